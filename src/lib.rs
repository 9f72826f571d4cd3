// Station model, dirty tracking and movement
pub mod station;

// Fleet coordination and ranging
pub mod simulation;

// Station persistence
pub mod storage;

// Message bus and station publishing
pub mod bus;

// File and environment configuration
pub mod config;

// Startup preparation and tick loop
pub mod runner;
