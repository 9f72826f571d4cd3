// Message bus integration: transport trait, NATS client and station publisher

mod client;
mod publisher;

#[cfg(test)]
pub(crate) mod memory;

#[cfg(test)]
mod tests;

pub use client::{subject_for, BusConfig, ConnectError, NatsBus};
pub use publisher::{station_topic_segment, PublishOutcome, StationPublisher};

use anyhow::Result;
use async_trait::async_trait;

/// Publish sink for station state.
///
/// Topics are `/`-separated paths; transports map them onto their own
/// addressing scheme.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish one payload. Retained publications are tracked until cleared.
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()>;

    /// Clear every retained publication this bus has tracked.
    ///
    /// Returns the number of topics cleared.
    async fn clear_retained(&self) -> Result<usize>;

    /// Clear everything retained under `prefix`, tracked or not.
    ///
    /// Returns the number of topics cleared.
    async fn clear_namespace(&self, prefix: &str) -> Result<usize>;

    /// Flush pending publications, optionally clearing tracked retained ones
    /// first
    async fn disconnect(&self, clear_retained: bool);
}
