use super::Bus;
use anyhow::{anyhow, Context, Result};
use async_nats::connection::State;
use async_nats::jetstream::{self, consumer, stream};
use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long `clear_namespace` waits for another retained message before it
/// assumes every subject has been seen
const CLEAR_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on a single `clear_namespace` scan
const CLEAR_MAX_DURATION: Duration = Duration::from_secs(10);

/// Connection state poll interval while waiting for the broker
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bus configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Topic namespace every station publishes under
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Publish station state as retained messages
    #[serde(default = "default_true")]
    pub retain_messages: bool,
    /// Clear everything retained under the base topic before the first publish
    #[serde(default)]
    pub clear_retained_on_start: bool,
    /// Clear tracked retained messages on shutdown
    #[serde(default)]
    pub clear_retained_on_exit: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// JetStream stream holding the last message per retained subject
    #[serde(default = "default_retained_stream")]
    pub retained_stream: String,
}

fn default_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_base_topic() -> String {
    "gpsno/simulation".to_string()
}

/// `gps-no-simulation_` plus six random hex digits
fn default_client_id() -> String {
    let suffix: [u8; 3] = rand::thread_rng().gen();
    format!(
        "gps-no-simulation_{:02x}{:02x}{:02x}",
        suffix[0], suffix[1], suffix[2]
    )
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_retained_stream() -> String {
    "GPSNO_RETAINED".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            base_topic: default_base_topic(),
            client_id: default_client_id(),
            retain_messages: true,
            clear_retained_on_start: false,
            clear_retained_on_exit: false,
            connect_timeout_secs: default_connect_timeout(),
            retained_stream: default_retained_stream(),
        }
    }
}

impl BusConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Why the initial bus connection failed
#[derive(Debug)]
pub enum ConnectError {
    /// The broker did not accept the connection within the timeout
    Timeout { url: String, waited: Duration },
    Failed { url: String, reason: String },
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Timeout { url, waited } => write!(
                f,
                "timed out after {:?} while connecting to message bus at {}",
                waited, url
            ),
            ConnectError::Failed { url, reason } => {
                write!(f, "failed to connect to message bus at {}: {}", url, reason)
            }
        }
    }
}

impl std::error::Error for ConnectError {}

/// Map a `/`-separated topic onto a NATS subject.
///
/// Segments are joined with `.`; characters NATS reserves inside a token
/// (`.`, `*`, `>` and whitespace) become `_`, and empty segments are dropped.
pub fn subject_for(topic: &str) -> String {
    topic
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .chars()
                .map(|c| match c {
                    '.' | '*' | '>' => '_',
                    c if c.is_whitespace() => '_',
                    c => c,
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// NATS-backed bus.
///
/// Retained publications go through a JetStream stream that keeps one message
/// per subject, so late subscribers can read the last value of every topic.
/// Everything else is a plain core NATS publish.
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: BusConfig,
    /// Present when retained publishing is enabled
    retained_stream: Option<stream::Stream>,
    /// Topics published with retain set since the last clear
    retained: Mutex<HashSet<String>>,
}

impl NatsBus {
    /// Connect, waiting at most `connect_timeout` for the broker.
    ///
    /// The client connects in the background and the connection state is
    /// polled until it reports connected or the timeout elapses.
    pub async fn connect(config: BusConfig) -> Result<Self, ConnectError> {
        info!(url = %config.url, client_id = %config.client_id, "Connecting to message bus");

        let mut options = async_nats::ConnectOptions::new()
            .name(&config.client_id)
            .connection_timeout(config.connect_timeout())
            .retry_on_initial_connect();

        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            if !user.is_empty() && !password.is_empty() {
                options = options.user_and_password(user.clone(), password.clone());
            }
        }

        let client = options
            .connect(config.url.as_str())
            .await
            .map_err(|e| ConnectError::Failed {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;

        let timeout = config.connect_timeout();
        let started = Instant::now();
        while !matches!(client.connection_state(), State::Connected) {
            if started.elapsed() >= timeout {
                error!(url = %config.url, "Timeout while connecting to message bus");
                return Err(ConnectError::Timeout {
                    url: config.url.clone(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
        }

        info!(url = %config.url, "Connected to message bus");

        let jetstream = jetstream::new(client.clone());
        let mut bus = Self {
            client,
            jetstream,
            config,
            retained_stream: None,
            retained: Mutex::new(HashSet::new()),
        };

        if bus.config.retain_messages {
            let retained_stream =
                bus.ensure_retained_stream()
                    .await
                    .map_err(|e| ConnectError::Failed {
                        url: bus.config.url.clone(),
                        reason: format!("{:#}", e),
                    })?;
            bus.retained_stream = Some(retained_stream);
        }

        Ok(bus)
    }

    /// Ensure the retained stream exists, covering everything under the base topic
    async fn ensure_retained_stream(&self) -> Result<stream::Stream> {
        let name = &self.config.retained_stream;

        if let Ok(existing) = self.jetstream.get_stream(name).await {
            info!(stream = %name, "Retained stream already exists");
            return Ok(existing);
        }

        let subjects = vec![format!("{}.>", subject_for(&self.config.base_topic))];
        info!(stream = %name, subjects = ?subjects, "Creating retained stream");

        let stream_config = stream::Config {
            name: name.clone(),
            subjects,
            max_messages_per_subject: 1,
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .context("Failed to create retained stream")
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn retained_stream(&self) -> Result<&stream::Stream> {
        self.retained_stream
            .as_ref()
            .ok_or_else(|| anyhow!("retained publishing is disabled"))
    }

    fn track_retained(&self, topic: &str) {
        if let Ok(mut retained) = self.retained.lock() {
            retained.insert(topic.to_string());
        }
    }

    fn take_retained(&self) -> Vec<String> {
        match self.retained.lock() {
            Ok(mut retained) => retained.drain().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Purge one subject from the retained stream
    async fn purge_subject(&self, subject: &str) -> Result<u64> {
        let response = self
            .retained_stream()?
            .purge()
            .filter(subject)
            .await
            .with_context(|| format!("Failed to purge retained subject '{}'", subject))?;
        Ok(response.purged)
    }

    /// Collect the subjects currently retained under `filter`.
    ///
    /// Reads the last message of every subject through an ephemeral consumer
    /// until no new message arrives for `CLEAR_IDLE_TIMEOUT`.
    async fn retained_subjects(&self, filter: String) -> Result<HashSet<String>> {
        let consumer = self
            .retained_stream()?
            .create_consumer(consumer::pull::Config {
                filter_subject: filter,
                deliver_policy: consumer::DeliverPolicy::LastPerSubject,
                ack_policy: consumer::AckPolicy::None,
                inactive_threshold: Duration::from_secs(30),
                ..Default::default()
            })
            .await
            .context("Failed to create retained scan consumer")?;

        let mut messages = consumer
            .messages()
            .await
            .context("Failed to read retained messages")?;

        let started = Instant::now();
        let mut subjects = HashSet::new();
        while started.elapsed() < CLEAR_MAX_DURATION {
            match tokio::time::timeout(CLEAR_IDLE_TIMEOUT, messages.next()).await {
                Ok(Some(Ok(msg))) => {
                    subjects.insert(msg.subject.to_string());
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Error while scanning retained messages");
                }
                // stream ended or went idle
                Ok(None) | Err(_) => break,
            }
        }

        Ok(subjects)
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()> {
        let subject = subject_for(topic);

        if retain && self.retained_stream.is_some() {
            self.jetstream
                .publish(subject.clone(), payload.into())
                .await
                .with_context(|| format!("Failed to publish to subject '{}'", subject))?
                .await
                .context("Failed to await publish ack")?;
            self.track_retained(topic);
        } else {
            self.client
                .publish(subject.clone(), payload.into())
                .await
                .with_context(|| format!("Failed to publish to subject '{}'", subject))?;
        }

        debug!(subject = %subject, retain = retain, "Published");
        Ok(())
    }

    async fn clear_retained(&self) -> Result<usize> {
        let topics = self.take_retained();
        if topics.is_empty() {
            return Ok(0);
        }

        let mut cleared = 0;
        for topic in &topics {
            match self.purge_subject(&subject_for(topic)).await {
                Ok(_) => cleared += 1,
                Err(e) => warn!(topic = %topic, error = %e, "Failed to clear retained message"),
            }
        }

        info!(cleared = cleared, "Cleared tracked retained messages");
        Ok(cleared)
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<usize> {
        let filter = format!("{}.>", subject_for(prefix));
        info!(filter = %filter, "Clearing retained messages");

        let subjects = self.retained_subjects(filter).await?;
        let mut cleared = 0;
        for subject in &subjects {
            match self.purge_subject(subject).await {
                Ok(_) => cleared += 1,
                Err(e) => warn!(subject = %subject, error = %e, "Failed to clear retained message"),
            }
        }

        if let Ok(mut retained) = self.retained.lock() {
            let prefix = format!("{}/", prefix.trim_end_matches('/'));
            retained.retain(|topic| !topic.starts_with(&prefix));
        }

        info!(cleared = cleared, "Cleared retained messages under namespace");
        Ok(cleared)
    }

    async fn disconnect(&self, clear_retained: bool) {
        if clear_retained {
            if let Err(e) = self.clear_retained().await {
                error!(error = %e, "Error while clearing retained messages");
            }
        }

        match self.client.flush().await {
            Ok(()) => info!("Disconnected from message bus"),
            Err(e) => error!(error = %e, "Error while disconnecting from message bus"),
        }
    }
}
