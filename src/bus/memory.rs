// In-process bus recording every publication

use super::Bus;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Publication {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Default)]
pub(crate) struct MemoryBus {
    publications: Mutex<Vec<Publication>>,
    retained: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    disconnected: Mutex<bool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `topic` fail
    pub fn fail_topic(&self, topic: &str) {
        self.failing.lock().unwrap().insert(topic.to_string());
    }

    pub fn heal_topic(&self, topic: &str) {
        self.failing.lock().unwrap().remove(topic);
    }

    pub fn publications(&self) -> Vec<Publication> {
        self.publications.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.publications()
            .into_iter()
            .map(|p| p.topic)
            .collect()
    }

    /// Payload of the latest publication to `topic`
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.publications()
            .into_iter()
            .rev()
            .find(|p| p.topic == topic)
            .map(|p| p.payload)
    }

    pub fn retained(&self) -> BTreeMap<String, String> {
        self.retained.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.publications.lock().unwrap().clear();
    }

    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.lock().unwrap()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<()> {
        if self.failing.lock().unwrap().contains(topic) {
            bail!("publish to '{}' rejected", topic);
        }

        if retain {
            self.retained
                .lock()
                .unwrap()
                .insert(topic.to_string(), payload.clone());
        }
        self.publications.lock().unwrap().push(Publication {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn clear_retained(&self) -> Result<usize> {
        let mut retained = self.retained.lock().unwrap();
        let cleared = retained.len();
        retained.clear();
        Ok(cleared)
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<usize> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let mut retained = self.retained.lock().unwrap();
        let before = retained.len();
        retained.retain(|topic, _| !topic.starts_with(&prefix));
        Ok(before - retained.len())
    }

    async fn disconnect(&self, clear_retained: bool) {
        if clear_retained {
            self.retained.lock().unwrap().clear();
        }
        *self.disconnected.lock().unwrap() = true;
    }
}
