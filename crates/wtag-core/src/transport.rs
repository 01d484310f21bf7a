//! Cloud transport collaborator
//!
//! The core never talks to the network itself. Fetching and persisting a
//! sensor's monitoring config go through [`ConfigTransport`], implemented
//! over HTTP by `wtag-cloud` and in memory by [`MemoryTransport`].

use crate::error::{TagError, TagResult};
use crate::kind::SensorKind;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identifies one sensor of one tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorRef {
    pub tag_uuid: Uuid,
    /// Tag number among its tag manager's tags
    pub slave_id: u8,
    pub kind: SensorKind,
}

impl fmt::Display for SensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}/{}", self.tag_uuid, self.slave_id, self.kind)
    }
}

/// Access to cloud-side monitoring configs
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    /// Current cloud-side config values for a sensor, canonical units
    async fn fetch_config(&self, sensor: &SensorRef) -> TagResult<Map<String, Value>>;

    /// Push a subset (or all) of a sensor's config values
    async fn persist_config(&self, sensor: &SensorRef, fields: Map<String, Value>)
        -> TagResult<()>;
}

/// A call recorded by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Fetch(SensorRef),
    Persist(SensorRef, Map<String, Value>),
}

/// In-memory stand-in for the cloud
///
/// Serves configs from a map, merges persisted fields into it and records
/// every call. Can be told to fail, for exercising error paths.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    configs: Mutex<HashMap<SensorRef, Map<String, Value>>>,
    calls: Mutex<Vec<TransportCall>>,
    failure: Mutex<Option<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cloud-side config of a sensor
    pub fn set_config(&self, sensor: &SensorRef, values: Map<String, Value>) {
        self.configs.lock().insert(sensor.clone(), values);
    }

    /// Current cloud-side config of a sensor
    pub fn config(&self, sensor: &SensorRef) -> Option<Map<String, Value>> {
        self.configs.lock().get(sensor).cloned()
    }

    /// Make every following call fail with `message` until cleared
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Calls seen so far
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, TransportCall::Fetch(_)))
            .count()
    }

    pub fn persist_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, TransportCall::Persist(..)))
            .count()
    }

    fn check_failure(&self) -> TagResult<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(TagError::transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                message.clone(),
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConfigTransport for MemoryTransport {
    async fn fetch_config(&self, sensor: &SensorRef) -> TagResult<Map<String, Value>> {
        self.calls.lock().push(TransportCall::Fetch(sensor.clone()));
        self.check_failure()?;
        Ok(self.config(sensor).unwrap_or_default())
    }

    async fn persist_config(
        &self,
        sensor: &SensorRef,
        fields: Map<String, Value>,
    ) -> TagResult<()> {
        self.calls
            .lock()
            .push(TransportCall::Persist(sensor.clone(), fields.clone()));
        self.check_failure()?;
        self.configs
            .lock()
            .entry(sensor.clone())
            .or_default()
            .extend(fields);
        Ok(())
    }
}
