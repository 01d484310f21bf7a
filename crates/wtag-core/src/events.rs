//! Sensor notifications
//!
//! Each sensor owns a broadcast channel. Observers call
//! [`Sensor::subscribe`](crate::Sensor::subscribe); dropping the receiver
//! removes the listener.

use crate::transport::SensorRef;
use serde::Serialize;
use serde_json::{Map, Value};

/// Buffer size of a sensor's event channel
pub const EVENT_BUFFER: usize = 64;

/// Why a config notification was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigCause {
    /// Config was refreshed from the cloud
    Update,
}

/// Notification emitted by a sensor after a cloud-driven refresh
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// The owning tag's cached payload changed
    Data { sensor: SensorRef },

    /// The monitoring config was replaced with different cloud state
    Config {
        sensor: SensorRef,
        /// Fresh cloud values, canonical units
        values: Map<String, Value>,
        cause: ConfigCause,
    },
}

impl SensorEvent {
    /// Event name as used by listeners ("data" or "config")
    pub fn name(&self) -> &'static str {
        match self {
            SensorEvent::Data { .. } => "data",
            SensorEvent::Config { .. } => "config",
        }
    }

    pub fn sensor(&self) -> &SensorRef {
        match self {
            SensorEvent::Data { sensor } | SensorEvent::Config { sensor, .. } => sensor,
        }
    }
}
