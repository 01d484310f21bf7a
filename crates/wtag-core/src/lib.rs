//! wtag-core - Tags, sensors and monitoring configs for the wireless tag cloud
//!
//! This crate models a tag manager's tags the way the cloud reports them:
//!
//! - **Tag**: one physical tag, its cached cloud payload and its sensors
//! - **Sensor**: one channel of a tag (temperature, humidity, motion, ...)
//! - **MonitoringConfig**: per-sensor alerting config with unit conversion,
//!   validation and dirty tracking, synchronized through a [`ConfigTransport`]
//! - **Registry**: the table of config fields each sensor kind supports
//!
//! Networking lives in `wtag-cloud`; [`MemoryTransport`] stands in for it
//! in tests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use wtag_core::{MemoryTransport, SensorKind, Tag, TemperatureUnit};
//!
//! # async fn run() -> Result<(), wtag_core::TagError> {
//! let payload = json!({"uuid": "0b6f8a1c-1d7e-4c22-9d0e-6a6b4f1c2d3e", "slaveId": 1, "tagType": 13});
//! let tag = Tag::new(payload.as_object().cloned().unwrap_or_default(), Arc::new(MemoryTransport::new()))?;
//!
//! let temp = tag.initialize_sensor(SensorKind::Temp)?;
//! let mut config = temp.monitoring_config().lock().await;
//! config
//!     .set_unit(TemperatureUnit::DegF)
//!     .set("thresholds.lowValue", 40)?
//!     .set("thresholds.highValue", 90)?;
//! config.update().await?;
//! # Ok(())
//! # }
//! ```

pub mod dirty;
pub mod error;
pub mod events;
pub mod kind;
pub mod monitoring;
pub mod registry;
pub mod sensor;
pub mod tag;
pub mod transport;
pub mod units;

// Re-export commonly used types
pub use dirty::DirtySet;
pub use error::{TagError, TagResult};
pub use events::{ConfigCause, SensorEvent};
pub use kind::SensorKind;
pub use monitoring::MonitoringConfig;
pub use registry::{registry, ConfigFieldSpec, ConfigRegistry};
pub use sensor::{Reading, Sensor};
pub use tag::Tag;
pub use transport::{ConfigTransport, MemoryTransport, SensorRef, TransportCall};
pub use units::TemperatureUnit;
