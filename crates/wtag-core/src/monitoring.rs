//! Monitoring configuration of a sensor
//!
//! Values are kept exactly as the cloud stores them (cloud keys, degC).
//! Reads and writes go through dotted paths from the
//! [registry](crate::registry), which also decides unit conversion and
//! accepted values. Every write is tracked so that [`MonitoringConfig::update`]
//! knows whether to push local edits or pull the cloud state.

use crate::dirty::DirtySet;
use crate::error::{TagError, TagResult};
use crate::events::{ConfigCause, SensorEvent, EVENT_BUFFER};
use crate::kind::SensorKind;
use crate::registry::{registry, ConfigFieldSpec};
use crate::transport::{ConfigTransport, SensorRef};
use crate::units::TemperatureUnit;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Display unit shared between a sensor and its config
pub(crate) type UnitCell = Arc<RwLock<TemperatureUnit>>;

/// A write that passed validation, ready to be committed
struct StagedWrite {
    path: String,
    cloud_key: &'static str,
    stored: Value,
}

/// Dirty-tracking monitoring configuration of one sensor
pub struct MonitoringConfig {
    sensor: SensorRef,
    raw: Map<String, Value>,
    dirty: DirtySet,
    unit: UnitCell,
    transport: Arc<dyn ConfigTransport>,
    events: broadcast::Sender<SensorEvent>,
}

impl MonitoringConfig {
    /// Create an empty, clean config with its own event channel
    pub fn new(sensor: SensorRef, transport: Arc<dyn ConfigTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self::attached(
            sensor,
            transport,
            events,
            Arc::new(RwLock::new(TemperatureUnit::default())),
        )
    }

    /// Create a config that reports through its sensor's channel and unit
    pub(crate) fn attached(
        sensor: SensorRef,
        transport: Arc<dyn ConfigTransport>,
        events: broadcast::Sender<SensorEvent>,
        unit: UnitCell,
    ) -> Self {
        Self {
            sensor,
            raw: Map::new(),
            dirty: DirtySet::new(),
            unit,
            transport,
            events,
        }
    }

    /// Hydrate with cloud values (canonical units). The config stays clean.
    pub fn with_values(mut self, values: Map<String, Value>) -> Self {
        self.raw = values;
        self
    }

    pub fn sensor_ref(&self) -> &SensorRef {
        &self.sensor
    }

    pub fn kind(&self) -> SensorKind {
        self.sensor.kind
    }

    /// Stored values keyed by cloud key, canonical units
    pub fn values(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Top-level field names applicable to this sensor kind
    pub fn fields(&self) -> Vec<&'static str> {
        registry()
            .top_level(self.kind())
            .map(|s| s.path.as_str())
            .collect()
    }

    /// Listen for config notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // UNIT
    // =========================================================================

    /// Unit temperature-bearing fields are read and written in
    pub fn unit(&self) -> TemperatureUnit {
        *self.unit.read()
    }

    /// Change the display unit. Stored values and modification state are untouched.
    pub fn set_unit(&mut self, unit: TemperatureUnit) -> &mut Self {
        *self.unit.write() = unit;
        self
    }

    // =========================================================================
    // FIELD ACCESS
    // =========================================================================

    /// Current value of a field, in the display unit.
    ///
    /// Object fields are returned as a JSON object of their children.
    /// `None` if the field does not apply to this sensor kind or has no value.
    pub fn get(&self, path: &str) -> Option<Value> {
        let spec = registry().lookup(self.kind(), path)?;
        if spec.is_object() {
            let children: Map<String, Value> = registry()
                .children(self.kind(), path)
                .filter_map(|child| {
                    let value = self.get(&child.path)?;
                    Some((leaf_name(&child.path).to_string(), value))
                })
                .collect();
            return (!children.is_empty()).then_some(Value::Object(children));
        }
        let stored = self.raw.get(spec.cloud_key?)?;
        self.present(spec, stored)
    }

    /// Numeric value of a field, in the display unit
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_f64())
    }

    /// Write a field, given in the display unit, and mark it modified.
    ///
    /// Writing an object field writes each supplied child; either all of
    /// them are accepted or nothing changes. Fields that do not apply to
    /// this sensor kind are discarded. A rejected value fails with
    /// [`TagError::Validation`] and leaves the config untouched.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> TagResult<&mut Self> {
        let value = value.into();
        let Some(spec) = registry().lookup(self.kind(), path) else {
            debug!(
                "Discarding write to '{}': not a {} config field",
                path,
                self.kind()
            );
            return Ok(self);
        };

        let mut staged = Vec::new();
        self.stage(spec, &value, &mut staged)?;

        for write in staged {
            self.raw.insert(write.cloud_key.to_string(), write.stored);
            self.dirty.mark(write.cloud_key);
            self.dirty.mark(write.path);
        }
        Ok(self)
    }

    fn stage(
        &self,
        spec: &'static ConfigFieldSpec,
        value: &Value,
        staged: &mut Vec<StagedWrite>,
    ) -> TagResult<()> {
        if spec.is_object() {
            let Some(children) = value.as_object() else {
                warn!("Rejecting non-object value for '{}'", spec.path);
                return Err(TagError::validation(&spec.path, value));
            };
            for (name, child_value) in children {
                let child_path = format!("{}.{}", spec.path, name);
                match registry().lookup(self.kind(), &child_path) {
                    Some(child) => self.stage(child, child_value, staged)?,
                    None => debug!("Discarding write to unknown field '{}'", child_path),
                }
            }
            return Ok(());
        }

        let Some(cloud_key) = spec.cloud_key else {
            return Err(TagError::validation(&spec.path, value));
        };
        let Some(mut stored) = spec.check(value) else {
            warn!("Rejecting value {} for '{}'", value, spec.path);
            return Err(TagError::validation(&spec.path, value));
        };

        if spec.is_temperature() {
            let Some(display) = value.as_f64() else {
                warn!("Rejecting non-numeric temperature {} for '{}'", value, spec.path);
                return Err(TagError::validation(&spec.path, value));
            };
            let unit = self.unit();
            if !unit.is_canonical() {
                let canonical = unit.to_canonical(display, spec.is_delta());
                if !canonical.is_finite() {
                    warn!("Rejecting {} for '{}': out of range in {}", value, spec.path, unit);
                    return Err(TagError::validation(&spec.path, value));
                }
                stored = Value::from(canonical);
            }
        }

        staged.push(StagedWrite {
            path: spec.path.clone(),
            cloud_key,
            stored,
        });
        Ok(())
    }

    /// Stored value as callers see it. `None` if it cannot be expressed in
    /// the display unit.
    fn present(&self, spec: &ConfigFieldSpec, stored: &Value) -> Option<Value> {
        let value = spec.decode(stored);
        let unit = self.unit();
        if !spec.is_temperature() || unit.is_canonical() {
            return Some(value);
        }
        match value.as_f64() {
            Some(canonical) => {
                Number::from_f64(unit.from_canonical(canonical, spec.is_delta())).map(Value::Number)
            }
            None => Some(value),
        }
    }

    // =========================================================================
    // MODIFICATION TRACKING
    // =========================================================================

    /// True if anything is marked modified
    pub fn is_modified(&self) -> bool {
        self.dirty.any()
    }

    /// True if `path` (dotted path or cloud key), an ancestor of it, or the
    /// whole config is marked modified
    pub fn is_path_modified(&self, path: &str) -> bool {
        self.dirty.contains(path)
    }

    /// Consider the whole config modified
    pub fn mark_modified(&mut self) -> &mut Self {
        self.dirty.mark_all();
        self
    }

    /// Mark exactly `path` modified (not its ancestors, siblings or cloud key)
    pub fn mark_path_modified(&mut self, path: &str) -> &mut Self {
        self.dirty.mark(path);
        self
    }

    /// Forget all modification marks
    pub fn reset_modified(&mut self) -> &mut Self {
        self.dirty.clear();
        self
    }

    /// Cloud values a push would send, canonical units
    pub fn pending_fields(&self) -> Map<String, Value> {
        if self.dirty.is_all() {
            return self.raw.clone();
        }

        let mut keys = BTreeSet::new();
        for path in self.dirty.paths() {
            let covered = registry().cloud_keys(self.kind(), path);
            if covered.is_empty() {
                keys.insert(path.to_string());
            } else {
                keys.extend(covered.into_iter().map(str::to_string));
            }
        }

        keys.into_iter()
            .filter_map(|key| self.raw.get(&key).cloned().map(|v| (key, v)))
            .collect()
    }

    // =========================================================================
    // CLOUD SYNC
    // =========================================================================

    /// Synchronize with the cloud.
    ///
    /// If modified, pushes the pending fields and keeps local values and
    /// marks as they are. Otherwise pulls the cloud state, replaces the
    /// local values and emits a `config` event if anything changed.
    /// Transport failures are returned unchanged with no local change.
    pub async fn update(&mut self) -> TagResult<&mut Self> {
        if self.is_modified() {
            let fields = self.pending_fields();
            debug!(
                "Pushing {} modified config fields for {}",
                fields.len(),
                self.sensor
            );
            if let Err(e) = self.transport.persist_config(&self.sensor, fields).await {
                warn!("Failed to push monitoring config for {}: {}", self.sensor, e);
                return Err(e);
            }
            return Ok(self);
        }

        debug!("Restoring monitoring config for {} from cloud", self.sensor);
        let fresh = match self.transport.fetch_config(&self.sensor).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("Failed to fetch monitoring config for {}: {}", self.sensor, e);
                return Err(e);
            }
        };

        if same_map(&self.raw, &fresh) {
            debug!("Monitoring config for {} unchanged", self.sensor);
            return Ok(self);
        }

        self.raw = fresh;
        info!("Monitoring config for {} updated from cloud", self.sensor);
        // no receivers is fine
        let _ = self.events.send(SensorEvent::Config {
            sensor: self.sensor.clone(),
            values: self.raw.clone(),
            cause: ConfigCause::Update,
        });
        Ok(self)
    }
}

impl fmt::Debug for MonitoringConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringConfig")
            .field("sensor", &self.sensor)
            .field("raw", &self.raw)
            .field("dirty", &self.dirty)
            .field("unit", &self.unit())
            .finish_non_exhaustive()
    }
}

fn leaf_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

/// Equality where `5` and `5.0` are the same number
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_value(a, b))
        }
        (Value::Object(x), Value::Object(y)) => same_map(x, y),
        _ => a == b,
    }
}

pub(crate) fn same_map(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(k, v)| b.get(k).map(|w| same_value(v, w)).unwrap_or(false))
}
