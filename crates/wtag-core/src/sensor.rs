//! Sensors
//!
//! A sensor is one channel of a tag. It reads its state through the
//! owning tag's cached cloud payload and owns exactly one
//! [`MonitoringConfig`], created on first access.

use crate::error::{TagError, TagResult};
use crate::events::{SensorEvent, EVENT_BUFFER};
use crate::kind::SensorKind;
use crate::monitoring::{MonitoringConfig, UnitCell};
use crate::registry::registry;
use crate::tag::Tag;
use crate::transport::{ConfigTransport, SensorRef};
use crate::units::TemperatureUnit;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// Current reading of a sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Flag(bool),
    State(&'static str),
}

impl Reading {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reading::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Reading::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Reading::State(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// PAYLOAD LAYOUT
// =============================================================================

const TEMP_STATES: &[&str] = &["Disarmed", "Normal", "Too Hot", "Too Cold"];
const CAP_STATES: &[&str] = &["Disarmed", "Normal", "Too Dry", "Too Humid"];
const LIGHT_STATES: &[&str] = &["N.A.", "Disarmed", "Normal", "Too Dark", "Too Bright"];
const WATER_STATES: &[&str] = &["Disarmed", "Dry", "Water Detected"];
const MOTION_STATES: &[&str] = &[
    "Disarmed",
    "Armed",
    "Moved",
    "Opened",
    "Closed",
    "Detected",
    "Timed Out",
    "Stabilizing",
    "Carried Away",
    "In Free Fall",
];
const ARM_STATES: &[&str] = &["Disarmed", "Armed"];
const RANGE_STATES: &[&str] = &["In Range", "Out Of Range"];

/// Event states meaning the sensor is not armed
const DISARMED_STATES: &[&str] = &["Disarmed", "N.A."];

#[derive(Clone, Copy)]
enum ReadingLayout {
    Number,
    Flag,
    /// Integer index into state names
    State(&'static [&'static str]),
}

#[derive(Clone, Copy)]
enum StateLayout {
    /// Integer index into state names
    Index(&'static [&'static str]),
    /// Zero/false is the first name, anything else the second
    Binary(&'static [&'static str]),
}

impl StateLayout {
    fn names(&self) -> &'static [&'static str] {
        match self {
            StateLayout::Index(names) | StateLayout::Binary(names) => names,
        }
    }

    fn decode(&self, value: &Value) -> Option<&'static str> {
        match self {
            StateLayout::Index(names) => names.get(usize::try_from(value.as_u64()?).ok()?).copied(),
            StateLayout::Binary(names) => Some(names[usize::from(truthy(value)?)]),
        }
    }
}

/// Where a sensor kind's reading and event state live in the tag payload
struct PayloadLayout {
    reading_key: &'static str,
    reading: ReadingLayout,
    state: Option<(&'static str, StateLayout)>,
}

fn layout(kind: SensorKind) -> PayloadLayout {
    use ReadingLayout as R;
    use StateLayout as S;

    let (reading_key, reading, state) = match kind {
        SensorKind::Temp => ("temperature", R::Number, Some(("tempEventState", S::Index(TEMP_STATES)))),
        SensorKind::SecondaryTemp => ("cap", R::Number, Some(("capEventState", S::Index(TEMP_STATES)))),
        SensorKind::Humidity | SensorKind::Moisture => {
            ("cap", R::Number, Some(("capEventState", S::Index(CAP_STATES))))
        }
        SensorKind::Light => ("lux", R::Number, Some(("lightEventState", S::Index(LIGHT_STATES)))),
        SensorKind::Water => ("shorted", R::Flag, Some(("capEventState", S::Index(WATER_STATES)))),
        SensorKind::Motion => ("eventState", R::State(MOTION_STATES), None),
        SensorKind::Event => (
            "eventState",
            R::State(MOTION_STATES),
            Some(("eventState", S::Binary(ARM_STATES))),
        ),
        SensorKind::Signal => ("signaldBm", R::Number, None),
        SensorKind::Battery => ("batteryVolt", R::Number, Some(("enLBN", S::Binary(ARM_STATES)))),
        SensorKind::OutOfRange => ("OutOfRange", R::Flag, Some(("OutOfRange", S::Binary(RANGE_STATES)))),
    };
    PayloadLayout {
        reading_key,
        reading,
        state,
    }
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    }
}

// =============================================================================
// SENSOR
// =============================================================================

/// One measurable channel of a tag
pub struct Sensor {
    reference: SensorRef,
    tag: Weak<Tag>,
    unit: UnitCell,
    events: broadcast::Sender<SensorEvent>,
    transport: Arc<dyn ConfigTransport>,
    config: OnceCell<Mutex<MonitoringConfig>>,
}

impl Sensor {
    pub(crate) fn new(
        reference: SensorRef,
        tag: Weak<Tag>,
        transport: Arc<dyn ConfigTransport>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            reference,
            tag,
            unit: Arc::new(RwLock::new(TemperatureUnit::default())),
            events,
            transport,
            config: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.reference.kind
    }

    pub fn sensor_ref(&self) -> &SensorRef {
        &self.reference
    }

    /// The owning tag. Fails once the tag has been dropped.
    pub fn tag(&self) -> TagResult<Arc<Tag>> {
        self.tag.upgrade().ok_or(TagError::TagDropped)
    }

    /// Display unit selected on the monitoring config
    pub fn unit(&self) -> TemperatureUnit {
        *self.unit.read()
    }

    /// Listen for `data` and `config` events. Drop the receiver to stop listening.
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }

    pub(crate) fn notify_data(&self) {
        // no receivers is fine
        let _ = self.events.send(SensorEvent::Data {
            sensor: self.reference.clone(),
        });
    }

    fn payload_value(&self, key: &str) -> Option<Value> {
        self.tag.upgrade()?.data_value(key)
    }

    /// Latest reading from the tag payload. Temperatures are in the display unit.
    pub fn reading(&self) -> Option<Reading> {
        let layout = layout(self.kind());
        let value = self.payload_value(layout.reading_key)?;
        match layout.reading {
            ReadingLayout::Number => {
                let n = value.as_f64()?;
                if self.kind().is_temperature() {
                    Some(Reading::Number(self.unit().from_canonical(n, false)))
                } else {
                    Some(Reading::Number(n))
                }
            }
            ReadingLayout::Flag => truthy(&value).map(Reading::Flag),
            ReadingLayout::State(names) => {
                let idx = usize::try_from(value.as_u64()?).ok()?;
                names.get(idx).copied().map(Reading::State)
            }
        }
    }

    /// Event state, or `None` for kinds without one
    pub fn event_state(&self) -> Option<&'static str> {
        let (key, state) = layout(self.kind()).state?;
        state.decode(&self.payload_value(key)?)
    }

    /// Possible values of [`Sensor::event_state`]
    pub fn event_state_values(&self) -> &'static [&'static str] {
        layout(self.kind())
            .state
            .map(|(_, state)| state.names())
            .unwrap_or(&[])
    }

    /// Whether the sensor is armed, or `None` for kinds without an event state
    pub fn is_armed(&self) -> Option<bool> {
        self.event_state().map(|s| !DISARMED_STATES.contains(&s))
    }

    /// Probe feeding a temperature, humidity or moisture sensor
    pub fn probe_type(&self) -> Option<String> {
        match self.kind() {
            SensorKind::Temp
            | SensorKind::SecondaryTemp
            | SensorKind::Humidity
            | SensorKind::Moisture => {}
            _ => return None,
        }
        let named = self
            .payload_value("probeType")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty());
        Some(named.unwrap_or_else(|| "Internal".to_string()))
    }

    /// Whether the external probe is unplugged, or `None` if the tag has
    /// no external probe to detect
    pub fn probe_disconnected(&self) -> Option<bool> {
        let tag = self.tag.upgrade()?;
        if !tag.is_external_temp_probe() {
            return None;
        }
        Some(
            tag.data_value("shorted")
                .and_then(|v| truthy(&v))
                .unwrap_or(false),
        )
    }

    /// The sensor's monitoring config, created and hydrated from the tag
    /// payload on first access. Always the same instance.
    pub fn monitoring_config(&self) -> &Mutex<MonitoringConfig> {
        self.config.get_or_init(|| {
            let values = self
                .tag
                .upgrade()
                .map(|tag| config_values(self.kind(), &tag.data()))
                .unwrap_or_default();
            debug!(
                "Creating monitoring config for {} with {} known values",
                self.reference,
                values.len()
            );
            Mutex::new(
                MonitoringConfig::attached(
                    self.reference.clone(),
                    self.transport.clone(),
                    self.events.clone(),
                    self.unit.clone(),
                )
                .with_values(values),
            )
        })
    }
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("reference", &self.reference)
            .field("unit", &self.unit())
            .finish_non_exhaustive()
    }
}

/// Config values of `kind` present in a tag payload
fn config_values(kind: SensorKind, payload: &Map<String, Value>) -> Map<String, Value> {
    registry()
        .fields(kind)
        .iter()
        .filter_map(|spec| spec.cloud_key)
        .filter_map(|key| payload.get(key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn tag(payload: Value) -> Arc<Tag> {
        let transport = Arc::new(MemoryTransport::new());
        Tag::new(payload.as_object().cloned().unwrap(), transport).unwrap()
    }

    fn payload() -> Value {
        json!({
            "uuid": "0b6f8a1c-1d7e-4c22-9d0e-6a6b4f1c2d3e",
            "slaveId": 4,
            "name": "Attic",
            "tagType": 26,
            "alive": true,
            "temperature": 21.5,
            "tempEventState": 2,
            "cap": 48.5,
            "capEventState": 0,
            "lux": 120.0,
            "lightEventState": 0,
            "eventState": 3,
            "signaldBm": -71,
            "batteryVolt": 2.95,
            "enLBN": true,
            "OutOfRange": false,
            "th_low": 0,
            "th_high": 30,
            "th_window": 1,
            "apnsSound": "default",
            "oorGrace": 2
        })
    }

    #[test]
    fn test_readings_by_kind() {
        let tag = tag(payload());
        let temp = tag.initialize_sensor(SensorKind::Temp).unwrap();
        assert_eq!(temp.reading(), Some(Reading::Number(21.5)));
        assert_eq!(temp.event_state(), Some("Too Hot"));
        assert_eq!(temp.is_armed(), Some(true));

        let humidity = tag.initialize_sensor(SensorKind::Humidity).unwrap();
        assert_eq!(humidity.reading().and_then(|r| r.as_f64()), Some(48.5));
        assert_eq!(humidity.event_state(), Some("Disarmed"));
        assert_eq!(humidity.is_armed(), Some(false));

        let light = tag.initialize_sensor(SensorKind::Light).unwrap();
        assert_eq!(light.event_state(), Some("N.A."));
        assert_eq!(light.is_armed(), Some(false));

        let battery = tag.initialize_sensor(SensorKind::Battery).unwrap();
        assert_eq!(battery.reading(), Some(Reading::Number(2.95)));
        assert_eq!(battery.event_state(), Some("Armed"));

        let oor = tag.initialize_sensor(SensorKind::OutOfRange).unwrap();
        assert_eq!(oor.reading(), Some(Reading::Flag(false)));
        assert_eq!(oor.event_state(), Some("In Range"));
    }

    #[test]
    fn test_motion_and_signal_have_no_event_state() {
        let tag = tag(payload());
        let motion = tag.initialize_sensor(SensorKind::Motion).unwrap();
        assert_eq!(motion.reading(), Some(Reading::State("Opened")));
        assert_eq!(motion.event_state(), None);
        assert_eq!(motion.is_armed(), None);
        assert!(motion.event_state_values().is_empty());

        let signal = tag.initialize_sensor(SensorKind::Signal).unwrap();
        assert_eq!(signal.reading().and_then(|r| r.as_f64()), Some(-71.0));
        assert_eq!(signal.event_state(), None);
    }

    #[test]
    fn test_event_state_in_values() {
        let tag = tag(payload());
        for kind in tag.sensor_capabilities() {
            let sensor = tag.initialize_sensor(kind).unwrap();
            if let Some(state) = sensor.event_state() {
                assert!(sensor.event_state_values().contains(&state), "{}", kind);
            }
        }
    }

    #[test]
    fn test_event_sensor_reading_and_arming() {
        let mut p = payload();
        p["tagType"] = json!(52);
        let tag = tag(p);
        let event = tag.initialize_sensor(SensorKind::Event).unwrap();
        assert_eq!(event.reading().and_then(|r| r.as_str()), Some("Opened"));
        assert_eq!(event.event_state(), Some("Armed"));
        assert_eq!(event.is_armed(), Some(true));
    }

    #[test]
    fn test_probe_type() {
        let tag = tag(payload());
        let temp = tag.initialize_sensor(SensorKind::Temp).unwrap();
        assert_eq!(temp.probe_type().as_deref(), Some("Internal"));
        let signal = tag.initialize_sensor(SensorKind::Signal).unwrap();
        assert_eq!(signal.probe_type(), None);

        let mut p = payload();
        p["probeType"] = json!("DS18B20");
        let probed = self::tag(p);
        let temp = probed.initialize_sensor(SensorKind::Temp).unwrap();
        assert_eq!(temp.probe_type().as_deref(), Some("DS18B20"));
    }

    #[test]
    fn test_probe_disconnected() {
        let tag = tag(payload());
        for kind in tag.sensor_capabilities() {
            let sensor = tag.initialize_sensor(kind).unwrap();
            assert_eq!(sensor.probe_disconnected(), None, "{}", kind);
        }

        let mut p = payload();
        p["tagType"] = json!(42);
        let probed = self::tag(p.clone());
        for kind in probed.sensor_capabilities() {
            let sensor = probed.initialize_sensor(kind).unwrap();
            assert_eq!(sensor.probe_disconnected(), Some(false), "{}", kind);
        }

        p["shorted"] = json!(true);
        assert!(probed.refresh(p.as_object().cloned().unwrap()).unwrap());
        let secondary = probed.initialize_sensor(SensorKind::SecondaryTemp).unwrap();
        assert_eq!(secondary.probe_disconnected(), Some(true));
    }

    #[tokio::test]
    async fn test_reading_follows_config_unit() {
        let tag = tag(payload());
        let temp = tag.initialize_sensor(SensorKind::Temp).unwrap();

        temp.monitoring_config()
            .lock()
            .await
            .set_unit(TemperatureUnit::DegF);
        let reading = temp.reading().and_then(|r| r.as_f64()).unwrap();
        assert!((reading - 70.7).abs() < 1e-9);
        assert_eq!(temp.unit(), TemperatureUnit::DegF);

        // humidity is not a temperature
        let humidity = tag.initialize_sensor(SensorKind::Humidity).unwrap();
        humidity
            .monitoring_config()
            .lock()
            .await
            .set_unit(TemperatureUnit::DegF);
        assert_eq!(humidity.reading(), Some(Reading::Number(48.5)));
    }

    #[tokio::test]
    async fn test_monitoring_config_is_cached_and_hydrated() {
        let tag = tag(payload());
        let temp = tag.initialize_sensor(SensorKind::Temp).unwrap();

        let first = temp.monitoring_config() as *const _;
        let second = temp.monitoring_config() as *const _;
        assert_eq!(first, second);

        let config = temp.monitoring_config().lock().await;
        assert!(!config.is_modified());
        assert_eq!(config.get("thresholds.highValue"), Some(json!(30)));
        assert_eq!(config.get("notifySettings.sound"), Some(json!("default")));
        // belongs to outofrange, not temp
        assert!(!config.values().contains_key("oorGrace"));
    }

    #[tokio::test]
    async fn test_config_event_reaches_sensor_listeners() {
        let transport = Arc::new(MemoryTransport::new());
        let tag = Tag::new(payload().as_object().cloned().unwrap(), transport.clone()).unwrap();
        let temp = tag.initialize_sensor(SensorKind::Temp).unwrap();
        transport.set_config(temp.sensor_ref(), json!({"th_low": 3}).as_object().cloned().unwrap());

        let mut rx = temp.subscribe();
        temp.monitoring_config().lock().await.update().await.unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), "config");
        assert_eq!(event.sensor(), temp.sensor_ref());
    }

    #[test]
    fn test_reading_without_tag_is_none() {
        let tag = tag(payload());
        let temp = tag.initialize_sensor(SensorKind::Temp).unwrap();
        drop(tag);
        assert!(matches!(temp.tag(), Err(TagError::TagDropped)));
        assert_eq!(temp.reading(), None);
        assert_eq!(temp.event_state(), None);
    }
}
