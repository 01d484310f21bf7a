//! Tags
//!
//! A [`Tag`] wraps the cloud's JSON payload for one physical tag and hands
//! out its sensors. Sensors are created on demand and cached, so asking for
//! the same kind twice yields the same [`Sensor`].

use crate::error::{TagError, TagResult};
use crate::kind::SensorKind;
use crate::monitoring::same_map;
use crate::sensor::Sensor;
use crate::transport::{ConfigTransport, SensorRef};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use uuid::Uuid;

/// 100 ns ticks between 1601-01-01 and the Unix epoch
const FILETIME_UNIX_OFFSET: i64 = 116_444_736_000_000_000;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Sensors every tag reports regardless of hardware
const COMMON_SENSORS: &[SensorKind] = &[
    SensorKind::Signal,
    SensorKind::Battery,
    SensorKind::OutOfRange,
];

/// Hardware sensors by tag type code
fn hardware_sensors(tag_type: u32) -> &'static [SensorKind] {
    use SensorKind::*;
    match tag_type {
        12 | 72 => &[Temp, Motion],
        13 | 21 => &[Temp, Humidity, Motion],
        26 => &[Temp, Humidity, Light, Motion],
        32 | 33 => &[Temp, Moisture, Water],
        42 => &[Temp, SecondaryTemp],
        52 | 53 => &[Temp, Humidity, Event],
        _ => &[Temp],
    }
}

/// Tag types whose temperature comes from an external probe on a cable
const EXTERNAL_PROBE_TYPES: &[u32] = &[42];

/// One physical tag as reported by the cloud
pub struct Tag {
    uuid: Uuid,
    slave_id: u8,
    tag_type: u32,
    data: RwLock<Map<String, Value>>,
    sensors: Mutex<BTreeMap<SensorKind, Arc<Sensor>>>,
    transport: Arc<dyn ConfigTransport>,
    me: Weak<Tag>,
}

impl Tag {
    /// Build a tag from its cloud payload.
    ///
    /// The payload must carry `uuid` and `slaveId`. `tagType` selects the
    /// hardware sensors and defaults to a plain temperature tag.
    pub fn new(
        data: Map<String, Value>,
        transport: Arc<dyn ConfigTransport>,
    ) -> TagResult<Arc<Self>> {
        let uuid = parse_uuid(&data)?;
        let slave_id = data
            .get("slaveId")
            .and_then(Value::as_u64)
            .and_then(|id| u8::try_from(id).ok())
            .ok_or_else(|| TagError::InvalidTagData("missing or invalid slaveId".to_string()))?;
        let tag_type = data
            .get("tagType")
            .and_then(Value::as_u64)
            .and_then(|t| u32::try_from(t).ok())
            .unwrap_or_default();

        debug!(
            "Creating tag {} (slave {}, type {})",
            uuid, slave_id, tag_type
        );

        Ok(Arc::new_cyclic(|me| Self {
            uuid,
            slave_id,
            tag_type,
            data: RwLock::new(data),
            sensors: Mutex::new(BTreeMap::new()),
            transport,
            me: me.clone(),
        }))
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn tag_type(&self) -> u32 {
        self.tag_type
    }

    pub fn name(&self) -> Option<String> {
        self.data_value("name")
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Whether the tag is considered alive by the tag manager
    pub fn alive(&self) -> bool {
        self.data_value("alive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Time of last communication with the tag manager
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        let ticks = self
            .data_value("lastComm")?
            .as_i64()?
            .checked_sub(FILETIME_UNIX_OFFSET)?;
        let secs = ticks.div_euclid(FILETIME_TICKS_PER_SEC);
        let nanos = ticks.rem_euclid(FILETIME_TICKS_PER_SEC) * 100;
        DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
    }

    /// Snapshot of the cached payload
    pub fn data(&self) -> Map<String, Value> {
        self.data.read().clone()
    }

    pub fn data_value(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Sensor kinds this tag has
    pub fn sensor_capabilities(&self) -> Vec<SensorKind> {
        hardware_sensors(self.tag_type)
            .iter()
            .chain(COMMON_SENSORS)
            .copied()
            .collect()
    }

    /// Whether the tag measures temperature through an external probe,
    /// so the cloud can tell when the probe is unplugged
    pub fn is_external_temp_probe(&self) -> bool {
        EXTERNAL_PROBE_TYPES.contains(&self.tag_type)
    }

    pub fn supports(&self, kind: SensorKind) -> bool {
        self.sensor_capabilities().contains(&kind)
    }

    /// Sensor of `kind`, created on first call and cached afterwards
    pub fn initialize_sensor(&self, kind: SensorKind) -> TagResult<Arc<Sensor>> {
        if !self.supports(kind) {
            return Err(TagError::UnsupportedSensor {
                tag: self.display_name(),
                kind: kind.to_string(),
            });
        }

        let mut sensors = self.sensors.lock();
        if let Some(sensor) = sensors.get(&kind) {
            return Ok(sensor.clone());
        }

        debug!("Initializing {} sensor on tag {}", kind, self.uuid);
        let reference = SensorRef {
            tag_uuid: self.uuid,
            slave_id: self.slave_id,
            kind,
        };
        let sensor = Arc::new(Sensor::new(
            reference,
            self.me.clone(),
            self.transport.clone(),
        ));
        sensors.insert(kind, sensor.clone());
        Ok(sensor)
    }

    /// Already initialized sensor of `kind`
    pub fn sensor(&self, kind: SensorKind) -> Option<Arc<Sensor>> {
        self.sensors.lock().get(&kind).cloned()
    }

    /// All initialized sensors
    pub fn sensors(&self) -> Vec<Arc<Sensor>> {
        self.sensors.lock().values().cloned().collect()
    }

    /// Replace the cached payload with a fresh one from the cloud.
    ///
    /// Returns whether anything changed. Initialized sensors get a `data`
    /// event when it did. A payload for a different tag is rejected.
    pub fn refresh(&self, data: Map<String, Value>) -> TagResult<bool> {
        let uuid = parse_uuid(&data)?;
        if uuid != self.uuid {
            return Err(TagError::InvalidTagData(format!(
                "payload for tag {} given to tag {}",
                uuid, self.uuid
            )));
        }

        {
            let mut current = self.data.write();
            if same_map(&current, &data) {
                debug!("Tag {} unchanged", self.uuid);
                return Ok(false);
            }
            *current = data;
        }

        info!("Tag {} data refreshed", self.uuid);
        for sensor in self.sensors() {
            sensor.notify_data();
        }
        Ok(true)
    }

    fn display_name(&self) -> String {
        self.name().unwrap_or_else(|| self.uuid.to_string())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("uuid", &self.uuid)
            .field("slave_id", &self.slave_id)
            .field("tag_type", &self.tag_type)
            .finish_non_exhaustive()
    }
}

fn parse_uuid(data: &Map<String, Value>) -> TagResult<Uuid> {
    let raw = data
        .get("uuid")
        .and_then(Value::as_str)
        .ok_or_else(|| TagError::InvalidTagData("missing uuid".to_string()))?;
    Uuid::parse_str(raw).map_err(|e| TagError::InvalidTagData(format!("uuid '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SensorEvent;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_test::assert_err;

    const UUID: &str = "0b6f8a1c-1d7e-4c22-9d0e-6a6b4f1c2d3e";

    fn payload(tag_type: u32) -> Map<String, Value> {
        json!({
            "uuid": UUID,
            "slaveId": 2,
            "name": "Garage",
            "tagType": tag_type,
            "alive": true,
            "temperature": 18.25,
            "lastComm": 133_000_000_000_000_000i64
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn tag(tag_type: u32) -> Arc<Tag> {
        Tag::new(payload(tag_type), Arc::new(MemoryTransport::new())).unwrap()
    }

    #[test]
    fn test_identity() {
        let tag = tag(13);
        assert_eq!(tag.uuid().to_string(), UUID);
        assert_eq!(tag.slave_id(), 2);
        assert_eq!(tag.name().as_deref(), Some("Garage"));
        assert!(tag.alive());
    }

    #[test]
    fn test_invalid_payload() {
        let transport: Arc<dyn ConfigTransport> = Arc::new(MemoryTransport::new());

        let mut no_uuid = payload(13);
        no_uuid.remove("uuid");
        let err = assert_err!(Tag::new(no_uuid, transport.clone()));
        assert!(matches!(err, TagError::InvalidTagData(_)));

        let mut bad_slave = payload(13);
        bad_slave.insert("slaveId".into(), json!(300));
        assert_err!(Tag::new(bad_slave, transport));
    }

    #[test]
    fn test_last_updated() {
        let tag = tag(13);
        let when = tag.last_updated().unwrap();
        assert_eq!(when.timestamp(), 1_655_526_400);
        assert_eq!(when.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_last_updated_out_of_range() {
        let mut data = payload(13);
        data.insert("lastComm".into(), json!(i64::MIN));
        let tag = Tag::new(data, Arc::new(MemoryTransport::new())).unwrap();
        assert_eq!(tag.last_updated(), None);

        let mut data = payload(13);
        data.remove("lastComm");
        let tag = Tag::new(data, Arc::new(MemoryTransport::new())).unwrap();
        assert_eq!(tag.last_updated(), None);
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(
            tag(26).sensor_capabilities(),
            vec![
                SensorKind::Temp,
                SensorKind::Humidity,
                SensorKind::Light,
                SensorKind::Motion,
                SensorKind::Signal,
                SensorKind::Battery,
                SensorKind::OutOfRange,
            ]
        );
        assert!(tag(32).supports(SensorKind::Water));
        assert!(tag(42).supports(SensorKind::SecondaryTemp));
        assert!(tag(52).supports(SensorKind::Event));
        assert!(!tag(52).supports(SensorKind::Motion));
        // unknown hardware still has a temperature sensor
        assert_eq!(tag(999).sensor_capabilities()[0], SensorKind::Temp);
    }

    #[test]
    fn test_external_temp_probe() {
        assert!(tag(42).is_external_temp_probe());
        assert!(!tag(13).is_external_temp_probe());
        assert!(!tag(32).is_external_temp_probe());
    }

    #[test]
    fn test_initialize_sensor_is_cached() {
        let tag = tag(13);
        let first = tag.initialize_sensor(SensorKind::Humidity).unwrap();
        let second = tag.initialize_sensor(SensorKind::Humidity).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(tag.sensor(SensorKind::Temp).is_none());
        assert_eq!(tag.sensors().len(), 1);
    }

    #[test]
    fn test_unsupported_sensor() {
        let tag = tag(62);
        let err = assert_err!(tag.initialize_sensor(SensorKind::Humidity));
        assert_eq!(err.to_string(), "Tag Garage does not support humidity sensor");
    }

    #[test]
    fn test_refresh_emits_data_only_on_change() {
        let tag = tag(13);
        let temp = tag.initialize_sensor(SensorKind::Temp).unwrap();
        let mut rx = temp.subscribe();

        assert!(!tag.refresh(payload(13)).unwrap());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        let mut fresh = payload(13);
        fresh.insert("temperature".into(), json!(19.0));
        assert!(tag.refresh(fresh).unwrap());
        assert_eq!(tag.data_value("temperature"), Some(json!(19.0)));

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, SensorEvent::Data { .. }));
        assert_eq!(event.sensor(), temp.sensor_ref());
    }

    #[test]
    fn test_refresh_rejects_other_tag() {
        let tag = tag(13);
        let mut other = payload(13);
        other.insert("uuid".into(), json!(Uuid::nil().to_string()));
        assert_err!(tag.refresh(other));
        assert_eq!(tag.uuid().to_string(), UUID);
    }
}
