//! Monitoring-configuration field registry
//!
//! Static knowledge of which configuration fields exist for each sensor
//! kind, where each one lives in the cloud payload, whether it carries a
//! temperature, and which values it accepts. Built once on first use and
//! never mutated afterwards.
//!
//! Fields are addressed by dotted paths (`thresholds.lowValue`). Object
//! fields (`thresholds`) have no cloud key of their own; their children do.

use crate::kind::SensorKind;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

/// Unit semantics of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUnit {
    None,
    /// Temperature in canonical degC. A delta is an interval (no offset).
    Temperature { delta: bool },
}

/// Shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Scalar,
    Object,
}

/// A literal value a restricted field accepts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(&'static str),
}

impl Literal {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Literal::Int(n), Value::Number(num)) => num.as_f64() == Some(*n as f64),
            (Literal::Str(s), Value::String(v)) => s == v,
            _ => false,
        }
    }

    fn to_value(self) -> Value {
        match self {
            Literal::Int(n) => Value::from(n),
            Literal::Str(s) => Value::from(s),
        }
    }
}

/// Mapping between an accepted literal and its stored cloud code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestrictedValue {
    pub accepted: Literal,
    pub stored: i64,
}

/// Extra acceptance check for a scalar field
pub type Validator = fn(&Value) -> bool;

/// Descriptor of one addressable configuration field
#[derive(Debug, Clone)]
pub struct ConfigFieldSpec {
    /// Dotted path, unique per sensor kind
    pub path: String,
    /// Key in the cloud payload (None for object fields)
    pub cloud_key: Option<&'static str>,
    pub unit: FieldUnit,
    pub shape: FieldShape,
    pub validator: Option<Validator>,
    pub restricted: Option<&'static [RestrictedValue]>,
}

impl ConfigFieldSpec {
    pub fn is_temperature(&self) -> bool {
        matches!(self.unit, FieldUnit::Temperature { .. })
    }

    pub fn is_delta(&self) -> bool {
        matches!(self.unit, FieldUnit::Temperature { delta: true })
    }

    pub fn is_object(&self) -> bool {
        self.shape == FieldShape::Object
    }

    /// Check a value offered for writing and return what gets stored.
    ///
    /// Returns `None` when the value is rejected.
    pub fn check(&self, value: &Value) -> Option<Value> {
        if let Some(restricted) = self.restricted {
            return restricted
                .iter()
                .find(|r| r.accepted.matches(value))
                .map(|r| Value::from(r.stored));
        }
        if let Some(validator) = self.validator {
            if !validator(value) {
                return None;
            }
        }
        Some(value.clone())
    }

    /// Translate a stored cloud value into what callers see
    pub fn decode(&self, stored: &Value) -> Value {
        let Some(restricted) = self.restricted else {
            return stored.clone();
        };
        stored
            .as_i64()
            .and_then(|code| restricted.iter().find(|r| r.stored == code))
            .map(|r| r.accepted.to_value())
            .unwrap_or_else(|| stored.clone())
    }
}

// =============================================================================
// FIELD TABLES
// =============================================================================

struct FieldDef {
    name: &'static str,
    cloud_key: Option<&'static str>,
    unit: FieldUnit,
    validator: Option<Validator>,
    restricted: Option<&'static [RestrictedValue]>,
    children: &'static [FieldDef],
}

impl FieldDef {
    const fn temperature(mut self, delta: bool) -> Self {
        self.unit = FieldUnit::Temperature { delta };
        self
    }

    const fn validated(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    const fn restricted(mut self, values: &'static [RestrictedValue]) -> Self {
        self.restricted = Some(values);
        self
    }
}

const fn scalar(name: &'static str, cloud_key: &'static str) -> FieldDef {
    FieldDef {
        name,
        cloud_key: Some(cloud_key),
        unit: FieldUnit::None,
        validator: None,
        restricted: None,
        children: &[],
    }
}

const fn object(name: &'static str, children: &'static [FieldDef]) -> FieldDef {
    FieldDef {
        name,
        cloud_key: None,
        unit: FieldUnit::None,
        validator: None,
        restricted: None,
        children,
    }
}

const fn accepts(accepted: Literal, stored: i64) -> RestrictedValue {
    RestrictedValue { accepted, stored }
}

fn positive_integer(value: &Value) -> bool {
    value
        .as_f64()
        .map(|n| n >= 1.0 && n.fract() == 0.0)
        .unwrap_or(false)
}

fn percentage(value: &Value) -> bool {
    value
        .as_f64()
        .map(|n| (1.0..=100.0).contains(&n) && n.fract() == 0.0)
        .unwrap_or(false)
}

/// Out-of-range grace periods in seconds, stored as their index
pub const GRACE_PERIOD_VALUES: &[RestrictedValue] = &[
    accepts(Literal::Int(120), 0),
    accepts(Literal::Int(240), 1),
    accepts(Literal::Int(360), 2),
    accepts(Literal::Int(480), 3),
    accepts(Literal::Int(600), 4),
    accepts(Literal::Int(900), 5),
    accepts(Literal::Int(1200), 6),
    accepts(Literal::Int(1800), 7),
    accepts(Literal::Int(2700), 8),
    accepts(Literal::Int(3600), 9),
];

pub const RESPONSIVENESS_VALUES: &[RestrictedValue] = &[
    accepts(Literal::Str("Highest"), 0),
    accepts(Literal::Str("Medium high"), 1),
    accepts(Literal::Str("Medium"), 2),
    accepts(Literal::Str("Medium low"), 3),
    accepts(Literal::Str("Lowest"), 4),
];

const NOTIFY_SETTINGS: FieldDef = object(
    "notifySettings",
    &[
        scalar("email", "email"),
        scalar("useEmail", "send_email"),
        scalar("usePush", "beep_pc"),
        scalar("useSpeech", "beep_pc_tts"),
        scalar("sound", "apnsSound"),
        scalar("noSound", "beep_pc_off"),
    ],
);

const TEMP_THRESHOLDS: FieldDef = object(
    "thresholds",
    &[
        scalar("lowValue", "th_low").temperature(false),
        scalar("minLowReadings", "th_low_delay"),
        scalar("highValue", "th_high").temperature(false),
        scalar("minHighReadings", "th_high_delay"),
        scalar("hysteresis", "th_window").temperature(true),
    ],
);

const THRESHOLDS: FieldDef = object(
    "thresholds",
    &[
        scalar("lowValue", "th_low"),
        scalar("minLowReadings", "th_low_delay"),
        scalar("highValue", "th_high"),
        scalar("minHighReadings", "th_high_delay"),
        scalar("hysteresis", "th_window"),
    ],
);

const BATTERY_THRESHOLDS: FieldDef = object("thresholds", &[scalar("lowValue", "LBTh")]);

const MONITORING_INTERVAL: FieldDef =
    scalar("monitoringInterval", "interval").validated(positive_integer);

const MONITORING_ENABLED: FieldDef = scalar("monitoringEnabled", "enabled");

const RESPONSIVENESS: FieldDef =
    scalar("responsiveness", "responsiveness").restricted(RESPONSIVENESS_VALUES);

const CALIBRATION: FieldDef = object(
    "calibration",
    &[
        scalar("lowValue", "cal_low_value"),
        scalar("lowCapacitance", "cal_low_cap"),
        scalar("highValue", "cal_high_value"),
        scalar("highCapacitance", "cal_high_cap"),
    ],
);

const IS_DOOR_MODE: FieldDef = scalar("isDoorMode", "door_mode");

const DOOR_MODE: FieldDef = object(
    "doorMode",
    &[
        scalar("angle", "door_mode_angle"),
        scalar("notifyWhenOpenFor", "door_mode_delay"),
        scalar("notifyOnClosed", "door_mode_set_closed"),
    ],
);

const MOTION_MODE: FieldDef = object(
    "motionMode",
    &[
        scalar("timeoutOrResetAfter", "auto_reset_delay"),
        scalar("timeoutMode", "hmc_timeout_mode"),
    ],
);

const ORIENTATION: FieldDef = object(
    "orientation1",
    &[
        scalar("x", "az1_x"),
        scalar("y", "az1_y"),
        scalar("z", "az1_z"),
    ],
);

const SENSITIVITY: FieldDef = scalar("sensitivity", "sensitivity").validated(percentage);

const ARM_SILENTLY: FieldDef = scalar("armSilently", "silent_arming");

const GRACE_PERIOD: FieldDef = scalar("gracePeriod", "oorGrace").restricted(GRACE_PERIOD_VALUES);

const TEMP_FIELDS: &[FieldDef] = &[NOTIFY_SETTINGS, TEMP_THRESHOLDS, MONITORING_INTERVAL];
const SECONDARY_TEMP_FIELDS: &[FieldDef] = &[NOTIFY_SETTINGS];
const CAP_FIELDS: &[FieldDef] = &[NOTIFY_SETTINGS, THRESHOLDS, RESPONSIVENESS, CALIBRATION];
const LIGHT_FIELDS: &[FieldDef] = &[NOTIFY_SETTINGS, THRESHOLDS, MONITORING_INTERVAL];
const WATER_FIELDS: &[FieldDef] = &[NOTIFY_SETTINGS];
const MOTION_FIELDS: &[FieldDef] = &[
    NOTIFY_SETTINGS,
    RESPONSIVENESS,
    IS_DOOR_MODE,
    DOOR_MODE,
    MOTION_MODE,
    ORIENTATION,
    SENSITIVITY,
    ARM_SILENTLY,
];
const BATTERY_FIELDS: &[FieldDef] = &[NOTIFY_SETTINGS, BATTERY_THRESHOLDS, MONITORING_ENABLED];
const OUT_OF_RANGE_FIELDS: &[FieldDef] = &[NOTIFY_SETTINGS, GRACE_PERIOD];

fn definitions(kind: SensorKind) -> &'static [FieldDef] {
    match kind {
        SensorKind::Temp => TEMP_FIELDS,
        SensorKind::SecondaryTemp => SECONDARY_TEMP_FIELDS,
        SensorKind::Humidity | SensorKind::Moisture => CAP_FIELDS,
        SensorKind::Light => LIGHT_FIELDS,
        SensorKind::Water => WATER_FIELDS,
        SensorKind::Motion | SensorKind::Event => MOTION_FIELDS,
        SensorKind::Signal => &[],
        SensorKind::Battery => BATTERY_FIELDS,
        SensorKind::OutOfRange => OUT_OF_RANGE_FIELDS,
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Fields of one sensor kind, in declaration order
#[derive(Debug, Default)]
struct KindFields {
    specs: Vec<ConfigFieldSpec>,
    by_path: HashMap<String, usize>,
    by_cloud_key: HashMap<&'static str, usize>,
}

impl KindFields {
    fn build(defs: &'static [FieldDef]) -> Self {
        let mut fields = KindFields::default();
        for def in defs {
            fields.push(def, None);
        }
        fields
    }

    fn push(&mut self, def: &'static FieldDef, parent: Option<&str>) {
        let path = match parent {
            Some(parent) => format!("{}.{}", parent, def.name),
            None => def.name.to_string(),
        };
        let shape = if def.children.is_empty() {
            FieldShape::Scalar
        } else {
            FieldShape::Object
        };

        let idx = self.specs.len();
        self.by_path.insert(path.clone(), idx);
        if let Some(key) = def.cloud_key {
            self.by_cloud_key.insert(key, idx);
        }
        self.specs.push(ConfigFieldSpec {
            path: path.clone(),
            cloud_key: def.cloud_key,
            unit: def.unit,
            shape,
            validator: def.validator,
            restricted: def.restricted,
        });

        for child in def.children {
            self.push(child, Some(&path));
        }
    }
}

/// Process-wide, read-only field registry
#[derive(Debug)]
pub struct ConfigRegistry {
    kinds: HashMap<SensorKind, KindFields>,
}

static REGISTRY: Lazy<ConfigRegistry> = Lazy::new(ConfigRegistry::build);

/// Get the registry
pub fn registry() -> &'static ConfigRegistry {
    &REGISTRY
}

impl ConfigRegistry {
    fn build() -> Self {
        let kinds = SensorKind::ALL
            .into_iter()
            .map(|kind| (kind, KindFields::build(definitions(kind))))
            .collect();
        Self { kinds }
    }

    /// Look up a field by dotted path. `None` if it does not apply to `kind`.
    pub fn lookup(&self, kind: SensorKind, path: &str) -> Option<&ConfigFieldSpec> {
        let fields = self.kinds.get(&kind)?;
        fields.by_path.get(path).map(|&idx| &fields.specs[idx])
    }

    /// Look up a scalar field by its cloud payload key
    pub fn lookup_cloud_key(&self, kind: SensorKind, key: &str) -> Option<&ConfigFieldSpec> {
        let fields = self.kinds.get(&kind)?;
        fields.by_cloud_key.get(key).map(|&idx| &fields.specs[idx])
    }

    /// All fields of a kind, parents before children
    pub fn fields(&self, kind: SensorKind) -> &[ConfigFieldSpec] {
        self.kinds
            .get(&kind)
            .map(|f| f.specs.as_slice())
            .unwrap_or(&[])
    }

    /// Top-level field names of a kind
    pub fn top_level(&self, kind: SensorKind) -> impl Iterator<Item = &ConfigFieldSpec> {
        self.fields(kind).iter().filter(|s| !s.path.contains('.'))
    }

    /// Direct children of an object field
    pub fn children<'a>(
        &'a self,
        kind: SensorKind,
        path: &'a str,
    ) -> impl Iterator<Item = &'a ConfigFieldSpec> + 'a {
        self.fields(kind).iter().filter(move |s| {
            s.path
                .strip_prefix(path)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| !rest.contains('.'))
                .unwrap_or(false)
        })
    }

    /// Cloud keys backing a path: its own key, or those of its descendants
    pub fn cloud_keys(&self, kind: SensorKind, path: &str) -> Vec<&'static str> {
        let prefix = format!("{}.", path);
        self.fields(kind)
            .iter()
            .filter(|s| s.path == path || s.path.starts_with(&prefix))
            .filter_map(|s| s.cloud_key)
            .collect()
    }
}
