//! Sensor kinds

use crate::error::TagError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One measurable channel on a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temp,
    SecondaryTemp,
    Humidity,
    Moisture,
    Light,
    Water,
    Motion,
    Event,
    Signal,
    Battery,
    OutOfRange,
}

impl SensorKind {
    pub const ALL: [SensorKind; 11] = [
        SensorKind::Temp,
        SensorKind::SecondaryTemp,
        SensorKind::Humidity,
        SensorKind::Moisture,
        SensorKind::Light,
        SensorKind::Water,
        SensorKind::Motion,
        SensorKind::Event,
        SensorKind::Signal,
        SensorKind::Battery,
        SensorKind::OutOfRange,
    ];

    /// Name used by the cloud service
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temp => "temp",
            SensorKind::SecondaryTemp => "secondarytemp",
            SensorKind::Humidity => "humidity",
            SensorKind::Moisture => "moisture",
            SensorKind::Light => "light",
            SensorKind::Water => "water",
            SensorKind::Motion => "motion",
            SensorKind::Event => "event",
            SensorKind::Signal => "signal",
            SensorKind::Battery => "battery",
            SensorKind::OutOfRange => "outofrange",
        }
    }

    /// Whether readings of this kind are temperatures subject to the display unit
    pub fn is_temperature(&self) -> bool {
        matches!(self, SensorKind::Temp)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| TagError::UnknownSensorKind(s.to_string()))
    }
}
