//! Temperature unit conversion
//!
//! The cloud stores every temperature in degrees Celsius. Display values
//! are derived at the read/write boundary and never stored.

use crate::error::TagError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit in which temperature-bearing values are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    /// Degrees Celsius (canonical storage unit)
    #[default]
    #[serde(rename = "degC")]
    DegC,

    /// Degrees Fahrenheit
    #[serde(rename = "degF")]
    DegF,
}

impl TemperatureUnit {
    /// The unit values are stored in
    pub const CANONICAL: TemperatureUnit = TemperatureUnit::DegC;

    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::DegC => "degC",
            TemperatureUnit::DegF => "degF",
        }
    }

    pub fn is_canonical(&self) -> bool {
        *self == Self::CANONICAL
    }

    /// Express a canonical value in this unit
    pub fn from_canonical(&self, value: f64, is_delta: bool) -> f64 {
        match self {
            TemperatureUnit::DegC => value,
            TemperatureUnit::DegF => to_display(value, is_delta),
        }
    }

    /// Convert a value expressed in this unit back to canonical
    pub fn to_canonical(&self, value: f64, is_delta: bool) -> f64 {
        match self {
            TemperatureUnit::DegC => value,
            TemperatureUnit::DegF => to_canonical(value, is_delta),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemperatureUnit {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "degC" => Ok(TemperatureUnit::DegC),
            "degF" => Ok(TemperatureUnit::DegF),
            other => Err(TagError::InvalidUnit(other.to_string())),
        }
    }
}

/// Celsius to Fahrenheit. A delta (an interval such as hysteresis) has no offset.
pub fn to_display(value: f64, is_delta: bool) -> f64 {
    let scaled = value / 5.0 * 9.0;
    if is_delta {
        scaled
    } else {
        scaled + 32.0
    }
}

/// Fahrenheit to Celsius. Inverse of [`to_display`].
pub fn to_canonical(value: f64, is_delta: bool) -> f64 {
    let shifted = if is_delta { value } else { value - 32.0 };
    shifted / 9.0 * 5.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_absolute_conversion() {
        assert!(close(to_display(0.0, false), 32.0));
        assert!(close(to_display(100.0, false), 212.0));
        assert!(close(to_canonical(41.0, false), 5.0));
        assert!(close(to_canonical(-40.0, false), -40.0));
    }

    #[test]
    fn test_delta_conversion() {
        assert!(close(to_display(1.0, true), 1.8));
        assert!(close(to_canonical(9.0 / 5.0, true), 1.0));
        assert!(close(to_display(0.0, true), 0.0));
    }

    #[test]
    fn test_round_trip() {
        let samples = [-273.15, -40.0, -17.5, 0.0, 0.1, 21.3, 37.77, 100.0, 1e6];
        for x in samples {
            assert!(close(to_canonical(to_display(x, false), false), x), "{}", x);
            assert!(close(to_canonical(to_display(x, true), true), x), "{}", x);
        }
    }

    #[test]
    fn test_extreme_values_stay_finite() {
        assert!(to_canonical(f64::MAX, false).is_finite());
        assert!(to_canonical(f64::MAX, true).is_finite());
        assert!(to_canonical(f64::MIN, true).is_finite());
        assert!(to_canonical(1.0e308, false).is_finite());

        let x = f64::MAX / 2.0;
        assert!(to_display(x, false).is_finite());
        let back = to_canonical(to_display(x, false), false);
        assert!(((back - x) / x).abs() < 1e-12);
    }

    #[test]
    fn test_unit_methods() {
        let f = TemperatureUnit::DegF;
        assert!(close(f.from_canonical(5.0, false), 41.0));
        assert!(close(f.to_canonical(41.0, false), 5.0));
        assert!(close(TemperatureUnit::DegC.from_canonical(5.0, false), 5.0));
        assert!(TemperatureUnit::default().is_canonical());
        assert!(!f.is_canonical());
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("degF".parse::<TemperatureUnit>().unwrap(), TemperatureUnit::DegF);
        assert_eq!(TemperatureUnit::DegC.to_string(), "degC");
        assert!(matches!(
            "kelvin".parse::<TemperatureUnit>(),
            Err(TagError::InvalidUnit(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TemperatureUnit::DegF).unwrap();
        assert_eq!(json, "\"degF\"");
        let unit: TemperatureUnit = serde_json::from_str("\"degC\"").unwrap();
        assert_eq!(unit, TemperatureUnit::DegC);
    }
}
