//! Sensor readings and their validation.
//!
//! Sensor nodes report raw accelerometer samples. Every sample passes through
//! [`Reading::try_from`] before it is allowed anywhere near machine state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reading as it arrives on the wire from a sensor node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    pub machine_id: String,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
}

impl RawReading {
    pub fn new(machine_id: impl Into<String>, acc_x: f64, acc_y: f64, acc_z: f64) -> Self {
        Self {
            machine_id: machine_id.into(),
            acc_x,
            acc_y,
            acc_z,
        }
    }
}

/// A validated accelerometer sample for one machine.
///
/// Construction guarantees a non-empty, trimmed machine id and finite axes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub machine_id: String,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    /// When the hub accepted the sample
    pub received_at: DateTime<Utc>,
}

impl Reading {
    /// Total acceleration, `sqrt(x² + y² + z²)`.
    pub fn magnitude(&self) -> f64 {
        (self.acc_x * self.acc_x + self.acc_y * self.acc_y + self.acc_z * self.acc_z).sqrt()
    }
}

/// Trim a machine id and reject it if nothing is left.
///
/// Every path that names a machine goes through here, so `" M1 "` and `"M1"`
/// always refer to the same registry entry.
pub fn normalize_machine_id(machine_id: &str) -> Result<&str, IngestError> {
    let machine_id = machine_id.trim();
    if machine_id.is_empty() {
        return Err(IngestError::InvalidReading(
            "machineId must not be empty".to_string(),
        ));
    }
    Ok(machine_id)
}

impl TryFrom<RawReading> for Reading {
    type Error = IngestError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        let machine_id = normalize_machine_id(&raw.machine_id)?;

        for (axis, value) in [("accX", raw.acc_x), ("accY", raw.acc_y), ("accZ", raw.acc_z)] {
            if !value.is_finite() {
                return Err(IngestError::InvalidReading(format!(
                    "{axis} for '{machine_id}' is not a finite number ({value})"
                )));
            }
        }

        Ok(Self {
            machine_id: machine_id.to_string(),
            acc_x: raw.acc_x,
            acc_y: raw.acc_y,
            acc_z: raw.acc_z,
            received_at: Utc::now(),
        })
    }
}

/// Errors raised while accepting a reading.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// The sample was malformed and has been dropped
    InvalidReading(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::InvalidReading(e) => write!(f, "Invalid reading: {e}"),
        }
    }
}

impl std::error::Error for IngestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_reading_is_normalized() {
        let reading = Reading::try_from(RawReading::new("  washer-1 ", 0.0, 3.0, 4.0)).unwrap();
        assert_eq!(reading.machine_id, "washer-1");
        assert!((reading.magnitude() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_id_rejected() {
        for id in ["", "   ", "\t\n"] {
            let err = Reading::try_from(RawReading::new(id, 1.0, 1.0, 1.0)).unwrap_err();
            assert!(matches!(err, IngestError::InvalidReading(_)));
        }
    }

    #[test]
    fn test_normalize_machine_id() {
        assert_eq!(normalize_machine_id(" M1 ").unwrap(), "M1");
        assert_eq!(normalize_machine_id("dryer-2").unwrap(), "dryer-2");
        assert!(matches!(
            normalize_machine_id("  "),
            Err(IngestError::InvalidReading(_))
        ));
    }

    #[test]
    fn test_non_finite_axes_rejected() {
        let bad = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY];
        for value in bad {
            assert!(Reading::try_from(RawReading::new("M1", value, 0.0, 0.0)).is_err());
            assert!(Reading::try_from(RawReading::new("M1", 0.0, value, 0.0)).is_err());
            assert!(Reading::try_from(RawReading::new("M1", 0.0, 0.0, value)).is_err());
        }
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let raw: RawReading = serde_json::from_str(
            r#"{"machineId":"FARRIS_WASHER_1","accX":0.1,"accY":-0.2,"accZ":9.8}"#,
        )
        .unwrap();
        assert_eq!(raw.machine_id, "FARRIS_WASHER_1");
        assert_eq!(raw.acc_z, 9.8);
    }

    #[test]
    fn test_error_display() {
        let err = IngestError::InvalidReading("accX is not a finite number".to_string());
        assert_eq!(err.to_string(), "Invalid reading: accX is not a finite number");
    }
}
