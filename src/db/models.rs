//! Database model types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The PRTG connection configuration. At most one non-deleted row is
/// considered active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrtgConfig {
    pub id: i64,
    /// Host or URL; `https://` is prepended when no scheme is given.
    pub endpoint: String,
    pub username: String,
    /// PRTG-issued hashed credential, treated as an opaque secret.
    pub passhash: String,
    pub verify_tls: bool,
    pub timeout_secs: i64,
    /// Field name carrying the sensor id on non-sensor scopes.
    pub sensor_field: String,
    pub last_test_status: Option<String>,
    pub last_test_message: Option<String>,
    pub last_tested_at: Option<NaiveDateTime>,
}

impl Default for PrtgConfig {
    fn default() -> Self {
        Self {
            id: 0,
            endpoint: String::new(),
            username: String::new(),
            passhash: String::new(),
            verify_tls: true,
            timeout_secs: 15,
            sensor_field: "idSensor".to_string(),
            last_test_status: None,
            last_test_message: None,
            last_tested_at: None,
        }
    }
}

/// Sensor state mapped from PRTG status codes and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorStatus {
    Up,
    Warning,
    Down,
    Paused,
    Unknown,
    /// Upstream text that matched no known state, passed through verbatim.
    Other(String),
}

impl SensorStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SensorStatus::Up => "up",
            SensorStatus::Warning => "warning",
            SensorStatus::Down => "down",
            SensorStatus::Paused => "paused",
            SensorStatus::Unknown => "unknown",
            SensorStatus::Other(text) => text,
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SensorStatus {
    fn from(value: &str) -> Self {
        match value {
            "up" => SensorStatus::Up,
            "warning" => SensorStatus::Warning,
            "down" => SensorStatus::Down,
            "paused" => SensorStatus::Paused,
            "unknown" => SensorStatus::Unknown,
            other => SensorStatus::Other(other.to_string()),
        }
    }
}

impl Serialize for SensorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SensorStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(SensorStatus::from(text.as_str()))
    }
}

/// A locally stored sensor row mirroring one PRTG sensor.
///
/// Every field below `sensor_id` is derived: a sync overwrites all of
/// them from the upstream row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub id: i64,
    /// External key into PRTG (`objid`).
    pub sensor_id: String,
    pub name: String,
    pub probe: Option<String>,
    pub group: Option<String>,
    pub device: Option<String>,
    pub status: Option<SensorStatus>,
    pub last_value: Option<String>,
    pub last_check: Option<NaiveDateTime>,
    pub last_up: Option<NaiveDateTime>,
    pub last_down: Option<NaiveDateTime>,
    pub uptime: Option<f64>,
    pub downtime: Option<f64>,
    pub coverage: Option<f64>,
    pub interval_secs: Option<i64>,
    pub message: Option<String>,
    pub priority: Option<i64>,
    /// Verbatim JSON snapshot of the source row, for audit and debugging.
    pub raw_details: Option<String>,
    pub chart_2h: Option<String>,
    pub chart_2d: Option<String>,
    pub chart_30d: Option<String>,
    pub chart_365d: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(SensorStatus::from("up"), SensorStatus::Up);
        assert_eq!(SensorStatus::from("paused").as_str(), "paused");
        assert_eq!(
            SensorStatus::from("unusual text"),
            SensorStatus::Other("unusual text".to_string())
        );
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&SensorStatus::Down).unwrap();
        assert_eq!(json, "\"down\"");

        let parsed: SensorStatus = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(parsed, SensorStatus::Warning);
    }

    #[test]
    fn test_config_defaults() {
        let config = PrtgConfig::default();
        assert!(config.verify_tls);
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.sensor_field, "idSensor");
    }
}
