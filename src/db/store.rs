//! SQLite-backed entity store.

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::{PrtgConfig, SensorRecord, SensorStatus};

/// Datetime format used for TEXT columns.
const STORE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Persistence interface for configuration and sensor records.
///
/// The sync orchestrator receives this as an injected dependency so
/// tests can run against an in-memory database.
pub trait EntityStore: Send + Sync {
    /// The single active (non-deleted) configuration, if any.
    fn find_active_config(&self) -> Result<Option<PrtgConfig>, DbError>;

    /// Upsert the active configuration. Test-result columns are left
    /// untouched; `config.id` is set on insert.
    fn save_config(&self, config: &mut PrtgConfig) -> Result<(), DbError>;

    /// Persist a connection-test outcome onto a configuration row. A
    /// missing row is a no-op, matching the host store semantics.
    fn save_test_result(&self, config_id: i64, success: bool, message: &str)
        -> Result<(), DbError>;

    fn get_sensor(&self, id: i64) -> Result<Option<SensorRecord>, DbError>;

    /// Insert a new sensor record and assign its id.
    fn insert_sensor(&self, sensor: &mut SensorRecord) -> Result<i64, DbError>;

    /// Overwrite an existing sensor record (last write wins).
    fn save_sensor(&self, sensor: &SensorRecord) -> Result<(), DbError>;

    /// A host record from another scope, as a JSON document.
    fn get_record(&self, scope: &str, id: i64) -> Result<Option<Value>, DbError>;
}

/// Thread-safe SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create a store backed by an in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with the embedded migration.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    /// Upsert a host record document for another scope.
    pub fn put_record(&self, scope: &str, id: i64, data: &Value) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO records (scope, id, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope, id) DO UPDATE SET data = excluded.data",
            params![scope, id, data.to_string()],
        )?;
        Ok(())
    }
}

impl EntityStore for SqliteStore {
    fn find_active_config(&self) -> Result<Option<PrtgConfig>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, endpoint, username, passhash, verify_tls, timeout_secs, sensor_field,
                    last_test_status, last_test_message, last_tested_at
             FROM prtg_config WHERE deleted = 0 ORDER BY id LIMIT 1",
        )?;

        let config = stmt
            .query_row([], |row| {
                Ok(PrtgConfig {
                    id: row.get(0)?,
                    endpoint: row.get(1)?,
                    username: row.get(2)?,
                    passhash: row.get(3)?,
                    verify_tls: row.get::<_, i64>(4)? != 0,
                    timeout_secs: row.get(5)?,
                    sensor_field: row.get(6)?,
                    last_test_status: row.get(7)?,
                    last_test_message: row.get(8)?,
                    last_tested_at: parse_datetime(row.get::<_, Option<String>>(9)?),
                })
            })
            .optional()?;

        Ok(config)
    }

    fn save_config(&self, config: &mut PrtgConfig) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM prtg_config WHERE deleted = 0 ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE prtg_config
                     SET endpoint = ?1, username = ?2, passhash = ?3, verify_tls = ?4,
                         timeout_secs = ?5, sensor_field = ?6
                     WHERE id = ?7",
                    params![
                        config.endpoint,
                        config.username,
                        config.passhash,
                        config.verify_tls as i64,
                        config.timeout_secs,
                        config.sensor_field,
                        id,
                    ],
                )?;
                config.id = id;
            }
            None => {
                conn.execute(
                    "INSERT INTO prtg_config (endpoint, username, passhash, verify_tls, timeout_secs, sensor_field)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        config.endpoint,
                        config.username,
                        config.passhash,
                        config.verify_tls as i64,
                        config.timeout_secs,
                        config.sensor_field,
                    ],
                )?;
                config.id = conn.last_insert_rowid();
            }
        }

        Ok(())
    }

    fn save_test_result(
        &self,
        config_id: i64,
        success: bool,
        message: &str,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE prtg_config
             SET last_test_status = ?1, last_test_message = ?2, last_tested_at = ?3
             WHERE id = ?4",
            params![
                if success { "success" } else { "failed" },
                truncate_message(message),
                Utc::now().naive_utc().format(STORE_DATETIME).to_string(),
                config_id,
            ],
        )?;
        Ok(())
    }

    fn get_sensor(&self, id: i64) -> Result<Option<SensorRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, sensor_id, name, probe, group_name, device, status, last_value,
                    last_check, last_up, last_down, uptime, downtime, coverage, interval_secs,
                    message, priority, raw_details, chart_2h, chart_2d, chart_30d, chart_365d
             FROM sensors WHERE id = ?1",
        )?;

        let sensor = stmt.query_row(params![id], map_sensor_row).optional()?;
        Ok(sensor)
    }

    fn insert_sensor(&self, sensor: &mut SensorRecord) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sensors (sensor_id, name) VALUES (?1, ?2)",
            params![sensor.sensor_id, sensor.name],
        )?;
        let id = conn.last_insert_rowid();
        sensor.id = id;
        Ok(id)
    }

    fn save_sensor(&self, sensor: &SensorRecord) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sensors
             SET sensor_id = ?1, name = ?2, probe = ?3, group_name = ?4, device = ?5,
                 status = ?6, last_value = ?7, last_check = ?8, last_up = ?9, last_down = ?10,
                 uptime = ?11, downtime = ?12, coverage = ?13, interval_secs = ?14,
                 message = ?15, priority = ?16, raw_details = ?17,
                 chart_2h = ?18, chart_2d = ?19, chart_30d = ?20, chart_365d = ?21
             WHERE id = ?22",
            params![
                sensor.sensor_id,
                sensor.name,
                sensor.probe,
                sensor.group,
                sensor.device,
                sensor.status.as_ref().map(|s| s.as_str().to_string()),
                sensor.last_value,
                format_datetime(sensor.last_check),
                format_datetime(sensor.last_up),
                format_datetime(sensor.last_down),
                sensor.uptime,
                sensor.downtime,
                sensor.coverage,
                sensor.interval_secs,
                sensor.message,
                sensor.priority,
                sensor.raw_details,
                sensor.chart_2h,
                sensor.chart_2d,
                sensor.chart_30d,
                sensor.chart_365d,
                sensor.id,
            ],
        )?;
        Ok(())
    }

    fn get_record(&self, scope: &str, id: i64) -> Result<Option<Value>, DbError> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE scope = ?1 AND id = ?2",
                params![scope, id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(data.map(|text| serde_json::from_str(&text).unwrap_or(Value::Null)))
    }
}

fn map_sensor_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SensorRecord> {
    Ok(SensorRecord {
        id: row.get(0)?,
        sensor_id: row.get(1)?,
        name: row.get(2)?,
        probe: row.get(3)?,
        group: row.get(4)?,
        device: row.get(5)?,
        status: row
            .get::<_, Option<String>>(6)?
            .map(|text| SensorStatus::from(text.as_str())),
        last_value: row.get(7)?,
        last_check: parse_datetime(row.get::<_, Option<String>>(8)?),
        last_up: parse_datetime(row.get::<_, Option<String>>(9)?),
        last_down: parse_datetime(row.get::<_, Option<String>>(10)?),
        uptime: row.get(11)?,
        downtime: row.get(12)?,
        coverage: row.get(13)?,
        interval_secs: row.get(14)?,
        message: row.get(15)?,
        priority: row.get(16)?,
        raw_details: row.get(17)?,
        chart_2h: row.get(18)?,
        chart_2d: row.get(19)?,
        chart_30d: row.get(20)?,
        chart_365d: row.get(21)?,
    })
}

fn format_datetime(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|dt| dt.format(STORE_DATETIME).to_string())
}

fn parse_datetime(value: Option<String>) -> Option<NaiveDateTime> {
    value.and_then(|text| NaiveDateTime::parse_from_str(&text, STORE_DATETIME).ok())
}

/// Cap a test message at 250 characters before persisting.
fn truncate_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() > 250 {
        let head: String = trimmed.chars().take(247).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_no_active_config() {
        assert!(store().find_active_config().unwrap().is_none());
    }

    #[test]
    fn test_config_upsert_keeps_single_row() {
        let store = store();

        let mut config = PrtgConfig {
            endpoint: "prtg.example.com".to_string(),
            username: "admin".to_string(),
            passhash: "123".to_string(),
            ..Default::default()
        };
        store.save_config(&mut config).unwrap();
        let first_id = config.id;

        config.endpoint = "prtg2.example.com".to_string();
        store.save_config(&mut config).unwrap();
        assert_eq!(config.id, first_id);

        let active = store.find_active_config().unwrap().unwrap();
        assert_eq!(active.endpoint, "prtg2.example.com");
        assert_eq!(active.timeout_secs, 15);
    }

    #[test]
    fn test_save_test_result() {
        let store = store();
        let mut config = PrtgConfig::default();
        store.save_config(&mut config).unwrap();

        store
            .save_test_result(config.id, false, "HTTP 401 - unauthorized")
            .unwrap();

        let active = store.find_active_config().unwrap().unwrap();
        assert_eq!(active.last_test_status.as_deref(), Some("failed"));
        assert_eq!(
            active.last_test_message.as_deref(),
            Some("HTTP 401 - unauthorized")
        );
        assert!(active.last_tested_at.is_some());
    }

    #[test]
    fn test_test_result_message_is_truncated() {
        let store = store();
        let mut config = PrtgConfig::default();
        store.save_config(&mut config).unwrap();

        let long = "x".repeat(400);
        store.save_test_result(config.id, true, &long).unwrap();

        let saved = store
            .find_active_config()
            .unwrap()
            .unwrap()
            .last_test_message
            .unwrap();
        assert_eq!(saved.chars().count(), 250);
        assert!(saved.ends_with("..."));
    }

    #[test]
    fn test_sensor_round_trip() {
        let store = store();

        let mut sensor = SensorRecord {
            sensor_id: "2001".to_string(),
            name: "Ping".to_string(),
            ..Default::default()
        };
        store.insert_sensor(&mut sensor).unwrap();
        assert!(sensor.id > 0);

        sensor.status = Some(SensorStatus::Up);
        sensor.uptime = Some(99.5);
        sensor.last_check = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(8, 30, 0);
        sensor.chart_2h = Some("<div>chart</div>".to_string());
        store.save_sensor(&sensor).unwrap();

        let loaded = store.get_sensor(sensor.id).unwrap().unwrap();
        assert_eq!(loaded, sensor);
    }

    #[test]
    fn test_record_document_lookup() {
        let store = store();
        store
            .put_record(
                "Circuit",
                7,
                &serde_json::json!({"idSensor": "4242", "name": "Link A"}),
            )
            .unwrap();

        let record = store.get_record("Circuit", 7).unwrap().unwrap();
        assert_eq!(record["idSensor"], "4242");
        assert!(store.get_record("Circuit", 8).unwrap().is_none());
    }
}
