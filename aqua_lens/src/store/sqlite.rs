use super::{ResultBackend, StoreError};
use crate::model::{Alert, CalibrationRecord, WaterSource, WaterTestResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Params, Statement, params};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_initial.sql"))];

/// Durable backend over a single SQLite connection.
///
/// Each row keeps the full record as JSON next to the indexed columns used for
/// filtering and ordering.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path` and runs pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=DELETE;")?;
        run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = current_schema_version(conn);
    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            tracing::info!("Running store migration v{version}");
            conn.execute_batch(sql).map_err(|e| StoreError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}

// 0 when the schema does not exist yet.
fn current_schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

// Fixed-width UTC so text ordering matches time ordering.
fn timestamp_column(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn decode_records<T: DeserializeOwned>(stmt: &mut Statement<'_>, params: impl Params) -> Result<Vec<T>, StoreError> {
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut records = Vec::new();
    for row in rows {
        records.push(serde_json::from_str(&row?)?);
    }
    Ok(records)
}

impl ResultBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn insert_test(&self, test: &WaterTestResult) -> Result<(), StoreError> {
        let record = serde_json::to_string(test)?;
        self.conn().execute(
            "INSERT INTO water_tests
             (id, timestamp, water_source, user_id, latitude, longitude,
              overall_quality, safety_level, processing_method, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                test.id,
                timestamp_column(&test.timestamp),
                test.water_source.as_str(),
                test.user_id,
                test.location.map(|l| l.latitude),
                test.location.map(|l| l.longitude),
                test.overall_quality.as_str(),
                test.safety_level.as_str(),
                test.processing_method.as_str(),
                record,
            ],
        )?;
        Ok(())
    }

    fn list_tests(&self, limit: usize) -> Result<Vec<WaterTestResult>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT record FROM water_tests ORDER BY timestamp DESC, rowid DESC LIMIT ?1")?;
        decode_records(&mut stmt, params![sql_limit(limit)])
    }

    fn tests_by_source(&self, source: WaterSource) -> Result<Vec<WaterTestResult>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT record FROM water_tests WHERE water_source = ?1 ORDER BY timestamp DESC, rowid DESC",
        )?;
        decode_records(&mut stmt, params![source.as_str()])
    }

    fn tests_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<WaterTestResult>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT record FROM water_tests WHERE user_id = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
        )?;
        decode_records(&mut stmt, params![user_id, sql_limit(limit)])
    }

    fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let record = serde_json::to_string(alert)?;
        self.conn().execute(
            "INSERT INTO water_alerts (id, test_id, severity, timestamp, resolved, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                alert.id,
                alert.test_id,
                alert.severity.as_str(),
                timestamp_column(&alert.timestamp),
                alert.resolved,
                record,
            ],
        )?;
        Ok(())
    }

    fn list_alerts(&self, include_resolved: bool) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT record FROM water_alerts WHERE ?1 OR resolved = 0 ORDER BY timestamp DESC, rowid DESC",
        )?;
        decode_records(&mut stmt, params![include_resolved])
    }

    fn get_alert(&self, id: &str) -> Result<Option<Alert>, StoreError> {
        let record: Option<String> = self
            .conn()
            .query_row("SELECT record FROM water_alerts WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn update_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let record = serde_json::to_string(alert)?;
        let changed = self.conn().execute(
            "UPDATE water_alerts SET resolved = ?1, severity = ?2, record = ?3 WHERE id = ?4",
            params![alert.resolved, alert.severity.as_str(), record, alert.id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { id: alert.id.clone() });
        }
        Ok(())
    }

    fn get_preference(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let value: Option<String> = self
            .conn()
            .query_row("SELECT value FROM user_preferences WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put_preference(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.conn().execute(
            "INSERT INTO user_preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, json, timestamp_column(&Utc::now())],
        )?;
        Ok(())
    }

    fn list_preferences(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM user_preferences")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut preferences = BTreeMap::new();
        for row in rows {
            let (key, json) = row?;
            preferences.insert(key, serde_json::from_str(&json)?);
        }
        Ok(preferences)
    }

    fn insert_calibration(&self, record: &CalibrationRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.conn().execute(
            "INSERT INTO calibration_data (id, parameter, timestamp, record) VALUES (?1, ?2, ?3, ?4)",
            params![record.id, record.parameter, timestamp_column(&record.timestamp), json],
        )?;
        Ok(())
    }

    fn list_calibration(&self, parameter: Option<&str>) -> Result<Vec<CalibrationRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT record FROM calibration_data WHERE ?1 IS NULL OR parameter = ?1
             ORDER BY timestamp DESC, rowid DESC",
        )?;
        decode_records(&mut stmt, params![parameter])
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            "DELETE FROM water_tests;
             DELETE FROM water_alerts;
             DELETE FROM calibration_data;
             DELETE FROM user_preferences;",
        )?;
        Ok(())
    }
}
