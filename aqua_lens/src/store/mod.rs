// THEORY:
// The `store` module is the Result Store: durable history of water tests, the
// contamination alerts derived from them, calibration readings and user
// preferences.
//
// Key architectural principles:
// 1.  **Backend Seam**: Persistence sits behind the `ResultBackend` trait. The
//     SQLite backend is the durable one; the memory backend is both the test
//     double and the safety net.
// 2.  **Graceful Degradation**: `ResultStore` never lets a storage failure reach
//     the user. A failing durable call is logged and served from memory.
// 3.  **Explicit Lifecycle**: The store is constructed by its owner and opened
//     with `init()`. There is no global instance.

pub mod geo;
pub mod memory;
pub mod result_store;
pub mod sqlite;

use crate::model::{Alert, CalibrationRecord, WaterSource, WaterTestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub use memory::MemoryBackend;
pub use result_store::{ResultStore, Statistics, StoreExport};
pub use sqlite::SqliteBackend;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Alert not found: {id}")]
    NotFound { id: String },

    #[error("Alert already resolved: {id}")]
    AlreadyResolved { id: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Where results are persisted. With no path the store runs in memory only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: Option<PathBuf>,
}

/// A persistence engine for the store's four collections.
///
/// Listing methods return newest records first.
pub trait ResultBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn insert_test(&self, test: &WaterTestResult) -> Result<(), StoreError>;
    fn list_tests(&self, limit: usize) -> Result<Vec<WaterTestResult>, StoreError>;
    fn tests_by_source(&self, source: WaterSource) -> Result<Vec<WaterTestResult>, StoreError>;
    fn tests_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<WaterTestResult>, StoreError>;

    fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError>;
    fn list_alerts(&self, include_resolved: bool) -> Result<Vec<Alert>, StoreError>;
    fn get_alert(&self, id: &str) -> Result<Option<Alert>, StoreError>;
    fn update_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    fn get_preference(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    fn put_preference(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
    fn list_preferences(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError>;

    fn insert_calibration(&self, record: &CalibrationRecord) -> Result<(), StoreError>;
    fn list_calibration(&self, parameter: Option<&str>) -> Result<Vec<CalibrationRecord>, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}
