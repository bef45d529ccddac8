use super::geo::within_radius;
use super::{MemoryBackend, ResultBackend, SqliteBackend, StoreConfig, StoreError};
use crate::model::{
    Alert, AlertSeverity, CalibrationRecord, ColorChannels, GeoPoint, OverallQuality, SafetyLevel, WaterSource,
    WaterTestDraft, WaterTestResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// How many of the newest tests a location query scans.
pub const LOCATION_SCAN_LIMIT: usize = 1000;
/// How many of the newest tests statistics and exports cover.
pub const FULL_SCAN_LIMIT: usize = 10_000;
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// Aggregate counts over the stored history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_tests: usize,
    pub safe_tests: usize,
    pub caution_tests: usize,
    pub unsafe_tests: usize,
    pub critical_tests: usize,
    pub active_alerts: usize,
    pub quality_distribution: BTreeMap<String, usize>,
    pub source_distribution: BTreeMap<String, usize>,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreExport {
    pub water_tests: Vec<WaterTestResult>,
    pub alerts: Vec<Alert>,
    pub user_preferences: BTreeMap<String, serde_json::Value>,
    pub calibration_data: Vec<CalibrationRecord>,
    pub export_timestamp: DateTime<Utc>,
    pub version: u32,
}

/// The store facade used by the service.
///
/// Calls go to the durable backend when one is open. When it fails, the failure
/// is logged and the call is answered by the in-memory fallback instead.
pub struct ResultStore {
    config: StoreConfig,
    durable: RwLock<Option<Box<dyn ResultBackend>>>,
    fallback: MemoryBackend,
}

impl ResultStore {
    /// Creates a closed store. Nothing touches disk until `init`.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            durable: RwLock::new(None),
            fallback: MemoryBackend::new(),
        }
    }

    /// A store that only ever uses memory.
    pub fn in_memory() -> Self {
        Self::new(StoreConfig::default())
    }

    /// A store over an already opened backend.
    pub fn with_backend(backend: Box<dyn ResultBackend>) -> Self {
        Self {
            config: StoreConfig::default(),
            durable: RwLock::new(Some(backend)),
            fallback: MemoryBackend::new(),
        }
    }

    /// Opens the configured database. Returns whether durable storage is active.
    ///
    /// An unopenable database is not an error: the store keeps running in memory.
    pub fn init(&self) -> bool {
        let Some(path) = self.config.database_path.as_deref() else {
            return self.is_durable();
        };
        match SqliteBackend::open(path) {
            Ok(backend) => {
                tracing::info!(path = %path.display(), "result store opened");
                *self.durable.write().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(backend));
                true
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "result store unavailable, using memory");
                false
            }
        }
    }

    /// Drops the durable backend. Later calls are served from memory.
    pub fn close(&self) {
        if self.durable.write().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            tracing::debug!("result store closed");
        }
    }

    pub fn is_durable(&self) -> bool {
        self.durable.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    // Records the fallback took while the durable backend was failing are moved
    // back before the backend serves anything else.
    fn replay_pending(&self, backend: &dyn ResultBackend) {
        match self.fallback.replay_into(backend) {
            Ok(0) => {}
            Ok(moved) => tracing::info!(moved, backend = backend.name(), "pending records replayed"),
            Err(err) => tracing::debug!(backend = backend.name(), error = %err, "pending records not replayed yet"),
        }
    }

    // Runs `op` on the durable backend, falling back to memory on failure.
    fn call<T>(&self, name: &str, op: impl Fn(&dyn ResultBackend) -> Result<T, StoreError>) -> Result<T, StoreError> {
        {
            let durable = self.durable.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(backend) = durable.as_deref() {
                self.replay_pending(backend);
                match op(backend) {
                    Ok(value) => return Ok(value),
                    Err(err) => tracing::warn!(
                        operation = name,
                        backend = backend.name(),
                        error = %err,
                        "store call failed, falling back to memory"
                    ),
                }
            }
        }
        op(&self.fallback)
    }

    // List reads never surface errors. Whatever the fallback still holds is
    // merged into the durable answer, newest first, up to `limit`.
    fn merged<T>(
        &self,
        name: &str,
        op: impl Fn(&dyn ResultBackend) -> Result<Vec<T>, StoreError>,
        id: impl Fn(&T) -> &str,
        timestamp: impl Fn(&T) -> DateTime<Utc>,
        limit: Option<usize>,
    ) -> Vec<T> {
        let mut records = {
            let durable = self.durable.read().unwrap_or_else(PoisonError::into_inner);
            match durable.as_deref() {
                Some(backend) => {
                    self.replay_pending(backend);
                    op(backend).unwrap_or_else(|err| {
                        tracing::warn!(operation = name, backend = backend.name(), error = %err, "store read failed");
                        Vec::new()
                    })
                }
                None => Vec::new(),
            }
        };
        let pending = op(&self.fallback).unwrap_or_default();
        if !pending.is_empty() {
            let seen: HashSet<String> = records.iter().map(|r| id(r).to_string()).collect();
            records.extend(pending.into_iter().filter(|r| !seen.contains(id(r))));
            records.sort_by(|a, b| timestamp(b).cmp(&timestamp(a)));
        }
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    fn merged_tests(
        &self,
        name: &str,
        limit: Option<usize>,
        op: impl Fn(&dyn ResultBackend) -> Result<Vec<WaterTestResult>, StoreError>,
    ) -> Vec<WaterTestResult> {
        self.merged(name, op, |t| t.id.as_str(), |t| t.timestamp, limit)
    }

    /// Persists a finished analysis and raises an alert when it is unsafe.
    pub fn save(&self, draft: WaterTestDraft) -> WaterTestResult {
        let result = WaterTestResult::from_draft(draft, Uuid::new_v4().to_string(), Utc::now());
        if let Err(err) = self.call("save", |b| b.insert_test(&result)) {
            tracing::warn!(id = %result.id, error = %err, "water test not persisted");
        } else {
            tracing::info!(id = %result.id, safety = %result.safety_level, "water test saved");
        }
        if result.safety_level.raises_alert() {
            self.create_alert(&result);
        }
        result
    }

    /// Records a contamination alert for `test`.
    pub fn create_alert(&self, test: &WaterTestResult) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            test_id: test.id.clone(),
            severity: AlertSeverity::for_safety(test.safety_level),
            message: format!("Unsafe water detected: {}", test.alerts.join(", ")),
            timestamp: Utc::now(),
            location: test.location,
            water_source: test.water_source,
            resolved: false,
            resolved_at: None,
        };
        match self.call("create_alert", |b| b.insert_alert(&alert)) {
            Ok(()) => tracing::info!(id = %alert.id, test_id = %alert.test_id, "alert created"),
            Err(err) => tracing::warn!(id = %alert.id, error = %err, "alert not persisted"),
        }
        alert
    }

    /// The newest `limit` tests.
    pub fn get_all(&self, limit: usize) -> Vec<WaterTestResult> {
        self.merged_tests("get_all", Some(limit), |b| b.list_tests(limit))
    }

    /// Tests within `radius_km` of a point, among the newest `LOCATION_SCAN_LIMIT`.
    pub fn get_by_location(&self, latitude: f64, longitude: f64, radius_km: f64) -> Vec<WaterTestResult> {
        let center = GeoPoint { latitude, longitude };
        self.get_all(LOCATION_SCAN_LIMIT)
            .into_iter()
            .filter(|t| t.location.is_some_and(|p| within_radius(center, p, radius_km)))
            .collect()
    }

    pub fn get_by_source(&self, source: WaterSource) -> Vec<WaterTestResult> {
        self.merged_tests("get_by_source", None, |b| b.tests_by_source(source))
    }

    pub fn get_by_user(&self, user_id: &str, limit: usize) -> Vec<WaterTestResult> {
        self.merged_tests("get_by_user", Some(limit), |b| b.tests_by_user(user_id, limit))
    }

    pub fn get_alerts(&self, include_resolved: bool) -> Vec<Alert> {
        self.merged(
            "get_alerts",
            |b| b.list_alerts(include_resolved),
            |a| a.id.as_str(),
            |a| a.timestamp,
            None,
        )
    }

    /// Active alerts within `radius_km` of a point.
    pub fn get_alerts_by_location(&self, latitude: f64, longitude: f64, radius_km: f64) -> Vec<Alert> {
        let center = GeoPoint { latitude, longitude };
        self.get_alerts(false)
            .into_iter()
            .filter(|a| a.location.is_some_and(|p| within_radius(center, p, radius_km)))
            .collect()
    }

    /// Marks an alert resolved. An alert resolves exactly once.
    pub fn resolve_alert(&self, id: &str) -> Result<Alert, StoreError> {
        {
            let durable = self.durable.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(backend) = durable.as_deref() {
                self.replay_pending(backend);
                match backend.get_alert(id) {
                    Ok(Some(alert)) => return mark_resolved(backend, alert),
                    Ok(None) => {}
                    Err(err) => tracing::warn!(id, backend = backend.name(), error = %err, "alert lookup failed"),
                }
            }
        }
        // Not durable yet: the alert may still be waiting in the fallback.
        match self.fallback.get_alert(id)? {
            Some(alert) => mark_resolved(&self.fallback, alert),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    /// A preference value. Values still held by the fallback are the newest.
    pub fn get_preference(&self, key: &str) -> Option<serde_json::Value> {
        let durable = self.durable.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(backend) = durable.as_deref() {
            self.replay_pending(backend);
        }
        if let Ok(Some(value)) = self.fallback.get_preference(key) {
            return Some(value);
        }
        let backend = durable.as_deref()?;
        backend.get_preference(key).unwrap_or_else(|err| {
            tracing::warn!(key, backend = backend.name(), error = %err, "preference read failed");
            None
        })
    }

    fn preferences(&self) -> BTreeMap<String, serde_json::Value> {
        let mut preferences = {
            let durable = self.durable.read().unwrap_or_else(PoisonError::into_inner);
            match durable.as_deref() {
                Some(backend) => {
                    self.replay_pending(backend);
                    backend.list_preferences().unwrap_or_else(|err| {
                        tracing::warn!(backend = backend.name(), error = %err, "preference read failed");
                        BTreeMap::new()
                    })
                }
                None => BTreeMap::new(),
            }
        };
        preferences.extend(self.fallback.list_preferences().unwrap_or_default());
        preferences
    }

    pub fn put_preference(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.call("put_preference", |b| b.put_preference(key, &value))
    }

    /// Stores a reference reading: the observed color and the measured value.
    pub fn add_calibration(&self, parameter: &str, color_value: ColorChannels, actual_value: f64) -> CalibrationRecord {
        let record = CalibrationRecord {
            id: Uuid::new_v4().to_string(),
            parameter: parameter.to_string(),
            color_value,
            actual_value,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.call("add_calibration", |b| b.insert_calibration(&record)) {
            tracing::warn!(id = %record.id, error = %err, "calibration not persisted");
        }
        record
    }

    pub fn get_calibration(&self, parameter: Option<&str>) -> Vec<CalibrationRecord> {
        self.merged(
            "get_calibration",
            |b| b.list_calibration(parameter),
            |r| r.id.as_str(),
            |r| r.timestamp,
            None,
        )
    }

    pub fn get_statistics(&self) -> Statistics {
        let tests = self.get_all(FULL_SCAN_LIMIT);
        let active_alerts = self.get_alerts(false).len();

        let mut stats = Statistics {
            total_tests: tests.len(),
            active_alerts,
            ..Statistics::default()
        };
        for quality in [
            OverallQuality::Excellent,
            OverallQuality::Good,
            OverallQuality::Fair,
            OverallQuality::Poor,
            OverallQuality::UnsafeForConsumption,
        ] {
            stats.quality_distribution.insert(quality.as_str().to_string(), 0);
        }
        for test in &tests {
            match test.safety_level {
                SafetyLevel::Safe => stats.safe_tests += 1,
                SafetyLevel::Caution => stats.caution_tests += 1,
                SafetyLevel::Unsafe => stats.unsafe_tests += 1,
                SafetyLevel::Critical => stats.critical_tests += 1,
            }
            *stats
                .quality_distribution
                .entry(test.overall_quality.as_str().to_string())
                .or_default() += 1;
            *stats
                .source_distribution
                .entry(test.water_source.as_str().to_string())
                .or_default() += 1;
        }
        if !tests.is_empty() {
            let total: u64 = tests.iter().map(|t| u64::from(t.confidence)).sum();
            stats.average_confidence = total as f64 / tests.len() as f64;
        }
        stats
    }

    pub fn export(&self) -> StoreExport {
        StoreExport {
            water_tests: self.get_all(FULL_SCAN_LIMIT),
            alerts: self.get_alerts(true),
            user_preferences: self.preferences(),
            calibration_data: self.get_calibration(None),
            export_timestamp: Utc::now(),
            version: EXPORT_FORMAT_VERSION,
        }
    }

    /// Deletes every record from both backends. The durable backend goes first,
    /// so a failure there leaves both intact.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        {
            let durable = self.durable.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(backend) = durable.as_deref() {
                backend.clear()?;
            }
        }
        self.fallback.clear()?;
        tracing::info!("result store cleared");
        Ok(())
    }
}

fn mark_resolved(backend: &dyn ResultBackend, mut alert: Alert) -> Result<Alert, StoreError> {
    if alert.resolved {
        return Err(StoreError::AlreadyResolved { id: alert.id });
    }
    alert.resolved = true;
    alert.resolved_at = Some(Utc::now());
    backend.update_alert(&alert)?;
    tracing::info!(id = %alert.id, backend = backend.name(), "alert resolved");
    Ok(alert)
}
