use super::{ResultBackend, StoreError};
use crate::model::{Alert, CalibrationRecord, WaterSource, WaterTestResult};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MemoryState {
    tests: Vec<WaterTestResult>,
    alerts: Vec<Alert>,
    preferences: BTreeMap<String, serde_json::Value>,
    calibration: Vec<CalibrationRecord>,
}

/// Process-local backend. Always succeeds.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves every held record into `target`, oldest first, tests before alerts.
    /// Stops at the first failure; whatever was not moved stays here.
    pub fn replay_into(&self, target: &dyn ResultBackend) -> Result<usize, StoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let mut moved = replay_records(&mut state.tests, |t| target.insert_test(t))?;
        moved += replay_records(&mut state.alerts, |a| target.insert_alert(a))?;
        moved += replay_records(&mut state.calibration, |r| target.insert_calibration(r))?;

        let mut replayed = Vec::new();
        let result = state.preferences.iter().try_for_each(|(key, value)| {
            target.put_preference(key, value)?;
            replayed.push(key.clone());
            Ok::<(), StoreError>(())
        });
        for key in &replayed {
            state.preferences.remove(key);
        }
        result.map(|()| moved + replayed.len())
    }
}

fn replay_records<T>(records: &mut Vec<T>, insert: impl Fn(&T) -> Result<(), StoreError>) -> Result<usize, StoreError> {
    let mut moved = 0;
    let result = records.iter().try_for_each(|record| {
        insert(record)?;
        moved += 1;
        Ok::<(), StoreError>(())
    });
    records.drain(..moved);
    result.map(|()| moved)
}

// Newest first. Records sharing a timestamp keep reverse insertion order.
fn newest_first<T: Clone>(records: &[T], timestamp: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    let mut sorted: Vec<T> = records.iter().rev().cloned().collect();
    sorted.sort_by(|a, b| timestamp(b).cmp(&timestamp(a)));
    sorted
}

impl ResultBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert_test(&self, test: &WaterTestResult) -> Result<(), StoreError> {
        self.state().tests.push(test.clone());
        Ok(())
    }

    fn list_tests(&self, limit: usize) -> Result<Vec<WaterTestResult>, StoreError> {
        let mut tests = newest_first(&self.state().tests, |t| t.timestamp);
        tests.truncate(limit);
        Ok(tests)
    }

    fn tests_by_source(&self, source: WaterSource) -> Result<Vec<WaterTestResult>, StoreError> {
        let tests = newest_first(&self.state().tests, |t| t.timestamp);
        Ok(tests.into_iter().filter(|t| t.water_source == source).collect())
    }

    fn tests_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<WaterTestResult>, StoreError> {
        let tests = newest_first(&self.state().tests, |t| t.timestamp);
        Ok(tests
            .into_iter()
            .filter(|t| t.user_id.as_deref() == Some(user_id))
            .take(limit)
            .collect())
    }

    fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.state().alerts.push(alert.clone());
        Ok(())
    }

    fn list_alerts(&self, include_resolved: bool) -> Result<Vec<Alert>, StoreError> {
        let alerts = newest_first(&self.state().alerts, |a| a.timestamp);
        Ok(alerts.into_iter().filter(|a| include_resolved || !a.resolved).collect())
    }

    fn get_alert(&self, id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self.state().alerts.iter().find(|a| a.id == id).cloned())
    }

    fn update_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut state = self.state();
        match state.alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(existing) => {
                *existing = alert.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound { id: alert.id.clone() }),
        }
    }

    fn get_preference(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.state().preferences.get(key).cloned())
    }

    fn put_preference(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.state().preferences.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn list_preferences(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        Ok(self.state().preferences.clone())
    }

    fn insert_calibration(&self, record: &CalibrationRecord) -> Result<(), StoreError> {
        self.state().calibration.push(record.clone());
        Ok(())
    }

    fn list_calibration(&self, parameter: Option<&str>) -> Result<Vec<CalibrationRecord>, StoreError> {
        let records = newest_first(&self.state().calibration, |r| r.timestamp);
        Ok(records
            .into_iter()
            .filter(|r| parameter.is_none_or(|p| r.parameter == p))
            .collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.state() = MemoryState::default();
        Ok(())
    }
}
