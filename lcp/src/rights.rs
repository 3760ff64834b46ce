use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::Value;

use lcp_core::{Clock, is_countable_right};

use crate::error::RightsError;
use crate::license::License;

/**
    External collaborator (spec §6): a named key/value store the facade
    reads and writes countable-right counters through, keyed as
    `lcp/<license-id>/rights/<right-name>` (§6 "Persisted state").
*/
pub trait RightsStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, RightsError>;
    fn put(&self, key: &str, value: &str) -> Result<(), RightsError>;
    fn remove(&self, key: &str) -> Result<(), RightsError>;
}

fn storage_key(license_id: &str, right: &str) -> String {
    format!("lcp/{license_id}/rights/{right}")
}

/// Process-wide table of per-(license-id, right-name) locks (§5: "Rights
/// persistence: serialized per (license-id, right-name) key"). Keyed on the
/// storage key itself so every [`RightsManager`] instance racing over the
/// same counter — even built fresh per call, as the facade does — shares
/// the same critical section rather than one scoped to its own lifetime.
fn right_lock(key: &str) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();
    let table = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = table.lock().unwrap();
    Arc::clone(guard.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
}

/// One (right-name, value) pair as exposed by [`RightsManager::entries`].
#[derive(Debug, Clone, PartialEq)]
pub enum RightValue {
    Count(u64),
    Bool(bool),
    Time(String),
    Other(Value),
}

/**
    Exposes, consumes, and persists a license's rights (C7, §4.6).
    `consume` is linearizable per (license-id, right-name): the in-process
    `Mutex` serializes the read-check-write-then-update-in-memory sequence
    spec §5 requires, while the actual counter of record lives in the
    injected [`RightsStorage`].
*/
pub struct RightsManager<'a, S: RightsStorage> {
    license: &'a License,
    storage: &'a S,
}

impl<'a, S: RightsStorage> RightsManager<'a, S> {
    pub fn new(license: &'a License, storage: &'a S) -> Self {
        Self { license, storage }
    }

    /// Enumerate every (name, value) pair the license carries, known and
    /// unknown, reading live counts from storage when a countable right
    /// has been consumed since the license was opened.
    pub fn entries(&self) -> Vec<(String, RightValue)> {
        let mut out = Vec::new();
        if let Some(v) = self.current_count("print") {
            out.push(("print".to_string(), RightValue::Count(v)));
        }
        if let Some(v) = self.current_count("copy") {
            out.push(("copy".to_string(), RightValue::Count(v)));
        }
        if let Some(tts) = self.license.rights.tts {
            out.push(("tts".to_string(), RightValue::Bool(tts)));
        }
        if let Some(start) = &self.license.rights.start {
            out.push(("start".to_string(), RightValue::Time(start.clone())));
        }
        if let Some(end) = &self.license.rights.end {
            out.push(("end".to_string(), RightValue::Time(end.clone())));
        }
        for (name, value) in &self.license.rights.other {
            out.push((name.clone(), RightValue::Other(value.clone())));
        }
        out
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries().iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<RightValue> {
        self.entries().into_iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn license_count(&self, name: &str) -> Option<u64> {
        match name {
            "print" => self.license.rights.print,
            "copy" => self.license.rights.copy,
            _ => None,
        }
    }

    fn current_count(&self, name: &str) -> Option<u64> {
        let license_value = self.license_count(name)?;
        let key = storage_key(&self.license.id, name);
        match self.storage.get(&key) {
            Ok(Some(s)) => s.parse::<u64>().ok().or(Some(license_value)),
            _ => Some(license_value),
        }
    }

    /// Atomically decrements `name` by `delta`, defined only for countable
    /// rights (`print`, `copy`). Fails with `RightsError::Insufficient` if
    /// the stored value is less than `delta`; the in-memory view and
    /// persisted value never change on failure, and the write always
    /// happens before the in-memory counter is considered updated (§7:
    /// "write-then-update ordering").
    pub fn consume(&self, name: &str, delta: u64) -> Result<u64, RightsError> {
        if !is_countable_right(name) {
            return Err(RightsError::NotCountable(name.to_string()));
        }
        let key = storage_key(&self.license.id, name);
        let lock = right_lock(&key);
        let _guard = lock.lock().unwrap();

        let current = self
            .current_count(name)
            .ok_or_else(|| RightsError::NotCountable(name.to_string()))?;

        if current < delta {
            return Err(RightsError::Insufficient {
                right: name.to_string(),
                have: current,
                need: delta,
            });
        }

        let new_value = current - delta;
        self.storage
            .put(&key, &new_value.to_string())
            .map_err(|e| RightsError::Storage(e.to_string()))?;

        tracing::debug!(right = name, from = current, to = new_value, "right consumed");
        Ok(new_value)
    }

    /// §4.6: time-bounded rights are evaluated against the host clock; the
    /// facade refuses to open if the clock is outside `[start, end]`.
    pub fn is_within_window(&self, clock: &dyn Clock) -> bool {
        self.license.is_within_time_window(clock.now())
    }
}

/// In-memory [`RightsStorage`] used by tests and standalone tools that
/// don't need durable persistence.
#[derive(Default)]
pub struct InMemoryRightsStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl RightsStorage for InMemoryRightsStorage {
    fn get(&self, key: &str) -> Result<Option<String>, RightsError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), RightsError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RightsError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
