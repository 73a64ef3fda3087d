//! In-memory session store.
//!
//! Nothing survives the process. Useful for tests and for embedding the
//! controller where only within-process reuse is wanted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::kernel::{CellOutput, Snapshot};

use super::{CacheEntry, SessionStore, unix_now};

/// Session store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether an entry exists for a fingerprint.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains_key(fingerprint)
    }

    /// Remove a single entry, as an external cleanup would.
    pub fn remove(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.lock().remove(fingerprint)
    }

    /// Replace the stored snapshot bytes of an entry.
    pub fn replace_snapshot(&self, fingerprint: &Fingerprint, snapshot: Snapshot) -> bool {
        match self.lock().get_mut(fingerprint) {
            Some(entry) => {
                entry.snapshot = snapshot;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn put(
        &self,
        fingerprint: &Fingerprint,
        output: &CellOutput,
        snapshot: &Snapshot,
    ) -> Result<()> {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            output: output.clone(),
            snapshot: snapshot.clone(),
            valid: true,
            created_at: unix_now(),
        };
        self.lock().insert(fingerprint.clone(), entry);
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        Ok(self.lock().get(fingerprint).cloned())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, NotebookIdentity, ParameterSet};
    use crate::fingerprint::fingerprint;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let key = fingerprint(
            &NotebookIdentity::new("mem"),
            &ParameterSet::new(),
            &Cell::code(0, "1 + 1"),
        )
        .unwrap();

        assert!(store.get(&key).unwrap().is_none());

        store
            .put(&key, &CellOutput::result("2"), &Snapshot::from_bytes(vec![1]))
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(&key));

        let entry = store.get(&key).unwrap().unwrap();
        assert_eq!(entry.output.result.as_deref(), Some("2"));

        assert!(store.replace_snapshot(&key, Snapshot::from_bytes(vec![9])));
        assert_eq!(store.get(&key).unwrap().unwrap().snapshot.as_bytes(), &[9]);

        assert!(store.remove(&key).is_some());
        assert!(store.get(&key).unwrap().is_none());

        store
            .put(&key, &CellOutput::default(), &Snapshot::from_bytes(vec![]))
            .unwrap();
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.is_empty());
    }
}
