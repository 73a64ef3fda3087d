//! Session store: cache entries keyed by fingerprint.
//!
//! The store is best-effort. Entries may vanish at any time (external cleanup
//! is the only eviction), so `get` on a missing key reports absence rather
//! than an error. Writers are not coordinated; the last complete write wins.

mod file;
mod memory;

pub use file::{ENTRY_VERSION, FileStore};
pub use memory::MemoryStore;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::kernel::{CellOutput, Snapshot};

/// Persisted record for one cell execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Fingerprint the entry was stored under
    pub fingerprint: Fingerprint,
    /// Output the cell produced when it ran live
    pub output: CellOutput,
    /// Session state immediately after the cell ran
    pub snapshot: Snapshot,
    /// Whether the entry may be replayed
    pub valid: bool,
    /// Unix timestamp (seconds) when the entry was written
    pub created_at: u64,
}

/// Durable key-value store for cache entries.
pub trait SessionStore {
    /// Store an entry, atomically replacing any entry under the same fingerprint.
    fn put(&self, fingerprint: &Fingerprint, output: &CellOutput, snapshot: &Snapshot)
    -> Result<()>;

    /// Look up an entry. Returns `Ok(None)` if absent.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Remove every entry. Returns the number removed.
    fn clear(&self) -> Result<usize>;
}

pub(crate) fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

impl<S: SessionStore + ?Sized> SessionStore for &S {
    fn put(&self, fingerprint: &Fingerprint, output: &CellOutput, snapshot: &Snapshot)
    -> Result<()> {
        (**self).put(fingerprint, output, snapshot)
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        (**self).get(fingerprint)
    }

    fn clear(&self) -> Result<usize> {
        (**self).clear()
    }
}
