//! Cache policy for a single run.

use std::fmt;

/// How a run uses the session store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read and write cache entries.
    #[default]
    Enabled,
    /// Never touch the session store.
    Disabled,
    /// Skip reads but still write, forcing a fresh run that repopulates the cache.
    Ignore,
}

impl CacheMode {
    /// Mode selected by the `--disable-cache` / `--ignore-cache` flags.
    pub fn from_flags(disable: bool, ignore: bool) -> Self {
        if disable {
            CacheMode::Disabled
        } else if ignore {
            CacheMode::Ignore
        } else {
            CacheMode::Enabled
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::Enabled => write!(f, "enabled"),
            CacheMode::Disabled => write!(f, "disabled"),
            CacheMode::Ignore => write!(f, "ignore"),
        }
    }
}

/// Runtime cache policy: the configured mode plus the degraded sub-state.
///
/// Degradation is never persisted; a new policy is created for every run.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    mode: CacheMode,
    /// Index of the cell whose capture degraded caching
    degraded_at: Option<usize>,
}

impl CachePolicy {
    /// Create a policy for a new run.
    pub fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            degraded_at: None,
        }
    }

    /// The configured mode.
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Whether cached entries may be replayed.
    pub fn reads_allowed(&self) -> bool {
        self.mode == CacheMode::Enabled && !self.is_degraded()
    }

    /// Whether new entries may be written.
    pub fn writes_allowed(&self) -> bool {
        self.mode != CacheMode::Disabled && !self.is_degraded()
    }

    /// Disable caching for the cell at `index` and everything after it.
    ///
    /// Only the first degradation is recorded.
    pub fn mark_degraded(&mut self, index: usize) {
        if self.degraded_at.is_none() {
            self.degraded_at = Some(index);
        }
    }

    /// Whether caching has been degraded in this run.
    pub fn is_degraded(&self) -> bool {
        self.degraded_at.is_some()
    }

    /// Index of the cell that degraded caching, if any.
    pub fn degraded_at(&self) -> Option<usize> {
        self.degraded_at
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(CacheMode::default())
    }
}
