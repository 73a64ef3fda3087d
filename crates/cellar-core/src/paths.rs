//! Cache directory management.
//!
//! Provides a consistent cache location across the CLI and library users.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Name of the cache directory created under the system temp directory.
pub const DEFAULT_CACHE_DIR_NAME: &str = "cellar-cache";

/// Directory holding cache entries.
///
/// By default entries live in a temp-directory subfolder:
///
/// ```text
/// $TMPDIR/
/// └── cellar-cache/
///     ├── cellar-<fingerprint>.entry
///     └── ...
/// ```
///
/// The directory is ephemeral: anything in it may be deleted at any time.
#[derive(Debug, Clone)]
pub struct CacheDirs {
    /// The cache directory itself.
    pub cache_dir: PathBuf,
}

impl CacheDirs {
    /// Use the default location under the system temp directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn default_location() -> Result<Self> {
        Self::from_dir(std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME))
    }

    /// Use an explicit cache directory.
    ///
    /// Creates the directory if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if directory creation fails.
    pub fn from_dir(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Use `dir` when given, the default location otherwise.
    pub fn resolve(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::default_location(),
        }
    }
}
