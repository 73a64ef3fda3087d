//! Clean command implementation for cellar CLI.

use std::path::Path;

use cellar_core::{CacheDirs, FileStore, SessionStore};

use crate::colors;

/// Remove every cache entry from the cache directory.
pub fn execute(cache_dir: Option<&Path>) -> anyhow::Result<()> {
    let dirs = CacheDirs::resolve(cache_dir)?;
    let store = FileStore::open(&dirs.cache_dir)?;
    let removed = store.clear()?;

    println!(
        "{}Removed{} {} cache entries from {}",
        colors::GREEN,
        colors::RESET,
        removed,
        store.dir().display()
    );
    Ok(())
}
