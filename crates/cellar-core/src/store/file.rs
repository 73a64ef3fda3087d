//! File-backed session store using rkyv.
//!
//! # Layout
//!
//! One file per fingerprint, `cellar-<fingerprint>.entry`, in the cache
//! directory. Files are written to a `.cellar-*.partial` temp file in the
//! same directory, synced, then renamed into place, so readers see either the
//! previous complete entry or the new one, never a torn write.
//!
//! Clearing the cache is a bulk delete of `cellar-*.entry`, either through
//! [`FileStore::clear`] or by hand.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::kernel::{CellOutput, Snapshot};

use super::{CacheEntry, SessionStore, unix_now};

/// Current entry format version.
///
/// Increment this when the entry layout changes in an incompatible way.
/// Entries with a different version are reported as unreadable.
pub const ENTRY_VERSION: u32 = 1;

const ENTRY_PREFIX: &str = "cellar-";
const ENTRY_SUFFIX: &str = ".entry";
const PARTIAL_PREFIX: &str = ".cellar-";
const PARTIAL_SUFFIX: &str = ".partial";

/// On-disk form of a [`CacheEntry`].
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
struct EntryRecord {
    version: u32,
    fingerprint: String,
    stdout: String,
    result: Option<String>,
    snapshot: Vec<u8>,
    valid: bool,
    created_at: u64,
}

/// Session store keeping one file per entry in a local directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry file for a fingerprint.
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", ENTRY_PREFIX, fingerprint, ENTRY_SUFFIX))
    }

    /// Fingerprints of all entries currently on disk.
    pub fn fingerprints(&self) -> Result<Vec<Fingerprint>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(name) = name.to_str()
                && let Some(hex) = name
                    .strip_prefix(ENTRY_PREFIX)
                    .and_then(|rest| rest.strip_suffix(ENTRY_SUFFIX))
                && let Some(fingerprint) = Fingerprint::from_hex(hex)
            {
                found.push(fingerprint);
            }
        }
        found.sort();
        Ok(found)
    }

    fn encode(fingerprint: &Fingerprint, output: &CellOutput, snapshot: &Snapshot) -> Result<Vec<u8>> {
        let record = EntryRecord {
            version: ENTRY_VERSION,
            fingerprint: fingerprint.as_hex().to_string(),
            stdout: output.stdout.clone(),
            result: output.result.clone(),
            snapshot: snapshot.as_bytes().to_vec(),
            valid: true,
            created_at: unix_now(),
        };

        rkyv::to_bytes::<rancor::Error>(&record)
            .map(|bytes| bytes.into_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<EntryRecord> {
        // rkyv validation needs aligned input; a plain Vec<u8> gives no guarantee.
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = rkyv::access::<ArchivedEntryRecord, rancor::Error>(aligned.as_slice())
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        let found_version = archived.version.to_native();
        if found_version != ENTRY_VERSION {
            return Err(Error::VersionMismatch {
                expected: ENTRY_VERSION,
                found: found_version,
            });
        }

        rkyv::deserialize::<EntryRecord, rancor::Error>(archived)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl SessionStore for FileStore {
    fn put(
        &self,
        fingerprint: &Fingerprint,
        output: &CellOutput,
        snapshot: &Snapshot,
    ) -> Result<()> {
        let bytes = Self::encode(fingerprint, output, snapshot)?;

        // Recreate the directory in case it was removed by an external cleanup.
        fs::create_dir_all(&self.dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.dir)?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;

        let path = self.entry_path(fingerprint);
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            "Stored cache entry {} ({} bytes, snapshot {} bytes)",
            fingerprint.short(),
            bytes.len(),
            snapshot.as_bytes().len()
        );
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(fingerprint);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No cache entry at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record = Self::decode(&bytes)?;

        // A renamed or copied file must not be replayed under another key.
        let valid = record.valid && record.fingerprint == fingerprint.as_hex();

        Ok(Some(CacheEntry {
            fingerprint: fingerprint.clone(),
            output: CellOutput {
                stdout: record.stdout,
                result: record.result,
            },
            snapshot: Snapshot::from_bytes(record.snapshot),
            valid,
            created_at: record.created_at,
        }))
    }

    fn clear(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            let is_entry = name.starts_with(ENTRY_PREFIX) && name.ends_with(ENTRY_SUFFIX);
            let is_partial = name.starts_with(PARTIAL_PREFIX) && name.ends_with(PARTIAL_SUFFIX);
            if !is_entry && !is_partial {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    if is_entry {
                        removed += 1;
                    }
                }
                // Raced with another cleanup.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!("Removed {} cache entries from {:?}", removed, self.dir);
        Ok(removed)
    }
}
