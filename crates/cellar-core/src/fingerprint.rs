//! Cell fingerprints.
//!
//! A fingerprint is the SHA-256 of a canonical JSON document built from the
//! notebook identity, the name-sorted parameter set, the cell content and the
//! cell index. It is stable across processes and machines, so a second run of
//! the same notebook finds the entries written by the first.
//!
//! Parameter values are hashed as the literal strings supplied on the command
//! line: `3` and `3.0` are different parameter values.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cell::{Cell, NotebookIdentity, ParameterSet};
use crate::error::{Error, Result};

/// Bumped when the fingerprint input layout changes, orphaning old entries.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Fixed-length hash identity of one cell execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex representation.
    pub const HEX_LEN: usize = 64;

    /// Parse a fingerprint from its hex form.
    ///
    /// Returns `None` unless the input is exactly 64 lowercase hex characters.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == Self::HEX_LEN
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(hex.to_string()))
    }

    /// Full hex representation.
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document hashed to produce a fingerprint. Field order is fixed by the struct.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    version: u32,
    notebook: String,
    params: Vec<(&'a str, &'a str)>,
    content: &'a str,
    index: usize,
}

/// Compute the fingerprint of a cell.
pub fn fingerprint(
    identity: &NotebookIdentity,
    params: &ParameterSet,
    cell: &Cell,
) -> Result<Fingerprint> {
    let input = FingerprintInput {
        version: FINGERPRINT_VERSION,
        notebook: identity.to_string(),
        params: params.canonical(),
        content: &cell.content,
        index: cell.index,
    };
    let bytes = serde_json::to_vec(&input).map_err(|e| Error::Fingerprint(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Fingerprint engine bound to one run's notebook identity and parameters.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    identity: NotebookIdentity,
    params: ParameterSet,
}

impl Fingerprinter {
    /// Create a fingerprinter for a run.
    pub fn new(identity: NotebookIdentity, params: ParameterSet) -> Self {
        Self { identity, params }
    }

    /// The notebook identity of the run.
    pub fn identity(&self) -> &NotebookIdentity {
        &self.identity
    }

    /// The resolved parameters of the run.
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Fingerprint a cell of this run.
    pub fn fingerprint(&self, cell: &Cell) -> Result<Fingerprint> {
        fingerprint(&self.identity, &self.params, cell)
    }
}
