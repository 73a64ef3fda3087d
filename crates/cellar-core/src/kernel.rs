//! The interpreter capability used by the execution controller.
//!
//! The controller never looks inside a session: it asks the kernel to run
//! code, to capture its state as an opaque [`Snapshot`], and to restore such
//! a snapshot later. Kernels report bindings they could not capture instead
//! of failing the whole capture.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output captured from running one code cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    /// Everything the cell printed
    pub stdout: String,
    /// Display form of the cell's final expression, if it had a value
    pub result: Option<String>,
}

impl CellOutput {
    /// Output with only a result value.
    pub fn result(text: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            result: Some(text.into()),
        }
    }

    /// Whether the cell produced nothing visible.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.result.is_none()
    }
}

impl fmt::Display for CellOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stdout)?;
        if let Some(result) = &self.result {
            f.write_str(result)?;
        }
        Ok(())
    }
}

/// Opaque, restorable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Vec<u8>,
}

impl Snapshot {
    /// Wrap kernel-encoded state.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The encoded state.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A binding left out of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedBinding {
    /// Variable name
    pub name: String,
    /// Why the value could not be captured
    pub reason: String,
}

impl fmt::Display for DroppedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.name, self.reason)
    }
}

/// Result of a snapshot capture.
///
/// A capture with dropped bindings is degraded: the snapshot is missing state
/// and must not be trusted to reconstruct the session.
#[derive(Debug, Clone)]
pub struct Capture {
    /// State of every binding that could be captured
    pub snapshot: Snapshot,
    /// Bindings that were excluded
    pub dropped: Vec<DroppedBinding>,
}

impl Capture {
    /// Whether any binding was excluded.
    pub fn is_degraded(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// A live interpreter session.
pub trait Kernel {
    /// Error raised by the kernel's own operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Kernel name, recorded in exported notebooks.
    fn name(&self) -> &str;

    /// Run code against the live session and capture what it displayed.
    fn execute(&mut self, code: &str) -> Result<CellOutput, Self::Error>;

    /// Snapshot the full current namespace.
    ///
    /// Unserializable bindings are reported in [`Capture::dropped`]; an `Err`
    /// means nothing could be captured at all.
    fn capture(&mut self) -> Result<Capture, Self::Error>;

    /// Replace the session state with a snapshot.
    ///
    /// On failure the session must be left as it was before the call.
    fn restore(&mut self, snapshot: &Snapshot) -> Result<(), Self::Error>;

    /// Check that code is well-formed without running it.
    fn check(&self, _code: &str) -> Result<(), Self::Error> {
        Ok(())
    }
}
