//! Core engine for cellar notebooks.
//!
//! This crate provides:
//! - The cell model and resolved parameter sets
//! - Fingerprints identifying a cell execution
//! - A durable session store keyed by fingerprint
//! - The kernel capability (execute, capture, restore)
//! - Cache policy and the execution controller driving a run

pub mod cell;
pub mod controller;
pub mod error;
pub mod fingerprint;
pub mod kernel;
pub mod paths;
pub mod policy;
pub mod store;

pub use cell::{Cell, CellKind, NotebookIdentity, ParameterSet};
pub use controller::{
    CellReport, ControllerState, ExecutionCallback, ExecutionController, Provenance, RunReport,
    RunStats,
};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use kernel::{Capture, CellOutput, DroppedBinding, Kernel, Snapshot};
pub use paths::CacheDirs;
pub use policy::{CacheMode, CachePolicy};
pub use store::{CacheEntry, FileStore, MemoryStore, SessionStore};
