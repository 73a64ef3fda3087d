//! The cellar script language.
//!
//! A small dynamically typed language used to write notebook cells, and the
//! [`ScriptKernel`] that runs it for the execution controller. Sessions can be
//! snapshotted binding by binding; live handles (open files, iterators) are
//! reported as dropped instead of failing the capture.

pub mod error;
pub mod interpreter;
pub mod kernel;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::{ScriptError, ScriptResult};
pub use interpreter::{Evaluation, Interpreter};
pub use kernel::{KERNEL_NAME, SNAPSHOT_FORMAT, ScriptKernel};
pub use parser::{Program, parse};
pub use value::{Value, literal};
