//! Error types for the script interpreter.

use thiserror::Error;

/// Result type for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors raised while parsing or running script code.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The code is not well-formed.
    #[error("SyntaxError: {message} (line {line}, column {column})")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// A name was read or deleted before being bound.
    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    /// An operation was applied to a value of the wrong type.
    #[error("TypeError: {0}")]
    Type(String),

    /// A value of the right type had an unusable value.
    #[error("ValueError: {0}")]
    Value(String),

    /// Index out of range.
    #[error("IndexError: {0}")]
    Index(String),

    /// Division or modulo by zero.
    #[error("ZeroDivisionError: division by zero")]
    ZeroDivision,

    /// Integer arithmetic left the 64-bit range.
    #[error("OverflowError: integer overflow")]
    Overflow,

    /// A file operation failed.
    #[error("OSError: {0}")]
    Io(#[from] std::io::Error),

    /// A session snapshot could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl ScriptError {
    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        ScriptError::Type(message.into())
    }
}
