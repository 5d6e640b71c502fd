//! Engine errors surfaced to embedders.

use crate::value::Value;
use thiserror::Error;

/// A script failed to parse.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("SyntaxError: {message} (line {line}, column {column})")]
pub struct SyntaxError {
    pub message: String,
    /// Character offset of the offending token.
    pub position: u32,
    /// 0-based line, including the script's line offset once located.
    pub line: u32,
    /// 0-based column.
    pub column: u32,
}

impl SyntaxError {
    /// Create an error at `position`; line and column are filled in by the compiler.
    pub fn new(message: impl Into<String>, position: u32) -> Self {
        Self {
            message: message.into(),
            position,
            line: 0,
            column: 0,
        }
    }
}

/// Outcome of running script code that did not complete normally.
#[derive(Debug, Error)]
pub enum ExecError {
    /// An exception escaped to the embedder.
    #[error("Uncaught {}", .0.to_display_string())]
    Exception(Value),

    /// Execution was cancelled through `terminate_execution`.
    #[error("execution terminated")]
    Terminated,

    /// Compilation failed.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl ExecError {
    /// The thrown value, if this is an exception.
    pub fn exception(&self) -> Option<&Value> {
        match self {
            ExecError::Exception(value) => Some(value),
            _ => None,
        }
    }

    /// Whether execution was terminated.
    pub fn is_terminated(&self) -> bool {
        matches!(self, ExecError::Terminated)
    }
}

/// Result type for embedder-facing engine operations.
pub type ExecResult<T> = Result<T, ExecError>;
