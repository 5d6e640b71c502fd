//! Debugger errors.

use crate::debugger::breakpoints::BreakpointId;
use crate::error::SyntaxError;
use thiserror::Error;

/// Failure of a debugger operation.
///
/// None of these ever escape as panics; the protocol layer turns each one
/// into a `success: false` response.
#[derive(Debug, Error)]
pub enum DebugError {
    #[error("Unknown breakpoint {0}")]
    UnknownBreakpoint(BreakpointId),

    #[error("Target is not breakable")]
    NotBreakable,

    #[error("Not in a break")]
    NoActiveBreak,

    #[error("Break id is no longer valid")]
    InvalidBreakId,

    #[error("Frame {index} out of range ({count} frames)")]
    FrameOutOfRange { index: usize, count: usize },

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Invalid request: {0}")]
    Protocol(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("Execution terminated")]
    Terminated,

    #[error("Debugger not unloaded: {0}")]
    NotUnloaded(String),
}

/// Result type for debugger operations.
pub type DebugResult<T> = Result<T, DebugError>;
