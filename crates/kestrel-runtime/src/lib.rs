//! Kestrel Runtime - embeddable script engine with an in-process debugger.
//!
//! This library provides:
//! - Lexical analysis and parsing of a small JavaScript subset
//! - A tree-walking interpreter with tiered code and a function heap
//! - Isolates with multiple contexts, natives and message listeners
//! - The debugger: breakpoints, stepping, exception breaks, events and a
//!   cross-thread JSON command queue.

/// Kestrel runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ast;
pub mod debugger;
pub mod error;
pub mod heap;
pub mod interpreter;
pub mod isolate;
pub mod lexer;
pub mod parser;
pub mod script;
pub mod span;
pub mod token;
pub mod value;

pub use debugger::{DebugEvent, DebugHandle, EventDetails, ExecState, Message, StepAction};
pub use error::{ExecError, ExecResult, SyntaxError};
pub use heap::{GcKind, Tier};
pub use isolate::{ContextId, ErrorMessage, Isolate, IsolateOptions, ScriptHandle};
pub use script::{FunctionId, ScriptId, ScriptOrigin};
pub use value::Value;
