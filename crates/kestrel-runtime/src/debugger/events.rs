//! Debug events delivered to the listener and the message handler.

use crate::debugger::breakpoints::BreakpointId;
use crate::error::SyntaxError;
use crate::isolate::ContextId;
use crate::script::{Script, SharedFunction};
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Kind of debug event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DebugEvent {
    /// Execution stopped at a breakpoint, a step, a `debugger` statement or
    /// a requested interrupt.
    Break,
    /// An exception was thrown and the exception policy matched.
    Exception,
    AfterCompile,
    CompileError,
    /// A function literal was compiled; no wire form.
    NewFunction,
}

impl DebugEvent {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugEvent::Break => "break",
            DebugEvent::Exception => "exception",
            DebugEvent::AfterCompile => "afterCompile",
            DebugEvent::CompileError => "compileError",
            DebugEvent::NewFunction => "newFunction",
        }
    }

    /// Whether execution is suspended while the event is handled.
    pub fn is_break(&self) -> bool {
        matches!(self, DebugEvent::Break | DebugEvent::Exception)
    }
}

impl fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of one debug event.
#[derive(Debug, Clone)]
pub struct EventDetails {
    event: DebugEvent,
    breakpoints: Vec<BreakpointId>,
    exception: Option<Value>,
    uncaught: bool,
    script: Option<Rc<Script>>,
    function: Option<Rc<SharedFunction>>,
    compile_error: Option<SyntaxError>,
    context: ContextId,
    context_data: Option<String>,
}

impl EventDetails {
    fn new(event: DebugEvent, context: ContextId, context_data: Option<String>) -> Self {
        Self {
            event,
            breakpoints: Vec::new(),
            exception: None,
            uncaught: false,
            script: None,
            function: None,
            compile_error: None,
            context,
            context_data,
        }
    }

    pub(crate) fn break_event(
        breakpoints: Vec<BreakpointId>,
        context: ContextId,
        context_data: Option<String>,
    ) -> Self {
        Self {
            breakpoints,
            ..Self::new(DebugEvent::Break, context, context_data)
        }
    }

    pub(crate) fn exception_event(
        exception: Value,
        uncaught: bool,
        context: ContextId,
        context_data: Option<String>,
    ) -> Self {
        Self {
            exception: Some(exception),
            uncaught,
            ..Self::new(DebugEvent::Exception, context, context_data)
        }
    }

    pub(crate) fn after_compile(
        script: Rc<Script>,
        context: ContextId,
        context_data: Option<String>,
    ) -> Self {
        Self {
            script: Some(script),
            ..Self::new(DebugEvent::AfterCompile, context, context_data)
        }
    }

    pub(crate) fn compile_error_event(
        script: Rc<Script>,
        error: SyntaxError,
        context: ContextId,
        context_data: Option<String>,
    ) -> Self {
        Self {
            script: Some(script),
            compile_error: Some(error),
            ..Self::new(DebugEvent::CompileError, context, context_data)
        }
    }

    pub(crate) fn new_function(
        function: Rc<SharedFunction>,
        context: ContextId,
        context_data: Option<String>,
    ) -> Self {
        Self {
            script: Some(Rc::clone(function.script())),
            function: Some(function),
            ..Self::new(DebugEvent::NewFunction, context, context_data)
        }
    }

    pub fn event(&self) -> DebugEvent {
        self.event
    }

    /// Breakpoints that caused a `Break`; empty for steps and interrupts.
    pub fn breakpoints(&self) -> &[BreakpointId] {
        &self.breakpoints
    }

    pub fn exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    /// For `Exception` events: no handler was active at the throw site.
    pub fn uncaught(&self) -> bool {
        self.uncaught
    }

    pub fn script(&self) -> Option<&Rc<Script>> {
        self.script.as_ref()
    }

    pub fn function(&self) -> Option<&Rc<SharedFunction>> {
        self.function.as_ref()
    }

    pub fn compile_error(&self) -> Option<&SyntaxError> {
        self.compile_error.as_ref()
    }

    /// Context execution was in when the event occurred.
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn context_data(&self) -> Option<&str> {
        self.context_data.as_deref()
    }
}
