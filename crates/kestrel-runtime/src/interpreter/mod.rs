//! AST interpreter (tree-walking).
//!
//! Executes compiled functions directly from their AST. Every break location
//! recorded for a function is reported to the debugger as execution reaches
//! it, and function entries and loop back-edges poll for interrupts
//! (`DebugBreak`, termination).
//!
//! The interpreter is split across `impl Isolate` blocks:
//! - `mod.rs`: frames, calls, hoisting
//! - `stmt.rs`: statements and control flow
//! - `expr.rs`: expressions.

mod expr;
pub mod scope;
mod stmt;

use crate::ast::Name;
use crate::error::ExecError;
use crate::heap::Tier;
use crate::isolate::{ContextId, Isolate};
use crate::script::SharedFunction;
use crate::value::{Closure, Value};
use scope::{Scope, ScopeRef};
use std::rc::Rc;

/// How a statement completed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Completion {
    Normal,
    Return(Value),
    Break(Option<Name>),
    Continue(Option<Name>),
}

/// Abrupt exit that crosses function boundaries.
#[derive(Debug, Clone)]
pub(crate) enum Unwind {
    /// A thrown value looking for a handler.
    Throw(Value),
    /// Termination; bypasses `catch` and `finally`.
    Terminate,
}

impl From<Unwind> for ExecError {
    fn from(unwind: Unwind) -> Self {
        match unwind {
            Unwind::Throw(value) => ExecError::Exception(value),
            Unwind::Terminate => ExecError::Terminated,
        }
    }
}

pub(crate) type Exec<T> = Result<T, Unwind>;

/// One activation of a script function.
#[derive(Debug)]
pub(crate) struct Frame {
    /// Unique per activation.
    pub(crate) id: u64,
    pub(crate) function: Rc<SharedFunction>,
    /// Innermost scope; changes while a `catch` clause runs.
    pub(crate) scope: ScopeRef,
    pub(crate) context: ContextId,
    /// Last break location reached.
    pub(crate) position: u32,
    /// Statement enclosing the last break location.
    pub(crate) statement: u32,
    /// Value of the last expression statement.
    pub(crate) completion: Value,
}

impl Isolate {
    /// Run a function body in `scope` on a fresh frame.
    pub(crate) fn execute_function(
        &mut self,
        function: &Rc<SharedFunction>,
        scope: ScopeRef,
        context: ContextId,
    ) -> Exec<Value> {
        if self.frames.len() >= self.options.max_call_depth {
            return Err(self.throw_error("RangeError", "Maximum call stack size exceeded"));
        }

        self.hoist_declarations(function, &scope, context);
        self.next_frame_id += 1;
        let entry = function
            .locations()
            .first()
            .map_or(function.start_position(), |location| location.position);
        self.frames.push(Frame {
            id: self.next_frame_id,
            function: Rc::clone(function),
            scope,
            context,
            position: entry,
            statement: entry,
            completion: Value::Undefined,
        });

        let result = self.run_frame(function);
        let frame = self.frames.pop();

        match result {
            Ok(Some(value)) => Ok(value),
            Ok(None) if function.is_toplevel() => {
                Ok(frame.map_or(Value::Undefined, |frame| frame.completion))
            }
            Ok(None) => Ok(Value::Undefined),
            Err(unwind) => Err(unwind),
        }
    }

    /// Body of the current frame; `None` when it ran off the end.
    fn run_frame(&mut self, function: &Rc<SharedFunction>) -> Exec<Option<Value>> {
        self.debug_function_entry(function)?;
        match self.exec_statements(function.body())? {
            Completion::Return(value) => Ok(Some(value)),
            _ => {
                self.debug_location(function.body_end())?;
                Ok(None)
            }
        }
    }

    /// Bind hoisted `var` names and function declarations.
    fn hoist_declarations(
        &mut self,
        function: &Rc<SharedFunction>,
        scope: &ScopeRef,
        context: ContextId,
    ) {
        let mut bindings = scope.borrow_mut();
        for name in function.var_names() {
            if !bindings.has_own(name) {
                bindings.declare(Rc::clone(name), Value::Undefined);
            }
        }
        for (name, index) in function.declarations() {
            if let Some(inner) = function.inner(*index) {
                let closure = Closure {
                    function: Rc::clone(inner),
                    scope: Rc::clone(scope),
                    context,
                };
                bindings.declare(Rc::clone(name), Value::Function(Rc::new(closure)));
            }
        }
    }

    /// Call any callable value.
    pub(crate) fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Exec<Value> {
        self.debug_poll_interrupts()?;
        match callee {
            Value::Function(closure) => self.invoke_closure(closure, args),
            Value::Native(native) => {
                let callback = Rc::clone(&native.callback);
                match callback(self, &args) {
                    Ok(value) => Ok(value),
                    Err(ExecError::Exception(value)) => Err(self.throw_value(value)),
                    Err(ExecError::Terminated) => Err(Unwind::Terminate),
                    Err(ExecError::Syntax(error)) => {
                        Err(self.throw_error("SyntaxError", &error.message))
                    }
                }
            }
            other => {
                let message = format!("{} is not a function", other.to_display_string());
                Err(self.throw_error("TypeError", &message))
            }
        }
    }

    fn invoke_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Exec<Value> {
        let function = &closure.function;
        self.maybe_optimize(function);

        let scope = Scope::child(&closure.scope);
        {
            let mut bindings = scope.borrow_mut();
            let mut args = args.into_iter();
            for param in function.params() {
                bindings.declare(Rc::clone(param), args.next().unwrap_or(Value::Undefined));
            }
        }
        self.execute_function(function, scope, closure.context)
    }

    /// Count a call and tier the function up once it is hot.
    fn maybe_optimize(&mut self, function: &Rc<SharedFunction>) {
        let calls = function.record_call();
        if calls >= self.options.optimize_after_calls
            && function.code().tier() == Tier::Baseline
            && !self.debug.has_debug_info(function.id())
        {
            self.heap.replace_code(function, Tier::Optimized);
            tracing::trace!(function = %function.id(), calls, "optimized");
        }
    }

    /// Throw an error object `{ name, message }`.
    pub(crate) fn throw_error(&mut self, name: &str, message: &str) -> Unwind {
        self.throw_value(Value::error(name, message))
    }

    /// Throw `value` from the current position, notifying the debugger.
    pub(crate) fn throw_value(&mut self, value: Value) -> Unwind {
        match self.debug_on_throw(&value) {
            Ok(()) => Unwind::Throw(value),
            Err(unwind) => unwind,
        }
    }

    /// Scope of the executing frame, or the default context's globals.
    pub(crate) fn current_scope(&self) -> ScopeRef {
        match self.frames.last() {
            Some(frame) => Rc::clone(&frame.scope),
            None => self.global_scope(ContextId::DEFAULT),
        }
    }

    /// Context of the executing frame.
    pub(crate) fn current_context(&self) -> ContextId {
        self.frames
            .last()
            .map_or(ContextId::DEFAULT, |frame| frame.context)
    }
}
