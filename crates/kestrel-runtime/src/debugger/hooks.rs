//! Interpreter and compiler hooks.
//!
//! These are the only places where running code hands control to the
//! debugger: break locations, function entry, interrupt polls, throws and
//! script compilation.

use crate::debugger::breakpoints::BreakpointId;
use crate::debugger::events::EventDetails;
use crate::debugger::stepping::StepAction;
use crate::error::SyntaxError;
use crate::heap::Tier;
use crate::interpreter::{Exec, Unwind};
use crate::isolate::{ContextId, Isolate, ThrowSite};
use crate::script::{BreakLocationKind, Script, SharedFunction};
use crate::value::Value;
use std::rc::Rc;

impl Isolate {
    /// Execution reached the break location at `position` in the top frame.
    pub(crate) fn debug_location(&mut self, position: u32) -> Exec<()> {
        if self.debug.shared.terminate_requested() {
            return Err(Unwind::Terminate);
        }
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let function = Rc::clone(&frame.function);
        let Some(location) = function.location_at(position).copied() else {
            return Ok(());
        };
        frame.position = position;
        frame.statement = location.statement;
        let frame_id = frame.id;

        if !self.debug.can_break() {
            return Ok(());
        }
        let code = function.code();
        let at_debugger_statement =
            location.kind == BreakLocationKind::DebuggerStatement && self.debug.break_points_active;
        let armed = code.tier() == Tier::Baseline && code.is_armed(position);
        if !armed && !at_debugger_statement {
            return Ok(());
        }

        let hits = if armed && self.debug.break_points_active {
            self.check_break_points(&function, position)
        } else {
            Vec::new()
        };
        let step_done = armed
            && self.debug.stepping.should_stop(
                self.frames.len(),
                &location,
                frame_id,
                self.debug.last_stop,
            );

        if at_debugger_statement || step_done || !hits.is_empty() {
            tracing::trace!(
                function = %function.id(),
                position,
                step_done,
                hits = hits.len(),
                "stopped"
            );
            self.on_break(hits)?;
        }
        Ok(())
    }

    /// A script function was entered.
    pub(crate) fn debug_function_entry(&mut self, function: &Rc<SharedFunction>) -> Exec<()> {
        if self.debug.stepping.action() == Some(StepAction::In) && self.debug.can_break() {
            self.debug.debug_infos.flood(&mut self.heap, function);
        }
        self.debug_poll_interrupts()
    }

    /// Safe point: function entry, loop back-edge or call site.
    pub(crate) fn debug_poll_interrupts(&mut self) -> Exec<()> {
        let shared = &self.debug.shared;
        if shared.terminate_requested() {
            return Err(Unwind::Terminate);
        }
        if shared.debug_break_requested()
            && self.debug.can_break()
            && !self.frames.is_empty()
            && self.debug.shared.take_debug_break()
        {
            tracing::debug!("debug break requested");
            self.on_break(Vec::new())?;
        }
        Ok(())
    }

    /// `value` is being thrown from the top frame.
    pub(crate) fn debug_on_throw(&mut self, value: &Value) -> Exec<()> {
        self.throw_site = match self.frames.last() {
            Some(frame) => {
                let script = frame.function.script();
                let (line, _) = script.position_to_line_column(frame.position);
                ThrowSite {
                    script_name: script.name().map(str::to_string),
                    line: Some(line + script.line_offset()),
                }
            }
            None => ThrowSite::default(),
        };

        if !self.debug.can_break() {
            return Ok(());
        }
        let caught = self.catch_depth > 0;
        if !self.debug.exceptions.should_break(caught) {
            tracing::trace!(caught, "exception ignored by policy");
            return Ok(());
        }

        if let Some(frame) = self.frames.last() {
            self.debug.last_stop = Some((frame.id, frame.statement));
        }
        self.debug.clear_stepping();
        let context = self.current_context();
        let details = EventDetails::exception_event(
            value.clone(),
            !caught,
            context,
            self.context_data(context).map(str::to_string),
        );
        self.process_debug_event(details)
    }

    fn on_break(&mut self, breakpoints: Vec<BreakpointId>) -> Exec<()> {
        if let Some(frame) = self.frames.last() {
            self.debug.last_stop = Some((frame.id, frame.statement));
        }
        self.debug.clear_stepping();
        let context = self.current_context();
        let details = EventDetails::break_event(
            breakpoints,
            context,
            self.context_data(context).map(str::to_string),
        );
        self.process_debug_event(details)
    }

    /// About to compile a script: drain queued commands.
    pub(crate) fn debug_before_compile(&mut self) {
        if self.debug.is_active() && self.debug.break_disabled == 0 {
            self.process_debug_messages();
        }
    }

    /// A script compiled successfully.
    pub(crate) fn debug_after_compile(&mut self, toplevel: &Rc<SharedFunction>, context: ContextId) {
        self.resolve_pending_breakpoints(toplevel);
        if !self.debug.can_break() {
            return;
        }
        let data = self.context_data(context).map(str::to_string);
        self.notify_debug_event(EventDetails::after_compile(
            Rc::clone(toplevel.script()),
            context,
            data.clone(),
        ));

        let mut pending: Vec<Rc<SharedFunction>> = toplevel.inner_functions().to_vec();
        while let Some(function) = pending.pop() {
            pending.extend(function.inner_functions().iter().cloned());
            self.notify_debug_event(EventDetails::new_function(function, context, data.clone()));
        }
    }

    /// A script failed to compile.
    pub(crate) fn debug_compile_error(
        &mut self,
        script: &Rc<Script>,
        error: &SyntaxError,
        context: ContextId,
    ) {
        if !self.debug.can_break() {
            return;
        }
        let data = self.context_data(context).map(str::to_string);
        self.notify_debug_event(EventDetails::compile_error_event(
            Rc::clone(script),
            error.clone(),
            context,
            data.clone(),
        ));
        if self.debug.exceptions.break_on_uncaught {
            let exception = Value::error("SyntaxError", &error.message);
            self.notify_debug_event(EventDetails::exception_event(exception, true, context, data));
        }
    }

    /// The outermost embedder call into script code returned.
    pub(crate) fn debug_embedder_exit(&mut self) {
        self.debug.clear_stepping();
        self.debug.last_stop = None;
        self.debug.shared.reset_terminate();
    }
}
