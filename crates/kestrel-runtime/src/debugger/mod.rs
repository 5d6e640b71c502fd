//! Kestrel in-process debugger.
//!
//! The debug session lives inside the [`Isolate`] and is driven from two
//! sides:
//!
//! - the engine thread, through the interpreter hooks in [`hooks`] and the
//!   breakpoint/stepping API on `Isolate`
//! - any thread, through a [`DebugHandle`] that queues JSON commands and
//!   raises interrupts.
//!
//! At most one event listener and one message handler are installed at a
//! time. The listener is called synchronously for every event; the message
//! handler receives every event and response as JSON. While a message
//! handler is installed, a break blocks the engine thread on the command
//! queue until a `continue` arrives. Removing both unloads the session.
//!
//! # Quick-start.
//!
//! ```rust
//! use kestrel_runtime::debugger::DebugEvent;
//! use kestrel_runtime::{ContextId, Isolate};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let mut isolate = Isolate::new();
//! isolate.compile_run("function foo() { bar = 0; }", "demo").unwrap();
//!
//! let hits = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&hits);
//! isolate.set_debug_event_listener(move |event, _state| {
//!     if event.event() == DebugEvent::Break {
//!         counter.set(counter.get() + 1);
//!     }
//! });
//!
//! let foo = isolate.get_global(ContextId::DEFAULT, "foo").unwrap();
//! isolate.set_function_breakpoint(&foo, 0).unwrap();
//! isolate.call(&foo, &[]).unwrap();
//! assert_eq!(hits.get(), 1);
//! ```

pub mod break_location;
pub mod breakpoints;
mod commands;
pub mod error;
pub mod events;
pub mod exception;
pub mod exec_state;
mod hooks;
pub mod protocol;
pub mod queue;
pub mod stepping;

pub use break_location::{DebugInfo, DebugInfoRegistry};
pub use breakpoints::{BreakpointId, BreakpointInfo, BreakpointTarget};
pub use error::{DebugError, DebugResult};
pub use events::{DebugEvent, EventDetails};
pub use exception::{ExceptionBreak, ExceptionPolicy};
pub use exec_state::{ExecState, FrameDetails};
pub use protocol::Message;
pub use queue::{ClientData, CommandMessage, CommandMessageQueue, DebugHandle, LockingCommandMessageQueue};
pub use stepping::{StepAction, StepState};

use crate::heap::GcKind;
use crate::interpreter::{Exec, Unwind};
use crate::isolate::{ContextId, Isolate, IsolateOptions};
use crate::script::{FunctionId, SharedFunction};
use breakpoints::BreakpointTable;
use protocol::EventMessage;
use queue::DebugShared;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with every native debug event.
pub type EventListener = Box<dyn FnMut(&EventDetails, &mut ExecState<'_>)>;

/// Callback that receives JSON events and responses.
pub type MessageHandler = Box<dyn FnMut(&Message)>;

// ── Slot ─────────────────────────────────────────────────────────────────────

/// Holder for a callback that may replace or remove itself while running.
enum Slot<T> {
    Empty,
    Installed(T),
    Running,
}

impl<T> Slot<T> {
    fn is_present(&self) -> bool {
        !matches!(self, Slot::Empty)
    }

    /// Take the callback out for a call, leaving `Running`.
    fn begin_call(&mut self) -> Option<T> {
        match std::mem::replace(self, Slot::Running) {
            Slot::Installed(callback) => Some(callback),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Put the callback back unless it was replaced or removed meanwhile.
    fn end_call(&mut self, callback: T) {
        if matches!(self, Slot::Running) {
            *self = Slot::Installed(callback);
        }
    }
}

// ── Debug ────────────────────────────────────────────────────────────────────

/// One break (or other event) being handled.
#[derive(Debug, Clone)]
pub(crate) struct BreakContext {
    pub(crate) id: u64,
    /// Frames on the stack when the event fired.
    pub(crate) frame_count: usize,
    pub(crate) context: ContextId,
}

/// Debug session state owned by an isolate.
pub struct Debug {
    shared: Arc<DebugShared>,
    listener: Slot<EventListener>,
    message_handler: Option<MessageHandler>,
    pub(crate) breakpoints: BreakpointTable,
    pub(crate) debug_infos: DebugInfoRegistry,
    pub(crate) stepping: StepState,
    pub(crate) exceptions: ExceptionPolicy,
    /// Innermost last.
    pub(crate) break_stack: Vec<BreakContext>,
    next_break_id: u64,
    /// Nonzero while events are suppressed.
    pub(crate) break_disabled: u32,
    pub(crate) break_points_active: bool,
    /// `(frame id, statement)` of the previous stop.
    pub(crate) last_stop: Option<(u64, u32)>,
    next_seq: u64,
    wait_timeout: Duration,
}

impl Debug {
    pub(crate) fn new(options: &IsolateOptions) -> Self {
        Self {
            shared: Arc::new(DebugShared::new(options.command_queue_capacity)),
            listener: Slot::Empty,
            message_handler: None,
            breakpoints: BreakpointTable::new(),
            debug_infos: DebugInfoRegistry::new(),
            stepping: StepState::new(),
            exceptions: ExceptionPolicy::new(options.break_on_caught, options.break_on_uncaught),
            break_stack: Vec::new(),
            next_break_id: 0,
            break_disabled: 0,
            break_points_active: true,
            last_stop: None,
            next_seq: 0,
            wait_timeout: options.wait_timeout,
        }
    }

    pub(crate) fn handle(&self) -> DebugHandle {
        DebugHandle::new(Arc::clone(&self.shared))
    }

    /// Whether a listener or message handler is installed.
    pub fn is_active(&self) -> bool {
        self.listener.is_present() || self.message_handler.is_some()
    }

    /// Whether events may fire right now.
    pub(crate) fn can_break(&self) -> bool {
        self.is_active() && self.break_disabled == 0
    }

    pub(crate) fn has_debug_info(&self, function: FunctionId) -> bool {
        self.debug_infos.contains(function)
    }

    pub(crate) fn clear_stepping(&mut self) {
        if self.stepping.is_stepping() {
            tracing::debug!("stepping cleared");
        }
        self.stepping.clear();
        self.debug_infos.unflood_all();
    }

    pub(crate) fn on_code_replaced(&self, function: &SharedFunction) {
        self.debug_infos.rearm(function);
    }

    /// Drop debug state that refers to collected functions.
    pub(crate) fn prune_collected(&mut self) {
        let locations = self.breakpoints.prune_dead_locations();
        let infos = self.debug_infos.prune_dead();
        if locations + infos > 0 {
            tracing::debug!(locations, infos, "pruned collected functions");
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn send_message(&mut self, message: &Message) {
        if let Some(handler) = self.message_handler.as_mut() {
            handler(message);
        }
    }

    /// Drop everything a session accumulated; exception toggles stay.
    fn unload(&mut self) {
        self.breakpoints.clear();
        self.debug_infos.clear();
        self.stepping.clear();
        self.last_stop = None;
        tracing::debug!("debugger unloaded");
    }

    fn unload_if_inactive(&mut self) {
        if !self.is_active() {
            self.unload();
        }
    }
}

// ── Isolate API ──────────────────────────────────────────────────────────────

impl Isolate {
    /// Install the event listener, replacing any previous one.
    pub fn set_debug_event_listener(
        &mut self,
        listener: impl FnMut(&EventDetails, &mut ExecState<'_>) + 'static,
    ) {
        self.debug.listener = Slot::Installed(Box::new(listener));
    }

    /// Remove the event listener; unloads the session if no handler remains.
    pub fn clear_debug_event_listener(&mut self) {
        self.debug.listener = Slot::Empty;
        self.debug.unload_if_inactive();
    }

    /// Install the message handler, replacing any previous one.
    pub fn set_message_handler(&mut self, handler: impl FnMut(&Message) + 'static) {
        self.debug.message_handler = Some(Box::new(handler));
    }

    /// Remove the message handler; unloads the session if no listener remains.
    pub fn clear_message_handler(&mut self) {
        self.debug.message_handler = None;
        self.debug.unload_if_inactive();
    }

    pub fn debug(&self) -> &Debug {
        &self.debug
    }

    /// Whether execution is currently stopped in a debug event.
    pub fn in_break(&self) -> bool {
        !self.debug.break_stack.is_empty()
    }

    /// Process every queued command now; usable with an empty stack.
    pub fn process_debug_messages(&mut self) {
        while let Some(command) = self.debug.shared.queue.get() {
            self.process_command(command);
        }
    }

    /// Verify that an unloaded session left nothing behind.
    pub fn check_debugger_unloaded(&mut self) -> DebugResult<()> {
        self.collect_garbage(GcKind::Full);
        if !self.debug.debug_infos.is_empty() {
            return Err(DebugError::NotUnloaded(format!(
                "{} debug infos remain",
                self.debug.debug_infos.len()
            )));
        }
        if !self.debug.breakpoints.is_empty() {
            return Err(DebugError::NotUnloaded(format!(
                "{} breakpoints remain",
                self.debug.breakpoints.len()
            )));
        }
        let armed = self
            .heap
            .live_functions()
            .iter()
            .filter(|function| function.code().armed_count() > 0)
            .count();
        if armed > 0 {
            return Err(DebugError::NotUnloaded(format!(
                "{} functions have armed break slots",
                armed
            )));
        }
        Ok(())
    }

    // ── Event dispatch ───────────────────────────────────────────────────────

    /// Deliver an event that suspends execution.
    ///
    /// With a message handler installed this blocks on the command queue
    /// until a command resumes execution.
    pub(crate) fn process_debug_event(&mut self, details: EventDetails) -> Exec<()> {
        self.dispatch_debug_event(details, true);
        if self.debug.shared.terminate_requested() {
            return Err(Unwind::Terminate);
        }
        Ok(())
    }

    /// Deliver an informational event; execution continues immediately.
    pub(crate) fn notify_debug_event(&mut self, details: EventDetails) {
        self.dispatch_debug_event(details, false);
    }

    fn dispatch_debug_event(&mut self, details: EventDetails, wait: bool) {
        if !self.debug.can_break() {
            return;
        }
        self.debug.next_break_id += 1;
        let break_id = self.debug.next_break_id;
        self.debug.break_stack.push(BreakContext {
            id: break_id,
            frame_count: self.frames.len(),
            context: details.context(),
        });
        tracing::debug!(
            event = %details.event(),
            break_id,
            frames = self.frames.len(),
            breakpoints = ?details.breakpoints(),
            "debug event"
        );

        if let Some(mut listener) = self.debug.listener.begin_call() {
            self.debug.break_disabled += 1;
            listener(&details, &mut ExecState::new(self, break_id));
            self.debug.break_disabled -= 1;
            self.debug.listener.end_call(listener);
        }

        if self.debug.message_handler.is_some() {
            if let Some(body) = self.event_body(&details) {
                let seq = self.debug.next_seq();
                let event = EventMessage {
                    seq,
                    kind: "event",
                    event: details.event().as_str(),
                    body,
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        let message = Message::for_event(
                            json,
                            details.event(),
                            !wait,
                            details.context(),
                            details.context_data().map(str::to_string),
                        );
                        self.debug.send_message(&message);
                    }
                    Err(error) => tracing::warn!(%error, "event not serialized"),
                }
                if wait {
                    self.run_command_loop();
                }
            }
        }

        self.debug.break_stack.pop();
    }

    /// Block on the command queue until execution resumes.
    fn run_command_loop(&mut self) {
        loop {
            if self.debug.shared.terminate_requested() || self.debug.message_handler.is_none() {
                return;
            }
            let timeout = self.debug.wait_timeout;
            let Some(command) = self.debug.shared.queue.wait_get(timeout) else {
                continue;
            };
            if self.process_command(command) {
                return;
            }
        }
    }

    pub(crate) fn break_context(&self) -> Option<&BreakContext> {
        self.debug.break_stack.last()
    }
}
