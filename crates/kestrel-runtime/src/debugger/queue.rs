//! Cross-thread command queue.
//!
//! Client threads push JSON commands with [`DebugHandle::send_command`]; the
//! engine thread drains them at safe points: inside a break, before compiling
//! a script, and in [`Isolate::process_debug_messages`]. The locking queue is
//! the only structure shared between threads. Interrupt requests
//! (`debug_break`, `terminate_execution`) are atomic flags next to it.
//!
//! [`Isolate::process_debug_messages`]: crate::isolate::Isolate::process_debug_messages.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ── ClientData ───────────────────────────────────────────────────────────────

/// Opaque data attached to a command and handed back with its response.
///
/// Ownership moves into the queue on send. The data is dropped exactly once:
/// after the message handler has seen the response, or with the queue if the
/// command is never processed.
pub trait ClientData: Any + Send {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send> ClientData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn ClientData {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

/// One queued command.
pub struct CommandMessage {
    text: String,
    client_data: Option<Box<dyn ClientData>>,
}

impl CommandMessage {
    pub fn new(text: impl Into<String>, client_data: Option<Box<dyn ClientData>>) -> Self {
        Self {
            text: text.into(),
            client_data,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn client_data(&self) -> Option<&dyn ClientData> {
        self.client_data.as_deref()
    }

    pub(crate) fn into_parts(self) -> (String, Option<Box<dyn ClientData>>) {
        (self.text, self.client_data)
    }
}

impl std::fmt::Debug for CommandMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandMessage")
            .field("text", &self.text)
            .field("client_data", &self.client_data.is_some())
            .finish()
    }
}

// ── CommandMessageQueue ──────────────────────────────────────────────────────

/// Growable FIFO of commands; dropping it releases pending client data.
#[derive(Debug, Default)]
pub struct CommandMessageQueue {
    messages: VecDeque<CommandMessage>,
}

impl CommandMessageQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, message: CommandMessage) {
        self.messages.push_back(message);
    }

    pub fn get(&mut self) -> Option<CommandMessage> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// ── LockingCommandMessageQueue ───────────────────────────────────────────────

/// Command FIFO shared between debugger threads and the isolate.
#[derive(Debug, Default)]
pub struct LockingCommandMessageQueue {
    queue: Mutex<CommandMessageQueue>,
    available: Condvar,
}

impl LockingCommandMessageQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(CommandMessageQueue::with_capacity(capacity)),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CommandMessageQueue> {
        // A panicking client thread cannot leave the queue half-updated
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, message: CommandMessage) {
        self.lock().put(message);
        self.available.notify_one();
    }

    pub fn get(&self) -> Option<CommandMessage> {
        self.lock().get()
    }

    /// Take the next command, waiting up to `timeout` for one to arrive.
    pub fn wait_get(&self, timeout: Duration) -> Option<CommandMessage> {
        let mut queue = self.lock();
        if queue.is_empty() {
            queue = self
                .available
                .wait_timeout(queue, timeout)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        queue.get()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

// ── Shared state and handle ──────────────────────────────────────────────────

/// State reachable from every thread.
#[derive(Debug, Default)]
pub(crate) struct DebugShared {
    pub(crate) queue: LockingCommandMessageQueue,
    debug_break: AtomicBool,
    terminate: AtomicBool,
}

impl DebugShared {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: LockingCommandMessageQueue::with_capacity(capacity),
            debug_break: AtomicBool::new(false),
            terminate: AtomicBool::new(false),
        }
    }

    pub(crate) fn debug_break_requested(&self) -> bool {
        self.debug_break.load(Ordering::SeqCst)
    }

    /// Consume a pending `debug_break`.
    pub(crate) fn take_debug_break(&self) -> bool {
        self.debug_break.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn set_debug_break(&self, requested: bool) {
        self.debug_break.store(requested, Ordering::SeqCst);
    }

    pub(crate) fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_terminate(&self) {
        self.terminate.store(false, Ordering::SeqCst);
    }
}

/// Thread-safe handle for driving the debugger of one isolate.
#[derive(Debug, Clone)]
pub struct DebugHandle {
    shared: Arc<DebugShared>,
}

impl DebugHandle {
    pub(crate) fn new(shared: Arc<DebugShared>) -> Self {
        Self { shared }
    }

    /// Queue a JSON command; never blocks.
    pub fn send_command(&self, text: impl Into<String>, client_data: Option<Box<dyn ClientData>>) {
        self.shared.queue.put(CommandMessage::new(text, client_data));
    }

    /// Ask the engine to break at its next safe point.
    pub fn debug_break(&self) {
        self.shared.set_debug_break(true);
    }

    pub fn cancel_debug_break(&self) {
        self.shared.set_debug_break(false);
    }

    /// Whether a requested break is still pending.
    pub fn check_debug_break(&self) -> bool {
        self.shared.debug_break_requested()
    }

    /// Stop script execution at its next safe point.
    pub fn terminate_execution(&self) {
        self.shared.terminate.store(true, Ordering::SeqCst);
        self.shared.queue.available.notify_all();
    }

    pub fn is_execution_terminating(&self) -> bool {
        self.shared.terminate_requested()
    }

    /// Number of commands not yet processed.
    pub fn pending_commands(&self) -> usize {
        self.shared.queue.len()
    }
}
