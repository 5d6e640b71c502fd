//! Isolate: one independent engine instance.
//!
//! An isolate owns the heap, every context's global scope, the call stack and
//! the debugger session. Everything here runs on the thread that created the
//! isolate; other threads reach it only through a [`DebugHandle`].

use crate::debugger::{Debug, DebugHandle};
use crate::error::{ExecError, ExecResult};
use crate::heap::{GcKind, Heap, Tier};
use crate::interpreter::scope::{Scope, ScopeRef};
use crate::interpreter::{Exec, Frame, Unwind};
use crate::parser::parse_program;
use crate::script::{compile_script, Script, ScriptId, ScriptOrigin, SharedFunction};
use crate::value::Value;
use kestrel_config::Config;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Identifies an isolated global environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContextId(pub u32);

impl ContextId {
    /// The context every isolate starts with.
    pub const DEFAULT: ContextId = ContextId(0);
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine tuning and debugger defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolateOptions {
    /// Calls before a function tiers up to optimized code.
    pub optimize_after_calls: u32,
    /// Functions allocated before an automatic scavenge.
    pub young_generation_functions: usize,
    /// Maximum script call depth.
    pub max_call_depth: usize,
    pub break_on_caught: bool,
    pub break_on_uncaught: bool,
    /// Initial capacity of the debugger command queue.
    pub command_queue_capacity: usize,
    /// Poll slice while blocked in a break waiting for commands.
    pub wait_timeout: Duration,
}

impl IsolateOptions {
    /// Options from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            optimize_after_calls: config.optimize_after_calls(),
            young_generation_functions: config.young_generation_functions(),
            max_call_depth: config.max_call_depth(),
            break_on_caught: config.break_on_caught(),
            break_on_uncaught: config.break_on_uncaught(),
            command_queue_capacity: config.command_queue_capacity(),
            wait_timeout: Duration::from_millis(config.wait_timeout_ms()),
        }
    }
}

impl Default for IsolateOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A compiled script bound to the context it was compiled in.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    function: Rc<SharedFunction>,
    context: ContextId,
}

impl ScriptHandle {
    pub fn script(&self) -> &Rc<Script> {
        self.function.script()
    }

    pub fn id(&self) -> ScriptId {
        self.function.script().id()
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The script's top-level function.
    pub fn function(&self) -> &Rc<SharedFunction> {
        &self.function
    }
}

/// Report of an error that reached the embedder.
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    pub text: String,
    /// Thrown value; `None` for compile errors.
    pub exception: Option<Value>,
    pub script_name: Option<String>,
    /// 0-based line including the script's line offset.
    pub line: Option<u32>,
}

/// Callback observing errors that reach the embedder.
pub type MessageListener = Box<dyn FnMut(&ErrorMessage)>;

struct Context {
    global: ScopeRef,
    data: Option<String>,
}

impl Context {
    fn new() -> Self {
        Self {
            global: Scope::new_global(),
            data: None,
        }
    }
}

/// Where the most recent exception was thrown.
#[derive(Debug, Clone, Default)]
pub(crate) struct ThrowSite {
    pub(crate) script_name: Option<String>,
    pub(crate) line: Option<u32>,
}

/// An engine instance.
pub struct Isolate {
    pub(crate) options: IsolateOptions,
    pub(crate) heap: Heap,
    contexts: Vec<Context>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) next_frame_id: u64,
    /// Active `try` blocks that have a `catch` clause.
    pub(crate) catch_depth: u32,
    embedder_depth: u32,
    message_listeners: Vec<MessageListener>,
    pub(crate) throw_site: ThrowSite,
    pub(crate) debug: Debug,
}

impl Isolate {
    pub fn new() -> Self {
        Self::with_options(IsolateOptions::default())
    }

    pub fn with_options(options: IsolateOptions) -> Self {
        let debug = Debug::new(&options);
        Self {
            options,
            heap: Heap::new(),
            contexts: vec![Context::new()],
            frames: Vec::new(),
            next_frame_id: 0,
            catch_depth: 0,
            embedder_depth: 0,
            message_listeners: Vec::new(),
            throw_site: ThrowSite::default(),
            debug,
        }
    }

    pub fn options(&self) -> &IsolateOptions {
        &self.options
    }

    // ── Contexts ─────────────────────────────────────────────────────────────

    /// Create a context with its own global scope.
    pub fn new_context(&mut self) -> ContextId {
        self.contexts.push(Context::new());
        ContextId(self.contexts.len() as u32 - 1)
    }

    /// Attach embedder data reported with debug events from this context.
    pub fn set_context_data(&mut self, context: ContextId, data: Option<String>) {
        if let Some(slot) = self.contexts.get_mut(context.0 as usize) {
            slot.data = data;
        }
    }

    pub fn context_data(&self, context: ContextId) -> Option<&str> {
        self.contexts
            .get(context.0 as usize)
            .and_then(|slot| slot.data.as_deref())
    }

    /// Global scope of `context`; unknown ids map to the default context.
    pub fn global_scope(&self, context: ContextId) -> ScopeRef {
        let slot = self
            .contexts
            .get(context.0 as usize)
            .unwrap_or(&self.contexts[0]);
        Rc::clone(&slot.global)
    }

    pub fn get_global(&self, context: ContextId, name: &str) -> Option<Value> {
        self.global_scope(context).borrow().get_own(name)
    }

    pub fn set_global(&mut self, context: ContextId, name: &str, value: Value) {
        self.global_scope(context)
            .borrow_mut()
            .declare(Rc::from(name), value);
    }

    /// Expose a host function as a global.
    pub fn register_native(
        &mut self,
        context: ContextId,
        name: &str,
        callback: impl Fn(&mut Isolate, &[Value]) -> ExecResult<Value> + 'static,
    ) {
        self.set_global(context, name, Value::native(name, callback));
    }

    // ── Compilation ──────────────────────────────────────────────────────────

    /// Compile a script into `context`.
    pub fn compile(
        &mut self,
        context: ContextId,
        source: &str,
        origin: ScriptOrigin,
    ) -> ExecResult<ScriptHandle> {
        self.debug_before_compile();

        let program = match parse_program(source) {
            Ok(program) => program,
            Err(mut error) => {
                let script = Rc::new(Script::new(self.heap.next_script_id(), source, &origin));
                let (line, column) = script.position_to_line_column(error.position);
                error.line = line + script.line_offset();
                error.column = column;
                tracing::debug!(script = %script.id(), line = error.line, "compile error");

                self.debug_compile_error(&script, &error, context);
                self.notify_message_listeners(&ErrorMessage {
                    text: error.to_string(),
                    exception: None,
                    script_name: origin.name.clone(),
                    line: Some(error.line),
                });
                return Err(ExecError::Syntax(error));
            }
        };

        let script = Rc::new(Script::new(self.heap.next_script_id(), source, &origin));
        self.heap.register_script(&script);
        let function = compile_script(program, &script, &mut self.heap);
        if self.heap.young_count() > self.options.young_generation_functions {
            self.collect_garbage(GcKind::Scavenge);
        }

        self.debug_after_compile(&function, context);
        Ok(ScriptHandle { function, context })
    }

    /// Run a compiled script's top-level code.
    pub fn run(&mut self, script: &ScriptHandle) -> ExecResult<Value> {
        let function = Rc::clone(&script.function);
        let context = script.context;
        let scope = self.global_scope(context);
        self.enter_script(|isolate| isolate.execute_function(&function, scope, context))
    }

    /// Compile and run `source` in the default context under `name`.
    pub fn compile_run(&mut self, source: &str, name: &str) -> ExecResult<Value> {
        let script = self.compile(ContextId::DEFAULT, source, ScriptOrigin::named(name))?;
        self.run(&script)
    }

    /// Call a function value from the embedder.
    pub fn call(&mut self, function: &Value, args: &[Value]) -> ExecResult<Value> {
        let args = args.to_vec();
        self.enter_script(|isolate| isolate.call_value(function, args))
    }

    /// Run `body` as an embedder entry into script code.
    fn enter_script<T>(&mut self, body: impl FnOnce(&mut Self) -> Exec<T>) -> ExecResult<T> {
        self.embedder_depth += 1;
        let result = body(self);
        self.embedder_depth -= 1;

        if self.embedder_depth == 0 {
            if let Err(Unwind::Throw(exception)) = &result {
                let site = std::mem::take(&mut self.throw_site);
                self.notify_message_listeners(&ErrorMessage {
                    text: format!("Uncaught {}", exception.to_display_string()),
                    exception: Some(exception.clone()),
                    script_name: site.script_name,
                    line: site.line,
                });
            }
            self.debug_embedder_exit();
        }
        result.map_err(ExecError::from)
    }

    // ── Message listeners ────────────────────────────────────────────────────

    /// Observe exceptions that escape to the embedder and compile errors.
    pub fn add_message_listener(&mut self, listener: impl FnMut(&ErrorMessage) + 'static) {
        self.message_listeners.push(Box::new(listener));
    }

    pub fn remove_message_listeners(&mut self) {
        self.message_listeners.clear();
    }

    fn notify_message_listeners(&mut self, message: &ErrorMessage) {
        let mut listeners = std::mem::take(&mut self.message_listeners);
        for listener in &mut listeners {
            listener(message);
        }
        // Keep listeners registered from inside a listener
        listeners.append(&mut self.message_listeners);
        self.message_listeners = listeners;
    }

    // ── Heap ─────────────────────────────────────────────────────────────────

    /// Force a garbage collection; moved code is re-armed for the debugger.
    pub fn collect_garbage(&mut self, kind: GcKind) {
        for function in self.heap.collect(kind) {
            self.debug.on_code_replaced(&function);
        }
        if kind == GcKind::Full {
            self.debug.prune_collected();
        }
    }

    /// Drop every function back to baseline code.
    pub fn deoptimize_all(&mut self) {
        for function in self.heap.live_functions() {
            if function.code().tier() == Tier::Optimized {
                self.heap.replace_code(&function, Tier::Baseline);
                self.debug.on_code_replaced(&function);
            }
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Number of script frames currently on the stack.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Find a live script by id.
    pub fn script_by_id(&self, id: ScriptId) -> Option<Rc<Script>> {
        self.heap
            .live_scripts()
            .into_iter()
            .find(|script| script.id() == id)
    }

    /// Handle for driving the debugger from other threads.
    pub fn debug_handle(&self) -> DebugHandle {
        self.debug.handle()
    }
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new()
    }
}
