//! Shared helpers for kestrel-runtime integration tests.

#![allow(dead_code)]

use kestrel_runtime::debugger::{DebugEvent, EventDetails, ExecState, Message, StepAction};
use kestrel_runtime::{ContextId, Isolate, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly.
///
/// Without `RUST_LOG` the default `[logging] filter` of the config applies.
pub fn init_tracing() {
    let config = kestrel_config::Config::default();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter())),
        )
        .with_test_writer()
        .try_init();
}

/// One event as seen by a recording listener.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub event: DebugEvent,
    pub breakpoints: Vec<u32>,
    /// Name of the top frame's function; empty with no frames.
    pub function: String,
    /// 0-based line of the top frame.
    pub line: Option<u32>,
    pub frame_count: usize,
    pub uncaught: bool,
    pub exception: Option<String>,
}

pub type Hits = Rc<RefCell<Vec<Hit>>>;

fn record(event: &EventDetails, state: &ExecState<'_>) -> Hit {
    let top = state.frame(0).ok();
    Hit {
        event: event.event(),
        breakpoints: event.breakpoints().to_vec(),
        function: top
            .as_ref()
            .map(|frame| frame.function_name.clone())
            .unwrap_or_default(),
        line: top.map(|frame| frame.line),
        frame_count: state.frame_count(),
        uncaught: event.uncaught(),
        exception: event.exception().map(Value::to_display_string),
    }
}

/// Record every `Break` and `Exception` event.
pub fn record_breaks(isolate: &mut Isolate) -> Hits {
    let hits: Hits = Rc::default();
    let sink = Rc::clone(&hits);
    isolate.set_debug_event_listener(move |event, state| {
        if matches!(event.event(), DebugEvent::Break | DebugEvent::Exception) {
            sink.borrow_mut().push(record(event, state));
        }
    });
    hits
}

/// Record every event, compile events included.
pub fn record_all(isolate: &mut Isolate) -> Hits {
    let hits: Hits = Rc::default();
    let sink = Rc::clone(&hits);
    isolate.set_debug_event_listener(move |event, state| {
        sink.borrow_mut().push(record(event, state));
    });
    hits
}

/// Record the first letter of the top function at every break and keep stepping.
pub fn record_steps(isolate: &mut Isolate, action: StepAction) -> Rc<RefCell<String>> {
    let trace: Rc<RefCell<String>> = Rc::default();
    let sink = Rc::clone(&trace);
    isolate.set_debug_event_listener(move |event, state| {
        if event.event() != DebugEvent::Break {
            return;
        }
        let name = state
            .frame(0)
            .map(|frame| frame.function_name)
            .unwrap_or_default();
        sink.borrow_mut().push(name.chars().next().unwrap_or('?'));
        state.prepare_step(action).unwrap();
    });
    trace
}

pub fn count(hits: &Hits, event: DebugEvent) -> usize {
    hits.borrow().iter().filter(|hit| hit.event == event).count()
}

/// Every message delivered to the handler, as parsed JSON.
pub type Messages = Rc<RefCell<Vec<serde_json::Value>>>;

pub fn record_messages(isolate: &mut Isolate) -> Messages {
    let messages: Messages = Rc::default();
    let sink = Rc::clone(&messages);
    isolate.set_message_handler(move |message: &Message| {
        let json: serde_json::Value = serde_json::from_str(message.json()).unwrap();
        sink.borrow_mut().push(json);
    });
    messages
}

/// Responses only, in delivery order.
pub fn responses(messages: &Messages) -> Vec<serde_json::Value> {
    messages
        .borrow()
        .iter()
        .filter(|message| message["type"] == "response")
        .cloned()
        .collect()
}

/// Events named `event`, in delivery order.
pub fn events(messages: &Messages, event: &str) -> Vec<serde_json::Value> {
    messages
        .borrow()
        .iter()
        .filter(|message| message["type"] == "event" && message["event"] == event)
        .cloned()
        .collect()
}

pub fn request(seq: u64, command: &str, arguments: serde_json::Value) -> String {
    serde_json::json!({
        "seq": seq,
        "type": "request",
        "command": command,
        "arguments": arguments,
    })
    .to_string()
}

/// Compile and run `source` under `name`, returning the isolate's global `function`.
pub fn compile_function(isolate: &mut Isolate, source: &str, name: &str, function: &str) -> Value {
    isolate.compile_run(source, name).unwrap();
    global(isolate, function)
}

pub fn global(isolate: &Isolate, name: &str) -> Value {
    isolate
        .get_global(ContextId::DEFAULT, name)
        .unwrap_or_else(|| panic!("global '{}' is not defined", name))
}
