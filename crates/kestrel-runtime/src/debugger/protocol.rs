//! JSON wire protocol.
//!
//! Requests arrive through the command queue as
//! `{"seq", "type": "request", "command", "arguments"}`. Every request gets
//! exactly one response echoing its `seq` as `request_seq`. Events are
//! pushed to the message handler as they happen. Every outgoing message
//! carries its own increasing `seq`.

use crate::debugger::breakpoints::BreakpointInfo;
use crate::debugger::events::{DebugEvent, EventDetails};
use crate::debugger::exec_state::FrameDetails;
use crate::debugger::queue::ClientData;
use crate::isolate::{ContextId, Isolate};
use crate::script::{Script, ScriptId};
use crate::value::{format_number, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Envelopes ────────────────────────────────────────────────────────────────

/// Incoming request.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: u64,
    #[serde(rename = "type", default = "default_request_type")]
    pub kind: String,
    pub command: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

fn default_request_type() -> String {
    "request".to_string()
}

/// Outgoing response.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub seq: u64,
    pub request_seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub running: bool,
}

/// Outgoing event.
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub event: &'static str,
    pub body: serde_json::Value,
}

// ── Bodies ───────────────────────────────────────────────────────────────────

/// Script reference inside event bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptBody {
    pub id: ScriptId,
    pub name: Option<String>,
    pub line_offset: u32,
    pub line_count: u32,
    pub source_length: u32,
}

impl From<&Script> for ScriptBody {
    fn from(script: &Script) -> Self {
        Self {
            id: script.id(),
            name: script.name().map(str::to_string),
            line_offset: script.line_offset(),
            line_count: script.line_count(),
            source_length: script.len(),
        }
    }
}

/// Serialized script value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Primitive values only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    pub text: String,
    /// Set when the value was thrown rather than returned.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exception: bool,
}

impl ValueBody {
    pub fn new(value: &Value, exception: bool) -> Self {
        let json = match value {
            Value::Undefined | Value::Object(_) | Value::Function(_) | Value::Native(_) => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(format_number(*n))),
            ),
            Value::String(s) => Some(serde_json::Value::String(s.to_string())),
        };
        Self {
            kind: value.type_name(),
            value: json,
            text: value.to_display_string(),
            exception,
        }
    }
}

/// Body of `break` and `exception` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breakpoints: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncaught: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ValueBody>,
}

/// Short script reference used in break bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRef {
    pub id: ScriptId,
    pub name: Option<String>,
    pub line_offset: u32,
}

/// Body of the `compileError` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileErrorBody {
    pub script: ScriptBody,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// Body of the `backtrace` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktraceBody {
    pub from_frame: usize,
    pub to_frame: usize,
    pub total_frames: usize,
    pub frames: Vec<FrameDetails>,
}

/// Body of the `listbreakpoints` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointListBody {
    pub breakpoints: Vec<BreakpointInfo>,
    pub break_on_exceptions: bool,
    pub break_on_uncaught_exceptions: bool,
}

// ── Message ──────────────────────────────────────────────────────────────────

/// A response or event delivered to the message handler.
pub struct Message {
    json: String,
    event: Option<DebugEvent>,
    running: bool,
    client_data: Option<Box<dyn ClientData>>,
    context: Option<ContextId>,
    context_data: Option<String>,
}

impl Message {
    pub(crate) fn for_event(
        json: String,
        event: DebugEvent,
        running: bool,
        context: ContextId,
        context_data: Option<String>,
    ) -> Self {
        Self {
            json,
            event: Some(event),
            running,
            client_data: None,
            context: Some(context),
            context_data,
        }
    }

    pub(crate) fn for_response(
        json: String,
        running: bool,
        client_data: Option<Box<dyn ClientData>>,
        context: Option<ContextId>,
        context_data: Option<String>,
    ) -> Self {
        Self {
            json,
            event: None,
            running,
            client_data,
            context,
            context_data,
        }
    }

    pub fn is_event(&self) -> bool {
        self.event.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.event.is_none()
    }

    pub fn event(&self) -> Option<DebugEvent> {
        self.event
    }

    /// The serialized message.
    pub fn json(&self) -> &str {
        &self.json
    }

    /// Data attached to the command this responds to.
    pub fn client_data(&self) -> Option<&dyn ClientData> {
        self.client_data.as_deref()
    }

    /// Context execution was in; `None` for responses outside a break.
    pub fn event_context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn context_data(&self) -> Option<&str> {
        self.context_data.as_deref()
    }

    /// Whether execution resumes after this message.
    pub fn will_start_running(&self) -> bool {
        self.running
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("json", &self.json)
            .field("event", &self.event)
            .field("running", &self.running)
            .field("client_data", &self.client_data.is_some())
            .finish()
    }
}

// ── Serialization of events ──────────────────────────────────────────────────

impl Isolate {
    /// Wire body of an event; `None` for events with no wire form.
    pub(crate) fn event_body(&self, details: &EventDetails) -> Option<serde_json::Value> {
        let body = match details.event() {
            DebugEvent::Break | DebugEvent::Exception => {
                serde_json::to_value(self.break_body(details))
            }
            DebugEvent::AfterCompile => {
                let script = details.script()?;
                Ok(serde_json::json!({ "script": ScriptBody::from(script.as_ref()) }))
            }
            DebugEvent::CompileError => {
                let script = details.script()?;
                let error = details.compile_error()?;
                serde_json::to_value(CompileErrorBody {
                    script: ScriptBody::from(script.as_ref()),
                    message: error.message.clone(),
                    line: error.line,
                    column: error.column,
                })
            }
            DebugEvent::NewFunction => return None,
        };
        body.ok()
    }

    fn break_body(&self, details: &EventDetails) -> BreakBody {
        let top = self.frame_details(0).ok();
        let script = self.frames.last().map(|frame| {
            let script = frame.function.script();
            ScriptRef {
                id: script.id(),
                name: script.name().map(str::to_string),
                line_offset: script.line_offset(),
            }
        });
        let exception = details.exception().map(|value| ValueBody::new(value, true));
        BreakBody {
            source_line: top.as_ref().map(|frame| frame.line),
            source_column: top.as_ref().map(|frame| frame.column),
            source_line_text: top.as_ref().map(|frame| frame.source_line_text.clone()),
            func: top.map(|frame| frame.function_name),
            script,
            breakpoints: details.breakpoints().to_vec(),
            uncaught: exception.as_ref().map(|_| details.uncaught()),
            exception,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_request_defaults() {
        let request: Request =
            serde_json::from_str(r#"{"seq": 3, "command": "scripts"}"#).unwrap();
        assert_eq!(request.seq, 3);
        assert_eq!(request.kind, "request");
        assert!(request.arguments.is_null());
    }

    #[test]
    fn test_response_skips_missing_fields() {
        let response = Response {
            seq: 9,
            request_seq: 4,
            kind: "response",
            command: "continue".to_string(),
            success: true,
            body: None,
            message: None,
            running: true,
        };
        assert_snapshot!(
            serde_json::to_string(&response).unwrap(),
            @r#"{"seq":9,"request_seq":4,"type":"response","command":"continue","success":true,"running":true}"#
        );
    }

    #[test]
    fn test_value_body_forms() {
        assert_snapshot!(
            serde_json::to_string(&ValueBody::new(&Value::Number(12.0), false)).unwrap(),
            @r#"{"type":"number","value":12.0,"text":"12"}"#
        );
        assert_snapshot!(
            serde_json::to_string(&ValueBody::new(&Value::Number(f64::NAN), false)).unwrap(),
            @r#"{"type":"number","value":"NaN","text":"NaN"}"#
        );
        assert_snapshot!(
            serde_json::to_string(&ValueBody::new(&Value::error("Error", "x"), true)).unwrap(),
            @r#"{"type":"object","text":"Error: x","exception":true}"#
        );
    }
}
