//! Protocol command dispatch.
//!
//! Each dequeued command produces exactly one response. Errors never escape:
//! they become `success: false` responses carrying the error text.

use crate::debugger::breakpoints::BreakpointId;
use crate::debugger::error::{DebugError, DebugResult};
use crate::debugger::exception::ExceptionBreak;
use crate::debugger::protocol::{
    BacktraceBody, BreakpointListBody, Message, Request, Response, ScriptBody, ValueBody,
};
use crate::debugger::queue::CommandMessage;
use crate::debugger::stepping::StepAction;
use crate::error::ExecError;
use crate::isolate::Isolate;
use crate::script::ScriptId;
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// Result of one command: response body and whether execution resumes.
struct Outcome {
    body: Option<serde_json::Value>,
    running: bool,
}

impl Outcome {
    fn body(body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            running: false,
        }
    }

    fn empty() -> Self {
        Self {
            body: None,
            running: false,
        }
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EvaluateArgs {
    expression: String,
    #[serde(default)]
    global: bool,
    #[serde(default)]
    disable_break: bool,
    #[serde(default)]
    frame: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContinueArgs {
    stepaction: Option<StepAction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBreakpointArgs {
    #[serde(rename = "type")]
    kind: String,
    target: serde_json::Value,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    ignore_count: Option<u32>,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeBreakpointArgs {
    breakpoint: BreakpointId,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    ignore_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ClearBreakpointArgs {
    breakpoint: BreakpointId,
}

#[derive(Debug, Deserialize)]
struct SetExceptionBreakArgs {
    #[serde(rename = "type")]
    kind: ExceptionBreak,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BacktraceArgs {
    from_frame: Option<usize>,
    to_frame: Option<usize>,
}

fn default_true() -> bool {
    true
}

fn arguments<T: DeserializeOwned>(request: &Request) -> DebugResult<T> {
    let arguments = if request.arguments.is_null() {
        json!({})
    } else {
        request.arguments.clone()
    };
    Ok(serde_json::from_value(arguments)?)
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

impl Isolate {
    /// Process one queued command; returns whether execution should resume.
    pub(crate) fn process_command(&mut self, command: CommandMessage) -> bool {
        let (text, client_data) = command.into_parts();
        let (request_seq, name, result) = match serde_json::from_str::<Request>(&text) {
            Ok(request) => {
                tracing::debug!(seq = request.seq, command = %request.command, "command");
                let result = self.dispatch_command(&request);
                (request.seq, request.command, result)
            }
            Err(error) => (0, String::new(), Err(DebugError::Json(error))),
        };

        let (success, outcome, message) = match result {
            Ok(outcome) => (true, outcome, None),
            Err(error) => {
                tracing::debug!(%error, command = %name, "command failed");
                (false, Outcome::empty(), Some(error.to_string()))
            }
        };
        let running = outcome.running;
        let response = Response {
            seq: self.debug.next_seq(),
            request_seq,
            kind: "response",
            command: name,
            success,
            body: outcome.body,
            message,
            running,
        };

        let json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(error) => {
                tracing::warn!(%error, "response not serialized");
                return running;
            }
        };
        let context = self.break_context().map(|current| current.context);
        let context_data = context.and_then(|context| self.context_data(context).map(str::to_string));
        let message = Message::for_response(json, running, client_data, context, context_data);
        self.debug.send_message(&message);
        running
    }

    fn dispatch_command(&mut self, request: &Request) -> DebugResult<Outcome> {
        match request.command.as_str() {
            "evaluate" => self.command_evaluate(arguments(request)?),
            "continue" => self.command_continue(arguments(request)?),
            "setbreakpoint" => self.command_set_breakpoint(arguments(request)?),
            "clearbreakpoint" => {
                let args: ClearBreakpointArgs = arguments(request)?;
                self.clear_breakpoint(args.breakpoint)?;
                Ok(Outcome::body(json!({ "breakpoint": args.breakpoint })))
            }
            "changebreakpoint" => self.command_change_breakpoint(arguments(request)?),
            "listbreakpoints" => {
                let policy = self.exception_policy();
                let body = BreakpointListBody {
                    breakpoints: self.breakpoints(),
                    break_on_exceptions: policy.break_on_caught,
                    break_on_uncaught_exceptions: policy.break_on_uncaught,
                };
                Ok(Outcome::body(serde_json::to_value(body)?))
            }
            "setexceptionbreak" => {
                let args: SetExceptionBreakArgs = arguments(request)?;
                self.set_break_on_exception(args.kind, args.enabled);
                Ok(Outcome::body(json!({ "type": args.kind, "enabled": args.enabled })))
            }
            "backtrace" => self.command_backtrace(arguments(request)?),
            "scripts" => {
                let scripts: Vec<ScriptBody> = self
                    .heap
                    .live_scripts()
                    .iter()
                    .map(|script| ScriptBody::from(script.as_ref()))
                    .collect();
                Ok(Outcome::body(serde_json::to_value(scripts)?))
            }
            "suspend" => {
                if !self.in_break() {
                    self.debug.shared.set_debug_break(true);
                }
                Ok(Outcome::empty())
            }
            other => Err(DebugError::UnknownCommand(other.to_string())),
        }
    }

    fn command_evaluate(&mut self, args: EvaluateArgs) -> DebugResult<Outcome> {
        let count = self.frames.len();
        let stack_index = match (args.global, count) {
            (true, _) | (_, 0) => None,
            (false, _) => {
                let index = args.frame.unwrap_or(0);
                if index >= count {
                    return Err(DebugError::FrameOutOfRange { index, count });
                }
                let stack_index = count - index - 1;
                Some(stack_index)
            }
        };

        let (value, thrown) =
            match self.debug_evaluate(&args.expression, stack_index, args.disable_break) {
                Ok(value) => (value, false),
                Err(ExecError::Exception(value)) => (value, true),
                Err(ExecError::Terminated) => return Err(DebugError::Terminated),
                Err(ExecError::Syntax(error)) => return Err(DebugError::Syntax(error)),
            };
        Ok(Outcome::body(serde_json::to_value(ValueBody::new(
            &value, thrown,
        ))?))
    }

    fn command_continue(&mut self, args: ContinueArgs) -> DebugResult<Outcome> {
        let Some(current) = self.break_context() else {
            return Err(DebugError::NoActiveBreak);
        };
        let break_id = current.id;
        if let Some(action) = args.stepaction {
            self.prepare_step(break_id, action)?;
        }
        Ok(Outcome {
            body: None,
            running: true,
        })
    }

    fn command_set_breakpoint(&mut self, args: SetBreakpointArgs) -> DebugResult<Outcome> {
        let line = args.line.unwrap_or(0);
        let id = match args.kind.as_str() {
            "function" => {
                let name = args
                    .target
                    .as_str()
                    .ok_or_else(|| DebugError::Protocol("target must be a name".to_string()))?;
                let function = self
                    .get_global(self.current_context(), name)
                    .ok_or_else(|| DebugError::Protocol(format!("'{}' is not defined", name)))?;
                let offset = self
                    .function_offset(&function, line, args.column.unwrap_or(0))
                    .ok_or_else(|| {
                        DebugError::Protocol(format!("line {} is outside '{}'", line, name))
                    })?;
                self.set_function_breakpoint(&function, offset)?
            }
            "script" => {
                let name = args
                    .target
                    .as_str()
                    .ok_or_else(|| DebugError::Protocol("target must be a script name".to_string()))?;
                self.set_script_breakpoint_by_name(name, line, args.column)
            }
            "scriptId" => {
                let script = match &args.target {
                    serde_json::Value::Number(n) => n.as_u64(),
                    serde_json::Value::String(s) => s.parse().ok(),
                    _ => None,
                }
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| DebugError::Protocol("target must be a script id".to_string()))?;
                self.set_script_breakpoint_by_id(ScriptId(script), line, args.column)
            }
            other => {
                return Err(DebugError::Protocol(format!(
                    "unknown breakpoint type '{}'",
                    other
                )))
            }
        };

        if args.condition.is_some() {
            self.set_breakpoint_condition(id, args.condition.as_deref())?;
        }
        if let Some(count) = args.ignore_count {
            self.set_breakpoint_ignore_count(id, count)?;
        }
        if !args.enabled {
            self.disable_breakpoint(id)?;
        }

        let actual_locations = self
            .breakpoint(id)
            .map(|info| info.actual_locations)
            .unwrap_or_default();
        Ok(Outcome::body(json!({
            "type": args.kind,
            "breakpoint": id,
            "actual_locations": actual_locations,
        })))
    }

    /// Character offset from a function's start for a line/column relative to it.
    ///
    /// Natives have no source and always get offset 0. `None` means the
    /// line or column lies outside the script.
    fn function_offset(&self, function: &Value, line: u32, column: u32) -> Option<u32> {
        let Value::Function(closure) = function else {
            return Some(0);
        };
        let shared = &closure.function;
        let script = shared.script();
        let start = shared.start_position();
        let (start_line, start_column) = script.position_to_line_column(start);
        let column = if line == 0 {
            start_column.checked_add(column)?
        } else {
            column
        };
        let position = script.line_column_to_position(start_line.checked_add(line)?, column)?;
        Some(position.saturating_sub(start))
    }

    fn command_change_breakpoint(&mut self, args: ChangeBreakpointArgs) -> DebugResult<Outcome> {
        let id = args.breakpoint;
        if self.breakpoint(id).is_none() {
            return Err(DebugError::UnknownBreakpoint(id));
        }
        if let Some(enabled) = args.enabled {
            self.set_breakpoint_enabled(id, enabled)?;
        }
        if let Some(condition) = &args.condition {
            self.set_breakpoint_condition(id, Some(condition))?;
        }
        if let Some(count) = args.ignore_count {
            self.set_breakpoint_ignore_count(id, count)?;
        }
        Ok(Outcome::body(json!({ "breakpoint": id })))
    }

    fn command_backtrace(&mut self, args: BacktraceArgs) -> DebugResult<Outcome> {
        let total = self.frames.len();
        let from = args.from_frame.unwrap_or(0).min(total);
        let to = args.to_frame.unwrap_or(total).clamp(from, total);
        let frames = (from..to)
            .map(|index| self.frame_details(index))
            .collect::<DebugResult<Vec<_>>>()?;
        let body = BacktraceBody {
            from_frame: from,
            to_frame: to,
            total_frames: total,
            frames,
        };
        Ok(Outcome::body(serde_json::to_value(body)?))
    }
}
