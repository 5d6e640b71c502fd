//! Execution state handed to the event listener.

use crate::debugger::breakpoints::BreakpointId;
use crate::debugger::error::{DebugError, DebugResult};
use crate::debugger::stepping::StepAction;
use crate::error::{ExecError, ExecResult};
use crate::heap::GcKind;
use crate::isolate::Isolate;
use crate::parser::parse_program;
use crate::script::{compile_script, Script, ScriptId, ScriptOrigin};
use crate::value::Value;
use serde::Serialize;
use std::rc::Rc;

/// Description of one stack frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDetails {
    /// 0 is the top frame.
    pub index: usize,
    #[serde(rename = "func")]
    pub function_name: String,
    pub script_id: ScriptId,
    pub script_name: Option<String>,
    pub position: u32,
    /// 0-based, including the script's line offset.
    pub line: u32,
    pub column: u32,
    pub source_line_text: String,
}

/// The stopped isolate as seen from inside a debug event.
///
/// Only valid while the event is being handled; operations are checked
/// against the break it was created for.
pub struct ExecState<'a> {
    isolate: &'a mut Isolate,
    break_id: u64,
}

impl<'a> ExecState<'a> {
    pub(crate) fn new(isolate: &'a mut Isolate, break_id: u64) -> Self {
        Self { isolate, break_id }
    }

    pub fn break_id(&self) -> u64 {
        self.break_id
    }

    pub fn frame_count(&self) -> usize {
        self.isolate.frames.len()
    }

    /// Frame `index`, counted from the top.
    pub fn frame(&self, index: usize) -> DebugResult<FrameDetails> {
        self.isolate.frame_details(index)
    }

    /// Evaluate `source` in the scope of frame `index` (from the top).
    pub fn evaluate(&mut self, index: usize, source: &str) -> ExecResult<Value> {
        let count = self.frame_count();
        let Some(stack_index) = (index < count).then(|| count - index - 1) else {
            return Err(ExecError::Exception(Value::error(
                "RangeError",
                DebugError::FrameOutOfRange { index, count }.to_string(),
            )));
        };
        self.isolate.debug_evaluate(source, Some(stack_index), true)
    }

    /// Evaluate `source` in the global scope of the current context.
    pub fn evaluate_global(&mut self, source: &str) -> ExecResult<Value> {
        self.isolate.debug_evaluate(source, None, true)
    }

    pub fn prepare_step(&mut self, action: StepAction) -> DebugResult<()> {
        self.isolate.prepare_step(self.break_id, action)
    }

    pub fn clear_stepping(&mut self) {
        self.isolate.clear_stepping();
    }

    pub fn clear_breakpoint(&mut self, id: BreakpointId) -> DebugResult<()> {
        self.isolate.clear_breakpoint(id)
    }

    pub fn collect_garbage(&mut self, kind: GcKind) {
        self.isolate.collect_garbage(kind);
    }

    /// Full access to the isolate, e.g. to change breakpoints.
    pub fn isolate(&mut self) -> &mut Isolate {
        self.isolate
    }
}

impl Isolate {
    /// Describe frame `index`, counted from the top.
    pub fn frame_details(&self, index: usize) -> DebugResult<FrameDetails> {
        let count = self.frames.len();
        let frame = (index < count)
            .then(|| count - index - 1)
            .and_then(|stack_index| self.frames.get(stack_index))
            .ok_or(DebugError::FrameOutOfRange { index, count })?;

        let script = frame.function.script();
        let (line, column) = script.position_to_line_column(frame.position);
        Ok(FrameDetails {
            index,
            function_name: frame.function.name().to_string(),
            script_id: script.id(),
            script_name: script.name().map(str::to_string),
            position: frame.position,
            line: line + script.line_offset(),
            column,
            source_line_text: script.line_text(line).unwrap_or_default(),
        })
    }

    /// Run debugger-supplied code.
    ///
    /// `stack_index` selects a frame from the bottom of the stack; `None`
    /// uses the global scope of the current context. Exceptions count as
    /// caught. No compile events fire for the evaluated code.
    pub(crate) fn debug_evaluate(
        &mut self,
        source: &str,
        stack_index: Option<usize>,
        disable_break: bool,
    ) -> ExecResult<Value> {
        let program = parse_program(source)?;
        let script = Rc::new(Script::new(
            self.heap.next_script_id(),
            source,
            &ScriptOrigin::default(),
        ));
        let function = compile_script(program, &script, &mut self.heap);

        let (scope, context) = match stack_index.and_then(|index| self.frames.get(index)) {
            Some(frame) => (Rc::clone(&frame.scope), frame.context),
            None => {
                let context = self.current_context();
                (self.global_scope(context), context)
            }
        };

        self.catch_depth += 1;
        if disable_break {
            self.debug.break_disabled += 1;
        }
        let result = self.execute_function(&function, scope, context);
        if disable_break {
            self.debug.break_disabled -= 1;
        }
        self.catch_depth -= 1;

        result.map_err(ExecError::from)
    }
}
