//! Step controller.
//!
//! Stepping is prepared from inside a break. Every function on the stack is
//! flooded (all its break slots armed) and, for step-in, so is every function
//! entered afterwards. Whether an armed slot actually stops is decided here
//! from the call depth at which the step was requested:
//!
//! - `In`: any location
//! - `Next`: locations at the same or a shallower depth
//! - `Out`: locations at a strictly shallower depth.
//!
//! A call location never stops when the previous stop was at the same
//! statement of the same frame, so a statement with several calls stops once
//! before its first call and again after each callee returns.

use crate::debugger::error::{DebugError, DebugResult};
use crate::isolate::Isolate;
use crate::script::{BreakLocation, BreakLocationKind};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

// ── StepAction ───────────────────────────────────────────────────────────────

/// Granularity of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Stop at the next location, descending into calls.
    In,
    /// Stop at the next location in this frame or a caller.
    Next,
    /// Stop once the current frame has returned.
    Out,
}

// ── StepState ────────────────────────────────────────────────────────────────

/// Active step request.
#[derive(Debug, Clone, Default)]
pub struct StepState {
    action: Option<StepAction>,
    /// Number of frames on the stack when the step was requested.
    start_depth: usize,
}

impl StepState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(&self) -> Option<StepAction> {
        self.action
    }

    pub fn is_stepping(&self) -> bool {
        self.action.is_some()
    }

    pub(crate) fn prepare(&mut self, action: StepAction, depth: usize) {
        self.action = Some(action);
        self.start_depth = depth;
    }

    pub(crate) fn clear(&mut self) {
        self.action = None;
        self.start_depth = 0;
    }

    /// Whether reaching `location` at `depth` completes the step.
    ///
    /// `frame` is the activation id of the frame at `depth`; `last_stop` is
    /// the `(frame, statement)` of the previous stop.
    pub fn should_stop(
        &self,
        depth: usize,
        location: &BreakLocation,
        frame: u64,
        last_stop: Option<(u64, u32)>,
    ) -> bool {
        let depth_ok = match self.action {
            None => return false,
            Some(StepAction::In) => true,
            Some(StepAction::Next) => depth <= self.start_depth,
            Some(StepAction::Out) => depth < self.start_depth,
        };
        let repeated_call = location.kind == BreakLocationKind::Call
            && last_stop == Some((frame, location.statement));
        depth_ok && !repeated_call
    }
}

// ── Isolate API ──────────────────────────────────────────────────────────────

impl Isolate {
    /// Request a step from the break `break_id`.
    pub fn prepare_step(&mut self, break_id: u64, action: StepAction) -> DebugResult<()> {
        let Some(current) = self.debug.break_stack.last() else {
            return Err(DebugError::NoActiveBreak);
        };
        if !self
            .debug
            .break_stack
            .iter()
            .any(|context| context.id == break_id)
        {
            return Err(DebugError::InvalidBreakId);
        }
        let depth = current.frame_count;

        self.debug.stepping.prepare(action, depth);
        let on_stack: Vec<_> = self
            .frames
            .iter()
            .map(|frame| Rc::clone(&frame.function))
            .collect();
        for function in &on_stack {
            self.debug.debug_infos.flood(&mut self.heap, function);
        }
        tracing::debug!(?action, depth, break_id, "step prepared");
        Ok(())
    }

    /// Cancel any step in progress.
    pub fn clear_stepping(&mut self) {
        self.debug.clear_stepping();
    }

    pub fn is_stepping(&self) -> bool {
        self.debug.stepping.is_stepping()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn location(kind: BreakLocationKind, statement: u32) -> BreakLocation {
        BreakLocation {
            position: statement + 3,
            kind,
            statement,
        }
    }

    #[rstest]
    #[case(StepAction::In, 3, true)]
    #[case(StepAction::In, 1, true)]
    #[case(StepAction::Next, 3, false)]
    #[case(StepAction::Next, 2, true)]
    #[case(StepAction::Next, 1, true)]
    #[case(StepAction::Out, 2, false)]
    #[case(StepAction::Out, 1, true)]
    fn test_depth_rule(#[case] action: StepAction, #[case] depth: usize, #[case] stops: bool) {
        let mut state = StepState::new();
        state.prepare(action, 2);
        let statement = location(BreakLocationKind::Statement, 10);
        assert_eq!(state.should_stop(depth, &statement, 7, None), stops);
    }

    #[test]
    fn test_call_after_stop_at_same_statement_is_skipped() {
        let mut state = StepState::new();
        state.prepare(StepAction::In, 1);
        let call = location(BreakLocationKind::Call, 10);
        assert!(!state.should_stop(1, &call, 7, Some((7, 10))));
        assert!(state.should_stop(1, &call, 8, Some((7, 10))));
        assert!(state.should_stop(1, &call, 7, Some((7, 4))));
    }

    #[test]
    fn test_not_stepping_never_stops() {
        let state = StepState::new();
        let statement = location(BreakLocationKind::Statement, 0);
        assert!(!state.should_stop(0, &statement, 1, None));
    }
}
