//! Breakpoint table.
//!
//! Breakpoints are registrations with stable ids. A function breakpoint
//! resolves once, to its function. A script breakpoint (by name or by id)
//! stays pending and gains a resolved location in every matching script
//! compiled later, so by-name breakpoints survive reloads.

use crate::debugger::error::{DebugError, DebugResult};
use crate::isolate::Isolate;
use crate::script::{innermost_function, FunctionId, Script, ScriptId, SharedFunction};
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Breakpoint identifier. Ids are allocated in increasing order and never reused.
pub type BreakpointId = u32;

// ── Targets ──────────────────────────────────────────────────────────────────

/// What a breakpoint was set on.
#[derive(Debug, Clone)]
pub enum BreakpointTarget {
    /// Offset from the function's start.
    Function {
        function: Rc<SharedFunction>,
        offset: u32,
    },
    /// A native function; registered but never fires.
    Native { name: String },
    /// Every script with this name; 0-based line, absolute.
    ScriptName {
        name: String,
        line: u32,
        column: Option<u32>,
    },
    /// One script by id.
    ScriptId {
        script: ScriptId,
        line: u32,
        column: Option<u32>,
    },
}

impl BreakpointTarget {
    /// Whether compiling `script` can resolve this target.
    fn matches(&self, script: &Script) -> bool {
        match self {
            BreakpointTarget::ScriptName { name, .. } => script.name() == Some(name.as_str()),
            BreakpointTarget::ScriptId { script: id, .. } => script.id() == *id,
            BreakpointTarget::Function { .. } | BreakpointTarget::Native { .. } => false,
        }
    }

    fn line_column(&self) -> Option<(u32, Option<u32>)> {
        match self {
            BreakpointTarget::ScriptName { line, column, .. }
            | BreakpointTarget::ScriptId { line, column, .. } => Some((*line, *column)),
            BreakpointTarget::Function { .. } | BreakpointTarget::Native { .. } => None,
        }
    }
}

/// A concrete location a breakpoint is armed at.
///
/// The function is held weakly so a reloaded script's old code can be
/// collected; dead locations are pruned on a full collection.
#[derive(Debug, Clone)]
pub struct ResolvedLocation {
    pub function: Weak<SharedFunction>,
    pub function_id: FunctionId,
    pub position: u32,
    /// Hits left to skip at this location.
    pub remaining_ignore: u32,
}

// ── Breakpoint ───────────────────────────────────────────────────────────────

/// A breakpoint registration.
#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub target: BreakpointTarget,
    /// Expression evaluated in the broken frame; falsy or throwing skips the hit.
    pub condition: Option<String>,
    pub ignore_count: u32,
    pub enabled: bool,
    pub hit_count: u32,
    pub locations: Vec<ResolvedLocation>,
}

impl Breakpoint {
    fn new(id: BreakpointId, target: BreakpointTarget) -> Self {
        Self {
            id,
            target,
            condition: None,
            ignore_count: 0,
            enabled: true,
            hit_count: 0,
            locations: Vec::new(),
        }
    }

    /// Count a hit against the location's ignore budget; `true` fires.
    fn consume_ignore(&mut self, function: FunctionId, position: u32) -> bool {
        let Some(location) = self
            .locations
            .iter_mut()
            .find(|location| location.function_id == function && location.position == position)
        else {
            return true;
        };
        if location.remaining_ignore > 0 {
            location.remaining_ignore -= 1;
            false
        } else {
            true
        }
    }
}

/// Snapshot of a breakpoint for embedders and the protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointInfo {
    pub number: BreakpointId,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<ScriptId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub active: bool,
    pub condition: Option<String>,
    pub ignore_count: u32,
    pub hit_count: u32,
    pub actual_locations: Vec<ActualLocation>,
}

/// Where a breakpoint actually landed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualLocation {
    pub script_id: ScriptId,
    /// 0-based, including the script's line offset.
    pub line: u32,
    pub column: u32,
}

impl From<&Breakpoint> for BreakpointInfo {
    fn from(breakpoint: &Breakpoint) -> Self {
        let (kind, script_name, script_id) = match &breakpoint.target {
            BreakpointTarget::Function { .. } | BreakpointTarget::Native { .. } => {
                ("function", None, None)
            }
            BreakpointTarget::ScriptName { name, .. } => ("scriptName", Some(name.clone()), None),
            BreakpointTarget::ScriptId { script, .. } => ("scriptId", None, Some(*script)),
        };
        let (line, column) = match breakpoint.target.line_column() {
            Some((line, column)) => (Some(line), column),
            None => (None, None),
        };
        let actual_locations = breakpoint
            .locations
            .iter()
            .filter_map(|location| {
                let function = location.function.upgrade()?;
                let script = function.script();
                let (line, column) = script.position_to_line_column(location.position);
                Some(ActualLocation {
                    script_id: script.id(),
                    line: line.saturating_add(script.line_offset()),
                    column,
                })
            })
            .collect();
        Self {
            number: breakpoint.id,
            kind,
            script_name,
            script_id,
            line,
            column,
            active: breakpoint.enabled,
            condition: breakpoint.condition.clone(),
            ignore_count: breakpoint.ignore_count,
            hit_count: breakpoint.hit_count,
            actual_locations,
        }
    }
}

// ── BreakpointTable ──────────────────────────────────────────────────────────

/// Every registered breakpoint, by id.
#[derive(Debug)]
pub struct BreakpointTable {
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    next_id: BreakpointId,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self {
            breakpoints: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, target: BreakpointTarget) -> BreakpointId {
        let id = self.next_id;
        self.next_id += 1;
        self.breakpoints.insert(id, Breakpoint::new(id, target));
        id
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    fn get_mut(&mut self, id: BreakpointId) -> DebugResult<&mut Breakpoint> {
        self.breakpoints
            .get_mut(&id)
            .ok_or(DebugError::UnknownBreakpoint(id))
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// Drop every breakpoint; ids keep increasing.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// Forget locations whose function has been collected.
    ///
    /// Returns how many were dropped. The breakpoints themselves stay, so
    /// a script breakpoint goes back to pending once its script is gone.
    pub(crate) fn prune_dead_locations(&mut self) -> usize {
        let mut pruned = 0;
        for breakpoint in self.breakpoints.values_mut() {
            let before = breakpoint.locations.len();
            breakpoint
                .locations
                .retain(|location| location.function.strong_count() > 0);
            pruned += before - breakpoint.locations.len();
        }
        pruned
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a script position to `(function, location position)`.
///
/// `line` is absolute; an absent column means the first code on the line.
fn resolve_in_script(
    script: &Script,
    functions: &[Rc<SharedFunction>],
    line: u32,
    column: Option<u32>,
) -> Option<(Rc<SharedFunction>, u32)> {
    let local_line = line.checked_sub(script.line_offset())?;
    let position = match column {
        Some(column) => script.line_column_to_position(local_line, column)?,
        None => script.first_code_position(local_line)?,
    };
    let function = innermost_function(functions, position)?;
    let location = function.location_at_or_after(position)?.position;
    Some((function, location))
}

// ── Isolate API ──────────────────────────────────────────────────────────────

impl Isolate {
    /// Set a breakpoint at `offset` from the start of a function value.
    pub fn set_function_breakpoint(
        &mut self,
        function: &Value,
        offset: u32,
    ) -> DebugResult<BreakpointId> {
        let target = match function {
            Value::Function(closure) => BreakpointTarget::Function {
                function: Rc::clone(&closure.function),
                offset,
            },
            Value::Native(native) => BreakpointTarget::Native {
                name: native.name.to_string(),
            },
            _ => return Err(DebugError::NotBreakable),
        };
        let id = self.debug.breakpoints.insert(target);

        if let Value::Function(closure) = function {
            let shared = &closure.function;
            let location = shared
                .start_position()
                .checked_add(offset)
                .and_then(|position| shared.location_at_or_after(position));
            if let Some(location) = location {
                let position = location.position;
                self.attach_location(id, shared, position);
            }
        }
        tracing::debug!(breakpoint = id, offset, "function breakpoint set");
        Ok(id)
    }

    /// Set a breakpoint on every script named `name`, now and in the future.
    pub fn set_script_breakpoint_by_name(
        &mut self,
        name: &str,
        line: u32,
        column: Option<u32>,
    ) -> BreakpointId {
        self.set_script_breakpoint(BreakpointTarget::ScriptName {
            name: name.to_string(),
            line,
            column,
        })
    }

    /// Set a breakpoint on the script with the given id.
    pub fn set_script_breakpoint_by_id(
        &mut self,
        script: ScriptId,
        line: u32,
        column: Option<u32>,
    ) -> BreakpointId {
        self.set_script_breakpoint(BreakpointTarget::ScriptId {
            script,
            line,
            column,
        })
    }

    fn set_script_breakpoint(&mut self, target: BreakpointTarget) -> BreakpointId {
        let id = self.debug.breakpoints.insert(target);
        let scripts = self.heap.live_scripts();
        let functions = self.heap.live_functions();
        for script in scripts {
            self.resolve_breakpoint(id, &script, &functions);
        }
        tracing::debug!(
            breakpoint = id,
            resolved = self.debug.breakpoints.get(id).map_or(0, |bp| bp.locations.len()),
            "script breakpoint set"
        );
        id
    }

    /// Resolve breakpoint `id` against one script.
    fn resolve_breakpoint(
        &mut self,
        id: BreakpointId,
        script: &Rc<Script>,
        functions: &[Rc<SharedFunction>],
    ) {
        let Some(breakpoint) = self.debug.breakpoints.get(id) else {
            return;
        };
        if !breakpoint.target.matches(script) {
            return;
        }
        let Some((line, column)) = breakpoint.target.line_column() else {
            return;
        };
        let candidates: Vec<_> = functions
            .iter()
            .filter(|function| Rc::ptr_eq(function.script(), script))
            .cloned()
            .collect();
        if let Some((function, position)) = resolve_in_script(script, &candidates, line, column) {
            self.attach_location(id, &function, position);
            tracing::debug!(breakpoint = id, script = %script.id(), position, "resolved");
        }
    }

    fn attach_location(&mut self, id: BreakpointId, function: &Rc<SharedFunction>, position: u32) {
        let Ok(breakpoint) = self.debug.breakpoints.get_mut(id) else {
            return;
        };
        let already = breakpoint
            .locations
            .iter()
            .any(|location| location.function_id == function.id() && location.position == position);
        if already {
            return;
        }
        breakpoint.locations.push(ResolvedLocation {
            function: Rc::downgrade(function),
            function_id: function.id(),
            position,
            remaining_ignore: breakpoint.ignore_count,
        });
        let enabled = breakpoint.enabled;
        self.debug
            .debug_infos
            .add_breakpoint(&mut self.heap, function, position, id, enabled);
    }

    /// Resolve every script breakpoint against a freshly compiled script.
    pub(crate) fn resolve_pending_breakpoints(&mut self, toplevel: &Rc<SharedFunction>) {
        let script = Rc::clone(toplevel.script());
        let pending: Vec<BreakpointId> = self
            .debug
            .breakpoints
            .iter()
            .filter(|breakpoint| breakpoint.target.matches(&script))
            .map(|breakpoint| breakpoint.id)
            .collect();
        if pending.is_empty() {
            return;
        }
        let mut functions = Vec::new();
        collect_functions(toplevel, &mut functions);
        for id in pending {
            self.resolve_breakpoint(id, &script, &functions);
        }
    }

    /// Remove a breakpoint and disarm its locations.
    pub fn clear_breakpoint(&mut self, id: BreakpointId) -> DebugResult<()> {
        let breakpoint = self
            .debug
            .breakpoints
            .breakpoints
            .remove(&id)
            .ok_or(DebugError::UnknownBreakpoint(id))?;
        for location in &breakpoint.locations {
            self.debug.debug_infos.remove_breakpoint(
                location.function_id,
                location.position,
                id,
                breakpoint.enabled,
            );
        }
        tracing::debug!(breakpoint = id, "breakpoint cleared");
        Ok(())
    }

    /// Toggle firing without removing the registration.
    pub fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> DebugResult<()> {
        let breakpoint = self.debug.breakpoints.get_mut(id)?;
        if breakpoint.enabled == enabled {
            return Ok(());
        }
        breakpoint.enabled = enabled;
        let sites: Vec<_> = breakpoint
            .locations
            .iter()
            .map(|location| (location.function_id, location.position))
            .collect();
        for (function, position) in sites {
            self.debug
                .debug_infos
                .set_enabled(function, position, enabled);
        }
        tracing::debug!(breakpoint = id, enabled, "breakpoint toggled");
        Ok(())
    }

    pub fn enable_breakpoint(&mut self, id: BreakpointId) -> DebugResult<()> {
        self.set_breakpoint_enabled(id, true)
    }

    pub fn disable_breakpoint(&mut self, id: BreakpointId) -> DebugResult<()> {
        self.set_breakpoint_enabled(id, false)
    }

    /// Set or remove a breakpoint's condition.
    pub fn set_breakpoint_condition(
        &mut self,
        id: BreakpointId,
        condition: Option<&str>,
    ) -> DebugResult<()> {
        let breakpoint = self.debug.breakpoints.get_mut(id)?;
        breakpoint.condition = condition
            .map(str::trim)
            .filter(|condition| !condition.is_empty())
            .map(str::to_string);
        Ok(())
    }

    /// Skip the next `count` hits at every location of the breakpoint.
    pub fn set_breakpoint_ignore_count(&mut self, id: BreakpointId, count: u32) -> DebugResult<()> {
        let breakpoint = self.debug.breakpoints.get_mut(id)?;
        breakpoint.ignore_count = count;
        for location in &mut breakpoint.locations {
            location.remaining_ignore = count;
        }
        Ok(())
    }

    /// Snapshot of one breakpoint.
    pub fn breakpoint(&self, id: BreakpointId) -> Option<BreakpointInfo> {
        self.debug.breakpoints.get(id).map(BreakpointInfo::from)
    }

    /// Snapshot of every breakpoint, by id.
    pub fn breakpoints(&self) -> Vec<BreakpointInfo> {
        self.debug
            .breakpoints
            .iter()
            .map(BreakpointInfo::from)
            .collect()
    }

    /// When inactive, breakpoints and `debugger` statements are ignored.
    pub fn set_break_points_active(&mut self, active: bool) {
        self.debug.break_points_active = active;
    }

    /// Breakpoints that fire at `position`; conditions and ignore counts applied.
    pub(crate) fn check_break_points(
        &mut self,
        function: &Rc<SharedFunction>,
        position: u32,
    ) -> Vec<BreakpointId> {
        let candidates = self.debug.debug_infos.breakpoints_at(function.id(), position);
        let mut hits = Vec::new();
        for id in candidates {
            let condition = match self.debug.breakpoints.get(id) {
                Some(breakpoint) if breakpoint.enabled => breakpoint.condition.clone(),
                _ => continue,
            };
            if let Some(condition) = condition {
                if !self.evaluate_condition(&condition) {
                    tracing::trace!(breakpoint = id, "condition not met");
                    continue;
                }
            }
            let Ok(breakpoint) = self.debug.breakpoints.get_mut(id) else {
                continue;
            };
            if !breakpoint.consume_ignore(function.id(), position) {
                tracing::trace!(breakpoint = id, "hit ignored");
                continue;
            }
            breakpoint.hit_count += 1;
            hits.push(id);
        }
        hits
    }

    /// Evaluate a condition in the top frame; a throw counts as false.
    fn evaluate_condition(&mut self, condition: &str) -> bool {
        let frame = self.frames.len().checked_sub(1);
        match self.debug_evaluate(condition, frame, true) {
            Ok(value) => value.is_truthy(),
            Err(error) => {
                tracing::trace!(%error, "condition failed");
                false
            }
        }
    }
}

/// `function` and every function nested in it.
fn collect_functions(function: &Rc<SharedFunction>, out: &mut Vec<Rc<SharedFunction>>) {
    out.push(Rc::clone(function));
    for inner in function.inner_functions() {
        collect_functions(inner, out);
    }
}
