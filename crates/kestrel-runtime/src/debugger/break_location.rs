//! Per-function debug side tables and slot arming.
//!
//! A function gets a [`DebugInfo`] the first time a breakpoint lands in it or
//! stepping floods it, and loses it once neither holds. Creating one forces
//! the function back to baseline code, since optimized code has no break
//! slots. Arming state lives here; code objects only mirror it, so a
//! relocated or recompiled code object is re-armed from the table.

use crate::debugger::breakpoints::BreakpointId;
use crate::heap::{Heap, Tier};
use crate::script::{FunctionId, SharedFunction};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

// ── BreakSite ────────────────────────────────────────────────────────────────

/// Breakpoints sharing one location.
#[derive(Debug, Default)]
struct BreakSite {
    breakpoints: Vec<BreakpointId>,
    /// How many of `breakpoints` are enabled; the slot is armed while > 0.
    enabled: usize,
}

// ── DebugInfo ────────────────────────────────────────────────────────────────

/// Debug side table of one function.
#[derive(Debug)]
pub struct DebugInfo {
    /// Weak so that debugging never keeps dead code alive.
    function: Weak<SharedFunction>,
    id: FunctionId,
    sites: BTreeMap<u32, BreakSite>,
    /// Every location armed for stepping.
    flooded: bool,
}

impl DebugInfo {
    fn new(function: &Rc<SharedFunction>) -> Self {
        Self {
            function: Rc::downgrade(function),
            id: function.id(),
            sites: BTreeMap::new(),
            flooded: false,
        }
    }

    /// The annotated function, unless it has been collected.
    pub fn function(&self) -> Option<Rc<SharedFunction>> {
        self.function.upgrade()
    }

    pub fn function_id(&self) -> FunctionId {
        self.id
    }

    pub fn is_flooded(&self) -> bool {
        self.flooded
    }

    /// Positions that currently hold at least one breakpoint.
    pub fn breakpoint_positions(&self) -> impl Iterator<Item = u32> + '_ {
        self.sites.keys().copied()
    }

    fn wants_armed(&self, position: u32) -> bool {
        self.flooded || self.sites.get(&position).is_some_and(|site| site.enabled > 0)
    }

    fn is_unused(&self) -> bool {
        self.sites.is_empty() && !self.flooded
    }

    /// Mirror the table onto the function's current code object.
    fn apply(&self) {
        let Some(function) = self.function.upgrade() else {
            return;
        };
        let code = function.code();
        for location in function.locations() {
            if self.wants_armed(location.position) {
                code.arm(location.position);
            } else {
                code.disarm(location.position);
            }
        }
    }

    fn disarm_all(&self) {
        let Some(function) = self.function.upgrade() else {
            return;
        };
        let code = function.code();
        for location in function.locations() {
            code.disarm(location.position);
        }
    }
}

// ── DebugInfoRegistry ────────────────────────────────────────────────────────

/// All debug side tables, keyed by function.
#[derive(Debug, Default)]
pub struct DebugInfoRegistry {
    infos: HashMap<FunctionId, DebugInfo>,
}

impl DebugInfoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, function: FunctionId) -> bool {
        self.infos.contains_key(&function)
    }

    pub fn get(&self, function: FunctionId) -> Option<&DebugInfo> {
        self.infos.get(&function)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DebugInfo> {
        self.infos.values()
    }

    /// Annotate `function`, deoptimizing it so its break slots exist.
    fn ensure(&mut self, heap: &mut Heap, function: &Rc<SharedFunction>) -> &mut DebugInfo {
        self.infos.entry(function.id()).or_insert_with(|| {
            if function.code().tier() == Tier::Optimized {
                heap.replace_code(function, Tier::Baseline);
                tracing::debug!(function = %function.id(), "deoptimized for debugging");
            }
            tracing::trace!(function = %function.id(), "debug info created");
            DebugInfo::new(function)
        })
    }

    fn release_if_unused(&mut self, function: FunctionId) {
        if self.infos.get(&function).is_some_and(DebugInfo::is_unused) {
            self.infos.remove(&function);
            tracing::trace!(function = %function, "debug info released");
        }
    }

    /// Register breakpoint `id` at `position`.
    pub fn add_breakpoint(
        &mut self,
        heap: &mut Heap,
        function: &Rc<SharedFunction>,
        position: u32,
        id: BreakpointId,
        enabled: bool,
    ) {
        let info = self.ensure(heap, function);
        let site = info.sites.entry(position).or_default();
        site.breakpoints.push(id);
        if enabled {
            site.enabled += 1;
        }
        info.apply();
        tracing::debug!(breakpoint = id, function = %function.id(), position, "armed");
    }

    /// Unregister breakpoint `id` from `position`.
    pub fn remove_breakpoint(
        &mut self,
        function: FunctionId,
        position: u32,
        id: BreakpointId,
        enabled: bool,
    ) {
        let Some(info) = self.infos.get_mut(&function) else {
            return;
        };
        let Some(site) = info.sites.get_mut(&position) else {
            return;
        };
        let Some(index) = site.breakpoints.iter().position(|&other| other == id) else {
            return;
        };
        site.breakpoints.remove(index);
        if enabled {
            site.enabled = site.enabled.saturating_sub(1);
        }
        if site.breakpoints.is_empty() {
            info.sites.remove(&position);
        }
        info.apply();
        tracing::debug!(breakpoint = id, function = %function, position, "disarmed");
        self.release_if_unused(function);
    }

    /// Account for breakpoint `id` at `position` being enabled or disabled.
    pub fn set_enabled(&mut self, function: FunctionId, position: u32, enabled: bool) {
        let Some(info) = self.infos.get_mut(&function) else {
            return;
        };
        let Some(site) = info.sites.get_mut(&position) else {
            return;
        };
        if enabled {
            site.enabled += 1;
        } else {
            site.enabled = site.enabled.saturating_sub(1);
        }
        info.apply();
    }

    /// Breakpoints registered at `position`, in registration order.
    pub fn breakpoints_at(&self, function: FunctionId, position: u32) -> Vec<BreakpointId> {
        self.infos
            .get(&function)
            .and_then(|info| info.sites.get(&position))
            .map(|site| site.breakpoints.clone())
            .unwrap_or_default()
    }

    /// Arm every location of `function` for stepping.
    pub fn flood(&mut self, heap: &mut Heap, function: &Rc<SharedFunction>) {
        let info = self.ensure(heap, function);
        if !info.flooded {
            info.flooded = true;
            info.apply();
            tracing::trace!(function = %function.id(), "flooded");
        }
    }

    /// Undo all flooding, keeping breakpoint arming.
    pub fn unflood_all(&mut self) {
        let mut released = Vec::new();
        for (id, info) in &mut self.infos {
            if info.flooded {
                info.flooded = false;
                info.apply();
            }
            if info.is_unused() {
                released.push(*id);
            }
        }
        for id in released {
            self.infos.remove(&id);
        }
    }

    /// Re-apply arming after `function` received a new code object.
    pub fn rearm(&self, function: &SharedFunction) {
        if let Some(info) = self.infos.get(&function.id()) {
            info.apply();
        }
    }

    /// Drop the tables of collected functions, returning how many went.
    pub fn prune_dead(&mut self) -> usize {
        let before = self.infos.len();
        self.infos
            .retain(|_, info| info.function.strong_count() > 0);
        before - self.infos.len()
    }

    /// Disarm everything and forget every table.
    pub fn clear(&mut self) {
        for info in self.infos.values() {
            info.disarm_all();
        }
        self.infos.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::script::{compile_script, Script, ScriptOrigin};

    fn compile(heap: &mut Heap, source: &str) -> Rc<SharedFunction> {
        let script = Rc::new(Script::new(
            heap.next_script_id(),
            source,
            &ScriptOrigin::default(),
        ));
        heap.register_script(&script);
        let toplevel = compile_script(parse_program(source).unwrap(), &script, heap);
        Rc::clone(&toplevel.inner_functions()[0])
    }

    #[test]
    fn test_shared_site_stays_armed_until_last_breakpoint_goes() {
        let mut heap = Heap::new();
        let f = compile(&mut heap, "function f() { a = 1; }");
        let position = f.locations()[0].position;
        let mut registry = DebugInfoRegistry::new();

        registry.add_breakpoint(&mut heap, &f, position, 1, true);
        registry.add_breakpoint(&mut heap, &f, position, 2, true);
        registry.remove_breakpoint(f.id(), position, 1, true);
        assert!(f.code().is_armed(position));

        registry.remove_breakpoint(f.id(), position, 1, true);
        assert!(f.code().is_armed(position));

        registry.remove_breakpoint(f.id(), position, 2, true);
        assert!(!f.code().is_armed(position));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_disabled_breakpoint_leaves_slot_disarmed() {
        let mut heap = Heap::new();
        let f = compile(&mut heap, "function f() { a = 1; }");
        let position = f.locations()[0].position;
        let mut registry = DebugInfoRegistry::new();

        registry.add_breakpoint(&mut heap, &f, position, 1, false);
        assert!(!f.code().is_armed(position));
        registry.set_enabled(f.id(), position, true);
        assert!(f.code().is_armed(position));
        registry.set_enabled(f.id(), position, false);
        assert!(!f.code().is_armed(position));
        assert!(registry.contains(f.id()));
    }

    #[test]
    fn test_annotation_deoptimizes() {
        let mut heap = Heap::new();
        let f = compile(&mut heap, "function f() { a = 1; }");
        heap.replace_code(&f, Tier::Optimized);
        let mut registry = DebugInfoRegistry::new();
        registry.flood(&mut heap, &f);
        assert_eq!(f.code().tier(), Tier::Baseline);
        assert_eq!(f.code().armed_count(), f.locations().len());

        registry.unflood_all();
        assert_eq!(f.code().armed_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rearm_after_relocation() {
        let mut heap = Heap::new();
        let f = compile(&mut heap, "function f() { a = 1; }");
        let position = f.locations()[0].position;
        let mut registry = DebugInfoRegistry::new();
        registry.add_breakpoint(&mut heap, &f, position, 7, true);

        heap.replace_code(&f, Tier::Baseline);
        assert!(!f.code().is_armed(position));
        registry.rearm(&f);
        assert!(f.code().is_armed(position));
    }

    #[test]
    fn test_prune_forgets_collected_functions() {
        let mut heap = Heap::new();
        let kept = compile(&mut heap, "function f() { a = 1; }");
        let dead = compile(&mut heap, "function g() { b = 1; }");
        let mut registry = DebugInfoRegistry::new();
        registry.flood(&mut heap, &kept);
        registry.flood(&mut heap, &dead);
        let dead_id = dead.id();

        assert_eq!(registry.prune_dead(), 0);
        drop(dead);
        assert_eq!(registry.prune_dead(), 1);
        assert!(registry.contains(kept.id()));
        assert!(!registry.contains(dead_id));
    }
}
