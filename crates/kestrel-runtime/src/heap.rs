//! Code objects and a simulated moving heap.
//!
//! Functions are tracked weakly. A scavenge relocates the code of functions
//! created since the previous collection; a full collection relocates every
//! live function's code and forgets dead functions and scripts. Relocation
//! produces a fresh [`Code`] object with no armed break slots, so whoever
//! owns arming state has to re-apply it (see `Isolate::collect_garbage`).

use crate::script::{FunctionId, Script, ScriptId, SharedFunction};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

/// Address-like identity of a code object; changes on every relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(pub u64);

/// Compilation tier of a code object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Carries break slots; every debug hook is honored.
    Baseline,
    /// No break slots; only `debugger` statements and interrupts are observed.
    Optimized,
}

/// Executable code for a function.
#[derive(Debug)]
pub struct Code {
    id: CodeId,
    tier: Tier,
    armed: RefCell<BTreeSet<u32>>,
}

impl Code {
    pub fn id(&self) -> CodeId {
        self.id
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Whether the slot at `position` transfers control to the debugger.
    pub fn is_armed(&self, position: u32) -> bool {
        self.tier == Tier::Baseline && self.armed.borrow().contains(&position)
    }

    pub(crate) fn arm(&self, position: u32) {
        self.armed.borrow_mut().insert(position);
    }

    pub(crate) fn disarm(&self, position: u32) {
        self.armed.borrow_mut().remove(&position);
    }

    /// Number of armed slots.
    pub fn armed_count(&self) -> usize {
        self.armed.borrow().len()
    }
}

/// Kind of garbage collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcKind {
    /// Young generation only.
    Scavenge,
    /// Everything, including compaction of old code.
    Full,
}

struct FunctionEntry {
    function: Weak<SharedFunction>,
    young: bool,
}

/// Allocation registry for scripts, functions and code.
pub struct Heap {
    next_code_id: u64,
    next_function_id: u32,
    next_script_id: u32,
    functions: Vec<FunctionEntry>,
    scripts: Vec<Weak<Script>>,
    young_count: usize,
    collections: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            next_code_id: 1,
            next_function_id: 1,
            next_script_id: 1,
            functions: Vec::new(),
            scripts: Vec::new(),
            young_count: 0,
            collections: 0,
        }
    }

    pub(crate) fn new_code(&mut self, tier: Tier) -> Rc<Code> {
        let id = CodeId(self.next_code_id);
        self.next_code_id += 1;
        Rc::new(Code {
            id,
            tier,
            armed: RefCell::new(BTreeSet::new()),
        })
    }

    pub(crate) fn next_function_id(&mut self) -> FunctionId {
        let id = FunctionId(self.next_function_id);
        self.next_function_id += 1;
        id
    }

    pub(crate) fn next_script_id(&mut self) -> ScriptId {
        let id = ScriptId(self.next_script_id);
        self.next_script_id += 1;
        id
    }

    pub(crate) fn register_function(&mut self, function: &Rc<SharedFunction>) {
        self.functions.push(FunctionEntry {
            function: Rc::downgrade(function),
            young: true,
        });
        self.young_count += 1;
    }

    pub(crate) fn register_script(&mut self, script: &Rc<Script>) {
        self.scripts.push(Rc::downgrade(script));
    }

    /// Functions allocated since the last collection.
    pub fn young_count(&self) -> usize {
        self.young_count
    }

    /// Number of collections performed so far.
    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Replace a function's code with a fresh object of the given tier.
    pub(crate) fn replace_code(&mut self, function: &SharedFunction, tier: Tier) {
        let code = self.new_code(tier);
        function.replace_code(code);
    }

    /// Collect garbage, returning every function whose code moved.
    pub(crate) fn collect(&mut self, kind: GcKind) -> Vec<Rc<SharedFunction>> {
        self.collections += 1;
        if kind == GcKind::Full {
            self.functions
                .retain(|entry| entry.function.strong_count() > 0);
            self.scripts.retain(|script| script.strong_count() > 0);
        }

        let mut moved = Vec::new();
        let mut entries = std::mem::take(&mut self.functions);
        for entry in &mut entries {
            let relocate = kind == GcKind::Full || entry.young;
            entry.young = false;
            if !relocate {
                continue;
            }
            if let Some(function) = entry.function.upgrade() {
                let tier = function.code().tier();
                self.replace_code(&function, tier);
                moved.push(function);
            }
        }
        self.functions = entries;
        self.young_count = 0;

        tracing::trace!(?kind, moved = moved.len(), "garbage collected");
        moved
    }

    /// Every live function.
    pub fn live_functions(&self) -> Vec<Rc<SharedFunction>> {
        self.functions
            .iter()
            .filter_map(|entry| entry.function.upgrade())
            .collect()
    }

    /// Every live script, oldest first.
    pub fn live_scripts(&self) -> Vec<Rc<Script>> {
        self.scripts.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::script::{compile_script, ScriptOrigin};

    fn compile(heap: &mut Heap, source: &str) -> Rc<SharedFunction> {
        let script = Rc::new(Script::new(
            heap.next_script_id(),
            source,
            &ScriptOrigin::default(),
        ));
        heap.register_script(&script);
        compile_script(parse_program(source).unwrap(), &script, heap)
    }

    #[test]
    fn test_scavenge_moves_only_young_code() {
        let mut heap = Heap::new();
        let first = compile(&mut heap, "function f() {}");
        let before = first.code().id();
        assert_eq!(heap.collect(GcKind::Scavenge).len(), 2);
        let after = first.code().id();
        assert_ne!(before, after);

        let _second = compile(&mut heap, "g = 1");
        let moved = heap.collect(GcKind::Scavenge);
        assert_eq!(moved.len(), 1);
        assert_eq!(first.code().id(), after);
    }

    #[test]
    fn test_full_gc_prunes_dead_functions() {
        let mut heap = Heap::new();
        let kept = compile(&mut heap, "x = 1");
        drop(compile(&mut heap, "function dead() {}"));
        heap.collect(GcKind::Full);
        let live = heap.live_functions();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), kept.id());
        assert_eq!(heap.live_scripts().len(), 1);
    }

    #[test]
    fn test_relocation_drops_armed_slots_and_keeps_tier() {
        let mut heap = Heap::new();
        let function = compile(&mut heap, "x = 1");
        function.code().arm(0);
        assert!(function.code().is_armed(0));
        heap.collect(GcKind::Full);
        assert!(!function.code().is_armed(0));
        assert_eq!(function.code().tier(), Tier::Baseline);
    }

    #[test]
    fn test_optimized_code_reports_no_armed_slots() {
        let mut heap = Heap::new();
        let function = compile(&mut heap, "x = 1");
        heap.replace_code(&function, Tier::Optimized);
        function.code().arm(0);
        assert!(!function.code().is_armed(0));
    }
}
