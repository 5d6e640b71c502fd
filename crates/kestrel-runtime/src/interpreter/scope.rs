//! Lexical environments.
//!
//! Scopes form a parent chain ending at a context's global scope. Functions
//! get one scope for parameters and hoisted declarations; `catch` clauses add
//! a child scope for their parameter. Blocks do not introduce scopes.

use crate::ast::Name;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared scope handle.
pub type ScopeRef = Rc<RefCell<Scope>>;

/// Variable bindings of one environment.
#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<Name, Value>,
    parent: Option<ScopeRef>,
}

impl Scope {
    /// A root scope.
    pub fn new_global() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    /// A scope nested in `parent`.
    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Create or overwrite a binding in this scope.
    pub fn declare(&mut self, name: Name, value: Value) {
        self.vars.insert(name, value);
    }

    /// Whether this scope itself binds `name`.
    pub fn has_own(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Read a binding of this scope only.
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    /// Number of bindings in this scope.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the scope has no bindings.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Resolve `name` along the scope chain.
pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut current = Rc::clone(scope);
    loop {
        let next = {
            let borrowed = current.borrow();
            if let Some(value) = borrowed.vars.get(name) {
                return Some(value.clone());
            }
            borrowed.parent.clone()
        };
        current = next?;
    }
}

/// Assign to the nearest binding of `name`, creating a global when there is none.
pub fn assign(scope: &ScopeRef, name: &Name, value: Value) {
    let mut current = Rc::clone(scope);
    loop {
        let next = {
            let mut borrowed = current.borrow_mut();
            if let Some(slot) = borrowed.vars.get_mut(name) {
                *slot = value;
                return;
            }
            match &borrowed.parent {
                Some(parent) => Rc::clone(parent),
                None => {
                    borrowed.vars.insert(Rc::clone(name), value);
                    return;
                }
            }
        };
        current = next;
    }
}
