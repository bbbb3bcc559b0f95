//! Scope stack for the per-function abstract interpreter.
//!
//! The environment is a stack of scopes: the bottom scope belongs to the
//! function body, one more is pushed for every `if`/`for`/`while`/`switch`
//! region. Lookup scans top-down. On region exit the top scope is unified
//! into its parent and popped: bindings present in both are merged, bindings
//! that exist only in the inner scope do not escape. `break` unifies without
//! popping.

use std::collections::HashMap;

use crate::types::SemType;

#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, SemType>,
}

#[derive(Debug, Default)]
pub struct Env {
    scopes: Vec<Scope>,
}

impl Env {
    pub fn new() -> Env {
        Env::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Binds a name in the innermost scope. The environment is always
    /// non-empty while a function body is being walked; a bind outside any
    /// scope is ignored.
    pub fn bind(&mut self, name: impl Into<String>, ty: SemType) {
        debug_assert!(!self.scopes.is_empty(), "bind outside any scope");
        if let Some(top) = self.scopes.last_mut() {
            top.bindings.insert(name.into(), ty);
        }
    }

    /// Top-down first hit.
    pub fn lookup(&self, name: &str) -> Option<&SemType> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    /// Models the join after a control-flow region: every binding present in
    /// both the top scope and its parent is merged into the parent. The top
    /// scope itself is left in place (a `break` unifies without leaving the
    /// region).
    pub fn unify_parent(&mut self) {
        let len = self.scopes.len();
        if len < 2 {
            return;
        }
        let (outer_scopes, inner_scopes) = self.scopes.split_at_mut(len - 1);
        let outer = outer_scopes
            .last_mut()
            .expect("scope stack has at least two scopes here");
        let inner = &inner_scopes[0];
        for (name, ty) in &inner.bindings {
            if let Some(existing) = outer.bindings.get_mut(name) {
                existing.merge(ty);
            }
        }
    }

    /// Region exit: unify into the parent, then drop the top scope.
    pub fn unify_and_pop(&mut self) {
        self.unify_parent();
        self.pop();
    }
}
