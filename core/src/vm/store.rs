//! Scope storage (spec §4.3): a `Store` is a name→value map; a `ScopeStack`
//! is the per-frame chain of them (innermost at index 0); a `StorePool`
//! recycles emptied stores so entering/leaving a block scope in a hot loop
//! doesn't allocate a fresh map every iteration.

use std::collections::HashMap;

use crate::errors::VmError;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct Store {
    bindings: HashMap<String, Value>,
}

impl Store {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn declare(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    fn clear(&mut self) {
        self.bindings.clear();
    }
}

/// The chain of `Store`s a frame has pushed, index 0 innermost. Represented
/// as stack order rather than an explicit `enclosing` pointer per store,
/// since a frame's scopes are never referenced from outside that frame.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Store>,
}

impl ScopeStack {
    pub fn with_root(root: Store) -> Self {
        ScopeStack { scopes: vec![root] }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().find_map(|s| s.get(name))
    }

    /// `Set(name, v, declare=false)`: updates the name in the nearest scope
    /// that already binds it, or declares it fresh in the innermost scope.
    pub fn set(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut() {
            if scope.bindings.contains_key(name) {
                scope.bindings.insert(name.to_string(), value);
                return;
            }
        }
        self.declare(name.to_string(), value);
    }

    /// `Set(name, v, declare=true)`: always binds in the innermost scope.
    pub fn declare(&mut self, name: String, value: Value) {
        self.scopes[0].declare(name, value);
    }

    pub fn push(&mut self, store: Store) {
        self.scopes.insert(0, store);
    }

    /// Never pops the root scope (index past the last one); returns `None`
    /// if asked to.
    pub fn pop(&mut self) -> Option<Store> {
        if self.scopes.len() <= 1 {
            None
        } else {
            Some(self.scopes.remove(0))
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// `EXPORT`: copies `name`'s binding from the innermost scope into the
    /// next one out.
    pub fn export(&mut self, name: &str) -> Result<(), VmError> {
        if self.scopes.len() < 2 {
            return Err(VmError::structure_error("export has no enclosing scope to write into"));
        }
        let value = self.scopes[0]
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::name_error(format!("'{name}' is not defined")))?;
        self.scopes[1].declare(name.to_string(), value);
        Ok(())
    }
}

/// Recycles emptied `Store`s across `PUSH_SCOPE`/`POP_SCOPE` pairs.
#[derive(Debug, Default)]
pub struct StorePool {
    free: Vec<Store>,
}

impl StorePool {
    /// Pre-allocates `size` empty, usable stores (spec §9's "store-pool
    /// pre-allocation") so the first few scope pushes in a program don't
    /// pay an allocation.
    pub fn with_capacity(size: usize) -> Self {
        StorePool {
            free: (0..size).map(|_| Store::default()).collect(),
        }
    }

    pub fn acquire(&mut self) -> Store {
        self.free.pop().unwrap_or_default()
    }

    pub fn release(&mut self, mut store: Store) {
        store.clear();
        self.free.push(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_without_declare_updates_enclosing_scope() {
        let mut root = Store::default();
        root.declare("x".into(), Value::Number(1.0));
        let mut scopes = ScopeStack::with_root(root);
        scopes.push(Store::default());
        scopes.set("x", Value::Number(2.0));
        assert_eq!(scopes.get("x").unwrap().to_string(), "2");
        // The inner scope never got its own binding.
        scopes.pop();
        assert_eq!(scopes.get("x").unwrap().to_string(), "2");
    }

    #[test]
    fn declare_always_binds_innermost() {
        let mut root = Store::default();
        root.declare("x".into(), Value::Number(1.0));
        let mut scopes = ScopeStack::with_root(root);
        scopes.push(Store::default());
        scopes.declare("x".into(), Value::Number(9.0));
        let inner_popped = scopes.pop().unwrap();
        assert_eq!(inner_popped.get("x").unwrap().to_string(), "9");
    }

    #[test]
    fn pool_recycles_released_stores() {
        let mut pool = StorePool::default();
        let mut store = pool.acquire();
        store.declare("leftover".into(), Value::Nil);
        pool.release(store);
        let reused = pool.acquire();
        assert!(reused.get("leftover").is_none());
    }
}
