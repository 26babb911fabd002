//! Verifier-time symbol tables.
//!
//! A nested scope is a clone of its enclosing table, so names declared
//! inside never leak back out.

use std::collections::HashSet;

use crate::ast::FunctionKey;

#[derive(Debug, Clone, Default)]
pub(crate) struct SymbolTable {
    variables: HashSet<String>,
    /// Variables declared in the innermost scope only.
    local: HashSet<String>,
    functions: HashSet<FunctionKey>,
    system_functions: HashSet<FunctionKey>,
    host_types: HashSet<String>,
}

impl SymbolTable {
    /// Clone for a nested scope.
    pub(crate) fn scoped(&self) -> SymbolTable {
        let mut table = self.clone();
        table.local.clear();
        table
    }

    /// Returns false when `name` already exists in this scope.
    pub(crate) fn declare_variable(&mut self, name: &str) -> bool {
        if !self.local.insert(name.to_string()) {
            return false;
        }
        self.variables.insert(name.to_string());
        true
    }

    pub(crate) fn has_variable(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    pub(crate) fn declare_function(&mut self, key: FunctionKey) {
        self.functions.insert(key);
    }

    pub(crate) fn declare_system_function(&mut self, key: FunctionKey) {
        self.system_functions.insert(key);
    }

    /// Exact-arity lookup over file and system functions.
    pub(crate) fn has_function(&self, name: &str, arity: usize) -> bool {
        let key = FunctionKey::new(name, arity);
        self.functions.contains(&key) || self.system_functions.contains(&key)
    }

    pub(crate) fn declare_host_type(&mut self, name: &str) {
        self.host_types.insert(name.to_string());
    }

    pub(crate) fn has_host_type(&self, name: &str) -> bool {
        self.host_types.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scope_does_not_leak() {
        let mut outer = SymbolTable::default();
        assert!(outer.declare_variable("a"));
        let mut inner = outer.scoped();
        assert!(inner.declare_variable("b"));
        assert!(inner.has_variable("a"));
        assert!(!outer.has_variable("b"));
    }

    #[test]
    fn shadowing_is_allowed_but_redeclaration_is_not() {
        let mut outer = SymbolTable::default();
        outer.declare_variable("x");
        let mut inner = outer.scoped();
        assert!(inner.declare_variable("x"));
        assert!(!inner.declare_variable("x"));
    }

    #[test]
    fn functions_match_exact_arity() {
        let mut table = SymbolTable::default();
        table.declare_function(FunctionKey::new("f", 2));
        table.declare_system_function(FunctionKey::new("println", 1));
        assert!(table.has_function("f", 2));
        assert!(!table.has_function("f", 1));
        assert!(table.has_function("println", 1));
    }
}
