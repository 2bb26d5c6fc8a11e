//! Variable store
//!
//! Scoped shell variables. Scopes form a stack: the bottom is the global
//! scope, each function call pushes one, and `local` installs into the top.
//! Assignment uses dynamic scoping: it targets the innermost scope that
//! already holds the name, else the global scope.
//!
//! The store also owns the positional parameters and answers the special
//! parameters (`$?`, `$$`, `$#`, ...). Subshells receive the whole store by
//! `fork`; nothing propagates back.

pub mod special;
pub mod value;

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use thiserror::Error;

pub use value::{Value, VarAttrs, Variable};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VarError {
    #[error("{0}: readonly variable")]
    Readonly(String),
    #[error("{0}: not an indexed array")]
    NotIndexed(String),
    #[error("{0}: bad array subscript")]
    BadSubscript(String),
}

/// One scope: a mapping from name to variable.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Variable>,
}

/// The process-wide variable store.
#[derive(Debug, Clone)]
pub struct VarStore {
    scopes: Vec<Scope>,
    positional: Vec<String>,
    positional_stack: Vec<Vec<String>>,
    /// `$0`
    pub script_name: String,
    /// `$?`
    pub last_status: i32,
    /// `$$`
    pub shell_pid: u32,
    /// `$!`
    pub last_bg_pid: Option<u32>,
    /// Short-letter option flags reported by `$-`; maintained by `set`.
    pub option_flags: String,
    /// Source line of the command being run, for `$LINENO`.
    pub current_line: usize,
}

impl Default for VarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VarStore {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            positional: Vec::new(),
            positional_stack: Vec::new(),
            script_name: "psh".to_string(),
            last_status: 0,
            shell_pid: std::process::id(),
            last_bg_pid: None,
            option_flags: String::new(),
            current_line: 0,
        }
    }

    /// Seed the global scope from the process environment, marking each
    /// variable exported.
    pub fn import_environment(&mut self) {
        for (name, value) in std::env::vars() {
            self.scopes[0].vars.insert(
                name,
                Variable::scalar(value).with_attrs(VarAttrs::EXPORTED),
            );
        }
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Scalar lookup, covering special parameters, positionals, and the
    /// scope stack.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = special::get_special(self, name) {
            return Some(value);
        }
        self.get_var(name).map(|v| v.value.as_scalar().to_string())
    }

    pub fn get_var(&self, name: &str) -> Option<&Variable> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name))
    }

    pub fn is_set(&self, name: &str) -> bool {
        special::get_special(self, name).is_some() || self.get_var(name).is_some()
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        self.get_var(name).is_some_and(Variable::is_readonly)
    }

    /// All visible names, innermost scope winning, sorted.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.vars.keys())
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    // =========================================================================
    // ASSIGNMENT
    // =========================================================================

    fn target_scope_index(&self, name: &str) -> usize {
        for (idx, scope) in self.scopes.iter().enumerate().rev() {
            if scope.vars.contains_key(name) {
                return idx;
            }
        }
        0
    }

    /// Assign a scalar, honoring readonly and case-transform attributes.
    pub fn set_scalar(&mut self, name: &str, value: impl Into<String>) -> Result<(), VarError> {
        let idx = self.target_scope_index(name);
        let value = value.into();
        let scope = &mut self.scopes[idx];
        match scope.vars.get_mut(name) {
            Some(var) => {
                if var.is_readonly() {
                    return Err(VarError::Readonly(name.to_string()));
                }
                let value = var.transform_case(value);
                match &mut var.value {
                    Value::Str(s) => *s = value,
                    Value::Indexed(map) => {
                        map.insert(0, value);
                    }
                    Value::Assoc(map) => {
                        map.insert("0".to_string(), value);
                    }
                }
            }
            None => {
                scope.vars.insert(name.to_string(), Variable::scalar(value));
            }
        }
        Ok(())
    }

    /// Append to a scalar (`VAR+=text`).
    pub fn append_scalar(&mut self, name: &str, value: &str) -> Result<(), VarError> {
        let current = self.get(name).unwrap_or_default();
        self.set_scalar(name, format!("{current}{value}"))
    }

    /// Install a variable in the top scope (the `local` builtin).
    pub fn set_local(&mut self, name: &str, value: impl Into<String>) -> Result<(), VarError> {
        if self.is_readonly(name) {
            return Err(VarError::Readonly(name.to_string()));
        }
        let scope = self.scopes.last_mut().unwrap();
        scope.vars.insert(
            name.to_string(),
            Variable::scalar(value.into()).with_attrs(VarAttrs::LOCAL),
        );
        Ok(())
    }

    /// Add attributes to a variable, creating it unset-empty if missing.
    /// Attribute changes are allowed even on readonly variables (`export`
    /// of a readonly name is legal).
    pub fn add_attrs(&mut self, name: &str, attrs: VarAttrs) -> Result<(), VarError> {
        let idx = self.target_scope_index(name);
        let scope = &mut self.scopes[idx];
        match scope.vars.get_mut(name) {
            Some(var) => var.attrs |= attrs,
            None => {
                scope
                    .vars
                    .insert(name.to_string(), Variable::scalar("").with_attrs(attrs));
            }
        }
        Ok(())
    }

    pub fn remove_attrs(&mut self, name: &str, attrs: VarAttrs) {
        let idx = self.target_scope_index(name);
        if let Some(var) = self.scopes[idx].vars.get_mut(name) {
            var.attrs &= !attrs;
        }
    }

    /// Put a previously saved variable back (temporary-assignment restore).
    pub fn restore_variable(&mut self, name: &str, var: Variable) {
        let idx = self.target_scope_index(name);
        self.scopes[idx].vars.insert(name.to_string(), var);
    }

    pub fn unset(&mut self, name: &str) -> Result<(), VarError> {
        if self.is_readonly(name) {
            return Err(VarError::Readonly(name.to_string()));
        }
        for scope in self.scopes.iter_mut().rev() {
            if scope.vars.remove(name).is_some() {
                return Ok(());
            }
        }
        Ok(())
    }

    // =========================================================================
    // ARRAYS
    // =========================================================================

    /// Assign one element of an indexed array, creating the array if needed.
    pub fn set_indexed_element(
        &mut self,
        name: &str,
        index: i64,
        value: String,
    ) -> Result<(), VarError> {
        let idx = self.target_scope_index(name);
        let scope = &mut self.scopes[idx];
        let var = scope
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Variable {
                value: Value::Indexed(BTreeMap::new()),
                attrs: VarAttrs::INDEXED,
            });
        if var.is_readonly() {
            return Err(VarError::Readonly(name.to_string()));
        }
        match &mut var.value {
            Value::Indexed(map) => {
                map.insert(index, value);
            }
            Value::Str(s) => {
                // Converting a scalar promotes the old value to element 0
                let mut map = BTreeMap::new();
                if !s.is_empty() {
                    map.insert(0, s.clone());
                }
                map.insert(index, value);
                var.value = Value::Indexed(map);
                var.attrs |= VarAttrs::INDEXED;
            }
            Value::Assoc(map) => {
                map.insert(index.to_string(), value);
            }
        }
        Ok(())
    }

    /// Assign one element of an associative array.
    pub fn set_assoc_element(
        &mut self,
        name: &str,
        key: String,
        value: String,
    ) -> Result<(), VarError> {
        let idx = self.target_scope_index(name);
        let scope = &mut self.scopes[idx];
        let var = scope
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Variable {
                value: Value::Assoc(IndexMap::new()),
                attrs: VarAttrs::ASSOC,
            });
        if var.is_readonly() {
            return Err(VarError::Readonly(name.to_string()));
        }
        match &mut var.value {
            Value::Assoc(map) => {
                map.insert(key, value);
            }
            _ => {
                let mut map = IndexMap::new();
                map.insert(key, value);
                var.value = Value::Assoc(map);
                var.attrs |= VarAttrs::ASSOC;
            }
        }
        Ok(())
    }

    /// Replace a whole indexed array (`NAME=(a b c)`), or append with
    /// `NAME+=(d)`.
    pub fn set_indexed(
        &mut self,
        name: &str,
        elements: Vec<String>,
        append: bool,
    ) -> Result<(), VarError> {
        if self.is_readonly(name) {
            return Err(VarError::Readonly(name.to_string()));
        }
        let idx = self.target_scope_index(name);
        let scope = &mut self.scopes[idx];

        let start = if append {
            match scope.vars.get(name).map(|v| &v.value) {
                Some(Value::Indexed(map)) => map.keys().max().map(|k| k + 1).unwrap_or(0),
                _ => 0,
            }
        } else {
            0
        };

        let var = scope
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Variable {
                value: Value::Indexed(BTreeMap::new()),
                attrs: VarAttrs::INDEXED,
            });
        if !append || !matches!(var.value, Value::Indexed(_)) {
            var.value = Value::Indexed(BTreeMap::new());
            var.attrs |= VarAttrs::INDEXED;
        }
        if let Value::Indexed(map) = &mut var.value {
            for (offset, element) in elements.into_iter().enumerate() {
                map.insert(start + offset as i64, element);
            }
        }
        Ok(())
    }

    // =========================================================================
    // SCOPES
    // =========================================================================

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    // =========================================================================
    // POSITIONAL PARAMETERS
    // =========================================================================

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn set_positional(&mut self, params: Vec<String>) {
        self.positional = params;
    }

    /// Save the current positionals and install new ones (function call).
    pub fn push_positional(&mut self, params: Vec<String>) {
        self.positional_stack
            .push(std::mem::replace(&mut self.positional, params));
    }

    pub fn pop_positional(&mut self) {
        if let Some(saved) = self.positional_stack.pop() {
            self.positional = saved;
        }
    }

    /// `shift [n]`; false when n exceeds `$#`.
    pub fn shift_positional(&mut self, n: usize) -> bool {
        if n > self.positional.len() {
            return false;
        }
        self.positional.drain(..n);
        true
    }

    // =========================================================================
    // ENVIRONMENT EXPORT
    // =========================================================================

    /// Exported name=value pairs for `execve`, innermost scope winning.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut seen: HashMap<&str, &Variable> = HashMap::new();
        for scope in &self.scopes {
            for (name, var) in &scope.vars {
                seen.insert(name.as_str(), var);
            }
        }
        let mut env: Vec<(String, String)> = seen
            .into_iter()
            .filter(|(_, var)| var.is_exported())
            .map(|(name, var)| (name.to_string(), var.value.as_scalar().to_string()))
            .collect();
        env.sort();
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_assignment() {
        let mut store = VarStore::new();
        store.set_scalar("X", "1").unwrap();
        assert_eq!(store.get("X").as_deref(), Some("1"));
    }

    #[test]
    fn test_local_scope_isolation() {
        let mut store = VarStore::new();
        store.set_scalar("X", "outer").unwrap();
        store.push_scope();
        store.set_local("X", "inner").unwrap();
        assert_eq!(store.get("X").as_deref(), Some("inner"));
        store.pop_scope();
        assert_eq!(store.get("X").as_deref(), Some("outer"));
    }

    #[test]
    fn test_dynamic_scoping_assignment() {
        let mut store = VarStore::new();
        store.push_scope();
        store.set_local("X", "local").unwrap();
        store.push_scope();
        // Assignment without `local` targets the innermost scope holding X
        store.set_scalar("X", "updated").unwrap();
        store.pop_scope();
        assert_eq!(store.get("X").as_deref(), Some("updated"));
        store.pop_scope();
        assert_eq!(store.get("X"), None);
    }

    #[test]
    fn test_readonly_rejected() {
        let mut store = VarStore::new();
        store.set_scalar("X", "1").unwrap();
        store.add_attrs("X", VarAttrs::READONLY).unwrap();
        assert!(matches!(
            store.set_scalar("X", "2"),
            Err(VarError::Readonly(_))
        ));
        assert!(store.unset("X").is_err());
    }

    #[test]
    fn test_unset_reveals_outer() {
        let mut store = VarStore::new();
        store.set_scalar("X", "outer").unwrap();
        store.push_scope();
        store.set_local("X", "inner").unwrap();
        store.unset("X").unwrap();
        assert_eq!(store.get("X").as_deref(), Some("outer"));
        store.pop_scope();
    }

    #[test]
    fn test_indexed_array() {
        let mut store = VarStore::new();
        store
            .set_indexed("arr", vec!["a".into(), "b".into()], false)
            .unwrap();
        store.set_indexed_element("arr", 5, "f".into()).unwrap();
        let var = store.get_var("arr").unwrap();
        assert_eq!(var.value.elements(), vec!["a", "b", "f"]);
        assert_eq!(var.value.keys(), vec!["0", "1", "5"]);
        // $arr is element 0
        assert_eq!(store.get("arr").as_deref(), Some("a"));
    }

    #[test]
    fn test_array_append() {
        let mut store = VarStore::new();
        store
            .set_indexed("arr", vec!["a".into()], false)
            .unwrap();
        store
            .set_indexed("arr", vec!["b".into(), "c".into()], true)
            .unwrap();
        let var = store.get_var("arr").unwrap();
        assert_eq!(var.value.elements(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_assoc_array_insertion_order() {
        let mut store = VarStore::new();
        store
            .set_assoc_element("map", "zebra".into(), "1".into())
            .unwrap();
        store
            .set_assoc_element("map", "apple".into(), "2".into())
            .unwrap();
        let var = store.get_var("map").unwrap();
        assert_eq!(var.value.keys(), vec!["zebra", "apple"]);
    }

    #[test]
    fn test_positional_params() {
        let mut store = VarStore::new();
        store.set_positional(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(store.get("#").as_deref(), Some("3"));
        assert_eq!(store.get("1").as_deref(), Some("a"));
        assert!(store.shift_positional(2));
        assert_eq!(store.get("1").as_deref(), Some("c"));
        assert!(!store.shift_positional(5));
    }

    #[test]
    fn test_positional_frames() {
        let mut store = VarStore::new();
        store.set_positional(vec!["outer".into()]);
        store.push_positional(vec!["inner".into(), "args".into()]);
        assert_eq!(store.get("#").as_deref(), Some("2"));
        store.pop_positional();
        assert_eq!(store.get("1").as_deref(), Some("outer"));
    }

    #[test]
    fn test_special_parameters() {
        let mut store = VarStore::new();
        store.last_status = 42;
        assert_eq!(store.get("?").as_deref(), Some("42"));
        assert_eq!(store.get("$").unwrap(), std::process::id().to_string());
        assert_eq!(store.get("!"), None);
        store.last_bg_pid = Some(123);
        assert_eq!(store.get("!").as_deref(), Some("123"));
    }

    #[test]
    fn test_names_with_prefix_sorted() {
        let mut store = VarStore::new();
        store.set_scalar("FOO_B", "1").unwrap();
        store.set_scalar("FOO_A", "2").unwrap();
        store.set_scalar("BAR", "3").unwrap();
        assert_eq!(store.names_with_prefix("FOO_"), vec!["FOO_A", "FOO_B"]);
    }

    #[test]
    fn test_environment_only_exported() {
        let mut store = VarStore::new();
        store.set_scalar("SECRET", "x").unwrap();
        store.set_scalar("PUBLIC", "y").unwrap();
        store.add_attrs("PUBLIC", VarAttrs::EXPORTED).unwrap();
        let env = store.environment();
        assert!(env.iter().any(|(n, v)| n == "PUBLIC" && v == "y"));
        assert!(!env.iter().any(|(n, _)| n == "SECRET"));
    }

    #[test]
    fn test_scalar_to_array_promotion() {
        let mut store = VarStore::new();
        store.set_scalar("v", "first").unwrap();
        store.set_indexed_element("v", 1, "second".into()).unwrap();
        let var = store.get_var("v").unwrap();
        assert_eq!(var.value.elements(), vec!["first", "second"]);
    }
}
