//! Variable values and attributes.

use std::collections::BTreeMap;

use bitflags::bitflags;
use indexmap::IndexMap;

bitflags! {
    /// Attribute bitset for a shell variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VarAttrs: u16 {
        const EXPORTED  = 1 << 0;
        const READONLY  = 1 << 1;
        const INTEGER   = 1 << 2;
        const LOWERCASE = 1 << 3;
        const UPPERCASE = 1 << 4;
        const NAMEREF   = 1 << 5;
        const LOCAL     = 1 << 6;
        const ASSOC     = 1 << 7;
        const INDEXED   = 1 << 8;
    }
}

/// A variable's value: scalar string, sparse indexed array, or associative
/// array. Associative arrays iterate in insertion order; indexed arrays in
/// index order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Indexed(BTreeMap<i64, String>),
    Assoc(IndexMap<String, String>),
}

impl Value {
    /// Scalar view: the string itself, or element 0 / first element for
    /// arrays (matching `$arr` == `${arr[0]}`).
    pub fn as_scalar(&self) -> &str {
        match self {
            Value::Str(s) => s.as_str(),
            Value::Indexed(map) => map.get(&0).map(|s| s.as_str()).unwrap_or(""),
            Value::Assoc(map) => map.get("0").map(|s| s.as_str()).unwrap_or(""),
        }
    }

    /// Number of elements (1 for scalars).
    pub fn element_count(&self) -> usize {
        match self {
            Value::Str(_) => 1,
            Value::Indexed(map) => map.len(),
            Value::Assoc(map) => map.len(),
        }
    }

    /// All element values in iteration order.
    pub fn elements(&self) -> Vec<String> {
        match self {
            Value::Str(s) => vec![s.clone()],
            Value::Indexed(map) => map.values().cloned().collect(),
            Value::Assoc(map) => map.values().cloned().collect(),
        }
    }

    /// All keys in iteration order (index numbers or assoc keys; `0` for a
    /// scalar).
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Str(_) => vec!["0".to_string()],
            Value::Indexed(map) => map.keys().map(|k| k.to_string()).collect(),
            Value::Assoc(map) => map.keys().cloned().collect(),
        }
    }
}

/// A shell variable: a value plus its attribute bitset.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Value,
    pub attrs: VarAttrs,
}

impl Variable {
    pub fn scalar(value: impl Into<String>) -> Self {
        Self {
            value: Value::Str(value.into()),
            attrs: VarAttrs::empty(),
        }
    }

    pub fn with_attrs(mut self, attrs: VarAttrs) -> Self {
        self.attrs |= attrs;
        self
    }

    pub fn is_readonly(&self) -> bool {
        self.attrs.contains(VarAttrs::READONLY)
    }

    pub fn is_exported(&self) -> bool {
        self.attrs.contains(VarAttrs::EXPORTED)
    }

    /// Apply the case-transform attributes to a new scalar value.
    pub fn transform_case(&self, value: String) -> String {
        if self.attrs.contains(VarAttrs::UPPERCASE) {
            value.to_uppercase()
        } else if self.attrs.contains(VarAttrs::LOWERCASE) {
            value.to_lowercase()
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_view_of_indexed() {
        let mut map = BTreeMap::new();
        map.insert(0, "zero".to_string());
        map.insert(5, "five".to_string());
        let v = Value::Indexed(map);
        assert_eq!(v.as_scalar(), "zero");
        assert_eq!(v.element_count(), 2);
        assert_eq!(v.keys(), vec!["0", "5"]);
    }

    #[test]
    fn test_assoc_insertion_order() {
        let mut map = IndexMap::new();
        map.insert("b".to_string(), "1".to_string());
        map.insert("a".to_string(), "2".to_string());
        let v = Value::Assoc(map);
        assert_eq!(v.keys(), vec!["b", "a"]);
        assert_eq!(v.elements(), vec!["1", "2"]);
    }

    #[test]
    fn test_case_transform_attrs() {
        let var = Variable::scalar("x").with_attrs(VarAttrs::UPPERCASE);
        assert_eq!(var.transform_case("hello".into()), "HELLO");
    }

    #[test]
    fn test_attr_bits_disjoint() {
        assert!((VarAttrs::EXPORTED & VarAttrs::READONLY).is_empty());
        let attrs = VarAttrs::EXPORTED | VarAttrs::INTEGER;
        assert!(attrs.contains(VarAttrs::EXPORTED));
        assert!(!attrs.contains(VarAttrs::READONLY));
    }
}
