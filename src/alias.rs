//! Alias table
//!
//! Aliases are textual command-name substitutions applied at execution time
//! by the dispatch chain. A trailing space in the value lets the next word
//! be alias-checked too; a set of currently-expanding names breaks cycles.

use indexmap::IndexMap;

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    map: IndexMap<String, String>,
}

impl AliasTable {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.map.shift_remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut aliases = AliasTable::default();
        aliases.set("ll", "ls -l");
        assert_eq!(aliases.get("ll"), Some("ls -l"));
        assert!(aliases.remove("ll"));
        assert!(!aliases.remove("ll"));
        assert_eq!(aliases.get("ll"), None);
    }

    #[test]
    fn test_insertion_order_listing() {
        let mut aliases = AliasTable::default();
        aliases.set("z", "1");
        aliases.set("a", "2");
        let names: Vec<&String> = aliases.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
