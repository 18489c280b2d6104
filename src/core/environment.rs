//! # Environment Chain
//!
//! Layered key/value environments for build variants. A child reads through
//! to its parent on a local miss but writes only to its own table, so sibling
//! variants derived from the same root never see each other's changes.

use crate::models::{EnvTable, ParamValue};
use std::collections::BTreeSet;

/// One layer of a variable chain. The parent is borrowed and must outlive
/// every child derived from it.
#[derive(Debug, Clone, Default)]
pub struct Environment<'p> {
    table: EnvTable,
    parent: Option<&'p Environment<'p>>,
}

impl<'p> Environment<'p> {
    /// A root environment with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// A root environment holding `table`.
    pub fn from_table(table: EnvTable) -> Self {
        Self { table, parent: None }
    }

    /// A child of `parent` whose local table is `table`.
    pub fn with_parent(parent: &'p Environment<'p>, table: EnvTable) -> Self {
        Self {
            table,
            parent: Some(parent),
        }
    }

    /// A new, empty child of this environment.
    pub fn derive(&'p self) -> Self {
        Self::with_parent(self, EnvTable::new())
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        match self.table.get(key) {
            Some(value) => Some(value),
            None => self.parent.and_then(|p| p.get(key)),
        }
    }

    /// Sets a key in the local table only.
    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) {
        self.table.insert(key.into(), value);
    }

    /// Removes a key from the local table. A parent's value becomes visible again.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.table.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The value of `key` as a list of strings, empty when unset.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(ParamValue::to_str_list).unwrap_or_default()
    }

    /// The local table, without inherited entries.
    pub fn table(&self) -> &EnvTable {
        &self.table
    }

    /// Every visible key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.table.keys().cloned().collect();
        if let Some(parent) = self.parent {
            keys.extend(parent.keys());
        }
        keys.into_iter().collect()
    }

    /// A detached root environment holding every visible entry.
    pub fn flatten(&self) -> Environment<'static> {
        let mut table = match self.parent {
            Some(parent) => parent.flatten().table,
            None => EnvTable::new(),
        };
        table.extend(self.table.iter().map(|(k, v)| (k.clone(), v.clone())));
        Environment::from_table(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ParamValue {
        ParamValue::Str(v.to_string())
    }

    #[test]
    fn test_child_reads_through_and_shadows() {
        // --- Setup ---
        let mut root = Environment::new();
        root.set("CC", s("gcc"));
        root.set("CFLAGS", s("-O2"));

        // --- Execute ---
        let mut child = root.derive();
        child.set("CFLAGS", s("-O0 -g"));

        // --- Assert ---
        assert_eq!(child.get("CC"), Some(&s("gcc")));
        assert_eq!(child.get_list("CFLAGS"), vec!["-O0", "-g"]);
        assert_eq!(root.get("CFLAGS"), Some(&s("-O2")));
        assert_eq!(child.table().len(), 1);
    }

    #[test]
    fn test_siblings_are_isolated() {
        let root = Environment::from_table([("A".to_string(), s("1"))].into_iter().collect());

        let mut left = root.derive();
        let right = root.derive();
        left.set("B", s("2"));

        assert!(left.contains("B"));
        assert!(!right.contains("B"));
        assert!(!root.contains("B"));
    }

    #[test]
    fn test_remove_uncovers_parent_value() {
        let mut root = Environment::new();
        root.set("X", s("root"));
        let mut child = root.derive();
        child.set("X", s("child"));

        assert_eq!(child.remove("X"), Some(s("child")));
        assert_eq!(child.get("X"), Some(&s("root")));
    }

    #[test]
    fn test_keys_and_flatten() {
        let mut root = Environment::new();
        root.set("B", s("1"));
        root.set("A", s("1"));
        let mut child = root.derive();
        child.set("C", s("2"));
        child.set("A", s("3"));

        assert_eq!(child.keys(), vec!["A", "B", "C"]);

        let flat = child.flatten();
        assert_eq!(flat.get("A"), Some(&s("3")));
        assert_eq!(flat.table().len(), 3);
        assert_eq!(child.get_list("MISSING"), Vec::<String>::new());
    }
}
