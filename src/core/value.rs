//! # Configuration Tree
//!
//! The in-memory shape of a user-authored build configuration: a tagged tree of
//! scalars, sequences, mappings and callables. The validator only reads it.
//!
//! Maps keep insertion order so that validation reports the first offending key
//! the way the user wrote it.

use std::fmt;
use std::sync::Arc;

/// A key of a configuration map. Parsed files only produce string keys, but
/// programmatic trees may carry integer keys, which the validator must reject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfKey {
    Str(String),
    Int(i64),
}

impl ConfKey {
    /// Returns the key as a string slice if it is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl From<&str> for ConfKey {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ConfKey {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for ConfKey {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl fmt::Display for ConfKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Signature of a callable stored in a configuration tree.
pub type ConfCallable = dyn Fn(&[ConfValue]) -> Option<ConfValue> + Send + Sync;

/// A named callable value (e.g. a `run.cmd` hook supplied by an embedding program).
#[derive(Clone)]
pub struct ConfFunc {
    pub name: String,
    call: Arc<ConfCallable>,
}

impl ConfFunc {
    pub fn new(
        name: impl Into<String>,
        call: impl Fn(&[ConfValue]) -> Option<ConfValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            call: Arc::new(call),
        }
    }
}

impl fmt::Debug for ConfFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfFunc").field("name", &self.name).finish()
    }
}

impl PartialEq for ConfFunc {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

/// An ordered mapping of configuration keys to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfMap {
    entries: Vec<(ConfKey, ConfValue)>,
}

impl ConfMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value, keeping the position of an existing key.
    pub fn insert(&mut self, key: impl Into<ConfKey>, value: ConfValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfValue> {
        let pos = self.entries.iter().position(|(k, _)| k.as_str() == Some(key))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConfKey, &ConfValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ConfKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// String keys only, in insertion order.
    pub fn str_keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<ConfKey>> FromIterator<(K, ConfValue)> for ConfMap {
    fn from_iter<I: IntoIterator<Item = (K, ConfValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ConfValue>),
    Map(ConfMap),
    Func(ConfFunc),
}

impl ConfValue {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Builds a list of string values.
    pub fn strs<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::Str(s.into())).collect())
    }

    /// Builds a map from `(key, value)` pairs.
    pub fn map<K: Into<ConfKey>>(items: impl IntoIterator<Item = (K, ConfValue)>) -> Self {
        Self::Map(items.into_iter().collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ConfMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Func(_))
    }

    /// Looks a child up by key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&ConfValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Converts a string into a list by splitting it on whitespace. Any other
    /// value is returned unchanged.
    pub fn to_list(&self) -> ConfValue {
        match self {
            Self::Str(s) => Self::strs(s.split_whitespace()),
            other => other.clone(),
        }
    }

    /// Flattens a string or a list of strings into owned strings, splitting
    /// strings on whitespace. Non-string elements are skipped.
    pub fn to_str_list(&self) -> Vec<String> {
        match self {
            Self::Str(s) => s.split_whitespace().map(str::to_string).collect(),
            Self::List(items) => items
                .iter()
                .filter_map(Self::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for ConfValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<bool> for ConfValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ConfValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl fmt::Display for ConfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Self::Func(func) => write!(f, "<function {}>", func.name),
        }
    }
}

/// Converts a parsed TOML document into a configuration tree.
impl From<toml::Value> for ConfValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Self::Str(s),
            toml::Value::Integer(i) => Self::Int(i),
            toml::Value::Float(x) => Self::Float(x),
            toml::Value::Boolean(b) => Self::Bool(b),
            toml::Value::Datetime(dt) => Self::Str(dt.to_string()),
            toml::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            toml::Value::Table(table) => {
                Self::Map(table.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// Converts a parsed JSON document into a configuration tree. A `null` member
/// or element is dropped, so a null parameter reads as absent. A bare `null`
/// document becomes an empty list.
impl From<serde_json::Value> for ConfValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::List(Vec::new()),
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .filter(|v| !v.is_null())
                    .map(Self::from)
                    .collect(),
            ),
            serde_json::Value::Object(obj) => Self::Map(
                obj.into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_insert_keeps_order_and_replaces() {
        let mut map = ConfMap::new();
        map.insert("b", ConfValue::from(1));
        map.insert("a", ConfValue::from(2));
        map.insert("b", ConfValue::from(3));

        let keys: Vec<&str> = map.str_keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(map.get("b"), Some(&ConfValue::Int(3)));
    }

    #[test]
    fn test_to_list_splits_strings_only() {
        assert_eq!(
            ConfValue::str("cxxprogram test").to_list(),
            ConfValue::strs(["cxxprogram", "test"])
        );
        let map = ConfValue::map(Vec::<(&str, ConfValue)>::new());
        assert_eq!(map.to_list(), map);
    }

    #[test]
    fn test_display_is_compact() {
        let value = ConfValue::map([
            ("name", ConfValue::str("x")),
            ("flags", ConfValue::strs(["-O2", "-g"])),
        ]);
        assert_eq!(value.to_string(), r#"{"name": "x", "flags": ["-O2", "-g"]}"#);
    }

    #[test]
    fn test_from_toml_table() {
        let parsed: toml::Table = toml::from_str("[tasks.app]\nfeatures = 'cxxprogram'\n").unwrap();
        let tree = ConfValue::from(toml::Value::Table(parsed));
        assert_eq!(
            tree.get("tasks").and_then(|t| t.get("app")).and_then(|a| a.get("features")),
            Some(&ConfValue::str("cxxprogram"))
        );
    }
}
