//! # Scheme Model
//!
//! A static, declarative description of configuration keys: their type (or union
//! of types) and their constraints. Nodes are pure data; the only behavior is the
//! pair of callback strategies for allowed values and sub-schemes, which the
//! validator evaluates lazily with a `(value, full_key)` signature.

use crate::core::value::ConfValue;
use std::fmt;

/// The primitive and structural types a scheme node may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeName {
    Bool,
    Int,
    Str,
    Dict,
    List,
    Func,
    ListOfStrs,
    VarsInDict,
}

impl TypeName {
    /// The identifier used in scheme declarations (`list-of-strs`, `vars-in-dict`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Str => "str",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Func => "func",
            Self::ListOfStrs => "list-of-strs",
            Self::VarsInDict => "vars-in-dict",
        }
    }

    /// The name shown to users when a union type fails to match.
    pub fn human_name(self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::ListOfStrs => "list of strings",
            Self::Dict => "dict/another map type",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single type or an ordered union ("complex" type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeType {
    Single(TypeName),
    Complex(Vec<TypeName>),
}

impl From<TypeName> for SchemeType {
    fn from(t: TypeName) -> Self {
        Self::Single(t)
    }
}

/// Callback computing the allowed values of a key from the value being checked
/// and its full dotted key.
pub type AllowedFn = fn(&ConfValue, &str) -> Vec<String>;

/// Callback computing a dict sub-scheme from the dict being checked.
pub type SubSchemeFn = fn(&ConfValue, &str) -> Scheme;

/// The permitted values of a key.
#[derive(Debug, Clone)]
pub enum Allowed {
    Values(Vec<String>),
    Computed(AllowedFn),
}

impl Allowed {
    /// Materializes the allowed set, calling the callback if needed.
    pub fn resolve(&self, value: &ConfValue, full_key: &str) -> Vec<String> {
        match self {
            Self::Values(values) => values.clone(),
            Self::Computed(f) => f(value, full_key),
        }
    }
}

/// The scheme applied to the entries of a dict value.
#[derive(Debug, Clone)]
pub enum SubScheme {
    Static(Scheme),
    Computed(SubSchemeFn),
}

impl SubScheme {
    pub fn resolve(&self, value: &ConfValue, full_key: &str) -> Scheme {
        match self {
            Self::Static(scheme) => scheme.clone(),
            Self::Computed(f) => f(value, full_key),
        }
    }
}

/// How the keys of a `vars-in-dict` value are constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysKind {
    /// Only the keys of an explicit list may appear.
    ByList,
    /// Any string key may appear.
    AnyStr,
}

/// Describes one configuration key.
#[derive(Debug, Clone)]
pub struct SchemeNode {
    pub ty: SchemeType,
    pub allowed: Option<Allowed>,
    pub default: Option<ConfValue>,
    pub vars: Option<SubScheme>,
    pub vars_type: Option<SchemeType>,
    pub keys_kind: Option<KeysKind>,
    pub keys_list: Vec<String>,
    pub disallowed_keys: Vec<String>,
    pub allow_unknown_keys: bool,
    pub vars_allow_unknown_keys: Option<bool>,
}

impl SchemeNode {
    pub fn new(ty: impl Into<SchemeType>) -> Self {
        Self {
            ty: ty.into(),
            allowed: None,
            default: None,
            vars: None,
            vars_type: None,
            keys_kind: None,
            keys_list: Vec::new(),
            disallowed_keys: Vec::new(),
            allow_unknown_keys: false,
            vars_allow_unknown_keys: None,
        }
    }

    pub fn bool() -> Self {
        Self::new(TypeName::Bool)
    }

    pub fn int() -> Self {
        Self::new(TypeName::Int)
    }

    pub fn str() -> Self {
        Self::new(TypeName::Str)
    }

    pub fn func() -> Self {
        Self::new(TypeName::Func)
    }

    pub fn list_of_strs() -> Self {
        Self::new(TypeName::ListOfStrs)
    }

    /// A list whose elements must all satisfy `element`.
    pub fn list_of(element: impl Into<SchemeType>) -> Self {
        Self::new(TypeName::List).with_vars_type(element)
    }

    pub fn dict(vars: Scheme) -> Self {
        Self::new(TypeName::Dict).with_vars(vars)
    }

    /// A union of types, tried in the given order.
    pub fn union(types: impl IntoIterator<Item = TypeName>) -> Self {
        Self::new(SchemeType::Complex(types.into_iter().collect()))
    }

    /// `str` or `list-of-strs`, the most common parameter shape.
    pub fn str_or_list_of_strs() -> Self {
        Self::union([TypeName::Str, TypeName::ListOfStrs])
    }

    /// A map with arbitrary string keys whose values must satisfy `vars_type`.
    pub fn any_str_keys(vars_type: impl Into<SchemeType>) -> Self {
        Self::new(TypeName::VarsInDict)
            .with_keys_kind(KeysKind::AnyStr)
            .with_vars_type(vars_type)
    }

    /// A map restricted to `keys` whose values must satisfy `vars_type`.
    pub fn listed_keys<I, S>(keys: I, vars_type: impl Into<SchemeType>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut node = Self::new(TypeName::VarsInDict)
            .with_keys_kind(KeysKind::ByList)
            .with_vars_type(vars_type);
        node.keys_list = keys.into_iter().map(Into::into).collect();
        node
    }

    pub fn with_allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(Allowed::Values(values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_computed_allowed(mut self, f: AllowedFn) -> Self {
        self.allowed = Some(Allowed::Computed(f));
        self
    }

    pub fn with_default(mut self, value: ConfValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_vars(mut self, vars: Scheme) -> Self {
        self.vars = Some(SubScheme::Static(vars));
        self
    }

    pub fn with_computed_vars(mut self, f: SubSchemeFn) -> Self {
        self.vars = Some(SubScheme::Computed(f));
        self
    }

    pub fn with_vars_type(mut self, ty: impl Into<SchemeType>) -> Self {
        self.vars_type = Some(ty.into());
        self
    }

    pub fn with_keys_kind(mut self, kind: KeysKind) -> Self {
        self.keys_kind = Some(kind);
        self
    }

    pub fn with_disallowed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowing_unknown_keys(mut self) -> Self {
        self.allow_unknown_keys = true;
        self
    }

    pub fn with_vars_allow_unknown_keys(mut self, allow: bool) -> Self {
        self.vars_allow_unknown_keys = Some(allow);
        self
    }

    /// Returns a copy of this node that requires `ty` instead of its own type.
    /// Used for list elements and `vars-in-dict` values.
    pub fn derive_for(&self, ty: SchemeType) -> Self {
        let mut node = self.clone();
        node.ty = ty;
        node
    }
}

/// A key of a scheme: a named configuration key or the wildcard marker that
/// stands for any number of additional string keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeKey {
    Named(String),
    AnyStrs,
}

/// An ordered set of scheme entries. At most one wildcard entry is kept.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    entries: Vec<(SchemeKey, SchemeNode)>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a named entry. Builder style.
    pub fn with(mut self, name: &str, node: SchemeNode) -> Self {
        self.insert(SchemeKey::Named(name.to_string()), node);
        self
    }

    /// Adds (or replaces) the wildcard entry. Builder style.
    pub fn with_any_strs(mut self, node: SchemeNode) -> Self {
        self.insert(SchemeKey::AnyStrs, node);
        self
    }

    pub fn insert(&mut self, key: SchemeKey, node: SchemeNode) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn node(&self, name: &str) -> Option<&SchemeNode> {
        self.entries.iter().find_map(|(k, n)| match k {
            SchemeKey::Named(k) if k == name => Some(n),
            _ => None,
        })
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut SchemeNode> {
        self.entries.iter_mut().find_map(|(k, n)| match k {
            SchemeKey::Named(k) if k == name => Some(n),
            _ => None,
        })
    }

    /// Named entries in declaration order.
    pub fn named(&self) -> impl Iterator<Item = (&str, &SchemeNode)> {
        self.entries.iter().filter_map(|(k, n)| match k {
            SchemeKey::Named(name) => Some((name.as_str(), n)),
            SchemeKey::AnyStrs => None,
        })
    }

    pub fn wildcard(&self) -> Option<&SchemeNode> {
        self.entries.iter().find_map(|(k, n)| match k {
            SchemeKey::AnyStrs => Some(n),
            SchemeKey::Named(_) => None,
        })
    }

    /// Sorted names of the named entries, as listed in unknown-key errors.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named().map(|(k, _)| k.to_string()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_partitions_named_and_wildcard() {
        let scheme = Scheme::new()
            .with("b", SchemeNode::str())
            .with_any_strs(SchemeNode::int())
            .with("a", SchemeNode::bool());

        let named: Vec<&str> = scheme.named().map(|(k, _)| k).collect();
        assert_eq!(named, vec!["b", "a"]);
        assert_eq!(scheme.sorted_names(), vec!["a", "b"]);
        assert!(scheme.wildcard().is_some());
        assert_eq!(scheme.len(), 3);
    }

    #[test]
    fn test_derive_for_replaces_only_type() {
        let node = SchemeNode::list_of(TypeName::Str).with_allowed(["x"]);
        let elem = node.derive_for(SchemeType::Single(TypeName::Str));
        assert_eq!(elem.ty, SchemeType::Single(TypeName::Str));
        assert!(matches!(elem.allowed, Some(Allowed::Values(ref v)) if v == &["x".to_string()]));
    }

    #[test]
    fn test_computed_allowed_receives_value_and_key() {
        fn echo(value: &ConfValue, key: &str) -> Vec<String> {
            vec![format!("{}@{}", value.as_str().unwrap_or_default(), key)]
        }
        let allowed = Allowed::Computed(echo);
        assert_eq!(allowed.resolve(&ConfValue::str("v"), "k.x"), vec!["v@k.x"]);
    }
}
