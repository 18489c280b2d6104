//! # Configuration Validator
//!
//! Recursively checks a configuration tree against a [`Scheme`]. Validation is a
//! pure function of `(tree, scheme)`: it stops at the first failure and never
//! accumulates partial results.

use crate::core::confscheme::{buildtype_names, conf_scheme};
use crate::core::loader::BuildConf;
use crate::core::scheme::{Allowed, KeysKind, Scheme, SchemeNode, SchemeType, SubScheme, TypeName};
use crate::core::value::{ConfKey, ConfMap, ConfValue};
use log::{debug, trace};
use std::path::Path;
use thiserror::Error;

/// The category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The value has the wrong shape or type.
    Type,
    /// The value has the right shape but is not permitted.
    Value,
    /// A structural problem: an unknown or disallowed key.
    Config,
}

/// A validation failure.
///
/// `nested` marks a type error raised inside a structural handler (dict, list,
/// vars-in-dict). Union resolution never swallows a nested error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub nested: bool,
    pub message: String,
}

impl ValidationError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            nested: false,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Marks a type error as coming from a nested structure. Other kinds pass
    /// through unchanged.
    fn into_nested(mut self) -> Self {
        if self.kind == ErrorKind::Type {
            self.nested = true;
        }
        self
    }

    /// Prefixes the message with the configuration file it came from and
    /// indents every original line.
    fn in_file(mut self, path: &Path) -> Self {
        let mut message = format!("Error in the file '{}':", path.display());
        for line in self.message.lines() {
            message.push_str("\n  ");
            message.push_str(line);
        }
        self.message = message;
        self
    }

    pub fn is_type_error(&self) -> bool {
        self.kind == ErrorKind::Type
    }

    pub fn is_value_error(&self) -> bool {
        self.kind == ErrorKind::Value
    }
}

type ValidationResult = Result<(), ValidationError>;

fn quoted(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_repr(key: &ConfKey) -> String {
    match key {
        ConfKey::Str(s) => format!("'{}'", s),
        ConfKey::Int(i) => i.to_string(),
    }
}

fn is_allowed(value: &ConfValue, allowed: &[String]) -> bool {
    value
        .as_str()
        .is_some_and(|s| allowed.iter().any(|a| a == s))
}

fn gen_full_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn dispatch(ty: &SchemeType, value: &ConfValue, node: &SchemeNode, full_key: &str) -> ValidationResult {
    match ty {
        SchemeType::Single(t) => handle(*t, value, node, full_key),
        SchemeType::Complex(types) => handle_complex(types, value, node, full_key),
    }
}

fn handle(ty: TypeName, value: &ConfValue, node: &SchemeNode, full_key: &str) -> ValidationResult {
    match ty {
        TypeName::Bool => handle_bool(value, full_key),
        TypeName::Int => handle_int(value, full_key),
        TypeName::Str => handle_str(value, node, full_key),
        TypeName::Dict => handle_dict(value, node, full_key),
        TypeName::List => handle_list(value, node, full_key),
        TypeName::Func => handle_func(value, full_key),
        TypeName::ListOfStrs => handle_list_of_strs(value, node, full_key),
        TypeName::VarsInDict => handle_vars_in_dict(value, node, full_key),
    }
}

fn handle_complex(
    types: &[TypeName],
    value: &ConfValue,
    node: &SchemeNode,
    full_key: &str,
) -> ValidationResult {
    let mut sorted = types.to_vec();
    sorted.sort();
    // A bare string shares the allowed-value check of the list form.
    let coerce = node.allowed.is_some() && sorted == [TypeName::Str, TypeName::ListOfStrs];
    let order: Vec<TypeName> = if coerce {
        vec![TypeName::ListOfStrs, TypeName::Str]
    } else {
        types.to_vec()
    };

    for ty in order {
        let coerced;
        let candidate = if coerce && ty == TypeName::ListOfStrs {
            coerced = value.to_list();
            &coerced
        } else {
            value
        };

        match handle(ty, candidate, node, full_key) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind == ErrorKind::Type && !e.nested => {
                trace!("'{}' is not a {}: {}", full_key, ty, e.message);
            }
            Err(e) => return Err(e),
        }
    }

    let names: Vec<&str> = types.iter().map(|t| t.human_name()).collect();
    Err(ValidationError::type_error(format!(
        "Value `{}` is invalid for the param '{}'. It should be {}.",
        value,
        full_key,
        names.join(" or ")
    )))
}

fn handle_bool(value: &ConfValue, full_key: &str) -> ValidationResult {
    match value {
        ConfValue::Bool(_) => Ok(()),
        _ => Err(ValidationError::type_error(format!("Param '{}' should be bool", full_key))),
    }
}

fn handle_int(value: &ConfValue, full_key: &str) -> ValidationResult {
    match value {
        ConfValue::Int(_) => Ok(()),
        _ => Err(ValidationError::type_error(format!("Param '{}' should be integer", full_key))),
    }
}

fn handle_func(value: &ConfValue, full_key: &str) -> ValidationResult {
    if value.is_callable() {
        Ok(())
    } else {
        Err(ValidationError::type_error(format!("Param '{}' should be function", full_key)))
    }
}

fn handle_str(value: &ConfValue, node: &SchemeNode, full_key: &str) -> ValidationResult {
    if value.as_str().is_none() {
        return Err(ValidationError::type_error(format!("Param '{}' should be string", full_key)));
    }

    if let Some(allowed) = &node.allowed {
        let allowed = allowed.resolve(value, full_key);
        if !is_allowed(value, &allowed) {
            return Err(ValidationError::value_error(format!(
                "Value `{}` is invalid for the param '{}'. Allowed values: [{}]",
                value,
                full_key,
                quoted(&allowed)
            )));
        }
    }
    Ok(())
}

fn handle_list(value: &ConfValue, node: &SchemeNode, full_key: &str) -> ValidationResult {
    let Some(items) = value.as_list() else {
        return Err(ValidationError::type_error(format!(
            "Value `{}` is invalid for the param '{}'. It should be list",
            value, full_key
        )));
    };

    let allowed = node.allowed.as_ref().map(|a| a.resolve(value, full_key));
    let element = node.vars_type.clone().map(|ty| node.derive_for(ty));

    for (i, item) in items.iter().enumerate() {
        if let Some(allowed) = &allowed {
            if !is_allowed(item, allowed) {
                return Err(ValidationError::value_error(format!(
                    "Value {} is invalid for the param '{}'. Allowed values: {}",
                    item,
                    full_key,
                    quoted(allowed)
                )));
            }
        }
        if let Some(element) = &element {
            let elem_key = format!("{}.[{}]", full_key, i);
            dispatch(&element.ty, item, element, &elem_key).map_err(ValidationError::into_nested)?;
        }
    }
    Ok(())
}

fn handle_list_of_strs(value: &ConfValue, node: &SchemeNode, full_key: &str) -> ValidationResult {
    let invalid_type = |v: &ConfValue| {
        ValidationError::type_error(format!(
            "Value `{}` is invalid for the param '{}'. It should be list of strings",
            v, full_key
        ))
    };

    let items = value.as_list().ok_or_else(|| invalid_type(value))?;
    let allowed = node.allowed.as_ref().map(|a| a.resolve(value, full_key));

    for item in items {
        if item.as_str().is_none() {
            return Err(invalid_type(item));
        }
        if let Some(allowed) = &allowed {
            if !is_allowed(item, allowed) {
                return Err(ValidationError::value_error(format!(
                    "Value {} is invalid for the param '{}'.\nAllowed values: {}",
                    item,
                    full_key,
                    quoted(allowed)
                )));
            }
        }
    }
    Ok(())
}

fn not_a_map(full_key: &str) -> ValidationError {
    ValidationError::type_error(format!(
        "Param '{}' should be dict or another map type.",
        full_key
    ))
}

fn handle_dict(value: &ConfValue, node: &SchemeNode, full_key: &str) -> ValidationResult {
    let map = value.as_map().ok_or_else(|| not_a_map(full_key))?;

    let scheme = node
        .vars
        .as_ref()
        .map(|vars| vars.resolve(value, full_key))
        .unwrap_or_default();
    let allow_unknown_keys = node.disallowed_keys.is_empty() && node.allow_unknown_keys;

    validate_scheme(map, &scheme, full_key, allow_unknown_keys, &node.disallowed_keys)
        .map_err(ValidationError::into_nested)
}

fn handle_vars_in_dict(value: &ConfValue, node: &SchemeNode, full_key: &str) -> ValidationResult {
    let map = value.as_map().ok_or_else(|| not_a_map(full_key))?;

    let vars_type = node.vars_type.clone().ok_or_else(|| {
        ValidationError::config_error(format!("The param '{}' has no declared value type.", full_key))
    })?;
    let mut element = node.derive_for(vars_type.clone());
    if vars_type == SchemeType::Single(TypeName::Dict) {
        if let Some(allow) = node.vars_allow_unknown_keys {
            element.allow_unknown_keys = allow;
        }
    }

    let result = match node.keys_kind.unwrap_or(KeysKind::AnyStr) {
        KeysKind::ByList => vars_by_list(map, &element, &node.keys_list, full_key),
        KeysKind::AnyStr => vars_any_str(map, &element, full_key),
    };
    result.map_err(ValidationError::into_nested)
}

fn vars_by_list(
    map: &ConfMap,
    element: &SchemeNode,
    keys_list: &[String],
    full_key: &str,
) -> ValidationResult {
    let unknown: Vec<String> = map
        .keys()
        .filter(|k| !k.as_str().is_some_and(|s| keys_list.iter().any(|l| l == s)))
        .map(key_repr)
        .collect();

    match unknown.as_slice() {
        [] => {}
        [one] => {
            return Err(ValidationError::value_error(format!(
                "Key {} isn't allowed in '{}'.",
                one, full_key
            )));
        }
        many => {
            return Err(ValidationError::value_error(format!(
                "Keys [{}] aren't allowed in '{}'.",
                many.join(", "),
                full_key
            )));
        }
    }

    for key in keys_list {
        if let Some(value) = map.get(key) {
            dispatch(&element.ty, value, element, &gen_full_key(full_key, key))?;
        }
    }
    Ok(())
}

fn vars_any_str(map: &ConfMap, element: &SchemeNode, full_key: &str) -> ValidationResult {
    for (key, value) in map.iter() {
        let Some(key) = key.as_str() else {
            return Err(ValidationError::type_error(format!(
                "Type of key `{}` is invalid. In '{}' this key should be string.",
                key_repr(key),
                full_key
            )));
        };
        dispatch(&element.ty, value, element, &gen_full_key(full_key, key))?;
    }
    Ok(())
}

/// Validates `conf` against `scheme`, reporting keys relative to `key_prefix`.
///
/// Named keys absent from the tree are skipped. Remaining keys go to the
/// wildcard entry when there is one; otherwise they are rejected unless
/// `allow_unknown_keys` is set. Any key in `disallowed_keys` is rejected outright.
pub fn validate_scheme(
    conf: &ConfMap,
    scheme: &Scheme,
    key_prefix: &str,
    allow_unknown_keys: bool,
    disallowed_keys: &[String],
) -> ValidationResult {
    let mut handled: Vec<&str> = Vec::new();
    for (key, node) in scheme.named() {
        let Some(value) = conf.get(key) else {
            continue;
        };
        dispatch(&node.ty, value, node, &gen_full_key(key_prefix, key))?;
        handled.push(key);
    }

    let wildcard = scheme.wildcard();
    if wildcard.is_none() && allow_unknown_keys {
        return Ok(());
    }

    for (key, value) in conf.iter() {
        let name = key.as_str();
        if let Some(name) = name {
            if disallowed_keys.iter().any(|d| d == name) {
                return Err(ValidationError::config_error(format!(
                    "The key '{}' is not allowed in the param '{}'.",
                    name, key_prefix
                )));
            }
            if handled.contains(&name) {
                continue;
            }
        }

        match (wildcard, name) {
            (Some(node), Some(name)) => {
                dispatch(&node.ty, value, node, &gen_full_key(key_prefix, name))?;
            }
            _ if !allow_unknown_keys => {
                return Err(ValidationError::config_error(format!(
                    "Unknown key {} is in the param '{}'. Unknown keys aren't allowed here.\nValid values: [{}]",
                    key_repr(key),
                    key_prefix,
                    quoted(&scheme.sorted_names())
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn inject_default_buildtypes(scheme: &mut Scheme, allowed: Vec<String>) {
    let vars = scheme
        .node_mut("buildtypes")
        .and_then(|node| node.vars.as_mut());
    if let Some(SubScheme::Static(vars)) = vars {
        if let Some(default) = vars.node_mut("default") {
            default.allowed = Some(Allowed::Values(allowed));
        }
    }
}

/// Validates a loaded build configuration against the build scheme.
///
/// The allowed values of `buildtypes.default` are computed from the buildtypes
/// the configuration itself declares. On failure the message names the file.
pub fn validate_conf(conf: &BuildConf) -> ValidationResult {
    debug!("Validating build configuration '{}'", conf.path.display());

    let mut scheme = conf_scheme();
    let mut names = buildtype_names(&conf.tree);
    if !names.is_empty() {
        names.remove("default");
        trace!("Allowed default buildtypes: {:?}", names);
        inject_default_buildtypes(&mut scheme, names.into_iter().collect());
    }

    validate_scheme(&conf.tree, &scheme, "", true, &[]).map_err(|e| e.in_file(&conf.path))
}
