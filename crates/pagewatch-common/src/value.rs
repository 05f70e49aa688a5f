//! Model of values living in the observed page's runtime.
//!
//! Composite values (`Array`, `Object`) are reference types: cloning a
//! [`HostValue`] clones the handle, not the contents, so graphs may share
//! members and contain cycles. Use [`HostArray::id`] / [`HostObject::id`] for
//! identity comparisons.
//!
//! `HostValue` intentionally does not implement `Serialize`; it has to pass
//! through the engine's serializer before it can be transmitted.

use crate::error::HostError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Debug)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Decimal digits of an arbitrary-precision integer.
    BigInt(String),
    String(String),
    /// Symbol description as rendered by the runtime, e.g. `Symbol(id)`.
    Symbol(String),
    Function(FunctionValue),
    Error(ErrorValue),
    /// `None` is an invalid date.
    Date(Option<DateTime<Utc>>),
    RegExp { source: String, flags: String },
    Array(HostArray),
    Object(HostObject),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionValue {
    pub name: Option<String>,
    pub source: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl HostValue {
    pub fn string(s: impl Into<String>) -> Self {
        HostValue::String(s.into())
    }

    pub fn error(
        name: impl Into<String>,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Self {
        HostValue::Error(ErrorValue {
            name: name.into(),
            message: message.into(),
            stack,
        })
    }

    pub fn function(name: Option<&str>, source: impl Into<String>) -> Self {
        HostValue::Function(FunctionValue {
            name: name.map(str::to_string),
            source: source.into(),
        })
    }

    pub fn regexp(source: impl Into<String>, flags: impl Into<String>) -> Self {
        HostValue::RegExp {
            source: source.into(),
            flags: flags.into(),
        }
    }

    pub fn array(items: impl IntoIterator<Item = HostValue>) -> Self {
        HostValue::Array(HostArray::from_items(items))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        HostValue::Object(HostObject::from_entries(entries))
    }

    /// Converts plain JSON data into a host value tree.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => HostValue::Null,
            serde_json::Value::Bool(b) => HostValue::Bool(*b),
            serde_json::Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => HostValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                HostValue::array(items.iter().map(HostValue::from_json))
            }
            serde_json::Value::Object(map) => {
                HostValue::object(map.iter().map(|(k, v)| (k.clone(), HostValue::from_json(v))))
            }
        }
    }

    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            HostValue::Error(_)
                | HostValue::Date(_)
                | HostValue::RegExp { .. }
                | HostValue::Array(_)
                | HostValue::Object(_)
        )
    }

    /// Reads a named property as a non-empty string, the way `value?.key` would be
    /// checked for truthiness. Errors expose `name`, `message` and `stack`.
    pub fn string_property(&self, key: &str) -> Option<String> {
        let found = match self {
            HostValue::Error(err) => match key {
                "name" => Some(err.name.clone()),
                "message" => Some(err.message.clone()),
                "stack" => err.stack.clone(),
                _ => None,
            },
            HostValue::Object(obj) => match obj.get(key) {
                Ok(Some(HostValue::String(s))) => Some(s),
                _ => None,
            },
            _ => None,
        };
        found.filter(|s| !s.is_empty())
    }

    /// String conversion as performed by `String(value)`.
    pub fn display_string(&self) -> String {
        let mut visiting = HashSet::new();
        self.display_inner(&mut visiting)
    }

    fn display_inner(&self, visiting: &mut HashSet<usize>) -> String {
        match self {
            HostValue::Undefined => "undefined".to_string(),
            HostValue::Null => "null".to_string(),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Number(n) => format_number(*n),
            HostValue::BigInt(digits) => digits.clone(),
            HostValue::String(s) => s.clone(),
            HostValue::Symbol(desc) => desc.clone(),
            HostValue::Function(f) => f.source.clone(),
            HostValue::Error(err) => {
                if err.message.is_empty() {
                    err.name.clone()
                } else {
                    format!("{}: {}", err.name, err.message)
                }
            }
            HostValue::Date(Some(at)) => at.to_rfc2822(),
            HostValue::Date(None) => "Invalid Date".to_string(),
            HostValue::RegExp { source, flags } => format!("/{}/{}", source, flags),
            HostValue::Array(arr) => {
                // Array.prototype.join renders a cyclic member as an empty string.
                if !visiting.insert(arr.id()) {
                    return String::new();
                }
                let joined = arr
                    .items()
                    .iter()
                    .map(|item| match item {
                        HostValue::Undefined | HostValue::Null => String::new(),
                        other => other.display_inner(visiting),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                visiting.remove(&arr.id());
                joined
            }
            HostValue::Object(_) => "[object Object]".to_string(),
        }
    }
}

/// Number formatting following the runtime's `Number.prototype.toString`
/// for the common cases.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Number(n as f64)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared handle to a host array.
#[derive(Clone, Default)]
pub struct HostArray(Arc<RwLock<Vec<HostValue>>>);

impl HostArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = HostValue>) -> Self {
        Self(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn push(&self, value: HostValue) {
        write(&self.0).push(value);
    }

    pub fn len(&self) -> usize {
        read(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn items(&self) -> Vec<HostValue> {
        read(&self.0).clone()
    }

    /// Clones at most `limit` leading items.
    pub fn prefix(&self, limit: usize) -> Vec<HostValue> {
        read(&self.0).iter().take(limit).cloned().collect()
    }
}

impl fmt::Debug for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostArray(#{:x}, len={})", self.id(), self.len())
    }
}

pub type Getter = Arc<dyn Fn() -> Result<HostValue, HostError> + Send + Sync>;

/// An own property: a plain data slot or a getter that may fail when read.
#[derive(Clone)]
pub enum Property {
    Data(HostValue),
    Accessor(Getter),
}

impl Property {
    pub fn read(&self) -> Result<HostValue, HostError> {
        match self {
            Property::Data(value) => Ok(value.clone()),
            Property::Accessor(getter) => getter(),
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Property::Accessor(_) => f.write_str("Accessor(..)"),
        }
    }
}

/// Shared handle to a host object with ordered own keys.
#[derive(Clone, Default)]
pub struct HostObject(Arc<RwLock<Vec<(String, Property)>>>);

impl HostObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        let obj = Self::new();
        for (key, value) in entries {
            obj.set(key, value);
        }
        obj
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Sets a data property, keeping the key's original position when it already exists.
    pub fn set(&self, key: impl Into<String>, value: HostValue) {
        self.define(key.into(), Property::Data(value));
    }

    pub fn define_getter(
        &self,
        key: impl Into<String>,
        getter: impl Fn() -> Result<HostValue, HostError> + Send + Sync + 'static,
    ) {
        self.define(key.into(), Property::Accessor(Arc::new(getter)));
    }

    fn define(&self, key: String, property: Property) {
        let mut entries = write(&self.0);
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = property,
            None => entries.push((key, property)),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<HostValue>, HostError> {
        let property = read(&self.0)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.clone());
        property.map(|p| p.read()).transpose()
    }

    pub fn keys(&self) -> Vec<String> {
        read(&self.0).iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        read(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones at most `limit` leading entries without evaluating getters.
    pub fn prefix(&self, limit: usize) -> Vec<(String, Property)> {
        read(&self.0).iter().take(limit).cloned().collect()
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject(#{:x}, keys={:?})", self.id(), self.keys())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_string_matches_runtime_conversions() {
        assert_eq!(HostValue::Number(3.0).display_string(), "3");
        assert_eq!(HostValue::Number(1.5).display_string(), "1.5");
        assert_eq!(HostValue::Number(f64::NEG_INFINITY).display_string(), "-Infinity");
        assert_eq!(HostValue::Undefined.display_string(), "undefined");
        assert_eq!(
            HostValue::error("TypeError", "boom", None).display_string(),
            "TypeError: boom"
        );
        assert_eq!(
            HostValue::object([("a", HostValue::Null)]).display_string(),
            "[object Object]"
        );
        assert_eq!(
            HostValue::array([1i64.into(), HostValue::Null, "x".into()]).display_string(),
            "1,,x"
        );
    }

    #[test]
    fn test_display_string_survives_cyclic_array() {
        let arr = HostArray::new();
        arr.push(HostValue::from("a"));
        arr.push(HostValue::Array(arr.clone()));
        assert_eq!(HostValue::Array(arr).display_string(), "a,");
    }

    #[test]
    fn test_set_keeps_key_position() {
        let obj = HostObject::from_entries([("a", HostValue::from(1i64)), ("b", 2i64.into())]);
        obj.set("a", HostValue::from(3i64));
        assert_eq!(obj.keys(), vec!["a", "b"]);
        assert!(matches!(obj.get("a"), Ok(Some(HostValue::Number(n))) if n == 3.0));
    }

    #[test]
    fn test_string_property_ignores_empty_and_non_strings() {
        let obj = HostObject::from_entries([
            ("stack", HostValue::from("")),
            ("message", HostValue::from(7i64)),
        ]);
        let value = HostValue::Object(obj);
        assert_eq!(value.string_property("stack"), None);
        assert_eq!(value.string_property("message"), None);

        let err = HostValue::error("Error", "bad", Some("Error: bad\n at x".into()));
        assert_eq!(err.string_property("stack").as_deref(), Some("Error: bad\n at x"));
    }

    #[test]
    fn test_getter_errors_surface_on_get() {
        let obj = HostObject::new();
        obj.define_getter("boom", || Err(HostError::Accessor("nope".into())));
        assert!(obj.get("boom").is_err());
        assert!(matches!(obj.get("missing"), Ok(None)));
    }
}
