//! Conversion of host values into bounded, transmittable JSON.

use crate::config::MonitorConfig;
use pagewatch_common::error::JsonError;
use pagewatch_common::protocol::iso_timestamp;
use pagewatch_common::value::HostValue;
use serde_json::{Map, Number, Value, json};
use std::collections::{HashMap, HashSet};

pub const MAX_DEPTH_MARKER: &str = "[Max Depth Reached]";
const TRUNCATION_SUFFIX: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializerLimits {
    pub max_depth: usize,
    pub max_entries: usize,
    pub max_string_length: usize,
    pub function_source_length: usize,
}

impl Default for SerializerLimits {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for SerializerLimits {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_entries: config.max_collection_entries,
            max_string_length: config.max_string_length,
            function_source_length: config.function_source_length,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Serializer {
    limits: SerializerLimits,
}

impl Serializer {
    pub fn new(limits: SerializerLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SerializerLimits {
        &self.limits
    }

    pub fn serialize(&self, value: &HostValue) -> Value {
        let mut path = HashMap::new();
        self.serialize_at(value, 0, &mut path)
    }

    /// `path` maps the identity of each composite currently being entered to its
    /// back-reference marker; entries are removed on the way out so only true
    /// cycles are reported.
    fn serialize_at(&self, value: &HostValue, depth: usize, path: &mut HashMap<usize, String>) -> Value {
        if depth > self.limits.max_depth {
            return Value::String(MAX_DEPTH_MARKER.to_string());
        }

        match value {
            HostValue::Undefined => json!({ "_type": "undefined" }),
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Number(n) => number(*n),
            HostValue::String(s) => Value::String(self.truncate(s)),
            HostValue::BigInt(digits) => json!({ "_type": "BigInt", "value": digits }),
            HostValue::Symbol(desc) => json!({ "_type": "Symbol", "value": desc }),
            HostValue::Function(f) => json!({
                "_type": "Function",
                "name": f.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("anonymous"),
                "stringValue": cap(&f.source, self.limits.function_source_length),
            }),
            HostValue::Error(err) => json!({
                "_type": "Error",
                "name": err.name,
                "message": err.message,
                "stack": err.stack,
            }),
            HostValue::Date(at) => json!({
                "_type": "Date",
                "iso": at.map(iso_timestamp),
            }),
            HostValue::RegExp { source, flags } => json!({
                "_type": "RegExp",
                "source": source,
                "flags": flags,
            }),
            HostValue::Array(arr) => {
                let id = arr.id();
                if let Some(marker) = path.get(&id) {
                    return circular(marker);
                }
                path.insert(id, format!("ref_{}", depth));
                let items = arr
                    .prefix(self.limits.max_entries)
                    .iter()
                    .map(|item| self.serialize_at(item, depth + 1, path))
                    .collect();
                path.remove(&id);
                Value::Array(items)
            }
            HostValue::Object(obj) => {
                let id = obj.id();
                if let Some(marker) = path.get(&id) {
                    return circular(marker);
                }
                path.insert(id, format!("ref_{}", depth));
                let mut out = Map::new();
                for (key, property) in obj.prefix(self.limits.max_entries) {
                    let serialized = match property.read() {
                        Ok(member) => self.serialize_at(&member, depth + 1, path),
                        Err(err) => {
                            tracing::debug!("Failed to serialize property {}: {}", key, err);
                            json!({ "_type": "Error", "message": "Failed to serialize" })
                        }
                    };
                    out.insert(key, serialized);
                }
                path.remove(&id);
                Value::Object(out)
            }
        }
    }

    /// Truncates to the configured maximum, marking the cut with `...`.
    pub fn truncate(&self, s: &str) -> String {
        match s.char_indices().nth(self.limits.max_string_length) {
            Some((cut, _)) => format!("{}{}", &s[..cut], TRUNCATION_SUFFIX),
            None => s.to_string(),
        }
    }

    /// Truncates to the configured maximum without a marker.
    pub fn cap(&self, s: &str) -> String {
        cap(s, self.limits.max_string_length)
    }
}

fn cap(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s.to_string(),
    }
}

fn circular(marker: &str) -> Value {
    json!({ "_type": "Circular", "ref": marker })
}

fn number(n: f64) -> Value {
    if n.is_nan() {
        return json!({ "_type": "NaN" });
    }
    if n.is_infinite() {
        let tag = if n > 0.0 { "Infinity" } else { "-Infinity" };
        return json!({ "_type": tag });
    }
    // Integral values inside the safe-integer range render without a fraction.
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Strict JSON text of a host value, following `JSON.stringify` rules.
///
/// Returns `Ok(None)` for values with no JSON form (`undefined`, functions,
/// symbols). Cycles and big integers are errors.
pub fn json_stringify(value: &HostValue) -> Result<Option<String>, JsonError> {
    let mut visiting = HashSet::new();
    let rendered = to_strict_json(value, &mut visiting)?;
    Ok(rendered.map(|v| v.to_string()))
}

fn to_strict_json(value: &HostValue, visiting: &mut HashSet<usize>) -> Result<Option<Value>, JsonError> {
    let rendered = match value {
        HostValue::Undefined | HostValue::Function(_) | HostValue::Symbol(_) => return Ok(None),
        HostValue::Null => Value::Null,
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Number(n) if !n.is_finite() => Value::Null,
        HostValue::Number(n) => number(*n),
        HostValue::String(s) => Value::String(s.clone()),
        HostValue::BigInt(_) => return Err(JsonError::BigInt),
        HostValue::Date(at) => at.map(|at| Value::String(iso_timestamp(at))).unwrap_or(Value::Null),
        HostValue::Error(_) | HostValue::RegExp { .. } => Value::Object(Map::new()),
        HostValue::Array(arr) => {
            if !visiting.insert(arr.id()) {
                return Err(JsonError::Circular);
            }
            let mut items = Vec::with_capacity(arr.len());
            for item in arr.items() {
                items.push(to_strict_json(&item, visiting)?.unwrap_or(Value::Null));
            }
            visiting.remove(&arr.id());
            Value::Array(items)
        }
        HostValue::Object(obj) => {
            if !visiting.insert(obj.id()) {
                return Err(JsonError::Circular);
            }
            let mut out = Map::new();
            for (key, property) in obj.prefix(usize::MAX) {
                if let Some(member) = to_strict_json(&property.read()?, visiting)? {
                    out.insert(key, member);
                }
            }
            visiting.remove(&obj.id());
            Value::Object(out)
        }
    };
    Ok(Some(rendered))
}
