//! Conversion of CDP remote objects into host values.
//!
//! Primitives arrive by value. Objects arrive as a handle plus a description
//! and, for console arguments and thrown values, a shallow preview. Errors,
//! dates, regular expressions and functions are rebuilt from the description.
//! Plain objects and arrays are rebuilt from the preview; nested objects past
//! the preview's depth keep only their description.

use chromiumoxide::cdp::js_protocol::runtime::{ObjectPreview, PropertyPreview, RemoteObject};
use chrono::{DateTime, Utc};
use pagewatch_engine::value::{ErrorValue, HostValue};
use serde_json::Value;

fn text<T: AsRef<str>>(value: &T) -> &str {
    value.as_ref()
}

pub fn from_remote(obj: &RemoteObject) -> HostValue {
    let subtype = obj.subtype.as_ref().map(text);
    if obj.value.is_none()
        && text(&obj.r#type) == "object"
        && is_container(subtype)
        && let Some(preview) = &obj.preview
    {
        return from_preview(preview);
    }
    from_parts(
        text(&obj.r#type),
        subtype,
        obj.value.as_ref(),
        obj.unserializable_value.as_ref().map(text),
        obj.description.as_deref(),
    )
}

/// Builds a host value from the fields of a `Runtime.RemoteObject`.
pub fn from_parts(
    kind: &str,
    subtype: Option<&str>,
    value: Option<&Value>,
    unserializable: Option<&str>,
    description: Option<&str>,
) -> HostValue {
    let description = description.unwrap_or_default();
    match kind {
        "undefined" => HostValue::Undefined,
        "boolean" => HostValue::Bool(value.and_then(Value::as_bool).unwrap_or_default()),
        "string" => HostValue::string(value.and_then(Value::as_str).unwrap_or(description)),
        "number" => match unserializable {
            Some(special) => HostValue::Number(special_number(special)),
            None => HostValue::Number(value.and_then(Value::as_f64).unwrap_or(f64::NAN)),
        },
        "bigint" => HostValue::BigInt(
            unserializable
                .unwrap_or(description)
                .trim_end_matches('n')
                .to_string(),
        ),
        "symbol" => HostValue::Symbol(description.to_string()),
        "function" => HostValue::function(function_name(description), description),
        _ => match subtype {
            Some("null") => HostValue::Null,
            Some("error") => parse_error(description),
            Some("date") => HostValue::Date(parse_date(description)),
            Some("regexp") => parse_regexp(description),
            _ => match value {
                Some(value) => HostValue::from_json(value),
                None => HostValue::string(description),
            },
        },
    }
}

fn is_container(subtype: Option<&str>) -> bool {
    matches!(subtype, None | Some("array") | Some("typedarray"))
}

/// Rebuilds an object or array from its preview. Previews list at most a
/// handful of properties, so an overflowing preview yields a partial value.
pub fn from_preview(preview: &ObjectPreview) -> HostValue {
    let description = preview.description.as_deref().unwrap_or_default();
    match preview.subtype.as_ref().map(text) {
        Some("array") | Some("typedarray") => HostValue::array(
            preview
                .properties
                .iter()
                .filter(|p| p.name.parse::<usize>().is_ok())
                .map(from_property),
        ),
        Some("null") => HostValue::Null,
        Some("error") => parse_error(description),
        Some("date") => HostValue::Date(parse_date(description)),
        Some("regexp") => parse_regexp(description),
        _ => HostValue::object(
            preview
                .properties
                .iter()
                .map(|p| (p.name.clone(), from_property(p))),
        ),
    }
}

fn from_property(prop: &PropertyPreview) -> HostValue {
    let value = prop.value.as_deref().unwrap_or_default();
    match text(&prop.r#type) {
        "undefined" | "accessor" => HostValue::Undefined,
        "boolean" => HostValue::Bool(value == "true"),
        "string" => HostValue::string(value),
        "number" => HostValue::Number(value.parse().unwrap_or_else(|_| special_number(value))),
        "bigint" => HostValue::BigInt(value.trim_end_matches('n').to_string()),
        "symbol" => HostValue::Symbol(value.to_string()),
        "function" => HostValue::function(function_name(value), value),
        _ => match (&prop.value_preview, prop.subtype.as_ref().map(text)) {
            (Some(nested), _) => from_preview(nested),
            (None, Some("null")) => HostValue::Null,
            (None, Some("error")) => parse_error(value),
            (None, Some("date")) => HostValue::Date(parse_date(value)),
            (None, Some("regexp")) => parse_regexp(value),
            (None, _) => HostValue::string(value),
        },
    }
}

fn special_number(text: &str) -> f64 {
    match text {
        "Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        "-0" => -0.0,
        _ => f64::NAN,
    }
}

fn function_name(source: &str) -> Option<&str> {
    let rest = source
        .strip_prefix("async function")
        .or_else(|| source.strip_prefix("function"))
        .or_else(|| source.strip_prefix("class"))?;
    let name = rest
        .trim_start_matches('*')
        .trim_start()
        .split(|c: char| c == '(' || c == '{' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    (!name.is_empty()).then_some(name)
}

/// `TypeError: message\n    at ...` becomes name, message, and stack.
fn parse_error(description: &str) -> HostValue {
    let first_line = description.lines().next().unwrap_or_default();
    let (name, message) = first_line.split_once(": ").unwrap_or((first_line, ""));
    HostValue::Error(ErrorValue {
        name: name.to_string(),
        message: message.to_string(),
        stack: (!description.is_empty()).then(|| description.to_string()),
    })
}

/// Parses `Mon Jan 01 2024 00:00:00 GMT+0000 (Coordinated Universal Time)`.
fn parse_date(description: &str) -> Option<DateTime<Utc>> {
    let stamp = description.split(" (").next().unwrap_or(description);
    DateTime::parse_from_str(stamp, "%a %b %d %Y %H:%M:%S GMT%z")
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_regexp(description: &str) -> HostValue {
    match description.strip_prefix('/').and_then(|s| s.rsplit_once('/')) {
        Some((source, flags)) => HostValue::regexp(source, flags),
        None => HostValue::regexp(description, ""),
    }
}
