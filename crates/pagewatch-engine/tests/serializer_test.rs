use chrono::DateTime;
use pagewatch_engine::error::{HostError, JsonError};
use pagewatch_engine::serializer::{MAX_DEPTH_MARKER, Serializer, SerializerLimits, json_stringify};
use pagewatch_engine::value::{HostArray, HostObject, HostValue};
use serde_json::{Value, json};

fn serializer() -> Serializer {
    Serializer::new(SerializerLimits::default())
}

fn count_circular(value: &Value) -> usize {
    match value {
        Value::Object(map) => {
            let here = usize::from(map.get("_type") == Some(&json!("Circular")));
            here + map.values().map(count_circular).sum::<usize>()
        }
        Value::Array(items) => items.iter().map(count_circular).sum(),
        _ => 0,
    }
}

#[test]
fn test_scalars_pass_through() {
    let s = serializer();
    assert_eq!(s.serialize(&HostValue::from("hi")), json!("hi"));
    assert_eq!(s.serialize(&HostValue::Bool(true)), json!(true));
    assert_eq!(s.serialize(&HostValue::Number(42.0)), json!(42));
    assert_eq!(s.serialize(&HostValue::Number(0.25)), json!(0.25));
    assert_eq!(s.serialize(&HostValue::Null), Value::Null);
}

#[test]
fn test_non_transmittable_scalars_are_tagged() {
    let s = serializer();
    assert_eq!(s.serialize(&HostValue::Undefined), json!({"_type": "undefined"}));
    assert_eq!(s.serialize(&HostValue::Number(f64::NAN)), json!({"_type": "NaN"}));
    assert_eq!(
        s.serialize(&HostValue::Number(f64::INFINITY)),
        json!({"_type": "Infinity"})
    );
    assert_eq!(
        s.serialize(&HostValue::Number(f64::NEG_INFINITY)),
        json!({"_type": "-Infinity"})
    );
    assert_eq!(
        s.serialize(&HostValue::BigInt("900719925474099312".into())),
        json!({"_type": "BigInt", "value": "900719925474099312"})
    );
    assert_eq!(
        s.serialize(&HostValue::Symbol("Symbol(token)".into())),
        json!({"_type": "Symbol", "value": "Symbol(token)"})
    );
}

#[test]
fn test_functions_record_name_and_source_excerpt() {
    let s = serializer();
    let source = format!("function handler() {{ {} }}", "x;".repeat(100));
    let out = s.serialize(&HostValue::function(Some("handler"), source.clone()));
    assert_eq!(out["_type"], json!("Function"));
    assert_eq!(out["name"], json!("handler"));
    assert_eq!(out["stringValue"], json!(source[..100].to_string()));

    let anon = s.serialize(&HostValue::function(None, "() => 1"));
    assert_eq!(anon["name"], json!("anonymous"));
    assert_eq!(anon["stringValue"], json!("() => 1"));
}

#[test]
fn test_long_strings_are_truncated_with_marker() {
    let s = serializer();
    let long = "a".repeat(10_050);
    let out = s.serialize(&HostValue::from(long));
    let text = out.as_str().unwrap();
    assert_eq!(text.chars().count(), 10_003);
    assert!(text.ends_with("..."));

    let exact = "b".repeat(10_000);
    assert_eq!(s.serialize(&HostValue::from(exact.clone())), json!(exact));
}

#[test]
fn test_special_objects_keep_their_shape() {
    let s = serializer();
    let err = HostValue::error("TypeError", "x is undefined", Some("TypeError: x\n  at a.js:1".into()));
    assert_eq!(
        s.serialize(&err),
        json!({
            "_type": "Error",
            "name": "TypeError",
            "message": "x is undefined",
            "stack": "TypeError: x\n  at a.js:1"
        })
    );

    let at = DateTime::from_timestamp(1_700_000_000, 123_000_000).unwrap();
    assert_eq!(
        s.serialize(&HostValue::Date(Some(at))),
        json!({"_type": "Date", "iso": "2023-11-14T22:13:20.123Z"})
    );
    assert_eq!(
        s.serialize(&HostValue::Date(None)),
        json!({"_type": "Date", "iso": null})
    );
    assert_eq!(
        s.serialize(&HostValue::regexp("^a+$", "gi")),
        json!({"_type": "RegExp", "source": "^a+$", "flags": "gi"})
    );
}

#[test]
fn test_self_reference_terminates_with_one_marker() {
    let s = serializer();
    let obj = HostObject::from_entries([("name", HostValue::from("node"))]);
    obj.set("self", HostValue::Object(obj.clone()));

    let out = s.serialize(&HostValue::Object(obj));
    assert_eq!(out["name"], json!("node"));
    assert_eq!(out["self"], json!({"_type": "Circular", "ref": "ref_0"}));
    assert_eq!(count_circular(&out), 1);
}

#[test]
fn test_one_marker_per_cycle_edge() {
    let s = serializer();
    // a -> b -> a, plus b -> b
    let a = HostObject::new();
    let b = HostObject::new();
    a.set("b", HostValue::Object(b.clone()));
    b.set("a", HostValue::Object(a.clone()));
    b.set("me", HostValue::Object(b.clone()));

    let out = s.serialize(&HostValue::Object(a));
    assert_eq!(out["b"]["a"], json!({"_type": "Circular", "ref": "ref_0"}));
    assert_eq!(out["b"]["me"], json!({"_type": "Circular", "ref": "ref_1"}));
    assert_eq!(count_circular(&out), 2);
}

#[test]
fn test_cyclic_array_terminates() {
    let s = serializer();
    let arr = HostArray::new();
    arr.push(HostValue::from(1i64));
    arr.push(HostValue::Array(arr.clone()));
    let out = s.serialize(&HostValue::Array(arr));
    assert_eq!(out, json!([1, {"_type": "Circular", "ref": "ref_0"}]));
}

#[test]
fn test_shared_acyclic_members_are_not_circular() {
    let s = serializer();
    let shared = HostValue::object([("v", HostValue::from(1i64))]);
    let out = s.serialize(&HostValue::object([("left", shared.clone()), ("right", shared)]));
    assert_eq!(out, json!({"left": {"v": 1}, "right": {"v": 1}}));
}

#[test]
fn test_depth_limit_marker_at_depth_six() {
    let s = serializer();
    // seven levels of nesting: depth 0..=6
    let mut value = HostValue::from("leaf");
    for _ in 0..6 {
        value = HostValue::array([value]);
    }
    let out = s.serialize(&value);

    let mut cursor = &out;
    for _ in 0..6 {
        cursor = &cursor[0];
    }
    assert_eq!(cursor, &json!(MAX_DEPTH_MARKER));

    let mut shallow = HostValue::from("leaf");
    for _ in 0..5 {
        shallow = HostValue::array([shallow]);
    }
    let out = s.serialize(&shallow);
    assert_eq!(out[0][0][0][0][0], json!("leaf"));
}

#[test]
fn test_collections_truncate_to_first_hundred() {
    let s = serializer();
    let arr = HostValue::array((0..150i64).map(HostValue::from));
    let out = s.serialize(&arr);
    let items = out.as_array().unwrap();
    assert_eq!(items.len(), 100);
    assert_eq!(items[0], json!(0));
    assert_eq!(items[99], json!(99));

    let obj = HostObject::new();
    for i in 0..120 {
        obj.set(format!("k{:03}", i), HostValue::from(i as i64));
    }
    let out = s.serialize(&HostValue::Object(obj));
    let map = out.as_object().unwrap();
    assert_eq!(map.len(), 100);
    assert!(map.contains_key("k000"));
    assert!(map.contains_key("k099"));
    assert!(!map.contains_key("k100"));
}

#[test]
fn test_failing_property_only_affects_its_key() {
    let s = serializer();
    let obj = HostObject::from_entries([("ok", HostValue::from("fine"))]);
    obj.define_getter("broken", || Err(HostError::Accessor("getter threw".into())));
    obj.set("after", HostValue::from(2i64));

    let out = s.serialize(&HostValue::Object(obj));
    assert_eq!(out["ok"], json!("fine"));
    assert_eq!(
        out["broken"],
        json!({"_type": "Error", "message": "Failed to serialize"})
    );
    assert_eq!(out["after"], json!(2));
}

#[test]
fn test_json_stringify_follows_strict_rules() {
    let value = HostValue::object([
        ("a", HostValue::from(1i64)),
        ("skip", HostValue::Undefined),
        ("list", HostValue::array([HostValue::Undefined, HostValue::Number(f64::NAN)])),
    ]);
    assert_eq!(
        json_stringify(&value).unwrap().as_deref(),
        Some(r#"{"a":1,"list":[null,null]}"#)
    );
    assert_eq!(json_stringify(&HostValue::Undefined), Ok(None));
    assert_eq!(
        json_stringify(&HostValue::BigInt("1".into())),
        Err(JsonError::BigInt)
    );

    let cyclic = HostObject::new();
    cyclic.set("me", HostValue::Object(cyclic.clone()));
    assert_eq!(
        json_stringify(&HostValue::Object(cyclic)),
        Err(JsonError::Circular)
    );
}
