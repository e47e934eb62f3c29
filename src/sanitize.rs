//! Serialization boundary: non-finite floats never leave the core.
//!
//! Output structs route their `f64` fields through the `serialize_with`
//! helpers below, which emit JSON `null` (the "missing" marker) for NaN and
//! infinities. [`sanitize_json`] does the same for already-built values.

use serde::Serializer;
use serde_json::Value;

/// `Some(v)` when finite, otherwise `None`.
pub fn finite_or_none(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Serialize an `f64`, writing `null` for non-finite values.
pub fn finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    match finite_or_none(*value) {
        Some(v) => serializer.serialize_f64(v),
        None => serializer.serialize_none(),
    }
}

/// Serialize an `Option<f64>`, writing `null` for `None` and non-finite values.
pub fn finite_opt<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value.and_then(finite_or_none) {
        Some(v) => serializer.serialize_f64(v),
        None => serializer.serialize_none(),
    }
}

/// Serialize a slice of `f64`, writing `null` for each non-finite element.
pub fn finite_vec<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for v in values {
        seq.serialize_element(&finite_or_none(*v))?;
    }
    seq.end()
}

/// Recursively replace non-finite numbers in a JSON tree with `null`.
///
/// Returns the cleaned value and whether anything was replaced.
/// `serde_json` cannot represent NaN in a `Number`, but values parsed with
/// arbitrary-precision or built from `f64` casts may still carry them as
/// strings like `"NaN"`, which are also treated as missing.
pub fn sanitize_json(value: Value) -> (Value, bool) {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => (Value::Null, true),
            _ => (Value::Number(n), false),
        },
        Value::String(s) if is_non_finite_literal(&s) => (Value::Null, true),
        Value::Array(items) => {
            let mut found = false;
            let cleaned = items
                .into_iter()
                .map(|item| {
                    let (v, f) = sanitize_json(item);
                    found |= f;
                    v
                })
                .collect();
            (Value::Array(cleaned), found)
        }
        Value::Object(map) => {
            let mut found = false;
            let cleaned = map
                .into_iter()
                .map(|(k, item)| {
                    let (v, f) = sanitize_json(item);
                    found |= f;
                    (k, v)
                })
                .collect();
            (Value::Object(cleaned), found)
        }
        other => (other, false),
    }
}

fn is_non_finite_literal(s: &str) -> bool {
    matches!(
        s,
        "NaN" | "nan" | "Infinity" | "-Infinity" | "inf" | "-inf"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Reading {
        #[serde(serialize_with = "finite")]
        a: f64,
        #[serde(serialize_with = "finite_opt")]
        b: Option<f64>,
        #[serde(serialize_with = "finite_vec")]
        c: Vec<f64>,
    }

    #[test]
    fn non_finite_fields_serialize_as_null() {
        let reading = Reading {
            a: f64::NAN,
            b: Some(f64::INFINITY),
            c: vec![1.0, f64::NEG_INFINITY],
        };
        let out = serde_json::to_value(&reading).expect("serialize");
        assert_eq!(out, json!({"a": null, "b": null, "c": [1.0, null]}));
    }

    #[test]
    fn finite_fields_pass_through() {
        let reading = Reading { a: 2.5, b: None, c: vec![] };
        let out = serde_json::to_value(&reading).expect("serialize");
        assert_eq!(out, json!({"a": 2.5, "b": null, "c": []}));
    }

    #[test]
    fn sanitize_json_reports_replacements() {
        let (clean, found) = sanitize_json(json!({"x": [1, "NaN"], "y": {"z": "Infinity"}}));
        assert!(found);
        assert_eq!(clean, json!({"x": [1, null], "y": {"z": null}}));

        let (same, found) = sanitize_json(json!({"ok": 1.5, "label": "wheel"}));
        assert!(!found);
        assert_eq!(same, json!({"ok": 1.5, "label": "wheel"}));
    }

    #[test]
    fn finite_or_none_filters() {
        assert_eq!(finite_or_none(1.0), Some(1.0));
        assert_eq!(finite_or_none(f64::NAN), None);
    }
}
