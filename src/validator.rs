//! Response checks: subset matching and JSON schema validation.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Whether everything `subset` asks for is present in `superset`.
///
/// Mapping keys must exist with a recursively matching value. Each element
/// of a sequence must match some element of the superset sequence, in any
/// position. Scalars compare by equality. Extra keys or elements in the
/// superset never cause a mismatch.
pub fn is_subset(superset: &Value, subset: &Value) -> bool {
    match subset {
        Value::Object(expected) => match superset {
            Value::Object(actual) => expected.iter().all(|(key, value)| {
                actual
                    .get(key)
                    .is_some_and(|candidate| is_subset(candidate, value))
            }),
            _ => false,
        },
        Value::Array(expected) => match superset {
            Value::Array(actual) => expected.iter().all(|item| {
                actual.iter().any(|candidate| is_subset(candidate, item))
            }),
            _ => false,
        },
        scalar => superset == scalar,
    }
}

/// Compile a JSON schema, detecting its draft from `$schema`.
pub fn compile_schema(schema: &Value) -> Result<jsonschema::Validator> {
    jsonschema::validator_for(schema)
        .map_err(|e| anyhow!("invalid response schema: {e}"))
}

/// Validate `instance` against `schema`.
///
/// `Ok(Ok(()))` when valid, `Ok(Err(violations))` with one line per
/// violation (instance path and message), `Err` when the schema itself does
/// not compile.
pub fn verify_schema(
    instance: &Value,
    schema: &Value,
) -> Result<std::result::Result<(), Vec<String>>> {
    let validator = compile_schema(schema)?;
    let violations: Vec<String> = validator
        .iter_errors(instance)
        .map(|error| {
            let path = error.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            format!("path {path}: {error}")
        })
        .collect();

    if violations.is_empty() {
        debug!("response schema validated");
        Ok(Ok(()))
    } else {
        Ok(Err(violations))
    }
}

/// Response headers as a JSON mapping for subset matching.
pub fn headers_as_value(headers: &HashMap<String, String>) -> Value {
    let mut obj = Map::new();
    for (k, v) in headers {
        obj.insert(k.to_ascii_lowercase(), Value::String(v.clone()));
    }
    Value::Object(obj)
}

/// Lower-case the top-level names of an expected-headers mapping. Header
/// names are case-insensitive, values are compared as written.
pub fn normalize_header_expectation(expected: &Value) -> Value {
    match expected {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mapping_subset() {
        assert!(is_subset(&json!({"a": 1, "b": 2}), &json!({"a": 1})));
        assert!(!is_subset(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!is_subset(&json!({"a": 1}), &json!({"a": 2})));
        assert!(is_subset(&json!({"a": 1}), &json!({})));
    }

    #[test]
    fn sequence_subset_is_existential() {
        assert!(is_subset(&json!([{"a": 1}, {"a": 2}]), &json!([{"a": 1}])));
        assert!(is_subset(&json!([{"a": 1}, {"a": 2}]), &json!([{"a": 2}, {"a": 1}])));
        assert!(!is_subset(&json!([{"a": 1}]), &json!([{"a": 3}])));
        assert!(is_subset(&json!([1, 2, 3]), &json!([3, 1])));
    }

    #[test]
    fn nested_subset() {
        let actual = json!({
            "user": {"id": "123", "roles": [{"name": "admin", "scope": "all"}]},
            "meta": {"version": 2}
        });
        assert!(is_subset(
            &actual,
            &json!({"user": {"roles": [{"name": "admin"}]}})
        ));
        assert!(!is_subset(
            &actual,
            &json!({"user": {"roles": [{"name": "guest"}]}})
        ));
    }

    #[test]
    fn type_mismatches_do_not_match() {
        assert!(!is_subset(&json!("a"), &json!({"a": 1})));
        assert!(!is_subset(&json!({"a": 1}), &json!([{"a": 1}])));
        assert!(!is_subset(&json!(1), &json!("1")));
        assert!(is_subset(&Value::Null, &Value::Null));
    }

    #[test]
    fn schema_validation() {
        let schema = json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "string"}}
        });
        assert!(verify_schema(&json!({"id": "1"}), &schema).unwrap().is_ok());

        let violations = verify_schema(&json!({"id": 1}), &schema)
            .unwrap()
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("/id"), "{}", violations[0]);
    }

    #[test]
    fn invalid_schema_is_an_error() {
        let schema = json!({"type": 12});
        assert!(verify_schema(&json!({}), &schema).is_err());
    }

    #[test]
    fn header_matching_ignores_name_case() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("x-request-id".to_string(), "abc".to_string());

        let expected =
            normalize_header_expectation(&json!({"Content-Type": "application/json"}));
        assert!(is_subset(&headers_as_value(&headers), &expected));

        let wrong = normalize_header_expectation(&json!({"X-Request-Id": "zzz"}));
        assert!(!is_subset(&headers_as_value(&headers), &wrong));
    }
}
