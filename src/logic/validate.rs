use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Validates an incoming request body against a stored request schema and
/// returns the arguments that will be forwarded upstream.
///
/// Missing required fields fail with a single error naming all of them.
/// Fields not declared in the schema are dropped rather than rejected, so
/// callers can send extra metadata without breaking. Absent optionals stay
/// absent; declared defaults are documentation, not injected values.
pub fn validate_request(schema: &Value, body: &Value) -> Result<Map<String, Value>, GatewayError> {
    let empty = Map::new();
    let body = match body {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(GatewayError::validation(format!(
                "request body must be a JSON object, got {}",
                json_type_name(other)
            )))
        }
    };

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let missing: Vec<String> = required
        .iter()
        .filter(|name| !body.contains_key(**name))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(GatewayError::missing_fields(missing));
    }

    let mut args = Map::new();
    let mut mismatched = Vec::new();
    for (name, value) in body {
        let Some(declared) = properties.get(name) else {
            // Undeclared field, silently dropped.
            continue;
        };
        let expected = declared.get("type").and_then(Value::as_str).unwrap_or("object");
        if !type_matches(expected, value) {
            mismatched.push(format!(
                "{} (expected {}, got {})",
                name,
                expected,
                json_type_name(value)
            ));
            continue;
        }
        args.insert(name.clone(), value.clone());
    }

    if !mismatched.is_empty() {
        return Err(GatewayError::validation(format!(
            "type mismatch: {}",
            mismatched.join(", ")
        )));
    }

    Ok(args)
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        // Object covers the unknown-type fallback, accept anything.
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "count": {"type": "integer"},
                "expand": {"type": "string", "default": "Details"},
                "payload": {"type": "object"},
            },
            "required": ["id"],
        })
    }

    #[test]
    fn missing_required_names_every_field() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
            "required": ["a", "b"],
        });
        let err = validate_request(&schema, &json!({})).unwrap_err();
        match err {
            GatewayError::Validation { fields, .. } => {
                assert_eq!(fields, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let args = validate_request(&schema(), &json!({"id": "SO-1", "debug": true})).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args["id"], "SO-1");
    }

    #[test]
    fn optional_defaults_are_not_injected() {
        let args = validate_request(&schema(), &json!({"id": "SO-1"})).unwrap();
        assert!(!args.contains_key("expand"));
    }

    #[test]
    fn type_mismatch_rejected() {
        let err = validate_request(&schema(), &json!({"id": 7})).unwrap_err();
        assert!(err.to_string().contains("expected string"));
    }

    #[test]
    fn object_typed_field_accepts_anything() {
        let args =
            validate_request(&schema(), &json!({"id": "x", "payload": [1, 2, 3]})).unwrap();
        assert_eq!(args["payload"], json!([1, 2, 3]));
    }

    #[test]
    fn null_body_with_no_required_fields_is_empty_args() {
        let schema = json!({"type": "object", "properties": {}});
        let args = validate_request(&schema, &Value::Null).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn non_object_body_rejected() {
        let err = validate_request(&schema(), &json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }
}
