use serde_json::{json, Map, Value};

use crate::model::{MethodContract, MethodSignature, TypeTag};

/// Materializes a request/response contract from an introspected method
/// signature. This runs once at deploy time; the stored schemas are the
/// contract until an explicit redeploy or schema refresh.
pub fn synthesize(signature: &MethodSignature) -> MethodContract {
    MethodContract {
        method_name: signature.name.clone(),
        request_schema: request_schema(signature),
        response_schema: response_schema(signature),
        example_request: example_request(signature),
        curl_example: curl_example(signature),
    }
}

/// Request schema: one property per parameter, required parameters in the
/// `required` array. Declared defaults are annotations only; they are never
/// auto-populated, so omitting an optional field stays legal.
pub fn request_schema(signature: &MethodSignature) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &signature.parameters {
        let mut prop = Map::new();
        prop.insert("type".to_string(), json!(param.type_tag.schema_type()));
        if let Some(default) = &param.default {
            if !param.required {
                prop.insert("default".to_string(), default.clone());
            }
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        if param.required {
            required.push(json!(param.name));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    Value::Object(schema)
}

/// Response schema: the standard `{success, data, meta}` wrapper, with
/// `data` typed from the return-type tag or, failing that, method-name
/// heuristics (list-ish names return arrays, mutation-ish names return a
/// status object).
pub fn response_schema(signature: &MethodSignature) -> Value {
    let data_schema = match signature.return_type {
        Some(TypeTag::Array) => json!({"type": "array", "items": {"type": "object"}}),
        Some(TypeTag::Boolean) => status_object_schema(),
        Some(tag) => json!({"type": tag.schema_type()}),
        None => {
            let name = signature.name.to_lowercase();
            if ["list", "query", "search", "get_all"].iter().any(|k| name.contains(k)) {
                json!({"type": "array", "items": {"type": "object"}})
            } else if ["delete", "remove", "update", "put"].iter().any(|k| name.contains(k)) {
                status_object_schema()
            } else {
                json!({"type": "object"})
            }
        }
    };

    json!({
        "type": "object",
        "properties": {
            "success": {"type": "boolean"},
            "data": data_schema,
            "meta": {
                "type": "object",
                "properties": {
                    "duration_ms": {"type": "integer"},
                    "endpoint_id": {"type": "string"},
                    "executed_at": {"type": "string", "format": "date-time"},
                },
            },
        },
        "required": ["success", "data"],
    })
}

fn status_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "status": {"type": "string"},
            "message": {"type": "string"},
        },
    })
}

/// Example payload policy: required parameters only, with typed placeholder
/// values. Optional parameters and their defaults are deliberately omitted
/// so the example is the minimal valid request.
pub fn example_request(signature: &MethodSignature) -> Value {
    let mut example = Map::new();
    for param in signature.parameters.iter().filter(|p| p.required) {
        example.insert(param.name.clone(), placeholder(param.type_tag, &param.name));
    }
    Value::Object(example)
}

fn placeholder(tag: TypeTag, name: &str) -> Value {
    match tag {
        TypeTag::String => json!(format!("example_{name}")),
        TypeTag::Integer => json!(0),
        TypeTag::Number => json!(0.0),
        TypeTag::Boolean => json!(true),
        TypeTag::Array => json!([]),
        TypeTag::Object | TypeTag::Unknown => json!({}),
    }
}

fn curl_example(signature: &MethodSignature) -> String {
    let body = serde_json::to_string(&example_request(signature)).unwrap_or_else(|_| "{}".to_string());
    format!(
        "curl -X POST \"$GATEWAY_URL/endpoints/{{instance_id}}/{{service}}/{}\" \\\n  -H \"X-API-Key: $API_KEY\" \\\n  -H \"Content-Type: application/json\" \\\n  -d '{}'",
        signature.name, body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterSpec;
    use serde_json::json;

    fn signature(params: Vec<ParameterSpec>) -> MethodSignature {
        MethodSignature {
            name: "get".to_string(),
            parameters: params,
            return_type: Some(TypeTag::Object),
            doc: None,
            error: None,
        }
    }

    fn param(name: &str, tag: TypeTag, required: bool, default: Option<Value>) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            type_tag: tag,
            required,
            default,
        }
    }

    #[test]
    fn required_params_listed_in_required_array() {
        let sig = signature(vec![
            param("id", TypeTag::String, true, None),
            param("expand", TypeTag::String, false, None),
        ]);
        let schema = request_schema(&sig);
        assert_eq!(schema["required"], json!(["id"]));
        assert_eq!(schema["properties"]["id"]["type"], "string");
        assert_eq!(schema["properties"]["expand"]["type"], "string");
    }

    #[test]
    fn no_required_array_when_everything_optional() {
        let sig = signature(vec![param("filter", TypeTag::String, false, None)]);
        let schema = request_schema(&sig);
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn defaults_annotated_but_not_in_example() {
        let sig = signature(vec![
            param("id", TypeTag::String, true, None),
            param("expand", TypeTag::String, false, Some(json!("Details"))),
        ]);
        let contract = synthesize(&sig);
        assert_eq!(
            contract.request_schema["properties"]["expand"]["default"],
            "Details"
        );
        // Example carries required params only.
        assert_eq!(contract.example_request, json!({"id": "example_id"}));
    }

    #[test]
    fn unknown_type_degrades_to_object() {
        let sig = signature(vec![param("options", TypeTag::Unknown, true, None)]);
        let schema = request_schema(&sig);
        assert_eq!(schema["properties"]["options"]["type"], "object");
    }

    #[test]
    fn array_return_type_shapes_response_data() {
        let mut sig = signature(vec![]);
        sig.return_type = Some(TypeTag::Array);
        let schema = response_schema(&sig);
        assert_eq!(schema["properties"]["data"]["type"], "array");
    }

    #[test]
    fn listish_name_heuristic_when_no_return_type() {
        let mut sig = signature(vec![]);
        sig.name = "get_list".to_string();
        sig.return_type = None;
        let schema = response_schema(&sig);
        assert_eq!(schema["properties"]["data"]["type"], "array");
    }

    #[test]
    fn mutation_name_heuristic_returns_status_object() {
        let mut sig = signature(vec![]);
        sig.name = "delete".to_string();
        sig.return_type = None;
        let schema = response_schema(&sig);
        assert_eq!(
            schema["properties"]["data"]["properties"]["status"]["type"],
            "string"
        );
    }

    #[test]
    fn curl_example_carries_method_and_body() {
        let sig = signature(vec![param("id", TypeTag::String, true, None)]);
        let contract = synthesize(&sig);
        assert!(contract.curl_example.contains("/get\""));
        assert!(contract.curl_example.contains("example_id"));
        assert!(contract.curl_example.contains("X-API-Key"));
    }
}
