use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive type tag inferred for a remote method parameter. Anything the
/// introspector cannot classify degrades to `Unknown`, which the synthesizer
/// treats as an opaque object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Unknown,
}

impl TypeTag {
    /// Parse a remote type description into a tag, tolerating the varied
    /// spellings upstream metadata uses.
    pub fn from_remote(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.contains("str") {
            TypeTag::String
        } else if lower.contains("int") {
            TypeTag::Integer
        } else if lower.contains("float") || lower.contains("number") || lower.contains("decimal") {
            TypeTag::Number
        } else if lower.contains("bool") {
            TypeTag::Boolean
        } else if lower.contains("list") || lower.contains("array") {
            TypeTag::Array
        } else if lower.contains("dict") || lower.contains("object") {
            TypeTag::Object
        } else {
            TypeTag::Unknown
        }
    }

    /// The JSON-schema primitive this tag maps to.
    pub fn schema_type(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Integer => "integer",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Array => "array",
            // Unknown/complex types accept opaque JSON.
            TypeTag::Object | TypeTag::Unknown => "object",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    pub required: bool,
    pub default: Option<Value>,
}

/// Best-effort description of one invocable remote operation. A method the
/// introspector failed to describe carries `error` instead of parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    pub return_type: Option<TypeTag>,
    pub doc: Option<String>,
    pub error: Option<String>,
}

impl MethodSignature {
    pub fn failed(name: String, error: String) -> Self {
        Self {
            name,
            parameters: Vec::new(),
            return_type: None,
            doc: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub method_count: usize,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDetail {
    pub name: String,
    pub methods: Vec<MethodSignature>,
    /// Set when describing the whole service failed; the listing still
    /// reports the service name.
    pub error: Option<String>,
}

impl ServiceDetail {
    pub fn summary(&self) -> ServiceSummary {
        ServiceSummary {
            name: self.name.clone(),
            method_count: self.methods.len(),
            methods: self.methods.iter().map(|m| m.name.clone()).collect(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }
}
