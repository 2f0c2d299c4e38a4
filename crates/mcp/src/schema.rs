// Input schema capability used by the tool registry

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Validates raw tool arguments and describes their shape.
///
/// The registry depends only on this trait, so any validation approach can
/// back a tool as long as it yields a typed input or an error detail.
pub trait InputSchema: Send + Sync + 'static {
    /// Value handed to the handler once validation succeeds
    type Input: Send + 'static;

    fn validate(&self, raw: &Value) -> Result<Self::Input, String>;

    /// JSON Schema advertised by `tools/list`; `None` for unstructured schemas
    fn describe_shape(&self) -> Option<Value> {
        None
    }
}

/// Shape advertised for schemas that cannot describe themselves
pub fn empty_shape() -> Value {
    json_schema_object(serde_json::json!({}), vec![])
}

/// Schema backed by serde: arguments are valid when they deserialize into `T`
pub struct TypedSchema<T> {
    shape: Option<Value>,
    _input: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new(shape: Value) -> Self {
        Self {
            shape: Some(shape),
            _input: PhantomData,
        }
    }

    /// A schema that validates but exposes no shape
    pub fn opaque() -> Self {
        Self {
            shape: None,
            _input: PhantomData,
        }
    }
}

impl<T> InputSchema for TypedSchema<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Input = T;

    fn validate(&self, raw: &Value) -> Result<T, String> {
        T::deserialize(raw).map_err(|e| e.to_string())
    }

    fn describe_shape(&self) -> Option<Value> {
        self.shape.clone()
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_integer(description: &str, minimum: i64, maximum: i64) -> Value {
    serde_json::json!({
        "type": "integer",
        "description": description,
        "minimum": minimum,
        "maximum": maximum
    })
}
