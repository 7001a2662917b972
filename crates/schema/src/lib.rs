//! Schema source and document validator collaborators.
//!
//! The core treats schemas as opaque: a source hands back the schema for an
//! endpoint, a validator answers pass/fail plus a violation list. Both are
//! traits so deployments can plug in a remote schema service; the shipped
//! implementations cover a static in-process registry and a structural
//! validator for a small JSON-Schema subset.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use ofactory_types::Endpoint;

/// Document validation failure: the full list of violations found.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("document violates schema: {0:?}")]
    SchemaViolation(Vec<String>),
}

/// A JSON-Schema-like description of an endpoint's documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema(Value);

impl Schema {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    /// Endpoint name derived from the schema title: lowercased, spaces
    /// collapsed to hyphens.
    pub fn endpoint_slug(&self) -> Option<String> {
        let title = self.title()?;
        let slug: String = title
            .trim()
            .chars()
            .map(|c| {
                if c.is_whitespace() {
                    '-'
                } else {
                    c.to_ascii_lowercase()
                }
            })
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if slug.is_empty() {
            None
        } else {
            Some(slug)
        }
    }
}

/// Supplies the schema governing an endpoint, if one is registered.
pub trait SchemaSource: Send + Sync {
    fn schema_for(&self, endpoint: &Endpoint) -> Option<Schema>;
}

/// Validates a candidate document against a schema.
pub trait DocumentValidator: Send + Sync {
    fn validate(&self, schema: &Schema, document: &Value) -> Result<(), ValidationError>;
}

/// In-process schema registry, seeded at startup.
#[derive(Default)]
pub struct StaticSchemaSource {
    schemas: RwLock<HashMap<String, Schema>>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: &Endpoint, schema: Schema) {
        self.schemas
            .write()
            .insert(endpoint.as_str().to_string(), schema);
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}

impl SchemaSource for StaticSchemaSource {
    fn schema_for(&self, endpoint: &Endpoint) -> Option<Schema> {
        self.schemas.read().get(endpoint.as_str()).cloned()
    }
}

/// Structural validator covering the schema subset the system ships with:
/// `type`, `properties` with primitive types, `required`, and integer
/// `minimum`.
#[derive(Default, Clone, Copy)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentValidator for StructuralValidator {
    fn validate(&self, schema: &Schema, document: &Value) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        check_value(schema.value(), document, "$", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::SchemaViolation(violations))
        }
    }
}

fn check_value(schema: &Value, document: &Value, path: &str, violations: &mut Vec<String>) {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, document) {
            violations.push(format!("{path}: expected {expected}"));
            return;
        }
    }

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
        if let Some(actual) = document.as_f64() {
            if actual < minimum {
                violations.push(format!("{path}: {actual} is below minimum {minimum}"));
            }
        }
    }

    let Some(object) = document.as_object() else {
        return;
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                violations.push(format!("{path}: missing required field '{field}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, field_schema) in properties {
            if let Some(value) = object.get(field) {
                check_value(field_schema, value, &format!("{path}.{field}"), violations);
            }
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Built-in example schema, seeded by the node so a fresh install serves a
/// working endpoint out of the box.
pub fn example_schema() -> Schema {
    Schema::new(serde_json::json!({
        "title": "Example Schema",
        "type": "object",
        "properties": {
            "firstName": {
                "type": "string"
            },
            "lastName": {
                "type": "string"
            },
            "age": {
                "description": "Age in years",
                "type": "integer",
                "minimum": 0
            }
        },
        "required": ["firstName", "lastName"]
    }))
}
