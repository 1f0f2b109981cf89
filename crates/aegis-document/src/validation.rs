//! Aegis Document Validation
//!
//! Schema validation for documents. A schema may be extended at runtime
//! with new field descriptors, which is how link storage fields join an
//! existing collection schema.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Document, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Schema
// =============================================================================

/// Schema definition for document validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub name: String,
    pub fields: HashMap<String, FieldSchema>,
    pub required: Vec<String>,
    pub additional_properties: bool,
}

impl Schema {
    /// Create a new schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }

    /// Add a field to the schema.
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Add a required field.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Set whether additional properties are allowed.
    pub fn additional_properties(mut self, allow: bool) -> Self {
        self.additional_properties = allow;
        self
    }

    /// Attach or replace a field descriptor on a live schema.
    pub fn extend_field(&mut self, name: impl Into<String>, schema: FieldSchema) {
        self.fields.insert(name.into(), schema);
    }

    /// Validate a document against this schema.
    pub fn validate(&self, doc: &Document) -> ValidationResult {
        let mut errors = Vec::new();

        for required in &self.required {
            if !doc.contains(required) {
                errors.push(format!("Missing required field: {}", required));
            }
        }

        for (field_name, field_schema) in &self.fields {
            if let Some(value) = doc.get(field_name) {
                if let Err(err) = field_schema.validate(value) {
                    errors.push(format!("Field '{}': {}", field_name, err));
                }
            }
        }

        if !self.additional_properties {
            for key in doc.keys() {
                if !self.fields.contains_key(key) {
                    errors.push(format!("Unknown field: {}", key));
                }
            }
        }

        if errors.is_empty() {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(errors)
        }
    }
}

// =============================================================================
// Field Schema
// =============================================================================

/// Schema for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, FieldSchema>>,
    /// Required keys of an object value.
    pub required: Vec<String>,
    /// Accept any object contents without checking properties.
    pub blackbox: bool,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::new(FieldType::Any)
    }
}

impl FieldSchema {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
            items: None,
            properties: None,
            required: Vec::new(),
            blackbox: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn int() -> Self {
        Self::new(FieldType::Int)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn array(items: FieldSchema) -> Self {
        let mut schema = Self::new(FieldType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    /// An object whose contents are never inspected.
    pub fn blackbox() -> Self {
        let mut schema = Self::object();
        schema.blackbox = true;
        schema
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn property(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.properties
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), schema);
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Validate a value against this field schema.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            if self.nullable {
                return Ok(());
            }
            return Err("Value cannot be null".to_string());
        }

        if !self.field_type.matches(value) {
            return Err(format!(
                "Expected type {:?}, got {}",
                self.field_type,
                value_type(value)
            ));
        }

        match value {
            Value::Array(arr) => {
                if let Some(ref items_schema) = self.items {
                    for (i, item) in arr.iter().enumerate() {
                        if let Err(e) = items_schema.validate(item) {
                            return Err(format!("Array item {}: {}", i, e));
                        }
                    }
                }
            }
            Value::Object(obj) if !self.blackbox => {
                for key in &self.required {
                    if !obj.contains_key(key) {
                        return Err(format!("Missing property '{}'", key));
                    }
                }
                if let Some(ref props) = self.properties {
                    for (key, value) in obj {
                        let Some(prop_schema) = props.get(key) else {
                            return Err(format!("Unknown property '{}'", key));
                        };
                        if let Err(e) = prop_schema.validate(value) {
                            return Err(format!("Property '{}': {}", key, e));
                        }
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Field Type
// =============================================================================

/// Type of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(alias = "string")]
    String,
    #[serde(alias = "int", alias = "Integer")]
    Int,
    #[serde(alias = "float")]
    Float,
    #[serde(alias = "number")]
    Number,
    #[serde(alias = "bool", alias = "Boolean")]
    Bool,
    #[serde(alias = "array")]
    Array,
    #[serde(alias = "object")]
    Object,
    #[serde(alias = "any")]
    Any,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Number, Value::Int(_) | Value::Float(_)) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Array, Value::Array(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

// =============================================================================
// Validation Result
// =============================================================================

/// Result of schema validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
