//! JSON-Schema synthesis for operation filter inputs.
//!
//! Each filter spec enumerates its own schema through [`FilterSchema`],
//! built from the small vocabulary below. The required rule: a field is
//! required iff it is neither nullable nor a collection/map nor an opaque
//! value — collections get empty-default semantics.

use serde_json::{json, Map, Value};

pub fn string() -> Value {
    json!({"type": "string"})
}

pub fn integer() -> Value {
    json!({"type": "integer"})
}

pub fn number() -> Value {
    json!({"type": "number"})
}

pub fn boolean() -> Value {
    json!({"type": "boolean"})
}

pub fn array(items: Value) -> Value {
    json!({"type": "array", "items": items})
}

/// Mapping with string keys.
pub fn map(values: Value) -> Value {
    json!({"type": "object", "additionalProperties": values})
}

/// Opaque payload with no usable structure.
pub fn any() -> Value {
    json!({"type": "object"})
}

pub struct Field {
    pub name: &'static str,
    pub schema: Value,
    pub required: bool,
}

/// A nullable field: present in `properties`, absent from `required`.
pub fn optional(name: &'static str, schema: Value) -> Field {
    Field {
        name,
        schema,
        required: false,
    }
}

/// A non-nullable scalar field: listed in `required`.
pub fn required(name: &'static str, schema: Value) -> Field {
    Field {
        name,
        schema,
        required: true,
    }
}

/// A sequence field: never required.
pub fn list(name: &'static str, items: Value) -> Field {
    optional(name, array(items))
}

/// Assemble an object schema. The `required` array is only emitted when
/// non-empty.
pub fn object(fields: Vec<Field>) -> Value {
    let mut properties = Map::new();
    let mut required_fields = Vec::new();

    for field in fields {
        if field.required {
            required_fields.push(Value::String(field.name.to_string()));
        }
        properties.insert(field.name.to_string(), field.schema);
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required_fields.is_empty() {
        schema.insert("required".to_string(), Value::Array(required_fields));
    }
    Value::Object(schema)
}

/// An operation filter input that can describe itself as a JSON schema.
pub trait FilterSchema {
    /// Type name used in argument-decoding error messages.
    const NAME: &'static str;

    fn json_schema() -> Value;
}

use crate::model::{IsDependencySpec, PackageQualifierSpec, PkgSpec, VulnerabilitySpec};

impl FilterSchema for PackageQualifierSpec {
    const NAME: &'static str = "PackageQualifierSpec";

    fn json_schema() -> Value {
        object(vec![
            required("key", string()),
            optional("value", string()),
        ])
    }
}

impl FilterSchema for PkgSpec {
    const NAME: &'static str = "PkgSpec";

    fn json_schema() -> Value {
        object(vec![
            optional("id", string()),
            optional("type", string()),
            optional("namespace", string()),
            optional("name", string()),
            optional("version", string()),
            list("qualifiers", PackageQualifierSpec::json_schema()),
            optional("matchOnlyEmptyQualifiers", boolean()),
            optional("subpath", string()),
        ])
    }
}

impl FilterSchema for IsDependencySpec {
    const NAME: &'static str = "IsDependencySpec";

    fn json_schema() -> Value {
        object(vec![
            optional("id", string()),
            optional("package", PkgSpec::json_schema()),
            optional("dependencyPackage", PkgSpec::json_schema()),
            optional("versionRange", string()),
            optional("dependencyType", string()),
            optional("justification", string()),
            optional("origin", string()),
            optional("collector", string()),
            optional("documentRef", string()),
        ])
    }
}

impl FilterSchema for VulnerabilitySpec {
    const NAME: &'static str = "VulnerabilitySpec";

    fn json_schema() -> Value {
        object(vec![
            optional("id", string()),
            optional("type", string()),
            optional("vulnerabilityID", string()),
            optional("noVuln", boolean()),
        ])
    }
}
