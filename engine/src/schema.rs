//! Schema definition and field validation.
//!
//! A [`CollectionSchema`] describes the value fields of the records in a
//! collection. Every write performed by a patch operation goes through
//! [`FieldDef::check`], which enforces the field's type and nullability
//! contract before anything is mutated.

use crate::{error::Result, Error, IDENTITY_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// Arbitrary nested JSON
    Json,
}

impl FieldType {
    /// Value a non-nullable field takes when a new record omits it.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Int => Value::from(0),
            FieldType::Float => Value::from(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Json => Value::Object(serde_json::Map::new()),
        }
    }

    /// Convert a non-null value to this type, if it is compatible.
    ///
    /// Integers are also accepted in their decimal string form, which is how
    /// server-assigned identities travel in outgoing patches.
    fn coerce(&self, value: Value) -> Option<Value> {
        match self {
            FieldType::String => value.is_string().then_some(value),
            FieldType::Int => {
                if value.is_i64() {
                    Some(value)
                } else if let Value::String(s) = &value {
                    s.trim().parse::<i64>().ok().map(Value::from)
                } else {
                    None
                }
            }
            FieldType::Float => value.is_number().then_some(value),
            FieldType::Bool => value.is_boolean().then_some(value),
            FieldType::Json => Some(value),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// Definition of a field in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether the field may hold `null`
    pub nullable: bool,
}

impl FieldDef {
    /// Create a non-nullable field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    /// Create a nullable field definition.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }

    /// Check a value about to be written at `path` and return it in its
    /// canonical form.
    pub fn check(&self, path: &str, value: Value) -> Result<Value> {
        if value.is_null() {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(Error::NotNullable(path.to_string()))
            };
        }

        let got = json_type_name(&value);
        self.field_type
            .coerce(value)
            .ok_or_else(|| Error::TypeMismatch {
                path: path.to_string(),
                expected: self.field_type.to_string(),
                got: got.to_string(),
            })
    }

    /// Whether `value` is what this field would hold after writing `expected`.
    ///
    /// Used by `test` operations, where `"4"` must match an integer `4`.
    pub fn matches(&self, current: &Value, expected: &Value) -> bool {
        if expected.is_null() {
            return current.is_null();
        }
        match self.field_type.coerce(expected.clone()) {
            Some(coerced) => values_equal(current, &coerced),
            None => false,
        }
    }
}

/// Numeric-aware equality: `1` and `1.0` compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

fn identity_field() -> FieldDef {
    FieldDef::optional(IDENTITY_FIELD, FieldType::Int)
}

/// Schema for the records of one collection.
///
/// The identity field `id` is implicit: it is always present, typed `Int`
/// and nullable until the persistence layer assigns a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    /// Collection name
    pub name: String,
    /// Value field definitions, in diff order
    pub fields: Vec<FieldDef>,
    #[serde(skip, default = "identity_field")]
    identity: FieldDef,
}

impl CollectionSchema {
    /// Create a new collection schema.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
            identity: identity_field(),
        }
    }

    /// Look up a field, including the identity field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        if name == IDENTITY_FIELD {
            return Some(&self.identity);
        }
        self.fields.iter().find(|f| f.name == name)
    }

    /// Identity field first, then the value fields in declaration order.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDef> {
        std::iter::once(&self.identity).chain(self.fields.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todo_schema() -> CollectionSchema {
        CollectionSchema::new(
            "todos",
            vec![
                FieldDef::optional("description", FieldType::String),
                FieldDef::required("complete", FieldType::Bool),
            ],
        )
    }

    #[test]
    fn check_accepts_matching_types() {
        let schema = todo_schema();
        let desc = schema.field("description").unwrap();
        assert_eq!(desc.check("/0/description", json!("A")).unwrap(), json!("A"));
        assert_eq!(desc.check("/0/description", json!(null)).unwrap(), json!(null));

        let complete = schema.field("complete").unwrap();
        assert_eq!(complete.check("/0/complete", json!(true)).unwrap(), json!(true));
    }

    #[test]
    fn check_rejects_null_on_required() {
        let schema = todo_schema();
        let complete = schema.field("complete").unwrap();
        let result = complete.check("/0/complete", Value::Null);
        assert_eq!(result, Err(Error::NotNullable("/0/complete".into())));
    }

    #[test]
    fn check_rejects_wrong_type() {
        let schema = todo_schema();
        let desc = schema.field("description").unwrap();
        let result = desc.check("/1/description", json!(true));
        assert!(matches!(
            result,
            Err(Error::TypeMismatch { path, expected, got })
                if path == "/1/description" && expected == "String" && got == "Bool"
        ));
    }

    #[test]
    fn identity_is_implicit_and_coerces_strings() {
        let schema = todo_schema();
        let id = schema.field("id").unwrap();
        assert!(id.nullable);
        assert_eq!(id.field_type, FieldType::Int);
        assert_eq!(id.check("/3/id", json!("4")).unwrap(), json!(4));
        assert!(id.check("/3/id", json!("four")).is_err());
    }

    #[test]
    fn int_rejects_values_beyond_i64() {
        let schema = todo_schema();
        let id = schema.field("id").unwrap();
        assert_eq!(id.check("/0/id", json!(i64::MAX)).unwrap(), json!(i64::MAX));
        assert!(matches!(
            id.check("/0/id", json!(u64::MAX)),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(id.check("/0/id", json!("18446744073709551615")).is_err());
    }

    #[test]
    fn all_fields_starts_with_identity() {
        let schema = todo_schema();
        let names: Vec<_> = schema.all_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "description", "complete"]);
    }

    #[test]
    fn matches_coerces_expected_value() {
        let schema = todo_schema();
        let id = schema.field("id").unwrap();
        assert!(id.matches(&json!(4), &json!("4")));
        assert!(id.matches(&Value::Null, &Value::Null));
        assert!(!id.matches(&json!(4), &Value::Null));

        let score = FieldDef::required("score", FieldType::Float);
        assert!(score.matches(&json!(1.0), &json!(1)));
    }

    #[test]
    fn field_type_display() {
        assert_eq!(FieldType::String.to_string(), "String");
        assert_eq!(FieldType::Int.to_string(), "Int");
        assert_eq!(FieldType::Json.to_string(), "Json");
    }

    #[test]
    fn schema_serialization_restores_identity() {
        let schema = todo_schema();
        let json = serde_json::to_string(&schema).unwrap();
        assert!(!json.contains("identity"));
        let parsed: CollectionSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, parsed);
        assert!(parsed.field("id").is_some());
    }

    #[test]
    fn json_field_accepts_any() {
        let data = FieldDef::required("data", FieldType::Json);
        assert!(data.check("/0/data", json!("string")).is_ok());
        assert!(data.check("/0/data", json!(123)).is_ok());
        assert!(data.check("/0/data", json!([1, 2, 3])).is_ok());
        assert!(data.check("/0/data", json!({"nested": "object"})).is_ok());
    }
}
