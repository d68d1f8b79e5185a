//! Record and collection types.

use crate::{error::Result, CollectionSchema, Error, RecordId, IDENTITY_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An addressable entity: an optional server-assigned identity plus named
/// values.
///
/// Serialized as a flat JSON object, e.g.
/// `{"id":1,"complete":false,"description":"A"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identity assigned by the persistence layer; `None` until first save
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Value fields
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl Record {
    /// Create a record that has not been persisted yet.
    pub fn new(values: Map<String, Value>) -> Self {
        Self { id: None, values }
    }

    /// Create a record with a known identity.
    pub fn with_id(id: RecordId, values: Map<String, Value>) -> Self {
        Self {
            id: Some(id),
            values,
        }
    }

    /// Build a record from a JSON object, checking it against `schema`.
    ///
    /// Missing nullable fields become `null`, missing non-nullable fields take
    /// their type's default, and unknown keys are rejected. `path` is the
    /// pointer the record is being written to and prefixes field errors.
    pub fn from_value(path: &str, value: Value, schema: &CollectionSchema) -> Result<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(Error::TypeMismatch {
                    path: path.to_string(),
                    expected: "Object".into(),
                    got: crate::schema::json_type_name(&other).into(),
                })
            }
        };

        if let Some(unknown) = object.keys().find(|key| schema.field(key).is_none()) {
            return Err(Error::UnknownField {
                path: format!("{}/{}", path, unknown),
                field: unknown.clone(),
            });
        }

        let mut record = Record::default();
        for def in schema.all_fields() {
            let field_path = format!("{}/{}", path, def.name);
            let value = match object.remove(&def.name) {
                Some(value) => def.check(&field_path, value)?,
                None if def.nullable => Value::Null,
                None => def.field_type.default_value(),
            };
            record.set(&def.name, value);
        }
        Ok(record)
    }

    /// Read a field; missing fields read as `null`.
    pub fn get(&self, field: &str) -> Value {
        if field == IDENTITY_FIELD {
            return self.id.map(Value::from).unwrap_or(Value::Null);
        }
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Write a field. The value is expected to have passed schema checks.
    pub fn set(&mut self, field: &str, value: Value) {
        if field == IDENTITY_FIELD {
            self.id = value.as_i64();
        } else {
            self.values.insert(field.to_string(), value);
        }
    }

    /// Whether every schema field (identity included) holds the same value.
    pub fn same_as(&self, other: &Record, schema: &CollectionSchema) -> bool {
        schema
            .all_fields()
            .all(|def| self.get(&def.name) == other.get(&def.name))
    }

    /// JSON form of this record.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(IDENTITY_FIELD.to_string(), self.get(IDENTITY_FIELD));
        for (key, value) in &self.values {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// An ordered sequence of records. Order is retrieval order only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    records: Vec<Record>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get a record by position.
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Get a mutable record by position.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    /// Find a record by identity.
    pub fn find(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id == Some(id))
    }

    /// Iterate records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Append a record.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Insert a record at `index`, shifting later records. `index <= len`.
    pub fn insert(&mut self, index: usize, record: Record) {
        self.records.insert(index, record);
    }

    /// Remove the record at `index`. `index < len`.
    pub fn remove(&mut self, index: usize) -> Record {
        self.records.remove(index)
    }

    /// Replace the record at `index`, returning the old one. `index < len`.
    pub fn replace(&mut self, index: usize, record: Record) -> Record {
        std::mem::replace(&mut self.records[index], record)
    }

    /// Borrow the records as a slice.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consume into the underlying records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// JSON form of the whole collection.
    pub fn to_value(&self) -> Value {
        Value::Array(self.records.iter().map(Record::to_value).collect())
    }
}

impl From<Vec<Record>> for Collection {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for Collection {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};
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
    fn from_value_fills_missing_fields() {
        let schema = todo_schema();
        let record = Record::from_value("/3", json!({"description": "D"}), &schema).unwrap();

        assert_eq!(record.id, None);
        assert_eq!(record.get("description"), json!("D"));
        assert_eq!(record.get("complete"), json!(false));
    }

    #[test]
    fn from_value_rejects_unknown_field() {
        let schema = todo_schema();
        let result = Record::from_value("/0", json!({"title": "x"}), &schema);
        assert!(matches!(
            result,
            Err(Error::UnknownField { path, field }) if path == "/0/title" && field == "title"
        ));
    }

    #[test]
    fn from_value_rejects_null_required_field() {
        let schema = todo_schema();
        let result = Record::from_value("/0", json!({"complete": null}), &schema);
        assert_eq!(result, Err(Error::NotNullable("/0/complete".into())));
    }

    #[test]
    fn from_value_rejects_non_object() {
        let schema = todo_schema();
        let result = Record::from_value("/0", json!(true), &schema);
        assert!(matches!(result, Err(Error::TypeMismatch { got, .. }) if got == "Bool"));
    }

    #[test]
    fn get_and_set_identity() {
        let mut record = Record::default();
        assert_eq!(record.get("id"), Value::Null);
        record.set("id", json!(7));
        assert_eq!(record.id, Some(7));
        assert_eq!(record.get("id"), json!(7));
    }

    #[test]
    fn same_as_compares_every_field() {
        let schema = todo_schema();
        let a = Record::from_value("/0", json!({"id": 1, "description": "A"}), &schema).unwrap();
        let mut b = a.clone();
        assert!(a.same_as(&b, &schema));
        b.set("complete", json!(true));
        assert!(!a.same_as(&b, &schema));
    }

    #[test]
    fn serialization_is_flat() {
        let mut values = Map::new();
        values.insert("description".into(), json!("A"));
        values.insert("complete".into(), json!(false));
        let record = Record::with_id(1, values);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, json!({"id": 1, "description": "A", "complete": false}));

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn collection_positional_ops() {
        let mut collection: Collection = (1..=3)
            .map(|id| Record::with_id(id, Map::new()))
            .collect();

        let removed = collection.remove(0);
        assert_eq!(removed.id, Some(1));
        collection.insert(2, removed);

        let ids: Vec<_> = collection.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(2), Some(3), Some(1)]);
        assert_eq!(collection.find(3).and_then(|r| r.id), Some(3));
    }
}
