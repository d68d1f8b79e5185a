//! Change classification and patch generation.
//!
//! [`ChangeSet::between`] decides what the persistence layer has to do after
//! a patch was applied. [`diff`] produces the patch that brings a client
//! holding one collection up to date with another.

use crate::{
    pointer::Pointer, Collection, CollectionSchema, FieldDef, Operation, Patch, Record,
    RecordId, IDENTITY_FIELD,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Records to save and delete after a patch was applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Records to insert or update, in patched order
    saves: Vec<Record>,
    deletes: Vec<Record>,
}

impl ChangeSet {
    /// Classify every record of `after` against `before`.
    ///
    /// - no identity: added
    /// - identity present in `before` with different fields: modified
    /// - identity present in `before` with equal fields: unchanged
    /// - identity in `before` but not in `after`: removed
    pub fn between(before: &Collection, after: &Collection, schema: &CollectionSchema) -> Self {
        let by_id: HashMap<RecordId, &Record> = before
            .iter()
            .filter_map(|record| record.id.map(|id| (id, record)))
            .collect();

        let mut saves = Vec::new();
        for record in after.iter() {
            let unchanged = match record.id.and_then(|id| by_id.get(&id)) {
                Some(old) => old.same_as(record, schema),
                None => false,
            };
            if !unchanged {
                saves.push(record.clone());
            }
        }

        let remaining: HashSet<RecordId> = after.iter().filter_map(|r| r.id).collect();
        let deletes = before
            .iter()
            .filter(|record| matches!(record.id, Some(id) if !remaining.contains(&id)))
            .cloned()
            .collect();

        Self { saves, deletes }
    }

    /// Whether nothing needs persisting.
    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }

    /// Records to insert (no identity yet).
    pub fn added(&self) -> impl Iterator<Item = &Record> {
        self.saves.iter().filter(|r| r.id.is_none())
    }

    /// Records to update.
    pub fn modified(&self) -> impl Iterator<Item = &Record> {
        self.saves.iter().filter(|r| r.id.is_some())
    }

    /// Records to delete.
    pub fn removed(&self) -> &[Record] {
        &self.deletes
    }

    /// Split into records to save and records to delete.
    pub fn into_parts(self) -> (Vec<Record>, Vec<Record>) {
        (self.saves, self.deletes)
    }
}

/// Patch that turns `from` into `to`.
///
/// Records are compared by position. For every differing field the patch
/// carries a `test` of the old value followed by a `replace` with the new
/// one. Extra records in `to` are added whole and surplus records in `from`
/// are removed from the highest index down.
pub fn diff(from: &Collection, to: &Collection, schema: &CollectionSchema) -> Patch {
    let mut patch = Patch::new();

    for (index, (old, new)) in from.iter().zip(to.iter()).enumerate() {
        for def in schema.all_fields() {
            let before = old.get(&def.name);
            let after = new.get(&def.name);
            if before == after {
                continue;
            }
            let path = Pointer::field(index, def.name.as_str());
            patch.push(Operation::Test {
                path: path.clone(),
                value: render(def, before),
            });
            patch.push(Operation::Replace {
                path,
                value: render(def, after),
            });
        }
    }

    for index in from.len()..to.len() {
        if let Some(record) = to.get(index) {
            patch.push(Operation::Add {
                path: Pointer::element(index),
                value: record.to_value(),
            });
        }
    }

    for index in (to.len()..from.len()).rev() {
        patch.push(Operation::Remove {
            path: Pointer::element(index),
        });
    }

    patch
}

/// Identities travel as strings, e.g. `"4"`.
fn render(def: &FieldDef, value: Value) -> Value {
    match value {
        Value::Number(n) if def.name == IDENTITY_FIELD => Value::String(n.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
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

    fn collection(value: Value) -> Collection {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn identical_collections_produce_empty_patch() {
        let schema = todo_schema();
        let a = collection(json!([{"id": 1, "description": "A", "complete": false}]));
        assert!(diff(&a, &a.clone(), &schema).is_empty());
    }

    #[test]
    fn new_identity_is_a_string() {
        let schema = todo_schema();
        let shadow = collection(json!([{"description": "D", "complete": false}]));
        let working = collection(json!([{"id": 4, "description": "D", "complete": false}]));

        let patch = diff(&shadow, &working, &schema);
        assert_eq!(
            patch.to_json().unwrap(),
            r#"[{"op":"test","path":"/0/id"},{"op":"replace","path":"/0/id","value":"4"}]"#
        );
    }

    #[test]
    fn changed_field_emits_test_and_replace() {
        let schema = todo_schema();
        let shadow = collection(json!([{"id": 1, "description": "A", "complete": false}]));
        let working = collection(json!([{"id": 1, "description": "A", "complete": true}]));

        let patch = diff(&shadow, &working, &schema);
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!([
                {"op": "test", "path": "/0/complete", "value": false},
                {"op": "replace", "path": "/0/complete", "value": true}
            ])
        );
    }

    #[test]
    fn length_changes() {
        let schema = todo_schema();
        let long = collection(json!([
            {"id": 1, "complete": false},
            {"id": 2, "complete": false},
            {"id": 3, "complete": false}
        ]));
        let short = collection(json!([{"id": 1, "complete": false}]));

        let patch = diff(&long, &short, &schema);
        let paths: Vec<_> = patch.iter().map(|op| op.path().to_string()).collect();
        assert_eq!(paths, vec!["/2", "/1"]);
        assert!(patch.iter().all(|op| op.name() == "remove"));

        let patch = diff(&short, &long, &schema);
        assert_eq!(patch.len(), 2);
        assert_eq!(
            patch.operations()[0],
            Operation::add("/1", json!({"id": 2, "complete": false})).unwrap()
        );
    }

    #[test]
    fn change_set_classifies_records() {
        let schema = todo_schema();
        let before = collection(json!([
            {"id": 1, "description": "A", "complete": false},
            {"id": 2, "description": "B", "complete": false},
            {"id": 3, "description": "C", "complete": false}
        ]));
        let after = collection(json!([
            {"id": 1, "description": "A", "complete": false},
            {"id": 3, "description": "C", "complete": true},
            {"description": "D", "complete": false}
        ]));

        let changes = ChangeSet::between(&before, &after, &schema);
        assert!(!changes.is_empty());
        assert_eq!(changes.added().count(), 1);
        assert_eq!(changes.modified().map(|r| r.id).collect::<Vec<_>>(), vec![Some(3)]);
        assert_eq!(changes.removed().len(), 1);
        assert_eq!(changes.removed()[0].id, Some(2));

        let (saves, deletes) = changes.into_parts();
        assert_eq!(saves.iter().map(|r| r.id).collect::<Vec<_>>(), vec![Some(3), None]);
        assert_eq!(deletes.len(), 1);
    }

    #[test]
    fn change_set_empty_when_unchanged() {
        let schema = todo_schema();
        let before = collection(json!([{"id": 1, "description": "A", "complete": false}]));
        assert!(ChangeSet::between(&before, &before.clone(), &schema).is_empty());
    }
}
