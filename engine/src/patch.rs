//! Ordered lists of operations.

use crate::{error::Result, operation::PatchContext, Collection, Error, Operation};
use serde::{Deserialize, Serialize};

/// An ordered JSON Patch document.
///
/// Operations apply strictly in order, each against the result of the
/// previous one. `[]` is a valid, empty patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    operations: Vec<Operation>,
}

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a patch from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::MalformedPatch(e.to_string()))
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::MalformedPatch(e.to_string()))
    }

    /// Apply every operation to `collection`.
    ///
    /// All or nothing: on error the collection is left as it was.
    pub fn apply(&self, collection: &mut Collection, ctx: &PatchContext<'_>) -> Result<()> {
        let mut working = collection.clone();
        self.apply_in_place(&mut working, ctx)?;
        *collection = working;
        Ok(())
    }

    /// Apply every operation, stopping at the first error. Operations that
    /// already succeeded stay applied.
    pub(crate) fn apply_in_place(
        &self,
        collection: &mut Collection,
        ctx: &PatchContext<'_>,
    ) -> Result<()> {
        for op in &self.operations {
            op.perform(collection, ctx)?;
        }
        Ok(())
    }

    /// Append an operation.
    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the patch has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Borrow the operations.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Iterate operations in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// Rewrite record-relative pointers (`/field`) to address the record at
    /// `index`.
    pub fn rebase(&self, index: usize) -> Result<Patch> {
        self.operations
            .iter()
            .map(|op| op.map_pointers(|p| Ok(p.rebase(index))))
            .collect()
    }

    /// Inverse of [`Patch::rebase`].
    pub fn strip_element(&self) -> Result<Patch> {
        self.operations
            .iter()
            .map(|op| {
                op.map_pointers(|p| {
                    p.strip_element().ok_or_else(|| Error::InvalidPointer {
                        pointer: p.to_string(),
                        reason: "expected a record index".into(),
                    })
                })
            })
            .collect()
    }
}

impl From<Vec<Operation>> for Patch {
    fn from(operations: Vec<Operation>) -> Self {
        Self { operations }
    }
}

impl FromIterator<Operation> for Patch {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionSchema, FieldDef, FieldType};
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

    fn todos() -> Collection {
        serde_json::from_value(json!([
            {"id": 1, "description": "A", "complete": false},
            {"id": 2, "description": "B", "complete": false}
        ]))
        .unwrap()
    }

    #[test]
    fn empty_patch() {
        let patch = Patch::from_json("[]").unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.to_json().unwrap(), "[]");

        let schema = todo_schema();
        let mut collection = todos();
        patch
            .apply(&mut collection, &PatchContext::new(&schema))
            .unwrap();
        assert_eq!(collection, todos());
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            Patch::from_json("{\"op\":\"add\"}"),
            Err(Error::MalformedPatch(_))
        ));
        assert!(matches!(
            Patch::from_json("[{\"op\":\"add\",\"path\":\"/0/complete\""),
            Err(Error::MalformedPatch(_))
        ));
    }

    #[test]
    fn applies_in_order() {
        let schema = todo_schema();
        let mut collection = todos();
        let patch = Patch::from_json(
            r#"[
                {"op":"test","path":"/0/complete","value":false},
                {"op":"replace","path":"/0/complete","value":true},
                {"op":"test","path":"/0/complete","value":true}
            ]"#,
        )
        .unwrap();
        patch
            .apply(&mut collection, &PatchContext::new(&schema))
            .unwrap();
        assert_eq!(collection.get(0).unwrap().get("complete"), json!(true));
    }

    #[test]
    fn failure_is_atomic() {
        let schema = todo_schema();
        let mut collection = todos();
        let patch = Patch::from(vec![
            Operation::replace("/0/description", json!("changed")).unwrap(),
            Operation::remove("/1/complete").unwrap(),
        ]);
        let result = patch.apply(&mut collection, &PatchContext::new(&schema));
        assert_eq!(result, Err(Error::NotNullable("/1/complete".into())));
        assert_eq!(collection, todos());
    }

    #[test]
    fn rebase_round_trip() {
        let patch = Patch::from(vec![
            Operation::test("/complete", json!(false)).unwrap(),
            Operation::replace("/complete", json!(true)).unwrap(),
        ]);
        let rebased = patch.rebase(0).unwrap();
        assert_eq!(rebased.operations()[1].path().as_str(), "/0/complete");
        assert_eq!(rebased.strip_element().unwrap(), patch);
    }
}
