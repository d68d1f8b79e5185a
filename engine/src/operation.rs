//! Patch operations.
//!
//! Changes are expressed as JSON Patch operations rather than direct
//! mutations. Every operation resolves its pointers against a
//! [`Collection`], checks the write against the [`CollectionSchema`], and
//! only then mutates. An operation that fails leaves the collection as it
//! found it.

use crate::{
    error::Result,
    pointer::{Pointer, Target},
    Collection, CollectionSchema, Error, Record, IDENTITY_FIELD,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who may write record identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// Identities are assigned by the persistence layer. Operations that
    /// would change an `id` fail with [`Error::IdentityOwnership`].
    #[default]
    ServerAssigned,
    /// Identity writes are accepted. Used when applying the server's
    /// outgoing patch on the client.
    Accept,
}

/// Everything an operation needs besides the collection it mutates.
#[derive(Debug, Clone, Copy)]
pub struct PatchContext<'a> {
    pub schema: &'a CollectionSchema,
    pub identity: IdentityPolicy,
}

impl<'a> PatchContext<'a> {
    /// Context with the default (server-assigned) identity policy.
    pub fn new(schema: &'a CollectionSchema) -> Self {
        Self {
            schema,
            identity: IdentityPolicy::default(),
        }
    }

    /// Set the identity policy.
    pub fn with_identity(mut self, identity: IdentityPolicy) -> Self {
        self.identity = identity;
        self
    }
}

/// A single JSON Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Test {
        path: Pointer,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        value: Value,
    },
    Add {
        path: Pointer,
        value: Value,
    },
    Remove {
        path: Pointer,
    },
    Replace {
        path: Pointer,
        value: Value,
    },
    Move {
        from: Pointer,
        path: Pointer,
    },
    Copy {
        from: Pointer,
        path: Pointer,
    },
}

impl Operation {
    /// Assert the value at `path`.
    pub fn test(path: &str, value: Value) -> Result<Self> {
        Ok(Operation::Test {
            path: Pointer::parse(path)?,
            value,
        })
    }

    /// Insert a record or set a field.
    pub fn add(path: &str, value: Value) -> Result<Self> {
        Ok(Operation::Add {
            path: Pointer::parse(path)?,
            value,
        })
    }

    /// Remove a record or null a field.
    pub fn remove(path: &str) -> Result<Self> {
        Ok(Operation::Remove {
            path: Pointer::parse(path)?,
        })
    }

    /// Replace an existing record or field.
    pub fn replace(path: &str, value: Value) -> Result<Self> {
        Ok(Operation::Replace {
            path: Pointer::parse(path)?,
            value,
        })
    }

    /// Move the value at `from` to `to`. The destination comes first.
    pub fn move_from(to: &str, from: &str) -> Result<Self> {
        Ok(Operation::Move {
            from: Pointer::parse(from)?,
            path: Pointer::parse(to)?,
        })
    }

    /// Copy the value at `from` to `to`. The destination comes first.
    pub fn copy_from(to: &str, from: &str) -> Result<Self> {
        Ok(Operation::Copy {
            from: Pointer::parse(from)?,
            path: Pointer::parse(to)?,
        })
    }

    /// The operation's name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Test { .. } => "test",
            Operation::Add { .. } => "add",
            Operation::Remove { .. } => "remove",
            Operation::Replace { .. } => "replace",
            Operation::Move { .. } => "move",
            Operation::Copy { .. } => "copy",
        }
    }

    /// Target pointer.
    pub fn path(&self) -> &Pointer {
        match self {
            Operation::Test { path, .. }
            | Operation::Add { path, .. }
            | Operation::Remove { path }
            | Operation::Replace { path, .. }
            | Operation::Move { path, .. }
            | Operation::Copy { path, .. } => path,
        }
    }

    /// Source pointer of `move` and `copy`.
    pub fn from(&self) -> Option<&Pointer> {
        match self {
            Operation::Move { from, .. } | Operation::Copy { from, .. } => Some(from),
            _ => None,
        }
    }

    /// Rewrite every pointer of this operation.
    pub(crate) fn map_pointers<F>(&self, mut f: F) -> Result<Operation>
    where
        F: FnMut(&Pointer) -> Result<Pointer>,
    {
        Ok(match self {
            Operation::Test { path, value } => Operation::Test {
                path: f(path)?,
                value: value.clone(),
            },
            Operation::Add { path, value } => Operation::Add {
                path: f(path)?,
                value: value.clone(),
            },
            Operation::Remove { path } => Operation::Remove { path: f(path)? },
            Operation::Replace { path, value } => Operation::Replace {
                path: f(path)?,
                value: value.clone(),
            },
            Operation::Move { from, path } => Operation::Move {
                from: f(from)?,
                path: f(path)?,
            },
            Operation::Copy { from, path } => Operation::Copy {
                from: f(from)?,
                path: f(path)?,
            },
        })
    }

    /// Apply this operation to `collection`.
    pub fn perform(&self, collection: &mut Collection, ctx: &PatchContext<'_>) -> Result<()> {
        match self {
            Operation::Test { path, value } => assert_value(collection, ctx, path, value),
            Operation::Add { path, value } => {
                put(collection, ctx, path, Node::Value(value.clone()), "add")
            }
            Operation::Remove { path } => remove(collection, ctx, path).map(|_| ()),
            Operation::Replace { path, value } => replace(collection, ctx, path, value.clone()),
            Operation::Move { from, path } => move_node(collection, ctx, from, path),
            Operation::Copy { from, path } => {
                check_not_ancestor(from, path, "copy")?;
                let node = match read(collection, ctx, from, "copy")? {
                    Node::Record(mut record) => {
                        record.id = None;
                        Node::Record(record)
                    }
                    value => value,
                };
                put(collection, ctx, path, node, "copy")
            }
        }
    }
}

/// A value in transit between two locations.
#[derive(Debug)]
enum Node {
    Record(Record),
    Value(Value),
}

impl Node {
    fn into_record(self, path: &Pointer, ctx: &PatchContext<'_>) -> Result<Record> {
        match self {
            Node::Record(record) => Ok(record),
            Node::Value(value) => new_record(path, value, ctx),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Record(record) => record.to_value(),
            Node::Value(value) => value,
        }
    }
}

fn assert_value(
    collection: &Collection,
    ctx: &PatchContext<'_>,
    path: &Pointer,
    expected: &Value,
) -> Result<()> {
    let schema = ctx.schema;
    let failed = |actual: Value| Error::TestFailed {
        path: path.to_string(),
        actual,
    };

    match path.resolve(collection, schema)? {
        Target::Root => {
            if !collection_matches(collection, expected, schema) {
                return Err(failed(collection.to_value()));
            }
        }
        Target::Element(index) => {
            let record = element(collection, path, index)?;
            if !record_matches(record, expected, schema) {
                return Err(failed(record.to_value()));
            }
        }
        Target::Field { index, field } => {
            let current = element(collection, path, index)?.get(&field);
            if !field_def(schema, path, &field)?.matches(&current, expected) {
                return Err(failed(current));
            }
        }
        Target::Append => return Err(invalid_target(path, "test")),
    }
    Ok(())
}

fn remove(collection: &mut Collection, ctx: &PatchContext<'_>, path: &Pointer) -> Result<Node> {
    match path.resolve(collection, ctx.schema)? {
        Target::Element(index) => Ok(Node::Record(collection.remove(index))),
        Target::Field { index, field } => {
            let old = element(collection, path, index)?.get(&field);
            set_field(collection, ctx, path, index, &field, Value::Null)?;
            Ok(Node::Value(old))
        }
        Target::Root | Target::Append => Err(invalid_target(path, "remove")),
    }
}

fn replace(
    collection: &mut Collection,
    ctx: &PatchContext<'_>,
    path: &Pointer,
    value: Value,
) -> Result<()> {
    match path.resolve(collection, ctx.schema)? {
        Target::Element(index) => {
            let existing = element(collection, path, index)?.id;
            let mut record = Record::from_value(path.as_str(), value, ctx.schema)?;
            match (record.id, existing) {
                (None, _) => record.id = existing,
                (Some(new), Some(old)) if new == old => {}
                _ if ctx.identity == IdentityPolicy::Accept => {}
                _ => return Err(Error::IdentityOwnership(identity_path(path))),
            }
            collection.replace(index, record);
            Ok(())
        }
        Target::Field { index, field } => set_field(collection, ctx, path, index, &field, value),
        Target::Root | Target::Append => Err(invalid_target(path, "replace")),
    }
}

/// Remove at `from`, then add at `to`, on a staged copy. The destination is
/// resolved after the removal, so `/0` to `/1` swaps the first two records.
fn move_node(
    collection: &mut Collection,
    ctx: &PatchContext<'_>,
    from: &Pointer,
    to: &Pointer,
) -> Result<()> {
    check_not_ancestor(from, to, "move")?;
    if matches!(from.resolve(collection, ctx.schema)?, Target::Root | Target::Append) {
        return Err(invalid_target(from, "move"));
    }

    let mut staged = collection.clone();
    let node = remove(&mut staged, ctx, from)?;
    put(&mut staged, ctx, to, node, "move")?;
    *collection = staged;
    Ok(())
}

fn read(
    collection: &Collection,
    ctx: &PatchContext<'_>,
    path: &Pointer,
    op: &'static str,
) -> Result<Node> {
    match path.resolve(collection, ctx.schema)? {
        Target::Element(index) => Ok(Node::Record(element(collection, path, index)?.clone())),
        Target::Field { index, field } => {
            Ok(Node::Value(element(collection, path, index)?.get(&field)))
        }
        Target::Root | Target::Append => Err(invalid_target(path, op)),
    }
}

/// Insert a record or set a field, with add semantics.
fn put(
    collection: &mut Collection,
    ctx: &PatchContext<'_>,
    path: &Pointer,
    node: Node,
    op: &'static str,
) -> Result<()> {
    match path.resolve_for_insert(collection, ctx.schema)? {
        Target::Element(index) => {
            let record = node.into_record(path, ctx)?;
            collection.insert(index, record);
            Ok(())
        }
        Target::Append => {
            let record = node.into_record(path, ctx)?;
            collection.push(record);
            Ok(())
        }
        Target::Field { index, field } => {
            set_field(collection, ctx, path, index, &field, node.into_value())
        }
        Target::Root => Err(invalid_target(path, op)),
    }
}

fn set_field(
    collection: &mut Collection,
    ctx: &PatchContext<'_>,
    path: &Pointer,
    index: usize,
    field: &str,
    value: Value,
) -> Result<()> {
    let value = field_def(ctx.schema, path, field)?.check(path.as_str(), value)?;
    let len = collection.len();
    let record = collection
        .get_mut(index)
        .ok_or_else(|| out_of_range(path, index, len))?;

    if field == IDENTITY_FIELD
        && ctx.identity == IdentityPolicy::ServerAssigned
        && record.get(field) != value
    {
        return Err(Error::IdentityOwnership(path.to_string()));
    }
    record.set(field, value);
    Ok(())
}

/// Build a record from client-supplied JSON.
fn new_record(path: &Pointer, value: Value, ctx: &PatchContext<'_>) -> Result<Record> {
    let record = Record::from_value(path.as_str(), value, ctx.schema)?;
    if record.id.is_some() && ctx.identity == IdentityPolicy::ServerAssigned {
        return Err(Error::IdentityOwnership(identity_path(path)));
    }
    Ok(record)
}

fn collection_matches(collection: &Collection, expected: &Value, schema: &CollectionSchema) -> bool {
    match expected.as_array() {
        Some(items) => {
            items.len() == collection.len()
                && collection
                    .iter()
                    .zip(items)
                    .all(|(record, item)| record_matches(record, item, schema))
        }
        None => false,
    }
}

/// Compare the fields named in `expected`; fields it leaves out are not
/// asserted.
fn record_matches(record: &Record, expected: &Value, schema: &CollectionSchema) -> bool {
    let Some(object) = expected.as_object() else {
        return false;
    };
    object.iter().all(|(name, value)| match schema.field(name) {
        Some(def) => def.matches(&record.get(name), value),
        None => false,
    })
}

fn check_not_ancestor(from: &Pointer, to: &Pointer, op: &'static str) -> Result<()> {
    if from.is_ancestor_of(to) {
        return Err(invalid_target(to, op));
    }
    Ok(())
}

fn element<'c>(collection: &'c Collection, path: &Pointer, index: usize) -> Result<&'c Record> {
    collection
        .get(index)
        .ok_or_else(|| out_of_range(path, index, collection.len()))
}

fn field_def<'s>(
    schema: &'s CollectionSchema,
    path: &Pointer,
    field: &str,
) -> Result<&'s crate::FieldDef> {
    schema.field(field).ok_or_else(|| Error::UnknownField {
        path: path.to_string(),
        field: field.to_string(),
    })
}

fn identity_path(path: &Pointer) -> String {
    format!("{}/{}", path, IDENTITY_FIELD)
}

fn invalid_target(path: &Pointer, op: &'static str) -> Error {
    Error::InvalidTarget {
        path: path.to_string(),
        op,
    }
}

fn out_of_range(path: &Pointer, index: usize, len: usize) -> Error {
    Error::IndexOutOfRange {
        path: path.to_string(),
        index,
        len,
    }
}
