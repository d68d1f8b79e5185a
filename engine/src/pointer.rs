//! JSON Pointer parsing and resolution against a [`Collection`].
//!
//! Pointers address one of three things:
//!
//! - the collection itself: `""` or `"/"`
//! - a record by position: `/N` (or `/-`, the append position, for `add`)
//! - a field of a record: `/N/field`
//!
//! Field names use the standard RFC 6901 escapes (`~0` for `~`, `~1` for
//! `/`). A bare `~` segment, the "end of list" addressing some clients send
//! as a move target, is rejected as unsupported.

use crate::{error::Result, Collection, CollectionSchema, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One parsed path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A decimal array index
    Index(usize),
    /// The `-` append marker
    Append,
    /// A field name, unescaped
    Field(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(index) => write!(f, "{}", index),
            Segment::Append => write!(f, "-"),
            Segment::Field(name) => write!(f, "{}", escape_component(name)),
        }
    }
}

/// The location a pointer resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The collection itself
    Root,
    /// The record at a position
    Element(usize),
    /// One past the last record
    Append,
    /// A named field of the record at a position
    Field { index: usize, field: String },
}

/// An immutable, parsed JSON Pointer.
///
/// Keeps the text it was parsed from so errors quote the path exactly as
/// the client sent it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pointer {
    raw: String,
    segments: Vec<Segment>,
}

impl Pointer {
    /// Parse a pointer string.
    pub fn parse(pointer: &str) -> Result<Self> {
        if pointer.is_empty() || pointer == "/" {
            return Ok(Self::root_with(pointer));
        }
        if !pointer.starts_with('/') {
            return Err(invalid(pointer, "must start with '/'"));
        }

        let segments = pointer[1..]
            .split('/')
            .map(|component| parse_segment(pointer, component))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: pointer.to_string(),
            segments,
        })
    }

    /// The pointer addressing the collection itself.
    pub fn root() -> Self {
        Self::root_with("")
    }

    fn root_with(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: Vec::new(),
        }
    }

    /// Pointer to the record at `index`.
    pub fn element(index: usize) -> Self {
        Self::from_segments(vec![Segment::Index(index)])
    }

    /// Pointer to `field` of the record at `index`.
    pub fn field(index: usize, field: impl Into<String>) -> Self {
        Self::from_segments(vec![Segment::Index(index), Segment::Field(field.into())])
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let raw = segments.iter().map(|s| format!("/{}", s)).collect();
        Self { raw, segments }
    }

    /// The pointer text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed components.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether this pointer addresses the collection itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &Pointer) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Re-anchor a record-relative pointer (`/field`) under the record at
    /// `index` (`/index/field`).
    pub fn rebase(&self, index: usize) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(Segment::Index(index));
        segments.extend(self.segments.iter().cloned());
        Self::from_segments(segments)
    }

    /// Inverse of [`Pointer::rebase`]: drop the leading record index.
    pub fn strip_element(&self) -> Option<Self> {
        match self.segments.split_first() {
            Some((Segment::Index(_), rest)) => Some(Self::from_segments(rest.to_vec())),
            _ => None,
        }
    }

    /// Resolve against an existing location.
    pub fn resolve(&self, collection: &Collection, schema: &CollectionSchema) -> Result<Target> {
        self.resolve_with(collection, schema, false)
    }

    /// Resolve as an insertion point: `/len` and `/-` are accepted.
    pub fn resolve_for_insert(
        &self,
        collection: &Collection,
        schema: &CollectionSchema,
    ) -> Result<Target> {
        self.resolve_with(collection, schema, true)
    }

    fn resolve_with(
        &self,
        collection: &Collection,
        schema: &CollectionSchema,
        insert: bool,
    ) -> Result<Target> {
        let len = collection.len();
        match self.segments.as_slice() {
            [] => Ok(Target::Root),
            [Segment::Append] if insert => Ok(Target::Append),
            [Segment::Append] => Err(invalid(
                &self.raw,
                "'-' is only valid as an insertion point",
            )),
            [Segment::Index(index)] => {
                if *index < len || (insert && *index == len) {
                    Ok(Target::Element(*index))
                } else {
                    Err(self.out_of_range(*index, len))
                }
            }
            [Segment::Index(index), field] => {
                if *index >= len {
                    return Err(self.out_of_range(*index, len));
                }
                let name = match field {
                    Segment::Field(name) if schema.field(name).is_some() => name,
                    other => {
                        return Err(Error::UnknownField {
                            path: self.raw.clone(),
                            field: other.to_string(),
                        })
                    }
                };
                Ok(Target::Field {
                    index: *index,
                    field: name.clone(),
                })
            }
            [first, _] => Err(invalid(
                &self.raw,
                &format!("expected a record index, got '{}'", first),
            )),
            [first] => Err(invalid(
                &self.raw,
                &format!("expected a record index, got '{}'", first),
            )),
            _ => Err(invalid(&self.raw, "nested paths are not supported")),
        }
    }

    fn out_of_range(&self, index: usize, len: usize) -> Error {
        Error::IndexOutOfRange {
            path: self.raw.clone(),
            index,
            len,
        }
    }
}

fn invalid(pointer: &str, reason: &str) -> Error {
    Error::InvalidPointer {
        pointer: pointer.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_segment(pointer: &str, component: &str) -> Result<Segment> {
    if component.is_empty() {
        return Err(invalid(pointer, "empty path segment"));
    }
    if component == "-" {
        return Ok(Segment::Append);
    }
    if component.bytes().all(|b| b.is_ascii_digit()) {
        if component.len() > 1 && component.starts_with('0') {
            return Err(invalid(pointer, "array index has leading zeros"));
        }
        return component
            .parse()
            .map(Segment::Index)
            .map_err(|_| invalid(pointer, "array index is too large"));
    }
    if component.contains('~') {
        if component == "~" {
            return Err(Error::UnsupportedPointer(pointer.to_string()));
        }
        return unescape_component(component)
            .map(Segment::Field)
            .ok_or_else(|| invalid(pointer, "invalid '~' escape"));
    }
    Ok(Segment::Field(component.to_string()))
}

/// Unescape `~1` and `~0`; `None` on any other use of `~`.
fn unescape_component(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    // Order matters: ~ must be escaped before /
    component.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Pointer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pointer {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Pointer> for String {
    fn from(pointer: Pointer) -> Self {
        pointer.raw
    }
}
