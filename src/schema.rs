//! The schema tree.  See [`Schema`].
//!
//! A [`Schema`] is either a leaf (one [`DataType`]) or a composite: an
//! object with insertion-ordered named children, or a list with positional
//! children.  The schema is the single source of truth for layout -- a
//! [`Node`](crate::Node) binds a schema to memory and every typed access
//! goes through the descriptors stored here.
//!
//! # Paths
//!
//! Paths are `/`-separated.  `..` ascends and is resolved lexically while a
//! path is walked, so `"a/../b"` is `"b"`; a leading `..` has nothing to
//! ascend from and fails.  A trailing separator denotes the node itself.
//!
//! # Compaction
//!
//! [`Schema::compact_to`] produces an isomorphic tree whose leaves are
//! compact and whose offsets are assigned by a single depth-first cursor
//! starting at zero, which is exactly the layout
//! [`Node::serialize`](crate::Node::serialize) writes.

use crate::{
  dtype::{DataKind, DataType},
  error::ConduitErr,
  util::{split_path, OkOrLog},
  IndexT,
};
use core::fmt::{Display, Formatter};
use smallvec::SmallVec;
use std::path::Path;

/// A tree of [`DataType`]s with named object children and ordered list
/// children.
///
/// ```
/// use conduit::{DataType, Schema};
///
/// let mut s = Schema::new();
/// s.fetch("coords/x").unwrap().set_dtype(DataType::float64(3));
/// s.fetch("coords/y").unwrap().set_dtype(DataType::float64(3));
/// assert_eq!(s.total_bytes_compact(), 48);
/// assert!(s.has_path("coords/x"));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
  dtype: DataType,
  children: Vec<Schema>,
  names: Vec<String>,
}

impl Schema {
  /// An empty schema.
  pub fn new() -> Schema {
    Schema::default()
  }

  /// A leaf schema holding `dtype`.
  pub fn from_dtype(dtype: DataType) -> Schema {
    Schema {
      dtype,
      children: Vec::new(),
      names: Vec::new(),
    }
  }

  /// Parses a schema from its JSON form.
  pub fn from_json(json: &str) -> Result<Schema, ConduitErr> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    Schema::from_json_value(&value)
  }

  pub(crate) fn from_json_value(
    value: &serde_json::Value,
  ) -> Result<Schema, ConduitErr> {
    match value {
      serde_json::Value::String(_) => {
        Ok(Schema::from_dtype(DataType::from_json(value)?))
      },
      serde_json::Value::Array(items) => {
        let mut schema = Schema::from_dtype(DataType::list());
        for item in items {
          schema.children.push(Schema::from_json_value(item)?);
        }
        Ok(schema)
      },
      serde_json::Value::Object(fields) => {
        // An object whose "dtype" member is a name is a leaf descriptor;
        // anything else is a composite with real children.
        if fields.get("dtype").map(|v| v.is_string()).unwrap_or(false) {
          Ok(Schema::from_dtype(DataType::from_json(value)?))
        } else {
          let mut schema = Schema::from_dtype(DataType::object());
          for (name, child) in fields {
            schema.names.push(name.clone());
            schema.children.push(Schema::from_json_value(child)?);
          }
          Ok(schema)
        }
      },
      other => Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!("unexpected JSON value in schema: {}", other),
        }
      )),
    }
  }

  /// Parses a schema the way the generator binds one: leaves whose JSON
  /// omits `offset` are packed at the depth-first cursor, so siblings land
  /// in disjoint regions of the shared buffer.  Explicit offsets are
  /// honored verbatim; the cursor always advances past each leaf's extent.
  pub(crate) fn from_json_value_packed(
    value: &serde_json::Value,
    cursor: &mut IndexT,
  ) -> Result<Schema, ConduitErr> {
    match value {
      serde_json::Value::String(_) => {
        // A bare kind name cannot carry an offset.
        let mut dtype = DataType::from_json(value)?;
        if dtype.kind().is_leaf() {
          dtype = dtype.with_offset(*cursor);
          *cursor = (*cursor).max(dtype.total_bytes());
        }
        Ok(Schema::from_dtype(dtype))
      },
      serde_json::Value::Array(items) => {
        let mut schema = Schema::from_dtype(DataType::list());
        for item in items {
          let child = Schema::from_json_value_packed(item, cursor)?;
          schema.children.push(child);
        }
        Ok(schema)
      },
      serde_json::Value::Object(fields) => {
        if fields.get("dtype").map(|v| v.is_string()).unwrap_or(false) {
          let mut dtype = DataType::from_json(value)?;
          if dtype.kind().is_leaf() {
            if fields.get("offset").is_none() {
              dtype = dtype.with_offset(*cursor);
            }
            *cursor = (*cursor).max(dtype.total_bytes());
          }
          Ok(Schema::from_dtype(dtype))
        } else {
          let mut schema = Schema::from_dtype(DataType::object());
          for (name, child_json) in fields {
            let child = Schema::from_json_value_packed(child_json, cursor)?;
            schema.names.push(name.clone());
            schema.children.push(child);
          }
          Ok(schema)
        }
      },
      other => Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!("unexpected JSON value in schema: {}", other),
        }
      )),
    }
  }

  /// The descriptor for this schema node.
  pub fn dtype(&self) -> &DataType {
    &self.dtype
  }

  pub fn kind(&self) -> DataKind {
    self.dtype.kind()
  }

  /// Replaces this schema with a leaf descriptor, discarding any children.
  pub fn set_dtype(&mut self, dtype: DataType) {
    self.dtype = dtype;
    self.children.clear();
    self.names.clear();
  }

  /// Replaces this schema with a deep copy of `other`.
  pub fn set(&mut self, other: &Schema) {
    self.clone_from(other);
  }

  /// Releases this schema back to empty.
  pub fn reset(&mut self) {
    self.dtype = DataType::empty();
    self.children.clear();
    self.names.clear();
  }

  pub fn number_of_children(&self) -> usize {
    self.children.len()
  }

  /// The `i`-th child, in insertion (object) or positional (list) order.
  pub fn child(&self, i: usize) -> Result<&Schema, ConduitErr> {
    self.children.get(i).ok_or_log(
      log::Level::Debug,
      ConduitErr::IndexOutOfRange {
        index: i,
        length: self.children.len(),
      },
    )
  }

  /// The name of the `i`-th object child.
  pub fn child_name(&self, i: usize) -> Result<&str, ConduitErr> {
    self.names.get(i).map(|s| s.as_str()).ok_or_log(
      log::Level::Debug,
      ConduitErr::IndexOutOfRange {
        index: i,
        length: self.names.len(),
      },
    )
  }

  /// The index of the object child called `name`, if present.
  pub fn child_index(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  pub(crate) fn children(&self) -> &[Schema] {
    &self.children
  }

  pub(crate) fn names(&self) -> &[String] {
    &self.names
  }

  /// Fetches a descendant by path, creating intermediate object nodes as
  /// needed.  An empty schema is first coerced to an object; fetching
  /// through a leaf fails.
  pub fn fetch(&mut self, path: &str) -> Result<&mut Schema, ConduitErr> {
    let segments = normalize_path(path)?;
    let mut here = self;
    for segment in segments {
      if here.dtype.kind().is_empty() {
        here.dtype = DataType::object();
      }
      if !here.dtype.kind().is_object() {
        return Err(err!(
          debug,
          ConduitErr::PathNotFound {
            path: format!("{} (parent is {})", path, here.dtype.kind()),
          }
        ));
      }
      let index = match here.child_index(segment) {
        Some(index) => index,
        None => {
          here.names.push(segment.to_string());
          here.children.push(Schema::new());
          here.children.len() - 1
        },
      };
      here = &mut here.children[index];
    }
    Ok(here)
  }

  /// The non-creating variant of [`Schema::fetch`].
  pub fn fetch_ptr(&self, path: &str) -> Result<&Schema, ConduitErr> {
    let segments = normalize_path(path)?;
    let mut here = self;
    for segment in segments {
      if !here.dtype.kind().is_object() {
        return Err(err!(
          debug,
          ConduitErr::PathNotFound { path: path.into() }
        ));
      }
      let index = here.child_index(segment).ok_or_log(
        log::Level::Debug,
        ConduitErr::PathNotFound { path: path.into() },
      )?;
      here = &here.children[index];
    }
    Ok(here)
  }

  /// `true` iff `path` resolves to an existing descendant.
  pub fn has_path(&self, path: &str) -> bool {
    self.fetch_ptr(path).is_ok()
  }

  /// Collects child paths into `out`.
  ///
  /// With `expand` set, every descendant contributes its full path;
  /// otherwise only the direct children's names are listed.
  pub fn paths(&self, out: &mut Vec<String>, expand: bool) {
    for (i, child) in self.children.iter().enumerate() {
      let name = match self.dtype.kind() {
        DataKind::Object => self.names[i].clone(),
        _ => format!("[{}]", i),
      };
      if expand && child.kind().is_composite() && !child.children.is_empty() {
        let mut sub = Vec::new();
        child.paths(&mut sub, true);
        for tail in sub {
          out.push(format!("{}/{}", name, tail));
        }
      } else {
        out.push(name);
      }
    }
  }

  /// Appends a new empty child, converting an empty schema to a list.
  /// Appending to an object fails.
  pub fn append(&mut self) -> Result<&mut Schema, ConduitErr> {
    match self.dtype.kind() {
      DataKind::Empty => self.dtype = DataType::list(),
      DataKind::List => {},
      other => {
        return Err(err!(
          debug,
          ConduitErr::TypeMismatch {
            expected: DataKind::List,
            observed: other,
          }
        ))
      },
    }
    self.children.push(Schema::new());
    Ok(self.children.last_mut().unwrap())
  }

  /// Removes the `i`-th child.
  pub fn remove(&mut self, i: usize) -> Result<(), ConduitErr> {
    if i >= self.children.len() {
      return Err(err!(
        debug,
        ConduitErr::IndexOutOfRange {
          index: i,
          length: self.children.len(),
        }
      ));
    }
    self.children.remove(i);
    if self.dtype.kind().is_object() {
      self.names.remove(i);
    }
    Ok(())
  }

  /// Removes the object child called `name`.
  pub fn remove_by_name(&mut self, name: &str) -> Result<(), ConduitErr> {
    if !self.dtype.kind().is_object() {
      return Err(err!(
        debug,
        ConduitErr::PathNotFound { path: name.into() }
      ));
    }
    let index = self.child_index(name).ok_or_log(
      log::Level::Debug,
      ConduitErr::PathNotFound { path: name.into() },
    )?;
    self.remove(index)
  }

  /// The bytes spanned by this subtree with its current layout.
  pub fn total_bytes(&self) -> IndexT {
    match self.dtype.kind() {
      DataKind::Object | DataKind::List => {
        self.children.iter().map(|c| c.total_bytes()).sum()
      },
      _ => self.dtype.total_bytes(),
    }
  }

  /// The bytes the subtree would occupy if every leaf were compact and laid
  /// out with no gaps.
  pub fn total_bytes_compact(&self) -> IndexT {
    match self.dtype.kind() {
      DataKind::Object | DataKind::List => {
        self.children.iter().map(|c| c.total_bytes_compact()).sum()
      },
      _ => self.dtype.total_bytes_compact(),
    }
  }

  /// The buffer extent needed to honor every leaf's absolute offset: the
  /// maximum of `offset + span` over the subtree.  Distinct from
  /// [`Schema::total_bytes`], which sums leaf extents and over-counts once
  /// offsets overlap a shared buffer.
  pub(crate) fn spanned_bytes(&self) -> IndexT {
    match self.dtype.kind() {
      DataKind::Object | DataKind::List => self
        .children
        .iter()
        .map(|c| c.spanned_bytes())
        .max()
        .unwrap_or(0),
      DataKind::Empty => 0,
      _ => self.dtype.total_bytes(),
    }
  }

  /// Rebuilds `dest` as an isomorphic schema with compact leaves, offsets
  /// assigned by depth-first traversal starting at zero.
  pub fn compact_to(&self, dest: &mut Schema) {
    dest.reset();
    self.compact_into(dest, 0);
  }

  fn compact_into(&self, dest: &mut Schema, cursor: IndexT) -> IndexT {
    match self.dtype.kind() {
      DataKind::Object | DataKind::List => {
        dest.dtype = self.dtype;
        dest.names = self.names.clone();
        let mut cursor = cursor;
        for child in &self.children {
          let mut dest_child = Schema::new();
          cursor = child.compact_into(&mut dest_child, cursor);
          dest.children.push(dest_child);
        }
        cursor
      },
      DataKind::Empty => cursor,
      _ => {
        dest.dtype = self.dtype.compacted(cursor);
        cursor + dest.dtype.total_bytes_compact()
      },
    }
  }

  /// Writes the JSON schema form into `out`.
  pub fn write_json(&self, out: &mut String) {
    match self.dtype.kind() {
      DataKind::Object => {
        out.push('{');
        for (i, child) in self.children.iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          // serde_json handles name escaping.
          out.push_str(
            &serde_json::to_string(&self.names[i]).unwrap_or_default(),
          );
          out.push(':');
          child.write_json(out);
        }
        out.push('}');
      },
      DataKind::List => {
        out.push('[');
        for (i, child) in self.children.iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          child.write_json(out);
        }
        out.push(']');
      },
      _ => self.dtype.write_json(out),
    }
  }

  /// The JSON schema form as an owned string.
  pub fn to_json(&self) -> String {
    let mut out = String::new();
    self.write_json(&mut out);
    out
  }

  /// Writes the JSON schema form to a file.
  pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConduitErr> {
    std::fs::write(path, self.to_json())?;
    Ok(())
  }

  /// Reads a schema from a file written by [`Schema::save`].
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Schema, ConduitErr> {
    let text = std::fs::read_to_string(path)?;
    Schema::from_json(&text)
  }
}

impl Display for Schema {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    f.write_str(&self.to_json())
  }
}

/// Lexically resolves `..` segments against the segments walked so far.
/// A leading `..` has no parent within the walk and fails.
pub(crate) fn normalize_path(
  path: &str,
) -> Result<SmallVec<[&str; 8]>, ConduitErr> {
  let mut segments: SmallVec<[&str; 8]> = SmallVec::new();
  for segment in split_path(path) {
    if segment == ".." {
      if segments.pop().is_none() {
        return Err(err!(
          debug,
          ConduitErr::PathNotFound { path: path.into() }
        ));
      }
    } else {
      segments.push(segment);
    }
  }
  Ok(segments)
}
