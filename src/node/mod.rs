//! The runtime value tree.  See [`Node`].
//!
//! A [`Node`] binds layout to memory: each node carries the
//! [`DataType`] describing itself, at most one byte buffer, and -- for
//! composites -- its children.  Buffers come in three ownership classes:
//!
//! - **alloced** -- the node owns the buffer and frees it on drop or rebind;
//! - **external** -- the node borrows caller memory and never frees it; the
//!   caller guarantees the allocation outlives the node;
//! - **mapped** -- the buffer came from a platform memory map and is
//!   released by dropping the map.
//!
//! Children of a schema-bound tree all carry the *base* pointer of the
//! root's buffer; a child's position is expressed entirely through its
//! descriptor's `offset`.  That convention is what lets
//! [`Node::info`] de-duplicate memory spaces by pointer, and it means a
//! buffer is never reallocated in place -- `set` operations replace a leaf's
//! buffer wholesale, and compaction rebuilds the tree over a fresh
//! allocation.
//!
//! A tree is single-writer: `Node` is `Send` (disjoint trees may live on
//! different threads) but not `Sync`.

mod get;
mod json;
mod set;

use crate::{
  dtype::{DataKind, DataType},
  endian::{swap16, swap32, swap64, Endianness},
  error::ConduitErr,
  generator::Generator,
  schema::{normalize_path, Schema},
  util::{to_hex_string, OkOrLog},
  IndexT,
};
use core::fmt::{Debug, Display, Formatter};
use std::path::Path;

/// The tri-state buffer behind a node.
pub(crate) enum Data {
  /// No buffer (empty nodes and composites built by hand).
  Empty,
  /// The node owns the allocation.
  Owned(Vec<u8>),
  /// Borrowed memory: the caller's buffer, or a view of an ancestor's.
  External { ptr: *mut u8, len: usize },
  /// A platform memory map, released on drop.
  #[cfg(feature = "mmap")]
  Mapped(memmap2::MmapMut),
}

impl Data {
  pub(crate) fn base_ptr(&self) -> Option<*mut u8> {
    match self {
      Data::Empty => None,
      Data::Owned(buf) => Some(buf.as_ptr() as *mut u8),
      Data::External { ptr, .. } => Some(*ptr),
      #[cfg(feature = "mmap")]
      Data::Mapped(map) => Some(map.as_ptr() as *mut u8),
    }
  }

  pub(crate) fn len(&self) -> usize {
    match self {
      Data::Empty => 0,
      Data::Owned(buf) => buf.len(),
      Data::External { len, .. } => *len,
      #[cfg(feature = "mmap")]
      Data::Mapped(map) => map.len(),
    }
  }
}

/// A hierarchical typed value: a leaf bound to memory, or a composite with
/// named (object) or positional (list) children.
///
/// ```
/// use conduit::Node;
///
/// let mut n = Node::new();
/// n.fetch("mesh/dims").unwrap().set_int32_slice(&[10, 20]);
/// n.fetch("mesh/origin").unwrap().set_float64(-1.5);
/// assert!(n.has_path("mesh/dims"));
/// assert_eq!(n["mesh/origin"].as_float64().unwrap(), -1.5);
/// ```
pub struct Node {
  dtype: DataType,
  data: Data,
  children: Vec<Node>,
  names: Vec<String>,
}

// SAFETY: A tree is single-writer (see the module docs); the raw pointers
// inside `Data::External` either belong to an ancestor in the same tree or
// to caller memory whose lifetime the caller guarantees.
unsafe impl Send for Node {}

impl Default for Node {
  fn default() -> Self {
    Node::new()
  }
}

impl Node {
  /// An empty node.
  pub fn new() -> Node {
    Node {
      dtype: DataType::empty(),
      data: Data::Empty,
      children: Vec::new(),
      names: Vec::new(),
    }
  }

  /// A leaf node with a zeroed owned buffer sized for `dtype`.
  pub fn from_dtype(dtype: DataType) -> Node {
    let mut node = Node::new();
    node.set_dtype(dtype);
    node
  }

  /// A node tree over a zeroed owned buffer laid out by `schema`.
  pub fn from_schema(schema: &Schema) -> Node {
    let mut buf = vec![0u8; schema.spanned_bytes() as usize];
    let ptr = buf.as_mut_ptr();
    let len = buf.len();
    let mut root = Node::bind(schema, ptr, len);
    root.data = Data::Owned(buf);
    root
  }

  /// A node tree walking caller-owned memory laid out by `schema`, without
  /// copying.
  ///
  /// SAFETY: `base` must stay valid for reads and writes over
  /// `schema.spanned_bytes()` bytes for the life of the returned tree, and
  /// must not be mutated through other aliases while the tree is in use.
  pub unsafe fn from_schema_external(schema: &Schema, base: *mut u8) -> Node {
    Node::bind(schema, base, schema.spanned_bytes() as usize)
  }

  /// A node tree over an owned byte vector laid out by `schema` -- the
  /// deserialization path for the `{schema, data}` persisted pair.
  pub fn from_schema_and_bytes(
    schema: &Schema,
    buf: Vec<u8>,
  ) -> Result<Node, ConduitErr> {
    let needed = schema.spanned_bytes() as usize;
    if buf.len() < needed {
      return Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!(
            "data holds {} bytes but the schema spans {}",
            buf.len(),
            needed
          ),
        }
      ));
    }
    let ptr = buf.as_ptr() as *mut u8;
    let len = buf.len();
    let mut root = Node::bind(schema, ptr, len);
    root.data = Data::Owned(buf);
    Ok(root)
  }

  /// Parses a node from a JSON text in the named protocol
  /// (`"conduit_json"`, `"json"`, or `"base64_json"`).
  pub fn parse(json: &str, protocol: &str) -> Result<Node, ConduitErr> {
    let generator = Generator::with_protocol(json, protocol)?;
    let mut node = Node::new();
    generator.walk(&mut node)?;
    Ok(node)
  }

  /// Builds the node structure for `schema` over `base`, every node
  /// carrying the base pointer and its own descriptor's offset.
  pub(crate) fn bind(schema: &Schema, base: *mut u8, len: usize) -> Node {
    let mut node = Node::new();
    node.dtype = *schema.dtype();
    if !node.dtype.kind().is_empty() {
      node.data = Data::External { ptr: base, len };
    }
    for child in schema.children() {
      node.children.push(Node::bind(child, base, len));
    }
    if schema.kind().is_object() {
      node.names = schema.names().to_vec();
    }
    node
  }

  //=== Accessors

  /// The descriptor for this node.
  pub fn dtype(&self) -> &DataType {
    &self.dtype
  }

  pub fn kind(&self) -> DataKind {
    self.dtype.kind()
  }

  /// Assembles the schema describing this subtree.
  pub fn schema(&self) -> Schema {
    let mut schema = Schema::from_dtype(self.dtype);
    for (i, child) in self.children.iter().enumerate() {
      let dest = match self.kind() {
        DataKind::Object => schema.fetch(&self.names[i]),
        _ => schema.append(),
      };
      // Both arms only fail on kind mismatches that cannot occur here.
      if let Ok(dest) = dest {
        dest.set(&child.schema());
      }
    }
    schema
  }

  pub fn number_of_children(&self) -> usize {
    self.children.len()
  }

  pub fn child(&self, i: usize) -> Result<&Node, ConduitErr> {
    self.children.get(i).ok_or_log(
      log::Level::Debug,
      ConduitErr::IndexOutOfRange {
        index: i,
        length: self.children.len(),
      },
    )
  }

  pub fn child_mut(&mut self, i: usize) -> Result<&mut Node, ConduitErr> {
    let length = self.children.len();
    self.children.get_mut(i).ok_or_log(
      log::Level::Debug,
      ConduitErr::IndexOutOfRange { index: i, length },
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

  pub fn child_index(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  //=== Path access

  /// Fetches a descendant by path, creating intermediate object nodes as
  /// needed; an empty node is first coerced to an object.
  pub fn fetch(&mut self, path: &str) -> Result<&mut Node, ConduitErr> {
    let segments = normalize_path(path)?;
    let mut here = self;
    for segment in segments {
      if here.kind().is_empty() {
        here.dtype = DataType::object();
      }
      if !here.kind().is_object() {
        return Err(err!(
          debug,
          ConduitErr::PathNotFound {
            path: format!("{} (parent is {})", path, here.kind()),
          }
        ));
      }
      let index = match here.child_index(segment) {
        Some(index) => index,
        None => {
          here.names.push(segment.to_string());
          here.children.push(Node::new());
          here.children.len() - 1
        },
      };
      here = &mut here.children[index];
    }
    Ok(here)
  }

  /// The non-creating variant of [`Node::fetch`].
  pub fn fetch_ptr(&self, path: &str) -> Result<&Node, ConduitErr> {
    let segments = normalize_path(path)?;
    let mut here = self;
    for segment in segments {
      if !here.kind().is_object() {
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

  pub fn has_path(&self, path: &str) -> bool {
    self.fetch_ptr(path).is_ok()
  }

  /// Collects child paths; see [`Schema::paths`].
  pub fn paths(&self, out: &mut Vec<String>, expand: bool) {
    for (i, child) in self.children.iter().enumerate() {
      let name = match self.kind() {
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

  /// Appends a new empty child, coercing an empty node to a list.
  pub fn append(&mut self) -> Result<&mut Node, ConduitErr> {
    match self.kind() {
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
    self.children.push(Node::new());
    Ok(self.children.last_mut().unwrap())
  }

  /// Removes the `i`-th child, tearing its subtree (and any owned buffers)
  /// down.
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
    // The subtree drops before its name leaves the table.
    self.children.remove(i);
    if self.kind().is_object() {
      self.names.remove(i);
    }
    Ok(())
  }

  /// Removes the object child called `name`.
  pub fn remove_by_name(&mut self, name: &str) -> Result<(), ConduitErr> {
    if !self.kind().is_object() {
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

  /// Releases the node back to empty, freeing any owned buffer and
  /// cascading through the children.
  pub fn reset(&mut self) {
    *self = Node::new();
  }

  //=== Sizing

  pub fn total_bytes(&self) -> IndexT {
    match self.kind() {
      DataKind::Object | DataKind::List => {
        self.children.iter().map(|c| c.total_bytes()).sum()
      },
      _ => self.dtype.total_bytes(),
    }
  }

  pub fn total_bytes_compact(&self) -> IndexT {
    match self.kind() {
      DataKind::Object | DataKind::List => {
        self.children.iter().map(|c| c.total_bytes_compact()).sum()
      },
      _ => self.dtype.total_bytes_compact(),
    }
  }

  /// `true` iff every leaf in the subtree is compact.
  pub fn is_compact(&self) -> bool {
    match self.kind() {
      DataKind::Object | DataKind::List => {
        self.children.iter().all(|c| c.is_compact())
      },
      _ => self.dtype.is_compact(),
    }
  }

  //=== Raw data plumbing

  pub(crate) fn base_ptr(&self) -> Option<*mut u8> {
    self.data.base_ptr()
  }

  /// The address of element `i` through the leaf descriptor.
  ///
  /// Callers must have checked that the node holds data.
  pub(crate) fn element_ptr(&self, i: usize) -> *mut u8 {
    let base = self.base_ptr().unwrap_or(core::ptr::null_mut());
    debug_assert!(!base.is_null());
    let at = self.dtype.element_index(i as IndexT) as usize;
    debug_assert!(
      at + self.dtype.element_bytes() as usize <= self.data.len(),
      "element {} escapes the buffer",
      i
    );
    // SAFETY: In bounds per the descriptor invariants checked above.
    unsafe { base.add(at) }
  }

  /// Replaces this node with a leaf of `dtype` over a zeroed owned buffer.
  pub(crate) fn set_dtype(&mut self, dtype: DataType) {
    self.children.clear();
    self.names.clear();
    self.dtype = dtype;
    if dtype.kind().is_leaf() {
      self.data = Data::Owned(vec![0u8; dtype.total_bytes() as usize]);
    } else {
      self.data = Data::Empty;
    }
  }

  //=== Update

  /// Merges `src` into this node.
  ///
  /// Objects merge per name (missing children are created); lists merge
  /// child-by-child with the remainder appended as deep copies; leaves
  /// overwrite in place when layouts allow it and otherwise replace this
  /// node with a compacted copy of `src`.
  pub fn update(&mut self, src: &Node) -> Result<(), ConduitErr> {
    match src.kind() {
      DataKind::Empty => Ok(()),
      DataKind::Object => {
        for i in 0..src.children.len() {
          self.fetch(&src.names[i])?.update(&src.children[i])?;
        }
        Ok(())
      },
      DataKind::List => {
        let mut idx = 0;
        if self.kind().is_list() {
          while idx < self.children.len() && idx < src.children.len() {
            self.children[idx].update(&src.children[idx])?;
            idx += 1;
          }
        } else if !self.kind().is_empty() {
          // Anything else merges as if it had zero list children.
          self.reset();
        }
        for i in idx..src.children.len() {
          self.append()?.update(&src.children[i])?;
        }
        Ok(())
      },
      _ => {
        self.update_leaf(src);
        Ok(())
      },
    }
  }

  fn update_leaf(&mut self, src: &Node) {
    if self.base_ptr().is_none() || src.base_ptr().is_none() {
      src.compact_to(self);
      return;
    }
    let n_src = src.dtype.num_elements() as usize;
    if self.dtype.is_compatible(&src.dtype) {
      if self.dtype.stride() == src.dtype.stride() {
        let span = leaf_span_bytes(&self.dtype);
        // SAFETY: Both regions were sized by the same descriptor fields.
        unsafe {
          core::ptr::copy_nonoverlapping(
            src.element_ptr(0),
            self.element_ptr(0),
            span,
          );
        }
      } else {
        let width = self.dtype.element_bytes() as usize;
        for i in 0..n_src {
          unsafe {
            core::ptr::copy_nonoverlapping(
              src.element_ptr(i),
              self.element_ptr(i),
              width,
            );
          }
        }
      }
    } else if self.kind() == src.kind()
      && self.dtype.num_elements() >= src.dtype.num_elements()
    {
      let width = self
        .dtype
        .element_bytes()
        .min(src.dtype.element_bytes()) as usize;
      for i in 0..n_src {
        unsafe {
          core::ptr::copy_nonoverlapping(
            src.element_ptr(i),
            self.element_ptr(i),
            width,
          );
        }
      }
    } else {
      src.compact_to(self);
    }
  }

  //=== Serialization & compaction

  /// Writes every leaf's elements in depth-first, left-to-right order into
  /// a buffer of exactly [`Node::total_bytes_compact`] bytes.
  pub fn serialize(&self, out: &mut Vec<u8>) {
    out.clear();
    out.resize(self.total_bytes_compact() as usize, 0);
    let mut cursor = 0usize;
    self.serialize_into(out, &mut cursor);
  }

  pub(crate) fn serialize_into(&self, out: &mut [u8], cursor: &mut usize) {
    match self.kind() {
      DataKind::Object | DataKind::List => {
        for child in &self.children {
          child.serialize_into(out, cursor);
        }
      },
      DataKind::Empty => {},
      _ => {
        let n = self.dtype.num_elements() as usize;
        let width = self.dtype.kind().default_bytes() as usize;
        if self.base_ptr().is_none() || n == 0 {
          return;
        }
        if self.dtype.is_compact() {
          let span = n * width;
          unsafe {
            core::ptr::copy_nonoverlapping(
              self.element_ptr(0),
              out[*cursor..*cursor + span].as_mut_ptr(),
              span,
            );
          }
          *cursor += span;
        } else {
          for i in 0..n {
            unsafe {
              core::ptr::copy_nonoverlapping(
                self.element_ptr(i),
                out[*cursor..*cursor + width].as_mut_ptr(),
                width,
              );
            }
            *cursor += width;
          }
        }
      },
    }
  }

  /// Rebuilds `dest` as a dense copy of this tree: one fresh contiguous
  /// buffer of [`Node::total_bytes_compact`] bytes, a compacted layout, and
  /// child nodes rebound to views into it.
  pub fn compact_to(&self, dest: &mut Node) {
    dest.reset();
    if self.kind().is_empty() {
      return;
    }
    let mut buf = vec![0u8; self.total_bytes_compact() as usize];
    let mut cursor = 0usize;
    self.serialize_into(&mut buf, &mut cursor);
    let ptr = buf.as_mut_ptr();
    let len = buf.len();
    let mut offset: IndexT = 0;
    *dest = self.compact_bind(ptr, len, &mut offset);
    dest.data = Data::Owned(buf);
  }

  /// Compacts in place through a temporary tree.
  pub fn compact(&mut self) {
    let mut dense = Node::new();
    self.compact_to(&mut dense);
    *self = dense;
  }

  fn compact_bind(
    &self,
    base: *mut u8,
    len: usize,
    cursor: &mut IndexT,
  ) -> Node {
    let mut node = Node::new();
    match self.kind() {
      DataKind::Empty => {},
      DataKind::Object | DataKind::List => {
        node.dtype = self.dtype;
        node.data = Data::External { ptr: base, len };
        node.names = self.names.clone();
        for child in &self.children {
          node.children.push(child.compact_bind(base, len, cursor));
        }
      },
      _ => {
        node.dtype = self.dtype.compacted(*cursor);
        *cursor += node.dtype.total_bytes_compact();
        node.data = Data::External { ptr: base, len };
      },
    }
    node
  }

  //=== Endianness

  /// Rewrites every numeric leaf to `target` byte order and records the
  /// resolved target on each leaf's descriptor.
  pub fn endian_swap(&mut self, target: Endianness) {
    match self.kind() {
      DataKind::Object | DataKind::List => {
        for child in &mut self.children {
          child.endian_swap(target);
        }
      },
      DataKind::Empty => {},
      _ => {
        let src = self.dtype.endianness().resolved();
        let dst = target.resolved();
        if src != dst && self.base_ptr().is_some() {
          // Swaps always use the kind's default width.
          let width = self.dtype.kind().default_bytes() as usize;
          let n = self.dtype.num_elements() as usize;
          for i in 0..n {
            // SAFETY: In bounds per the descriptor invariants.
            let bytes = unsafe {
              core::slice::from_raw_parts_mut(self.element_ptr(i), width)
            };
            match width {
              2 => swap16(bytes),
              4 => swap32(bytes),
              8 => swap64(bytes),
              _ => {},
            }
          }
        }
        self.dtype.set_endianness(dst);
      },
    }
  }

  //=== Info

  /// Fills `out` with a report of this subtree's memory footprint: a
  /// `mem_spaces` map keyed by pointer with `{path, type, bytes}` entries,
  /// plus `total_bytes`, `total_bytes_compact`, `total_bytes_alloced`, and
  /// `total_bytes_mmaped`.
  pub fn info(&self, out: &mut Node) -> Result<(), ConduitErr> {
    out.reset();
    self.info_walk(out, "")?;

    let mut tb_alloc: u64 = 0;
    let mut tb_mmap: u64 = 0;
    if let Ok(spaces) = out.fetch_ptr("mem_spaces") {
      for space in &spaces.children {
        let mtype = space.fetch_ptr("type")?.as_string()?;
        if mtype == "alloced" {
          tb_alloc += space.fetch_ptr("bytes")?.as_uint64()?;
        } else if mtype == "mmap" {
          tb_mmap += space.fetch_ptr("bytes")?.as_uint64()?;
        }
      }
    }
    out.fetch("total_bytes")?.set_uint64(self.total_bytes() as u64);
    out
      .fetch("total_bytes_compact")?
      .set_uint64(self.total_bytes_compact() as u64);
    out.fetch("total_bytes_alloced")?.set_uint64(tb_alloc);
    out.fetch("total_bytes_mmaped")?.set_uint64(tb_mmap);
    Ok(())
  }

  fn info_walk(&self, out: &mut Node, path: &str) -> Result<(), ConduitErr> {
    if let Some(ptr) = self.base_ptr() {
      let key = to_hex_string(ptr);
      let spaces = out.fetch("mem_spaces")?;
      if spaces.child_index(&key).is_none() {
        let entry = spaces.fetch(&key)?;
        entry.fetch("path")?.set_string(path);
        match &self.data {
          Data::Owned(buf) => {
            entry.fetch("type")?.set_string("alloced");
            let len = buf.len() as u64;
            entry.fetch("bytes")?.set_uint64(len);
          },
          #[cfg(feature = "mmap")]
          Data::Mapped(map) => {
            entry.fetch("type")?.set_string("mmap");
            let len = map.len() as u64;
            entry.fetch("bytes")?.set_uint64(len);
          },
          Data::External { .. } => {
            entry.fetch("type")?.set_string("external");
          },
          Data::Empty => {},
        }
      }
    }
    for (i, child) in self.children.iter().enumerate() {
      let child_path = match self.kind() {
        DataKind::Object => {
          if path.is_empty() {
            self.names[i].clone()
          } else {
            format!("{}/{}", path, self.names[i])
          }
        },
        _ => format!("{}[{}]", path, i),
      };
      child.info_walk(out, &child_path)?;
    }
    Ok(())
  }

  //=== Structural comparison

  /// `true` iff the two trees have the same structure (kinds, names,
  /// element counts) and their leaves serialize to the same bytes.
  pub fn equals(&self, other: &Node) -> bool {
    if !structure_eq(self, other) {
      return false;
    }
    let mut a = Vec::new();
    let mut b = Vec::new();
    self.serialize(&mut a);
    other.serialize(&mut b);
    a == b
  }

  //=== Files

  /// Persists the tree as the `{schema, data}` pair
  /// `<path>.conduit_json` / `<path>.conduit_bin`.
  pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConduitErr> {
    let mut dense = Node::new();
    self.compact_to(&mut dense);
    let base = path.as_ref().display();
    std::fs::write(
      format!("{}.conduit_json", base),
      dense.schema().to_json(),
    )?;
    let mut bytes = Vec::new();
    dense.serialize(&mut bytes);
    std::fs::write(format!("{}.conduit_bin", base), bytes)?;
    Ok(())
  }

  /// Loads a tree persisted by [`Node::save`], copying the data into an
  /// owned buffer.
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Node, ConduitErr> {
    let base = path.as_ref().display().to_string();
    let schema =
      Schema::from_json(&std::fs::read_to_string(format!(
        "{}.conduit_json",
        base
      ))?)?;
    let bytes = std::fs::read(format!("{}.conduit_bin", base))?;
    Node::from_schema_and_bytes(&schema, bytes)
  }

  /// Maps the data file of a pair persisted by [`Node::save`] read-write
  /// and walks it without copying; the map is released when the tree
  /// drops.
  #[cfg(feature = "mmap")]
  pub fn mmap<P: AsRef<Path>>(path: P) -> Result<Node, ConduitErr> {
    let base = path.as_ref().display().to_string();
    let schema =
      Schema::from_json(&std::fs::read_to_string(format!(
        "{}.conduit_json",
        base
      ))?)?;
    let file = std::fs::OpenOptions::new()
      .read(true)
      .write(true)
      .open(format!("{}.conduit_bin", base))?;
    // SAFETY: The map stays private to this tree; the single-writer
    // discipline of the tree extends to the mapped file.
    let mut map = unsafe { memmap2::MmapMut::map_mut(&file)? };
    let needed = schema.spanned_bytes() as usize;
    if map.len() < needed {
      return Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!(
            "mapped file holds {} bytes but the schema spans {}",
            map.len(),
            needed
          ),
        }
      ));
    }
    let ptr = map.as_mut_ptr();
    let len = map.len();
    let mut root = Node::bind(&schema, ptr, len);
    root.data = Data::Mapped(map);
    Ok(root)
  }
}

impl Clone for Node {
  /// Deep copy via compaction.
  fn clone(&self) -> Node {
    let mut out = Node::new();
    self.compact_to(&mut out);
    out
  }
}

impl Debug for Node {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    let mut d = f.debug_struct("Node");
    d.field("dtype", &self.dtype);
    if let Some(ptr) = self.base_ptr() {
      d.field("data", &ptr);
    }
    if !self.children.is_empty() {
      d.field("children", &self.children);
    }
    d.finish()
  }
}

impl Display for Node {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self.to_json("json", 2, 0, "", "\n") {
      Ok(text) => f.write_str(&text),
      Err(_) => Err(core::fmt::Error),
    }
  }
}

impl core::ops::Index<&str> for Node {
  type Output = Node;

  /// Non-creating path lookup.
  ///
  /// # Panics
  ///
  /// Panics when the path does not resolve; use [`Node::fetch_ptr`] for a
  /// fallible lookup.
  fn index(&self, path: &str) -> &Node {
    match self.fetch_ptr(path) {
      Ok(node) => node,
      Err(err) => panic!("{}", err),
    }
  }
}

impl core::ops::IndexMut<&str> for Node {
  /// Creating path lookup.
  ///
  /// # Panics
  ///
  /// Panics when the path walks through a leaf; use [`Node::fetch`] for a
  /// fallible lookup.
  fn index_mut(&mut self, path: &str) -> &mut Node {
    match self.fetch(path) {
      Ok(node) => node,
      Err(err) => panic!("{}", err),
    }
  }
}

impl core::ops::Index<usize> for Node {
  type Output = Node;

  /// Positional child access; panics out of range.
  fn index(&self, i: usize) -> &Node {
    match self.child(i) {
      Ok(node) => node,
      Err(err) => panic!("{}", err),
    }
  }
}

impl core::ops::IndexMut<usize> for Node {
  fn index_mut(&mut self, i: usize) -> &mut Node {
    match self.child_mut(i) {
      Ok(node) => node,
      Err(err) => panic!("{}", err),
    }
  }
}

/// The bytes between element 0 and the end of the last element.
pub(crate) fn leaf_span_bytes(dtype: &DataType) -> usize {
  let n = dtype.num_elements();
  if n == 0 {
    return 0;
  }
  ((n - 1) * dtype.stride() + dtype.element_bytes()) as usize
}

fn structure_eq(a: &Node, b: &Node) -> bool {
  if a.kind() != b.kind() {
    return false;
  }
  if a.kind().is_leaf() {
    return a.dtype.num_elements() == b.dtype.num_elements();
  }
  if a.children.len() != b.children.len() || a.names != b.names {
    return false;
  }
  a.children
    .iter()
    .zip(b.children.iter())
    .all(|(x, y)| structure_eq(x, y))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn fetch_creates_nested_objects() {
    let mut n = Node::new();
    n.fetch("a/b/c").unwrap();
    assert!(n.has_path("a/b/c"));
    assert_eq!(n.kind(), DataKind::Object);
    assert_eq!(n["a"].number_of_children(), 1);
  }

  #[test]
  fn from_schema_binds_children_to_one_buffer() {
    let mut s = Schema::new();
    s.fetch("a").unwrap().set_dtype(DataType::int32(1));
    s.fetch("b").unwrap().set_dtype(DataType::float64(2));
    let mut dense = Schema::new();
    s.compact_to(&mut dense);

    let n = Node::from_schema(&dense);
    let base = n.base_ptr().unwrap();
    assert_eq!(n["a"].base_ptr().unwrap(), base);
    assert_eq!(n["b"].base_ptr().unwrap(), base);
    assert_eq!(n["a"].as_int32().unwrap(), 0);
    assert_eq!(n.total_bytes_compact(), 20);
  }

  #[test]
  fn update_merges_objects() {
    let mut a = Node::new();
    a.fetch("x").unwrap().set_int32(1);
    a.fetch("y").unwrap().set_int32(2);

    let mut b = Node::new();
    b.fetch("y").unwrap().set_int32(20);
    b.fetch("z").unwrap().set_int32(30);

    a.update(&b).unwrap();
    assert_eq!(a["x"].as_int32().unwrap(), 1);
    assert_eq!(a["y"].as_int32().unwrap(), 20);
    assert_eq!(a["z"].as_int32().unwrap(), 30);
  }

  #[test]
  fn update_merges_lists_by_position() {
    let mut a = Node::new();
    a.append().unwrap().set_int32(1);
    a.append().unwrap().set_int32(2);

    let mut b = Node::new();
    b.append().unwrap().set_int32(10);
    b.append().unwrap().set_int32(20);
    b.append().unwrap().set_int32(30);

    a.update(&b).unwrap();
    assert_eq!(a.number_of_children(), 3);
    assert_eq!(a[2].as_int32().unwrap(), 30);
  }

  #[test]
  fn update_overwrites_compatible_leaves_in_place() {
    let mut a = Node::new();
    a.set_int32_slice(&[1, 2, 3]);
    let ptr_before = a.base_ptr().unwrap();

    let mut b = Node::new();
    b.set_int32_slice(&[7, 8, 9]);
    a.update(&b).unwrap();
    assert_eq!(a.base_ptr().unwrap(), ptr_before);
    assert_eq!(a.as_int32_array().unwrap().to_vec(), vec![7, 8, 9]);
  }

  #[test]
  fn remove_by_index_and_name() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(1);
    n.fetch("b").unwrap().set_int32(2);
    n.remove_by_name("a").unwrap();
    assert!(!n.has_path("a"));
    assert!(n.has_path("b"));
    assert!(n.remove(5).is_err());
  }

  #[test]
  fn compact_to_is_idempotent() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(7);
    n.fetch("b").unwrap().set_float64_slice(&[1.5, 2.5]);

    let mut once = Node::new();
    n.compact_to(&mut once);
    let mut twice = Node::new();
    once.compact_to(&mut twice);
    assert!(once.equals(&twice));
    assert!(once.is_compact());
  }

  #[test]
  fn serialize_layout_is_depth_first() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(7);
    n.fetch("b").unwrap().set_float64_slice(&[1.5, 2.5]);
    assert_eq!(n.total_bytes_compact(), 20);

    let mut bytes = Vec::new();
    n.serialize(&mut bytes);
    assert_eq!(bytes.len(), 20);
    assert_eq!(&bytes[0..4], &7i32.to_ne_bytes());
    assert_eq!(&bytes[4..12], &1.5f64.to_ne_bytes());
    assert_eq!(&bytes[12..20], &2.5f64.to_ne_bytes());
  }

  #[test]
  fn endian_swap_is_physical() {
    // Swapping to the non-host order must flip the stored bytes.
    let other = match Endianness::machine_default() {
      Endianness::Big => Endianness::Little,
      _ => Endianness::Big,
    };
    let mut n = Node::new();
    n.set_uint32(0x0102_0304);
    n.endian_swap(other);
    assert_eq!(n.as_uint32().unwrap(), 0x0403_0201);
    assert_eq!(n.dtype().endianness(), other);

    // Swapping back restores the value.
    n.endian_swap(Endianness::Default);
    assert_eq!(n.as_uint32().unwrap(), 0x0102_0304);
  }

  #[test]
  fn info_reports_memory_spaces() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32_slice(&[1, 2, 3]);
    n.fetch("b").unwrap().set_float64(2.5);

    let mut report = Node::new();
    n.info(&mut report).unwrap();
    assert!(report.has_path("mem_spaces"));
    assert_eq!(report["total_bytes"].as_uint64().unwrap(), 20);
    assert_eq!(report["total_bytes_compact"].as_uint64().unwrap(), 20);
    assert_eq!(report["total_bytes_alloced"].as_uint64().unwrap(), 20);
    assert_eq!(report["total_bytes_mmaped"].as_uint64().unwrap(), 0);
  }

  #[test]
  fn clone_deep_copies() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(5);
    let copy = n.clone();
    assert!(copy.equals(&n));
    assert_ne!(copy["a"].base_ptr(), n["a"].base_ptr());
  }
}
