//! Typed set families.
//!
//! Every primitive kind gets four entry points, all thin wrappers over one
//! generic implementation per family:
//!
//! 1. scalar set -- `set_int32(v)`;
//! 2. slice set by value -- `set_int32_slice(&[v])`;
//! 3. pointer set -- `set_int32_ptr(..)`, copying from a strided source;
//! 4. external set -- `set_external_int32_ptr(..)`, borrowing the caller's
//!    buffer with no copy and no free.
//!
//! The copying families always produce a compact owned leaf; the external
//! family records the caller's layout verbatim.

use super::{Data, Node};
use crate::{
  dtype::{DataType, Element},
  endian::Endianness,
  error::ConduitErr,
  IndexT,
};
use core::mem::size_of;

/// Generates the named set family for one primitive kind.
macro_rules! gen_node_set {
  ($native:ident, $set:ident, $set_slice:ident, $set_ptr:ident,
   $set_external:ident) => {
    /// Replaces this node with a single-element leaf holding `value`.
    pub fn $set(&mut self, value: $native) {
      self.set_scalar(value)
    }

    /// Replaces this node with a compact leaf copied from `values`.
    pub fn $set_slice(&mut self, values: &[$native]) {
      self.set_slice(values)
    }

    /// Replaces this node with a compact leaf copied from the strided
    /// source described by
    /// `(src, num_elements, offset, stride, element_bytes, endianness)`.
    ///
    /// SAFETY: The described elements must be readable through `src`.
    pub unsafe fn $set_ptr(
      &mut self,
      src: *const $native,
      num_elements: IndexT,
      offset: IndexT,
      stride: IndexT,
      element_bytes: IndexT,
      endianness: Endianness,
    ) {
      self.set_strided(
        src,
        num_elements,
        offset,
        stride,
        element_bytes,
        endianness,
      )
    }

    /// Binds this node to the caller's strided buffer without copying.
    /// The caller keeps ownership and must outlive the node.
    ///
    /// SAFETY: The described elements must stay valid for reads and writes
    /// for the life of this node.
    pub unsafe fn $set_external(
      &mut self,
      base: *mut $native,
      num_elements: IndexT,
      offset: IndexT,
      stride: IndexT,
      element_bytes: IndexT,
      endianness: Endianness,
    ) -> Result<(), ConduitErr> {
      self.set_external_ptr(
        base,
        num_elements,
        offset,
        stride,
        element_bytes,
        endianness,
      )
    }
  };
}

impl Node {
  /// Replaces this node with a single-element compact leaf.
  pub fn set_scalar<T: Element>(&mut self, value: T) {
    let mut buf = vec![0u8; size_of::<T>()];
    value.write_ne_slice(&mut buf);
    self.replace_leaf(DataType::of::<T>(1), buf);
  }

  /// Replaces this node with a compact leaf copied from `values`.
  pub fn set_slice<T: Element>(&mut self, values: &[T]) {
    let width = size_of::<T>();
    let mut buf = vec![0u8; width * values.len()];
    for (i, value) in values.iter().enumerate() {
      value.write_ne_slice(&mut buf[i * width..]);
    }
    self.replace_leaf(DataType::of::<T>(values.len() as IndexT), buf);
  }

  /// Replaces this node with a compact leaf copied elementwise from a
  /// strided source.  The source's byte order is recorded on the new leaf;
  /// its `element_bytes` may exceed the kind's width, in which case only
  /// the kind's width is copied per element.
  ///
  /// SAFETY: Elements `offset + i * stride` for `i < num_elements` must be
  /// readable through `src`.
  pub unsafe fn set_strided<T: Element>(
    &mut self,
    src: *const T,
    num_elements: IndexT,
    offset: IndexT,
    stride: IndexT,
    element_bytes: IndexT,
    endianness: Endianness,
  ) {
    let width = size_of::<T>().min(element_bytes as usize);
    let n = num_elements as usize;
    let mut buf = vec![0u8; size_of::<T>() * n];
    let base = src as *const u8;
    for i in 0..n {
      let at = (offset + i as IndexT * stride) as usize;
      core::ptr::copy_nonoverlapping(
        base.add(at),
        buf[i * size_of::<T>()..].as_mut_ptr(),
        width,
      );
    }
    let mut dtype = DataType::of::<T>(num_elements);
    dtype.set_endianness(endianness);
    self.replace_leaf(dtype, buf);
  }

  /// Binds this node to a caller-owned strided buffer, recording the
  /// caller's layout verbatim.  No copy is made and the buffer is never
  /// freed by the node.
  ///
  /// SAFETY: The described elements must stay valid for reads and writes
  /// for the life of this node.
  pub unsafe fn set_external_ptr<T: Element>(
    &mut self,
    base: *mut T,
    num_elements: IndexT,
    offset: IndexT,
    stride: IndexT,
    element_bytes: IndexT,
    endianness: Endianness,
  ) -> Result<(), ConduitErr> {
    let dtype = DataType::new(
      T::KIND,
      num_elements,
      offset,
      stride,
      element_bytes,
      endianness,
    )?;
    self.children.clear();
    self.names.clear();
    self.dtype = dtype;
    self.data = Data::External {
      ptr: base as *mut u8,
      len: dtype.total_bytes() as usize,
    };
    Ok(())
  }

  /// Replaces this node with a `char8_str` leaf; the stored element count
  /// includes the trailing NUL.
  pub fn set_string(&mut self, value: &str) {
    let bytes = value.as_bytes();
    let mut buf = vec![0u8; bytes.len() + 1];
    buf[..bytes.len()].copy_from_slice(bytes);
    self.replace_leaf(
      DataType::char8_str((bytes.len() + 1) as IndexT),
      buf,
    );
  }

  /// Replaces this node with a deep copy of `other`.
  pub fn set(&mut self, other: &Node) {
    other.compact_to(self);
  }

  /// Navigates (or creates) `path`, then sets a scalar there.
  pub fn set_path<T: Element>(
    &mut self,
    path: &str,
    value: T,
  ) -> Result<(), ConduitErr> {
    self.path_target(path)?.set_scalar(value);
    Ok(())
  }

  /// Navigates (or creates) `path`, then sets a compact slice copy there.
  pub fn set_path_slice<T: Element>(
    &mut self,
    path: &str,
    values: &[T],
  ) -> Result<(), ConduitErr> {
    self.path_target(path)?.set_slice(values);
    Ok(())
  }

  /// Navigates (or creates) `path`, then sets a string there.
  pub fn set_path_string(
    &mut self,
    path: &str,
    value: &str,
  ) -> Result<(), ConduitErr> {
    self.path_target(path)?.set_string(value);
    Ok(())
  }

  /// Navigates (or creates) `path`, then binds caller memory there.
  ///
  /// SAFETY: As for [`Node::set_external_ptr`].
  pub unsafe fn set_path_external<T: Element>(
    &mut self,
    path: &str,
    base: *mut T,
    num_elements: IndexT,
    offset: IndexT,
    stride: IndexT,
    element_bytes: IndexT,
    endianness: Endianness,
  ) -> Result<(), ConduitErr> {
    self.path_target(path)?.set_external_ptr(
      base,
      num_elements,
      offset,
      stride,
      element_bytes,
      endianness,
    )
  }

  /// Path assignment coerces a leaf at the root to an object; plain
  /// fetches only coerce empties and refuse to walk through leaves.
  fn path_target(&mut self, path: &str) -> Result<&mut Node, ConduitErr> {
    if self.kind().is_leaf() {
      self.reset();
    }
    self.fetch(path)
  }

  fn replace_leaf(&mut self, dtype: DataType, buf: Vec<u8>) {
    self.children.clear();
    self.names.clear();
    self.dtype = dtype;
    self.data = Data::Owned(buf);
  }

  gen_node_set!(i8, set_int8, set_int8_slice, set_int8_ptr,
    set_external_int8_ptr);
  gen_node_set!(i16, set_int16, set_int16_slice, set_int16_ptr,
    set_external_int16_ptr);
  gen_node_set!(i32, set_int32, set_int32_slice, set_int32_ptr,
    set_external_int32_ptr);
  gen_node_set!(i64, set_int64, set_int64_slice, set_int64_ptr,
    set_external_int64_ptr);
  gen_node_set!(u8, set_uint8, set_uint8_slice, set_uint8_ptr,
    set_external_uint8_ptr);
  gen_node_set!(u16, set_uint16, set_uint16_slice, set_uint16_ptr,
    set_external_uint16_ptr);
  gen_node_set!(u32, set_uint32, set_uint32_slice, set_uint32_ptr,
    set_external_uint32_ptr);
  gen_node_set!(u64, set_uint64, set_uint64_slice, set_uint64_ptr,
    set_external_uint64_ptr);
  gen_node_set!(f32, set_float32, set_float32_slice, set_float32_ptr,
    set_external_float32_ptr);
  gen_node_set!(f64, set_float64, set_float64_slice, set_float64_ptr,
    set_external_float64_ptr);
}

impl<T: Element> From<T> for Node {
  fn from(value: T) -> Node {
    let mut node = Node::new();
    node.set_scalar(value);
    node
  }
}

impl<T: Element> From<&[T]> for Node {
  fn from(values: &[T]) -> Node {
    let mut node = Node::new();
    node.set_slice(values);
    node
  }
}

impl<T: Element> From<Vec<T>> for Node {
  fn from(values: Vec<T>) -> Node {
    let mut node = Node::new();
    node.set_slice(&values);
    node
  }
}

impl From<&str> for Node {
  fn from(value: &str) -> Node {
    let mut node = Node::new();
    node.set_string(value);
    node
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::dtype::DataKind;

  #[test]
  fn scalar_set_replaces_layout() {
    let mut n = Node::new();
    n.set_int32(42);
    assert_eq!(n.kind(), DataKind::Int32);
    assert_eq!(n.as_int32().unwrap(), 42);

    // A later set frees the old buffer and swaps kinds.
    n.set_float64(1.25);
    assert_eq!(n.kind(), DataKind::Float64);
    assert_eq!(n.as_float64().unwrap(), 1.25);
  }

  #[test]
  fn slice_set_is_compact() {
    let mut n = Node::new();
    n.set_uint16_slice(&[1, 2, 3]);
    assert!(n.dtype().is_compact());
    assert_eq!(n.total_bytes(), 6);
  }

  #[test]
  fn ptr_set_copies_strided_elements() {
    let src: [u32; 6] = [1, 2, 3, 4, 5, 6];
    let mut n = Node::new();
    unsafe {
      n.set_uint32_ptr(src.as_ptr(), 3, 0, 8, 4, Endianness::Default);
    }
    assert_eq!(n.as_uint32_array().unwrap().to_vec(), vec![1, 3, 5]);
    assert!(n.dtype().is_compact());
  }

  #[test]
  fn external_set_aliases_the_caller() {
    let mut backing: [u32; 3] = [7, 8, 9];
    let mut n = Node::new();
    unsafe {
      n.set_external_uint32_ptr(
        backing.as_mut_ptr(),
        3,
        0,
        4,
        4,
        Endianness::Default,
      )
      .unwrap();
    }
    // Writes through the node land in the caller's buffer.
    let mut patch = Node::new();
    patch.set_uint32_slice(&[70, 8, 9]);
    n.update(&patch).unwrap();
    assert_eq!(backing[0], 70);

    // Dropping the node leaves the buffer alone.
    drop(n);
    assert_eq!(backing, [70, 8, 9]);
  }

  #[test]
  fn string_set_counts_the_nul() {
    let mut n = Node::new();
    n.set_string("structured");
    assert_eq!(n.kind(), DataKind::Char8Str);
    assert_eq!(n.dtype().num_elements(), 11);
    assert_eq!(n.as_string().unwrap(), "structured");
  }

  #[test]
  fn path_assignment_coerces_a_leaf_root() {
    let mut n = Node::new();
    n.set_int32(5);
    n.set_path("a/b", 1.5f64).unwrap();
    assert_eq!(n.kind(), DataKind::Object);
    assert_eq!(n["a/b"].as_float64().unwrap(), 1.5);

    // A plain fetch refuses to walk through a leaf.
    let mut leaf = Node::new();
    leaf.set_int32(5);
    assert!(leaf.fetch("a").is_err());
  }

  #[test]
  fn from_impls_build_leaves() {
    let n = Node::from(3.5f64);
    assert_eq!(n.as_float64().unwrap(), 3.5);
    let n = Node::from(&[1i64, 2, 3][..]);
    assert_eq!(n.dtype().num_elements(), 3);
    let n = Node::from("abc");
    assert_eq!(n.as_string().unwrap(), "abc");
  }
}
