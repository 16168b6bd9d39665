//! Strict and coercing read families.
//!
//! Three strict families per primitive kind, each failing with
//! `TypeMismatch` unless the leaf's kind matches exactly:
//!
//! 1. `as_int32()` -- scalar from element 0;
//! 2. `as_int32_ptr()` -- a typed pointer to element 0 (the stored stride
//!    still governs element placement);
//! 3. `as_int32_array()` -- a [`DataArray`] strided view.
//!
//! The coercing family `to_int32()` / `to_int32_array(dest)` converts
//! across numeric kinds with elementwise C-style casts; string and
//! composite sources fail with `ConversionError`.

use super::Node;
use crate::{
  array::DataArray,
  dtype::{DataKind, DataType, Element, Scalar},
  error::ConduitErr,
  IndexT,
};
use core::mem::size_of;

/// Generates the named read family for one primitive kind.
macro_rules! gen_node_get {
  ($native:ident, $as:ident, $as_ptr:ident, $as_array:ident, $to:ident,
   $to_array:ident) => {
    /// Strict scalar read of element 0.
    pub fn $as(&self) -> Result<$native, ConduitErr> {
      self.as_scalar()
    }

    /// Strict typed pointer to element 0.
    pub fn $as_ptr(&self) -> Result<*mut $native, ConduitErr> {
      self.as_element_ptr()
    }

    /// Strict strided view over the leaf.
    pub fn $as_array(&self) -> Result<DataArray<'_, $native>, ConduitErr> {
      self.as_array()
    }

    /// Coercing scalar read of element 0.
    pub fn $to(&self) -> Result<$native, ConduitErr> {
      self.to_scalar()
    }

    /// Coercing elementwise conversion into `dest`, which becomes a
    /// compact leaf of this kind.
    pub fn $to_array(&self, dest: &mut Node) -> Result<(), ConduitErr> {
      self.to_array_into::<$native>(dest)
    }
  };
}

impl Node {
  fn leaf_check<T: Element>(&self) -> Result<(), ConduitErr> {
    if self.kind() != T::KIND {
      return Err(err!(
        debug,
        ConduitErr::TypeMismatch {
          expected: T::KIND,
          observed: self.kind(),
        }
      ));
    }
    if self.base_ptr().is_none() || self.dtype().num_elements() == 0 {
      return Err(err!(
        debug,
        ConduitErr::IndexOutOfRange {
          index: 0,
          length: 0,
        }
      ));
    }
    Ok(())
  }

  /// Reads element `i` of a leaf already known to hold `T`.
  pub(crate) fn read_element<T: Element>(&self, i: usize) -> T {
    // SAFETY: Callers check the kind and bounds; the read is an unaligned
    // byte copy.
    unsafe {
      let bytes =
        core::slice::from_raw_parts(self.element_ptr(i), size_of::<T>());
      T::from_ne_slice(bytes)
    }
  }

  /// Writes element `i` of a leaf already known to hold `T`.
  pub(crate) fn write_element<T: Element>(&mut self, i: usize, value: T) {
    // SAFETY: As for `read_element`.
    unsafe {
      let bytes =
        core::slice::from_raw_parts_mut(self.element_ptr(i), size_of::<T>());
      value.write_ne_slice(bytes);
    }
  }

  /// Strict scalar read of element 0.
  pub fn as_scalar<T: Element>(&self) -> Result<T, ConduitErr> {
    self.leaf_check::<T>()?;
    Ok(self.read_element(0))
  }

  /// Strict typed pointer to element 0.  The stored stride still governs
  /// where later elements live; prefer [`Node::as_array`] unless the raw
  /// pointer is genuinely needed.
  pub fn as_element_ptr<T: Element>(&self) -> Result<*mut T, ConduitErr> {
    self.leaf_check::<T>()?;
    Ok(self.element_ptr(0) as *mut T)
  }

  /// Strict strided view over the leaf.
  pub fn as_array<T: Element>(&self) -> Result<DataArray<'_, T>, ConduitErr> {
    if self.kind() != T::KIND {
      return Err(err!(
        debug,
        ConduitErr::TypeMismatch {
          expected: T::KIND,
          observed: self.kind(),
        }
      ));
    }
    let base = self.base_ptr().ok_or(ConduitErr::TypeMismatch {
      expected: T::KIND,
      observed: DataKind::Empty,
    })?;
    // SAFETY: The buffer outlives the returned borrow of `self`, and the
    // leaf's descriptor was validated when it was set.
    unsafe { Ok(DataArray::new(base, *self.dtype())) }
  }

  /// Reads element `i` of any numeric leaf into the scalar class, or
  /// `None` for non-numeric kinds and missing data.
  pub(crate) fn scalar_at(&self, i: usize) -> Option<Scalar> {
    if self.base_ptr().is_none()
      || i >= self.dtype().num_elements() as usize
    {
      return None;
    }
    let scalar = match self.kind() {
      DataKind::Int8 => self.read_element::<i8>(i).to_scalar(),
      DataKind::Int16 => self.read_element::<i16>(i).to_scalar(),
      DataKind::Int32 => self.read_element::<i32>(i).to_scalar(),
      DataKind::Int64 => self.read_element::<i64>(i).to_scalar(),
      DataKind::UInt8 => self.read_element::<u8>(i).to_scalar(),
      DataKind::UInt16 => self.read_element::<u16>(i).to_scalar(),
      DataKind::UInt32 => self.read_element::<u32>(i).to_scalar(),
      DataKind::UInt64 => self.read_element::<u64>(i).to_scalar(),
      DataKind::Float32 => self.read_element::<f32>(i).to_scalar(),
      DataKind::Float64 => self.read_element::<f64>(i).to_scalar(),
      _ => return None,
    };
    Some(scalar)
  }

  /// Coercing scalar read: element 0 cast elementwise to `T`.
  pub fn to_scalar<T: Element>(&self) -> Result<T, ConduitErr> {
    let scalar = self.scalar_at(0).ok_or_else(|| {
      err!(
        debug,
        ConduitErr::ConversionError {
          from: self.kind(),
          to: T::KIND,
        }
      )
    })?;
    Ok(T::from_scalar(scalar))
  }

  /// Coercing elementwise conversion: `dest` becomes a compact leaf of
  /// `T` with this leaf's element count.
  pub fn to_array_into<T: Element>(
    &self,
    dest: &mut Node,
  ) -> Result<(), ConduitErr> {
    if !self.kind().is_number() || self.base_ptr().is_none() {
      return Err(err!(
        debug,
        ConduitErr::ConversionError {
          from: self.kind(),
          to: T::KIND,
        }
      ));
    }
    let n = self.dtype().num_elements() as usize;
    dest.set_dtype(DataType::of::<T>(n as IndexT));
    for i in 0..n {
      // scalar_at cannot miss: the kind and bounds were just checked.
      if let Some(scalar) = self.scalar_at(i) {
        dest.write_element(i, T::from_scalar(scalar));
      }
    }
    Ok(())
  }

  /// Strict borrowed read of a `char8_str` leaf, up to its first NUL.
  pub fn as_char8_str(&self) -> Result<&str, ConduitErr> {
    if self.kind() != DataKind::Char8Str {
      return Err(err!(
        debug,
        ConduitErr::TypeMismatch {
          expected: DataKind::Char8Str,
          observed: self.kind(),
        }
      ));
    }
    let n = self.dtype().num_elements() as usize;
    if n == 0 || self.base_ptr().is_none() {
      return Ok("");
    }
    // SAFETY: `char8_str` elements are contiguous bytes; bounds were
    // validated when the leaf was set.
    let bytes =
      unsafe { core::slice::from_raw_parts(self.element_ptr(0), n) };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(core::str::from_utf8(&bytes[..end])?)
  }

  /// Strict owned read of a `char8_str` leaf.
  pub fn as_string(&self) -> Result<String, ConduitErr> {
    Ok(self.as_char8_str()?.to_string())
  }

  gen_node_get!(i8, as_int8, as_int8_ptr, as_int8_array, to_int8,
    to_int8_array);
  gen_node_get!(i16, as_int16, as_int16_ptr, as_int16_array, to_int16,
    to_int16_array);
  gen_node_get!(i32, as_int32, as_int32_ptr, as_int32_array, to_int32,
    to_int32_array);
  gen_node_get!(i64, as_int64, as_int64_ptr, as_int64_array, to_int64,
    to_int64_array);
  gen_node_get!(u8, as_uint8, as_uint8_ptr, as_uint8_array, to_uint8,
    to_uint8_array);
  gen_node_get!(u16, as_uint16, as_uint16_ptr, as_uint16_array, to_uint16,
    to_uint16_array);
  gen_node_get!(u32, as_uint32, as_uint32_ptr, as_uint32_array, to_uint32,
    to_uint32_array);
  gen_node_get!(u64, as_uint64, as_uint64_ptr, as_uint64_array, to_uint64,
    to_uint64_array);
  gen_node_get!(f32, as_float32, as_float32_ptr, as_float32_array,
    to_float32, to_float32_array);
  gen_node_get!(f64, as_float64, as_float64_ptr, as_float64_array,
    to_float64, to_float64_array);
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn strict_reads_require_an_exact_kind() {
    let mut n = Node::new();
    n.set_float64(3.7);
    assert_eq!(n.as_float64().unwrap(), 3.7);
    assert!(matches!(
      n.as_int32(),
      Err(ConduitErr::TypeMismatch { .. })
    ));
  }

  #[test]
  fn coercion_casts_like_c() {
    let mut n = Node::new();
    n.set_float64(3.7);
    assert_eq!(n.to_int32().unwrap(), 3);
    assert_eq!(n.to_uint8().unwrap(), 3);
    assert_eq!(n.to_float32().unwrap(), 3.7f32);

    n.set_int16(-2);
    assert_eq!(n.to_float64().unwrap(), -2.0);
    assert_eq!(n.to_int64().unwrap(), -2);
  }

  #[test]
  fn strict_equals_coercing_on_matching_kind() {
    let mut n = Node::new();
    n.set_uint32(77);
    assert_eq!(n.as_uint32().unwrap(), n.to_uint32().unwrap());
  }

  #[test]
  fn composite_and_string_coercions_fail() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(1);
    assert!(matches!(
      n.to_int32(),
      Err(ConduitErr::ConversionError { .. })
    ));

    n.set_string("12");
    assert!(matches!(
      n.to_int32(),
      Err(ConduitErr::ConversionError { .. })
    ));
  }

  #[test]
  fn array_coercion_is_elementwise() {
    let mut n = Node::new();
    n.set_float64_slice(&[1.9, -2.9, 3.0]);
    let mut dest = Node::new();
    n.to_int32_array(&mut dest).unwrap();
    assert_eq!(dest.as_int32_array().unwrap().to_vec(), vec![1, -2, 3]);
    assert!(dest.dtype().is_compact());
  }

  #[test]
  fn typed_pointers_alias_element_zero() {
    let mut n = Node::new();
    n.set_int64_slice(&[5, 6]);
    let p = n.as_int64_ptr().unwrap();
    unsafe {
      assert_eq!(*p, 5);
    }
  }
}
