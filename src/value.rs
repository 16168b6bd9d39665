//! A small polymorphic handle for leaf values.  See [`Value`].

use crate::{array::DataArray, dtype::Element, error::ConduitErr, Node};

/// A read handle that converts into any primitive kind.
///
/// The conversion discipline is chosen when the handle is made:
/// [`Node::value`] converts strictly (the leaf's kind must match exactly),
/// while [`Node::coerced`] casts across numeric kinds.  Array conversions
/// are always strict.
///
/// ```
/// use conduit::Node;
///
/// let mut n = Node::new();
/// n.fetch("a/b").unwrap().set_float64(2.5);
/// let x: f64 = n["a/b"].value().try_into().unwrap();
/// assert_eq!(x, 2.5);
/// let i: i32 = n["a/b"].coerced().try_into().unwrap();
/// assert_eq!(i, 2);
/// ```
#[derive(Copy, Clone)]
pub struct Value<'a> {
  node: &'a Node,
  coerce: bool,
}

impl Node {
  /// A strictly-converting value handle.
  pub fn value(&self) -> Value<'_> {
    Value {
      node: self,
      coerce: false,
    }
  }

  /// A coercing value handle.
  pub fn coerced(&self) -> Value<'_> {
    Value {
      node: self,
      coerce: true,
    }
  }
}

impl<'a> Value<'a> {
  /// The node behind the handle.
  pub fn node(&self) -> &'a Node {
    self.node
  }

  fn get<T: Element>(&self) -> Result<T, ConduitErr> {
    if self.coerce {
      self.node.to_scalar()
    } else {
      self.node.as_scalar()
    }
  }
}

/// Generates the scalar conversions for one primitive kind.
macro_rules! gen_value_conv {
  ($native:ident) => {
    impl<'a> TryFrom<Value<'a>> for $native {
      type Error = ConduitErr;

      fn try_from(value: Value<'a>) -> Result<Self, Self::Error> {
        value.get::<$native>()
      }
    }
  };
}

gen_value_conv!(i8);
gen_value_conv!(i16);
gen_value_conv!(i32);
gen_value_conv!(i64);
gen_value_conv!(u8);
gen_value_conv!(u16);
gen_value_conv!(u32);
gen_value_conv!(u64);
gen_value_conv!(f32);
gen_value_conv!(f64);

impl<'a> TryFrom<Value<'a>> for String {
  type Error = ConduitErr;

  fn try_from(value: Value<'a>) -> Result<Self, Self::Error> {
    value.node.as_string()
  }
}

impl<'a, T: Element> TryFrom<Value<'a>> for DataArray<'a, T> {
  type Error = ConduitErr;

  /// Array views convert strictly regardless of the handle's mode.
  fn try_from(value: Value<'a>) -> Result<Self, Self::Error> {
    value.node.as_array()
  }
}
