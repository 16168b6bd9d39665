//! Element layout descriptors.  See [`DataType`].
//!
//! A [`DataType`] describes the layout of one leaf: the primitive kind, how
//! many elements are present, and where those elements live relative to a
//! base pointer (`offset`, `stride`, `element_bytes`).  Composite kinds
//! ([`DataKind::Object`], [`DataKind::List`]) carry no layout of their own;
//! their extent is the sum of their children's, computed at the schema level.
//!
//! The address algebra is deliberately tiny: element `i` of a leaf lives at
//! `offset + i * stride`, a leaf is *compact* when its stride equals its
//! element width and that width is the kind's default, and two descriptors
//! are *compatible* when they agree on kind, count, element width, and byte
//! order (offset and stride are allowed to differ).

use crate::{endian::Endianness, error::ConduitErr, IndexT};
use core::{
  fmt::{Debug, Display, Formatter, Write as FmtWrite},
  mem::size_of,
};

/// The closed set of leaf and composite kinds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum DataKind {
  /// No value.
  Empty = 0,
  /// Named children, insertion-ordered.
  Object,
  /// Positional children.
  List,

  //=== Signed integers
  Int8,
  Int16,
  Int32,
  Int64,

  //=== Unsigned integers
  UInt8,
  UInt16,
  UInt32,
  UInt64,

  //=== Floating point
  Float32,
  Float64,

  /// A byte string whose stored count always includes a trailing NUL.
  Char8Str,
}

impl DataKind {
  /// The default element width for the kind, in bytes.
  ///
  /// Composite kinds and [`DataKind::Empty`] have no element width and
  /// return zero.
  pub const fn default_bytes(self) -> IndexT {
    match self {
      DataKind::Empty | DataKind::Object | DataKind::List => 0,
      DataKind::Int8 | DataKind::UInt8 | DataKind::Char8Str => 1,
      DataKind::Int16 | DataKind::UInt16 => 2,
      DataKind::Int32 | DataKind::UInt32 | DataKind::Float32 => 4,
      DataKind::Int64 | DataKind::UInt64 | DataKind::Float64 => 8,
    }
  }

  /// The canonical name used in JSON schema forms.
  pub const fn name(self) -> &'static str {
    match self {
      DataKind::Empty => "empty",
      DataKind::Object => "object",
      DataKind::List => "list",
      DataKind::Int8 => "int8",
      DataKind::Int16 => "int16",
      DataKind::Int32 => "int32",
      DataKind::Int64 => "int64",
      DataKind::UInt8 => "uint8",
      DataKind::UInt16 => "uint16",
      DataKind::UInt32 => "uint32",
      DataKind::UInt64 => "uint64",
      DataKind::Float32 => "float32",
      DataKind::Float64 => "float64",
      DataKind::Char8Str => "char8_str",
    }
  }

  /// Parses a kind name from its JSON schema form.
  ///
  /// C-family aliases (`char`, `short`, `int`, `long`, their `unsigned_*`
  /// forms, `float`, `double`) and the platform `index_t` resolve to the
  /// fixed-width kinds here, so a schema written with native names loads on
  /// any platform.
  pub fn from_name(name: &str) -> Option<DataKind> {
    let kind = match name {
      "empty" => DataKind::Empty,
      "object" => DataKind::Object,
      "list" => DataKind::List,
      "int8" | "char" => DataKind::Int8,
      "int16" | "short" => DataKind::Int16,
      "int32" | "int" => DataKind::Int32,
      "int64" | "long" => DataKind::Int64,
      "uint8" | "unsigned_char" => DataKind::UInt8,
      "uint16" | "unsigned_short" => DataKind::UInt16,
      "uint32" | "unsigned_int" => DataKind::UInt32,
      "uint64" | "unsigned_long" => DataKind::UInt64,
      "float32" | "float" => DataKind::Float32,
      "float64" | "double" => DataKind::Float64,
      "char8_str" => DataKind::Char8Str,
      "index_t" => {
        if size_of::<IndexT>() == 8 {
          DataKind::UInt64
        } else {
          DataKind::UInt32
        }
      },
      _ => return None,
    };
    Some(kind)
  }

  pub const fn is_empty(self) -> bool {
    matches!(self, DataKind::Empty)
  }

  pub const fn is_object(self) -> bool {
    matches!(self, DataKind::Object)
  }

  pub const fn is_list(self) -> bool {
    matches!(self, DataKind::List)
  }

  /// Object or list.
  pub const fn is_composite(self) -> bool {
    matches!(self, DataKind::Object | DataKind::List)
  }

  pub const fn is_string(self) -> bool {
    matches!(self, DataKind::Char8Str)
  }

  pub const fn is_signed_integer(self) -> bool {
    matches!(
      self,
      DataKind::Int8 | DataKind::Int16 | DataKind::Int32 | DataKind::Int64
    )
  }

  pub const fn is_unsigned_integer(self) -> bool {
    matches!(
      self,
      DataKind::UInt8 | DataKind::UInt16 | DataKind::UInt32 | DataKind::UInt64
    )
  }

  pub const fn is_integer(self) -> bool {
    self.is_signed_integer() || self.is_unsigned_integer()
  }

  pub const fn is_floating_point(self) -> bool {
    matches!(self, DataKind::Float32 | DataKind::Float64)
  }

  /// Any fixed-width numeric kind.
  pub const fn is_number(self) -> bool {
    self.is_integer() || self.is_floating_point()
  }

  /// A leaf kind: numeric or string.
  pub const fn is_leaf(self) -> bool {
    self.is_number() || self.is_string()
  }
}

impl Display for DataKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    f.write_str(self.name())
  }
}

/// An intermediate scalar class used when a value crosses numeric kinds.
///
/// Widening into the class (`i64`/`u64`/`f64`) is lossless for every kind in
/// [`DataKind`]; narrowing back out uses `as` casts, giving the elementwise
/// conversion table one arm per class instead of one per kind pair.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Scalar {
  I(i64),
  U(u64),
  F(f64),
}

impl Scalar {
  /// The value as an `f64`, for display and pure-JSON emission.
  pub fn as_f64(self) -> f64 {
    match self {
      Scalar::I(v) => v as f64,
      Scalar::U(v) => v as f64,
      Scalar::F(v) => v,
    }
  }
}

/// A native primitive that can live in a leaf.
///
/// Element bytes are always read and written in the host's native order; a
/// leaf's recorded [`Endianness`] is metadata that an explicit
/// `endian_swap` physically applies to the buffer.
pub trait Element:
  Copy + Default + PartialEq + Debug + Send + Sync + 'static
{
  /// The leaf kind this primitive stores as.
  const KIND: DataKind;

  /// Reads one element from the start of `bytes`.
  fn from_ne_slice(bytes: &[u8]) -> Self;

  /// Writes one element at the start of `out`.
  fn write_ne_slice(self, out: &mut [u8]);

  /// Widens into the kind-crossing scalar class.
  fn to_scalar(self) -> Scalar;

  /// Narrows from the kind-crossing scalar class with C-style casts.
  fn from_scalar(value: Scalar) -> Self;
}

gen_element!(i8, Int8, I);
gen_element!(i16, Int16, I);
gen_element!(i32, Int32, I);
gen_element!(i64, Int64, I);
gen_element!(u8, UInt8, U);
gen_element!(u16, UInt16, U);
gen_element!(u32, UInt32, U);
gen_element!(u64, UInt64, U);
gen_element!(f32, Float32, F);
gen_element!(f64, Float64, F);

/// Describes the layout of one leaf, or marks a composite.
///
/// ```
/// use conduit::{DataKind, DataType};
///
/// let dt = DataType::float64(3);
/// assert_eq!(dt.kind(), DataKind::Float64);
/// assert_eq!(dt.total_bytes(), 24);
/// assert!(dt.is_compact());
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DataType {
  kind: DataKind,
  num_elements: IndexT,
  offset: IndexT,
  stride: IndexT,
  element_bytes: IndexT,
  endianness: Endianness,
}

impl DataType {
  /// A descriptor with explicit layout, checked against the layout
  /// invariants of the kind.
  ///
  /// # Returns
  ///
  /// - `Err(ConduitErr::InvalidLayout)` if a numeric or string kind has an
  ///   element width below the kind's default, or a stride smaller than the
  ///   element width while holding more than one element.
  pub fn new(
    kind: DataKind,
    num_elements: IndexT,
    offset: IndexT,
    stride: IndexT,
    element_bytes: IndexT,
    endianness: Endianness,
  ) -> Result<DataType, ConduitErr> {
    if kind.is_leaf() {
      if element_bytes < kind.default_bytes() {
        return Err(err!(
          debug,
          ConduitErr::InvalidLayout {
            detail: format!(
              "element_bytes {} below the {}-byte width of {}",
              element_bytes,
              kind.default_bytes(),
              kind.name()
            ),
          }
        ));
      }
      if num_elements > 1 && stride < element_bytes {
        return Err(err!(
          debug,
          ConduitErr::InvalidLayout {
            detail: format!(
              "stride {} smaller than element_bytes {}",
              stride, element_bytes
            ),
          }
        ));
      }
    }
    Ok(DataType {
      kind,
      num_elements,
      offset,
      stride,
      element_bytes,
      endianness,
    })
  }

  /// The empty descriptor.
  pub const fn empty() -> DataType {
    DataType {
      kind: DataKind::Empty,
      num_elements: 0,
      offset: 0,
      stride: 0,
      element_bytes: 0,
      endianness: Endianness::Default,
    }
  }

  /// Marks a node with named, insertion-ordered children.
  pub const fn object() -> DataType {
    DataType {
      kind: DataKind::Object,
      num_elements: 0,
      offset: 0,
      stride: 0,
      element_bytes: 0,
      endianness: Endianness::Default,
    }
  }

  /// Marks a node with positional children.
  pub const fn list() -> DataType {
    DataType {
      kind: DataKind::List,
      num_elements: 0,
      offset: 0,
      stride: 0,
      element_bytes: 0,
      endianness: Endianness::Default,
    }
  }

  gen_dtype_ctor!(int8, Int8);
  gen_dtype_ctor!(int16, Int16);
  gen_dtype_ctor!(int32, Int32);
  gen_dtype_ctor!(int64, Int64);
  gen_dtype_ctor!(uint8, UInt8);
  gen_dtype_ctor!(uint16, UInt16);
  gen_dtype_ctor!(uint32, UInt32);
  gen_dtype_ctor!(uint64, UInt64);
  gen_dtype_ctor!(float32, Float32);
  gen_dtype_ctor!(float64, Float64);
  gen_dtype_ctor!(char8_str, Char8Str);

  /// A compact single-element descriptor of `kind`.
  pub fn scalar(kind: DataKind) -> DataType {
    let width = kind.default_bytes();
    DataType {
      kind,
      num_elements: 1,
      offset: 0,
      stride: width,
      element_bytes: width,
      endianness: Endianness::Default,
    }
  }

  /// A compact descriptor for `num_elements` elements of a native
  /// primitive.
  pub fn of<T: Element>(num_elements: IndexT) -> DataType {
    Self::scalar(T::KIND).with_num_elements(num_elements)
  }

  pub const fn kind(&self) -> DataKind {
    self.kind
  }

  pub const fn num_elements(&self) -> IndexT {
    self.num_elements
  }

  pub const fn offset(&self) -> IndexT {
    self.offset
  }

  pub const fn stride(&self) -> IndexT {
    self.stride
  }

  pub const fn element_bytes(&self) -> IndexT {
    self.element_bytes
  }

  pub const fn endianness(&self) -> Endianness {
    self.endianness
  }

  /// Records a concrete byte order on the descriptor.
  pub fn set_endianness(&mut self, endianness: Endianness) {
    self.endianness = endianness;
  }

  pub(crate) fn with_num_elements(mut self, num_elements: IndexT) -> DataType {
    self.num_elements = num_elements;
    self
  }

  pub(crate) fn with_offset(mut self, offset: IndexT) -> DataType {
    self.offset = offset;
    self
  }

  /// The byte address of element `i` relative to the base pointer.
  #[inline(always)]
  pub fn element_index(&self, i: IndexT) -> IndexT {
    self.offset + i * self.stride
  }

  /// `true` iff the stride equals the element width and that width is the
  /// kind's default.  Composites and empties are trivially compact.
  pub fn is_compact(&self) -> bool {
    if !self.kind.is_leaf() {
      return true;
    }
    self.stride == self.element_bytes
      && self.element_bytes == self.kind.default_bytes()
  }

  /// `true` iff the two descriptors agree on kind, element count, element
  /// width, and (resolved) byte order.  Offset and stride may differ.
  pub fn is_compatible(&self, other: &DataType) -> bool {
    self.kind == other.kind
      && self.num_elements == other.num_elements
      && self.element_bytes == other.element_bytes
      && self.endianness.resolved() == other.endianness.resolved()
  }

  /// The bytes spanned by this leaf, from the base pointer through the last
  /// byte of the last element.  Zero for composites and empties.
  pub fn total_bytes(&self) -> IndexT {
    if !self.kind.is_leaf() {
      return 0;
    }
    self.offset
      + self.num_elements.saturating_sub(1) * self.stride
      + self.element_bytes
  }

  /// The bytes this leaf would occupy with a compact layout.
  pub fn total_bytes_compact(&self) -> IndexT {
    if !self.kind.is_leaf() {
      return 0;
    }
    self.num_elements * self.kind.default_bytes()
  }

  /// An equivalent compact descriptor placed at `offset`.
  pub(crate) fn compacted(&self, offset: IndexT) -> DataType {
    if !self.kind.is_leaf() {
      let mut dt = *self;
      dt.offset = offset;
      return dt;
    }
    let width = self.kind.default_bytes();
    DataType {
      kind: self.kind,
      num_elements: self.num_elements,
      offset,
      stride: width,
      element_bytes: width,
      endianness: self.endianness,
    }
  }

  /// Writes the JSON schema form, omitting fields whose values equal the
  /// canonical defaults for the kind.
  pub fn write_json(&self, out: &mut String) {
    out.push('{');
    self.write_json_fields(out);
    out.push('}');
  }

  /// Writes the member list of the JSON schema form (no surrounding
  /// braces), so callers can append further members such as `value`.
  pub(crate) fn write_json_fields(&self, out: &mut String) {
    let _ = write!(out, "\"dtype\":\"{}\"", self.kind.name());
    if self.kind.is_leaf() {
      if self.num_elements != 1 {
        let _ = write!(out, ",\"number_of_elements\":{}", self.num_elements);
      }
      if self.offset != 0 {
        let _ = write!(out, ",\"offset\":{}", self.offset);
      }
      if self.element_bytes != self.kind.default_bytes() {
        let _ = write!(out, ",\"element_bytes\":{}", self.element_bytes);
      }
      if self.stride != self.element_bytes {
        let _ = write!(out, ",\"stride\":{}", self.stride);
      }
      if self.endianness != Endianness::Default {
        let _ = write!(out, ",\"endianness\":\"{}\"", self.endianness.name());
      }
    }
  }

  /// The JSON schema form as an owned string.
  pub fn to_json(&self) -> String {
    let mut out = String::new();
    self.write_json(&mut out);
    out
  }

  /// Reads a descriptor from its JSON schema form.
  ///
  /// Accepts either a bare kind name (`"int32"`, a compact scalar) or the
  /// object form with any subset of `number_of_elements`, `offset`,
  /// `stride`, `element_bytes`, and `endianness`; omitted fields take the
  /// kind's canonical defaults.
  pub fn from_json(value: &serde_json::Value) -> Result<DataType, ConduitErr> {
    match value {
      serde_json::Value::String(name) => {
        let kind = DataKind::from_name(name).ok_or_else(|| {
          err!(
            debug,
            ConduitErr::ParseError {
              detail: format!("unknown dtype name \"{}\"", name),
            }
          )
        })?;
        Ok(DataType::scalar(kind))
      },
      serde_json::Value::Object(fields) => {
        let name = fields
          .get("dtype")
          .and_then(|v| v.as_str())
          .ok_or_else(|| {
            err!(
              debug,
              ConduitErr::ParseError {
                detail: "dtype object missing a \"dtype\" name".into(),
              }
            )
          })?;
        let kind = DataKind::from_name(name).ok_or_else(|| {
          err!(
            debug,
            ConduitErr::ParseError {
              detail: format!("unknown dtype name \"{}\"", name),
            }
          )
        })?;

        let field = |key: &str| -> Result<Option<IndexT>, ConduitErr> {
          match fields.get(key) {
            None => Ok(None),
            Some(v) => {
              let n = v.as_u64().ok_or_else(|| {
                err!(
                  debug,
                  ConduitErr::ParseError {
                    detail: format!(
                      "dtype field \"{}\" must be a non-negative integer",
                      key
                    ),
                  }
                )
              })?;
              Ok(Some(IndexT::try_from(n)?))
            },
          }
        };

        let num_elements = field("number_of_elements")?.unwrap_or(1);
        let offset = field("offset")?.unwrap_or(0);
        let element_bytes =
          field("element_bytes")?.unwrap_or_else(|| kind.default_bytes());
        let stride = field("stride")?.unwrap_or(element_bytes);
        let endianness = match fields.get("endianness") {
          None => Endianness::Default,
          Some(v) => {
            let name = v.as_str().unwrap_or("");
            Endianness::from_name(name).ok_or_else(|| {
              err!(
                debug,
                ConduitErr::ParseError {
                  detail: format!("unknown endianness \"{}\"", name),
                }
              )
            })?
          },
        };

        DataType::new(
          kind,
          num_elements,
          offset,
          stride,
          element_bytes,
          endianness,
        )
      },
      other => Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!("dtype must be a name or an object, got {}", other),
        }
      )),
    }
  }
}

impl Default for DataType {
  fn default() -> Self {
    DataType::empty()
  }
}

impl Display for DataType {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    f.write_str(&self.to_json())
  }
}
