//! The crate-wide error type.  See [`ConduitErr`].

use crate::dtype::DataKind;
use core::{
  fmt::{Debug, Display, Formatter},
  num::TryFromIntError,
  str::Utf8Error,
};

/// Errors surfaced by the hierarchical data core.
///
/// Leaf operations surface errors immediately; tree-walking operations stop
/// at the first failure and return it unchanged.  Mutations performed before
/// the failure are not rolled back, so callers must treat the tree as
/// possibly partially updated after an `Err`.
#[derive(Clone, Debug, PartialEq)]
pub enum ConduitErr {
  /// A strict reader or a compatible-copy path found a leaf whose kind
  /// differs from the declared expectation.
  TypeMismatch {
    expected: DataKind,
    observed: DataKind,
  },

  /// A non-creating path lookup, a remove-by-name, or a parent traversal
  /// failed.  Creating fetches never raise this.
  PathNotFound {
    path: String,
  },

  /// Child access or remove-by-index outside `[0, number_of_children)`.
  IndexOutOfRange {
    index:  usize,
    length: usize,
  },

  /// A [`DataType`](crate::DataType) violated its layout invariants, e.g.,
  /// an element width below the kind's default or a stride smaller than the
  /// element width.
  InvalidLayout {
    detail: String,
  },

  /// The generator encountered malformed JSON, an unknown protocol, or a
  /// leaf `value` incompatible with the declared dtype.
  ParseError {
    detail: String,
  },

  /// Coercion from a non-numeric kind (object, list, or string) to a
  /// numeric kind.
  ConversionError {
    from: DataKind,
    to:   DataKind,
  },

  /// A backing file or stream could not be opened, read, or written.
  IoError {
    detail: String,
  },

  /// Memory allocation failed.  Always fatal for the current operation.
  AllocationError {
    bytes: usize,
  },
}

impl Display for ConduitErr {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match self {
      ConduitErr::TypeMismatch { expected, observed } => {
        write!(
          f,
          "type mismatch: expected {}, found {}",
          expected.name(),
          observed.name()
        )
      },
      ConduitErr::PathNotFound { path } => {
        write!(f, "path not found: \"{}\"", path)
      },
      ConduitErr::IndexOutOfRange { index, length } => {
        write!(f, "index {} out of range (length {})", index, length)
      },
      ConduitErr::InvalidLayout { detail } => {
        write!(f, "invalid layout: {}", detail)
      },
      ConduitErr::ParseError { detail } => {
        write!(f, "parse error: {}", detail)
      },
      ConduitErr::ConversionError { from, to } => {
        write!(
          f,
          "cannot convert {} to {}",
          from.name(),
          to.name()
        )
      },
      ConduitErr::IoError { detail } => write!(f, "i/o error: {}", detail),
      ConduitErr::AllocationError { bytes } => {
        write!(f, "allocation of {} bytes failed", bytes)
      },
    }
  }
}

impl std::error::Error for ConduitErr {}

impl From<std::io::Error> for ConduitErr {
  fn from(src: std::io::Error) -> Self {
    ConduitErr::IoError {
      detail: src.to_string(),
    }
  }
}

impl From<serde_json::Error> for ConduitErr {
  fn from(src: serde_json::Error) -> Self {
    ConduitErr::ParseError {
      detail: src.to_string(),
    }
  }
}

impl From<Utf8Error> for ConduitErr {
  fn from(src: Utf8Error) -> Self {
    ConduitErr::ParseError {
      detail: src.to_string(),
    }
  }
}

impl From<core::convert::Infallible> for ConduitErr {
  fn from(src: core::convert::Infallible) -> Self {
    match src {}
  }
}

impl From<TryFromIntError> for ConduitErr {
  fn from(src: TryFromIntError) -> Self {
    ConduitErr::ParseError {
      detail: src.to_string(),
    }
  }
}

impl From<base64::DecodeError> for ConduitErr {
  fn from(src: base64::DecodeError) -> Self {
    ConduitErr::ParseError {
      detail: src.to_string(),
    }
  }
}
