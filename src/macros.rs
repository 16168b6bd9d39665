/// A macro wrapper for error values that allows logging at the point the
/// error is generated.
///
/// In debug builds the error is reported through [`log`] before being
/// returned, together with a stack backtrace when the `backtrace` feature
/// is enabled.  Release builds compile down to the bare error expression.
///
/// Usage: `return Err(err!(debug, ConduitErr::PathNotFound { .. }))`.
macro_rules! err {
  ($level:ident, $error:expr) => {{
    let error = $error;

    #[cfg(debug_assertions)]
    {
      ::log::$level!("{}:{}: {:?}", file!(), line!(), &error);
      #[cfg(feature = "backtrace")]
      {
        let bt = backtrace::Backtrace::new();
        ::log::trace!("{:?}", bt);
      }
    }

    error
  }};
}

/// Generates the [`Element`](crate::dtype::Element) impl for a native
/// primitive.
///
/// # Parameters
///
/// - `native`: The primitive type (e.g., `u32`).
/// - `kind`: The corresponding [`DataKind`](crate::dtype::DataKind) variant.
/// - `scalar`: The [`Scalar`](crate::dtype::Scalar) class the primitive
///   widens into for kind-crossing casts (`I`, `U`, or `F`).
macro_rules! gen_element {
  ($native:ident, $kind:ident, $scalar:ident) => {
    impl Element for $native {
      const KIND: DataKind = DataKind::$kind;

      #[inline(always)]
      fn from_ne_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; size_of::<$native>()];
        raw.copy_from_slice(&bytes[..size_of::<$native>()]);
        <$native>::from_ne_bytes(raw)
      }

      #[inline(always)]
      fn write_ne_slice(self, out: &mut [u8]) {
        out[..size_of::<$native>()].copy_from_slice(&self.to_ne_bytes());
      }

      #[inline(always)]
      fn to_scalar(self) -> Scalar {
        Scalar::$scalar(self as _)
      }

      #[inline(always)]
      fn from_scalar(value: Scalar) -> Self {
        match value {
          Scalar::I(v) => v as $native,
          Scalar::U(v) => v as $native,
          Scalar::F(v) => v as $native,
        }
      }
    }
  };
}

/// Generates a compact constructor for one leaf kind, e.g.
/// `DataType::int32(n)`.
macro_rules! gen_dtype_ctor {
  ($name:ident, $kind:ident) => {
    /// A compact descriptor for `num_elements` elements of this kind.
    pub fn $name(num_elements: IndexT) -> DataType {
      let width = DataKind::$kind.default_bytes();
      DataType {
        kind: DataKind::$kind,
        num_elements,
        offset: 0,
        stride: width,
        element_bytes: width,
        endianness: Endianness::Default,
      }
    }
  };
}
