//! Misc non-public utility code for the crate itself.

use core::fmt::Debug;
use smallvec::SmallVec;

/// Splits a `/`-separated path into segments.
///
/// Consecutive separators collapse (an empty segment is only meaningful at
/// the very end of a path, where it denotes "self" and is dropped here).
/// Most paths are shallow, so segments live on the stack.
pub(crate) fn split_path(path: &str) -> SmallVec<[&str; 8]> {
  path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Formats a pointer the way memory-space reports key it.
pub(crate) fn to_hex_string(ptr: *const u8) -> String {
  format!("0x{:x}", ptr as usize)
}

/// Utility trait for error reporting at the point an `Option` turns out to
/// be `None`.
///
/// `ok_or` loses the error site and `ok_or_else` buys it back with a closure
/// at every caller; this logs where the `None` was observed (debug builds)
/// and stays terse at the call site.
pub(crate) trait OkOrLog<O, E>: Sized
where
  E: Debug,
{
  fn ok_or_log(self, level: log::Level, error: E) -> Result<O, E>;
}

impl<O, E> OkOrLog<O, E> for Option<O>
where
  E: Debug,
{
  #[inline(always)]
  fn ok_or_log(self, level: log::Level, error: E) -> Result<O, E> {
    match self {
      Some(value) => Ok(value),
      None => {
        #[cfg(debug_assertions)]
        log::log!(level, "{:?}", error);
        #[cfg(not(debug_assertions))]
        let _ = level;
        Err(error)
      },
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn path_segments() {
    assert_eq!(split_path("a/b/c").as_slice(), ["a", "b", "c"]);
    assert_eq!(split_path("a/b/").as_slice(), ["a", "b"]);
    assert!(split_path("").is_empty());
    assert_eq!(split_path("a/../b").as_slice(), ["a", "..", "b"]);
  }

  #[test]
  fn hex_keys() {
    let bytes = [0u8; 4];
    let key = to_hex_string(bytes.as_ptr());
    assert!(key.starts_with("0x"));
  }
}
