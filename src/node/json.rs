//! JSON emission for node trees.
//!
//! Three output protocols:
//!
//! - `json` -- pure JSON: leaves emit their literal values;
//! - `conduit_json` -- detailed JSON: leaves emit their descriptor fields
//!   plus a `value` member, so the text re-parses losslessly;
//! - `base64_json` -- a `{"schema": .., "data": {"base64": ".."}}` envelope
//!   carrying the compacted schema and the serialized bytes.
//!
//! Layout parameters mirror the writer they feed: `indent` spaces per
//! level, an initial `depth`, a `pad` prefix per line, and an `eol`
//! separator.  Passing `0, 0, "", ""` produces a single line.

use super::Node;
use crate::{
  dtype::{DataKind, Scalar},
  error::ConduitErr,
};
use base64::Engine;
use core::fmt::Write as FmtWrite;

impl Node {
  /// Renders the tree as JSON in the named protocol.
  pub fn to_json(
    &self,
    protocol: &str,
    indent: usize,
    depth: usize,
    pad: &str,
    eol: &str,
  ) -> Result<String, ConduitErr> {
    let mut out = String::new();
    match protocol {
      "json" => self.write_json_leaf_values(&mut out, indent, depth, pad, eol),
      "conduit_json" => {
        self.write_json_detailed(&mut out, indent, depth, pad, eol)
      },
      "base64_json" => self.write_base64_json(&mut out),
      other => {
        return Err(err!(
          debug,
          ConduitErr::ParseError {
            detail: format!("unknown protocol \"{}\"", other),
          }
        ))
      },
    }
    Ok(out)
  }

  /// Renders the tree as JSON into an [`std::io::Write`] sink.
  pub fn to_json_stream<W: std::io::Write>(
    &self,
    out: &mut W,
    protocol: &str,
    indent: usize,
    depth: usize,
    pad: &str,
    eol: &str,
  ) -> Result<(), ConduitErr> {
    let text = self.to_json(protocol, indent, depth, pad, eol)?;
    out.write_all(text.as_bytes())?;
    Ok(())
  }

  /// Prints the tree to stdout as indented pure JSON.
  pub fn print(&self) {
    println!("{}", self);
  }

  fn write_json_leaf_values(
    &self,
    out: &mut String,
    indent: usize,
    depth: usize,
    pad: &str,
    eol: &str,
  ) {
    match self.kind() {
      DataKind::Object | DataKind::List => self.write_json_composite(
        out,
        indent,
        depth,
        pad,
        eol,
        &Node::write_json_leaf_values,
      ),
      DataKind::Empty => out.push_str("null"),
      DataKind::Char8Str => self.write_string_value(out),
      _ => self.write_numeric_value(out),
    }
  }

  fn write_json_detailed(
    &self,
    out: &mut String,
    indent: usize,
    depth: usize,
    pad: &str,
    eol: &str,
  ) {
    match self.kind() {
      DataKind::Object | DataKind::List => self.write_json_composite(
        out,
        indent,
        depth,
        pad,
        eol,
        &Node::write_json_detailed,
      ),
      DataKind::Empty => out.push_str("{\"dtype\":\"empty\"}"),
      _ => {
        out.push('{');
        self.dtype().write_json_fields(out);
        out.push_str(",\"value\":");
        if self.kind() == DataKind::Char8Str {
          self.write_string_value(out);
        } else {
          self.write_numeric_value(out);
        }
        out.push('}');
      },
    }
  }

  fn write_json_composite(
    &self,
    out: &mut String,
    indent: usize,
    depth: usize,
    pad: &str,
    eol: &str,
    write_child: &dyn Fn(&Node, &mut String, usize, usize, &str, &str),
  ) {
    let object = self.kind().is_object();
    out.push(if object { '{' } else { '[' });
    out.push_str(eol);
    for i in 0..self.number_of_children() {
      write_line_prefix(out, indent, depth + 1, pad);
      if object {
        if let Ok(name) = self.child_name(i) {
          out.push_str(&serde_json::to_string(name).unwrap_or_default());
          out.push_str(": ");
        }
      }
      write_child(&self[i], out, indent, depth + 1, pad, eol);
      if i + 1 < self.number_of_children() {
        out.push(',');
      }
      out.push_str(eol);
    }
    write_line_prefix(out, indent, depth, pad);
    out.push(if object { '}' } else { ']' });
  }

  fn write_numeric_value(&self, out: &mut String) {
    let n = self.dtype().num_elements() as usize;
    if n == 1 {
      write_scalar(out, self.scalar_at(0));
      return;
    }
    out.push('[');
    for i in 0..n {
      if i > 0 {
        out.push_str(", ");
      }
      write_scalar(out, self.scalar_at(i));
    }
    out.push(']');
  }

  fn write_string_value(&self, out: &mut String) {
    match self.as_char8_str() {
      Ok(text) => {
        out.push_str(&serde_json::to_string(text).unwrap_or_default())
      },
      Err(_) => out.push_str("null"),
    }
  }

  fn write_base64_json(&self, out: &mut String) {
    let mut dense = Node::new();
    self.compact_to(&mut dense);
    let mut bytes = Vec::new();
    dense.serialize(&mut bytes);
    let payload = base64::engine::general_purpose::STANDARD.encode(&bytes);
    out.push_str("{\"schema\": ");
    out.push_str(&dense.schema().to_json());
    out.push_str(", \"data\": {\"base64\": \"");
    out.push_str(&payload);
    out.push_str("\"}}");
  }
}

fn write_line_prefix(out: &mut String, indent: usize, depth: usize, pad: &str) {
  out.push_str(pad);
  for _ in 0..indent * depth {
    out.push(' ');
  }
}

fn write_scalar(out: &mut String, scalar: Option<Scalar>) {
  match scalar {
    Some(Scalar::I(v)) => {
      let _ = write!(out, "{}", v);
    },
    Some(Scalar::U(v)) => {
      let _ = write!(out, "{}", v);
    },
    Some(Scalar::F(v)) => {
      // Non-finite values have no JSON form.
      if v.is_finite() {
        let _ = write!(out, "{}", v);
      } else {
        out.push_str("null");
      }
    },
    None => out.push_str("null"),
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn pure_json_scalar_is_the_literal() {
    let mut n = Node::new();
    n.set_int32(42);
    assert_eq!(n.to_json("json", 0, 0, "", "").unwrap(), "42");
  }

  #[test]
  fn pure_json_tree() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(7);
    n.fetch("b").unwrap().set_float64_slice(&[1.5, 2.5]);
    n.fetch("c").unwrap().set_string("hi");
    let text = n.to_json("json", 0, 0, "", "").unwrap();
    assert_eq!(text, "{\"a\": 7,\"b\": [1.5, 2.5],\"c\": \"hi\"}");
  }

  #[test]
  fn detailed_json_carries_the_dtype() {
    let mut n = Node::new();
    n.set_uint16_slice(&[3, 4]);
    let text = n.to_json("conduit_json", 0, 0, "", "").unwrap();
    assert!(text.contains("\"dtype\":\"uint16\""));
    assert!(text.contains("\"number_of_elements\":2"));
    assert!(text.contains("\"value\":[3, 4]"));
  }

  #[test]
  fn unknown_protocol_fails() {
    let n = Node::new();
    assert!(matches!(
      n.to_json("yaml", 0, 0, "", ""),
      Err(ConduitErr::ParseError { .. })
    ));
  }

  #[test]
  fn indentation_layout() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(1);
    let text = n.to_json("json", 2, 0, "", "\n").unwrap();
    assert_eq!(text, "{\n  \"a\": 1\n}");
  }
}
