//! JSON-driven construction of schemas and node trees.  See [`Generator`].
//!
//! Three protocols share one AST walk over [`serde_json::Value`]:
//!
//! - `conduit_json` -- explicit dtype objects at the leaves, optionally with
//!   inline `value` payloads;
//! - `json` -- pure JSON, with leaf kinds inferred from the values;
//! - `base64_json` -- a `{"schema": .., "data": {"base64": ".."}}` envelope
//!   whose decoded payload becomes the tree's buffer.
//!
//! A generator either copies (`walk`), producing a tree that owns its
//! memory, or overlays (`walk_external`), walking a caller-supplied buffer
//! without copying.

use crate::{
  dtype::{DataKind, Element, Scalar},
  error::ConduitErr,
  node::Node,
  schema::Schema,
};
use base64::Engine;

/// The JSON encodings a [`Generator`] understands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Protocol {
  ConduitJson,
  Json,
  Base64Json,
}

impl Protocol {
  /// Parses a protocol name; unknown names fail with `ParseError`.
  pub fn from_name(name: &str) -> Result<Protocol, ConduitErr> {
    match name {
      "conduit_json" => Ok(Protocol::ConduitJson),
      "json" => Ok(Protocol::Json),
      "base64_json" => Ok(Protocol::Base64Json),
      other => Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!("unknown protocol \"{}\"", other),
        }
      )),
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Protocol::ConduitJson => "conduit_json",
      Protocol::Json => "json",
      Protocol::Base64Json => "base64_json",
    }
  }
}

/// Parses a JSON text into a [`Schema`] and/or [`Node`].
///
/// ```
/// use conduit::{Generator, Node};
///
/// let gen = Generator::new(
///   r#"{"a": {"dtype": "int32", "value": 7}, "b": {"dtype": "float64"}}"#,
/// );
/// let mut n = Node::new();
/// gen.walk(&mut n).unwrap();
/// assert_eq!(n["a"].as_int32().unwrap(), 7);
/// assert_eq!(n["b"].as_float64().unwrap(), 0.0);
/// ```
pub struct Generator {
  json: String,
  protocol: Protocol,
}

impl Generator {
  /// A generator for the default `conduit_json` protocol.
  pub fn new(json: &str) -> Generator {
    Generator {
      json: json.to_string(),
      protocol: Protocol::ConduitJson,
    }
  }

  /// A generator for a named protocol.
  pub fn with_protocol(
    json: &str,
    protocol: &str,
  ) -> Result<Generator, ConduitErr> {
    Ok(Generator {
      json: json.to_string(),
      protocol: Protocol::from_name(protocol)?,
    })
  }

  pub fn protocol(&self) -> Protocol {
    self.protocol
  }

  /// Builds the schema the JSON describes.  Leaves that omit `offset` are
  /// packed depth-first, so the schema binds without overlap.
  pub fn walk_schema(&self, schema: &mut Schema) -> Result<(), ConduitErr> {
    match self.protocol {
      Protocol::ConduitJson => {
        let value: serde_json::Value = serde_json::from_str(&self.json)?;
        *schema = Schema::from_json_value_packed(&value, &mut 0)?;
        Ok(())
      },
      Protocol::Json => {
        // Inference shares the node walk; the schema is what it built.
        let mut scratch = Node::new();
        self.walk(&mut scratch)?;
        *schema = scratch.schema();
        Ok(())
      },
      Protocol::Base64Json => {
        let (envelope_schema, _payload) = self.parse_envelope()?;
        *schema = envelope_schema;
        Ok(())
      },
    }
  }

  /// Builds a node tree that owns its memory, copying any inline or
  /// base64 payload into it.
  pub fn walk(&self, node: &mut Node) -> Result<(), ConduitErr> {
    node.reset();
    match self.protocol {
      Protocol::ConduitJson => {
        let value: serde_json::Value = serde_json::from_str(&self.json)?;
        // Pack omitted offsets before binding; an as-parsed schema would
        // alias every offset-less sibling onto the buffer's base.
        let schema = Schema::from_json_value_packed(&value, &mut 0)?;
        *node = Node::from_schema(&schema);
        fill_values(node, &value)
      },
      Protocol::Json => {
        let value: serde_json::Value = serde_json::from_str(&self.json)?;
        build_inferred(node, &value)
      },
      Protocol::Base64Json => {
        let (schema, payload) = self.parse_envelope()?;
        *node = Node::from_schema_and_bytes(&schema, payload)?;
        Ok(())
      },
    }
  }

  /// Walks a caller-owned buffer laid out by the parsed schema, without
  /// copying.  Inline `value` payloads are ignored; the buffer is the
  /// data.
  ///
  /// SAFETY: `base` must stay valid for reads and writes over the schema's
  /// span for the life of the tree rooted at `node`.
  pub unsafe fn walk_external(
    &self,
    node: &mut Node,
    base: *mut u8,
  ) -> Result<(), ConduitErr> {
    if self.protocol != Protocol::ConduitJson {
      return Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!(
            "external walks require conduit_json, got {}",
            self.protocol.name()
          ),
        }
      ));
    }
    let value: serde_json::Value = serde_json::from_str(&self.json)?;
    let schema = Schema::from_json_value_packed(&value, &mut 0)?;
    *node = Node::from_schema_external(&schema, base);
    Ok(())
  }

  fn parse_envelope(&self) -> Result<(Schema, Vec<u8>), ConduitErr> {
    let value: serde_json::Value = serde_json::from_str(&self.json)?;
    let fields = value.as_object().ok_or_else(|| {
      err!(
        debug,
        ConduitErr::ParseError {
          detail: "base64_json expects an object envelope".into(),
        }
      )
    })?;
    let schema_value = fields.get("schema").ok_or_else(|| {
      err!(
        debug,
        ConduitErr::ParseError {
          detail: "base64_json envelope missing \"schema\"".into(),
        }
      )
    })?;
    let payload = fields
      .get("data")
      .and_then(|d| d.get("base64"))
      .and_then(|b| b.as_str())
      .ok_or_else(|| {
        err!(
          debug,
          ConduitErr::ParseError {
            detail: "base64_json envelope missing \"data\"/\"base64\"".into(),
          }
        )
      })?;
    let schema = Schema::from_json_value_packed(schema_value, &mut 0)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    Ok((schema, bytes))
  }
}

/// Walks a freshly allocated tree alongside its source JSON, copying every
/// inline `value` into the leaves.
fn fill_values(
  node: &mut Node,
  value: &serde_json::Value,
) -> Result<(), ConduitErr> {
  match value {
    serde_json::Value::Object(fields) => {
      if fields.get("dtype").map(|v| v.is_string()).unwrap_or(false) {
        match fields.get("value") {
          Some(payload) => apply_leaf_value(node, payload),
          None => Ok(()),
        }
      } else {
        for (name, child_json) in fields {
          fill_values(node.fetch(name)?, child_json)?;
        }
        Ok(())
      }
    },
    serde_json::Value::Array(items) => {
      for (i, item) in items.iter().enumerate() {
        fill_values(node.child_mut(i)?, item)?;
      }
      Ok(())
    },
    // A bare dtype name has no payload.
    serde_json::Value::String(_) => Ok(()),
    other => Err(err!(
      debug,
      ConduitErr::ParseError {
        detail: format!("unexpected JSON value in schema: {}", other),
      }
    )),
  }
}

fn apply_leaf_value(
  node: &mut Node,
  payload: &serde_json::Value,
) -> Result<(), ConduitErr> {
  let kind = node.kind();
  if kind.is_composite() || kind.is_empty() {
    return Err(err!(
      debug,
      ConduitErr::ParseError {
        detail: format!("inline value on a {} dtype", kind),
      }
    ));
  }
  let n = node.dtype().num_elements() as usize;

  if kind == DataKind::Char8Str {
    let text = payload.as_str().ok_or_else(|| {
      err!(
        debug,
        ConduitErr::ParseError {
          detail: "char8_str value must be a string".into(),
        }
      )
    })?;
    let bytes = text.as_bytes();
    if bytes.len() + 1 > n {
      return Err(err!(
        debug,
        ConduitErr::ParseError {
          detail: format!(
            "string of {} bytes does not fit {} declared elements",
            bytes.len(),
            n
          ),
        }
      ));
    }
    for (i, byte) in bytes.iter().enumerate() {
      node.write_element(i, *byte);
    }
    return Ok(());
  }

  match payload {
    serde_json::Value::Array(items) => {
      if items.len() != n {
        return Err(err!(
          debug,
          ConduitErr::ParseError {
            detail: format!(
              "value holds {} elements but {} are declared",
              items.len(),
              n
            ),
          }
        ));
      }
      for (i, item) in items.iter().enumerate() {
        write_scalar_element(node, i, json_scalar(item)?);
      }
      Ok(())
    },
    single => {
      if n != 1 {
        return Err(err!(
          debug,
          ConduitErr::ParseError {
            detail: format!(
              "scalar value but {} elements are declared",
              n
            ),
          }
        ));
      }
      write_scalar_element(node, 0, json_scalar(single)?);
      Ok(())
    },
  }
}

/// Builds a tree from pure JSON, inferring leaf kinds: strings become
/// `char8_str`, booleans `uint8`, integers `int64`/`uint64`, floats
/// `float64`; homogeneous numeric arrays become one leaf and anything else
/// becomes a list.
fn build_inferred(
  node: &mut Node,
  value: &serde_json::Value,
) -> Result<(), ConduitErr> {
  match value {
    serde_json::Value::Null => {
      node.reset();
      Ok(())
    },
    serde_json::Value::Bool(b) => {
      node.set_uint8(*b as u8);
      Ok(())
    },
    serde_json::Value::Number(num) => {
      match json_number_scalar(num)? {
        Scalar::I(v) => node.set_int64(v),
        Scalar::U(v) => node.set_uint64(v),
        Scalar::F(v) => node.set_float64(v),
      }
      Ok(())
    },
    serde_json::Value::String(text) => {
      node.set_string(text);
      Ok(())
    },
    serde_json::Value::Array(items) => {
      if !items.is_empty() && items.iter().all(|v| v.is_number()) {
        set_numeric_array(node, items)?;
      } else {
        node.reset();
        for item in items {
          build_inferred(node.append()?, item)?;
        }
      }
      Ok(())
    },
    serde_json::Value::Object(fields) => {
      node.reset();
      for (name, child) in fields {
        build_inferred(node.fetch(name)?, child)?;
      }
      Ok(())
    },
  }
}

fn set_numeric_array(
  node: &mut Node,
  items: &[serde_json::Value],
) -> Result<(), ConduitErr> {
  if items.iter().all(|v| v.as_i64().is_some()) {
    let values: Vec<i64> =
      items.iter().filter_map(|v| v.as_i64()).collect();
    node.set_int64_slice(&values);
  } else if items.iter().all(|v| v.as_u64().is_some()) {
    let values: Vec<u64> =
      items.iter().filter_map(|v| v.as_u64()).collect();
    node.set_uint64_slice(&values);
  } else {
    let values: Vec<f64> =
      items.iter().filter_map(|v| v.as_f64()).collect();
    node.set_float64_slice(&values);
  }
  Ok(())
}

fn json_scalar(value: &serde_json::Value) -> Result<Scalar, ConduitErr> {
  match value {
    serde_json::Value::Number(num) => json_number_scalar(num),
    serde_json::Value::Bool(b) => Ok(Scalar::U(*b as u64)),
    other => Err(err!(
      debug,
      ConduitErr::ParseError {
        detail: format!("expected a numeric value, got {}", other),
      }
    )),
  }
}

fn json_number_scalar(
  num: &serde_json::Number,
) -> Result<Scalar, ConduitErr> {
  if let Some(v) = num.as_i64() {
    Ok(Scalar::I(v))
  } else if let Some(v) = num.as_u64() {
    Ok(Scalar::U(v))
  } else if let Some(v) = num.as_f64() {
    Ok(Scalar::F(v))
  } else {
    Err(err!(
      debug,
      ConduitErr::ParseError {
        detail: format!("unrepresentable number {}", num),
      }
    ))
  }
}

fn write_scalar_element(node: &mut Node, i: usize, scalar: Scalar) {
  match node.kind() {
    DataKind::Int8 => node.write_element(i, i8::from_scalar(scalar)),
    DataKind::Int16 => node.write_element(i, i16::from_scalar(scalar)),
    DataKind::Int32 => node.write_element(i, i32::from_scalar(scalar)),
    DataKind::Int64 => node.write_element(i, i64::from_scalar(scalar)),
    DataKind::UInt8 => node.write_element(i, u8::from_scalar(scalar)),
    DataKind::UInt16 => node.write_element(i, u16::from_scalar(scalar)),
    DataKind::UInt32 => node.write_element(i, u32::from_scalar(scalar)),
    DataKind::UInt64 => node.write_element(i, u64::from_scalar(scalar)),
    DataKind::Float32 => node.write_element(i, f32::from_scalar(scalar)),
    DataKind::Float64 => node.write_element(i, f64::from_scalar(scalar)),
    _ => {},
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::dtype::DataKind;

  #[test]
  fn conduit_json_with_inline_values() {
    let gen = Generator::new(
      r#"{"a": {"dtype": "int32", "value": 7},
          "b": {"dtype": "float64", "number_of_elements": 2,
                "value": [1.5, 2.5]}}"#,
    );
    let mut n = Node::new();
    gen.walk(&mut n).unwrap();
    assert_eq!(n["a"].as_int32().unwrap(), 7);
    assert_eq!(
      n["b"].as_float64_array().unwrap().to_vec(),
      vec![1.5, 2.5]
    );
  }

  #[test]
  fn omitted_offsets_are_packed_depth_first() {
    let gen = Generator::new(
      r#"{"a": {"dtype": "int32"},
          "b": {"dtype": "float64", "number_of_elements": 2},
          "c": {"dtype": "uint8"}}"#,
    );
    let mut schema = Schema::new();
    gen.walk_schema(&mut schema).unwrap();
    assert_eq!(schema.fetch_ptr("a").unwrap().dtype().offset(), 0);
    assert_eq!(schema.fetch_ptr("b").unwrap().dtype().offset(), 4);
    assert_eq!(schema.fetch_ptr("c").unwrap().dtype().offset(), 20);
    assert_eq!(schema.spanned_bytes(), 21);

    // An explicit offset is honored verbatim.
    let gen = Generator::new(r#"{"x": {"dtype": "int32", "offset": 12}}"#);
    let mut schema = Schema::new();
    gen.walk_schema(&mut schema).unwrap();
    assert_eq!(schema.fetch_ptr("x").unwrap().dtype().offset(), 12);
  }

  #[test]
  fn sibling_leaves_do_not_alias() {
    let gen = Generator::new(
      r#"{"a": {"dtype": "int32", "value": 7},
          "b": {"dtype": "int32", "value": 9}}"#,
    );
    let mut n = Node::new();
    gen.walk(&mut n).unwrap();
    assert_eq!(n["a"].as_int32().unwrap(), 7);
    assert_eq!(n["b"].as_int32().unwrap(), 9);
  }

  #[test]
  fn value_length_mismatch_fails() {
    let gen = Generator::new(
      r#"{"a": {"dtype": "int32", "number_of_elements": 3,
               "value": [1, 2]}}"#,
    );
    let mut n = Node::new();
    assert!(matches!(
      gen.walk(&mut n),
      Err(ConduitErr::ParseError { .. })
    ));
  }

  #[test]
  fn value_on_composite_dtype_fails() {
    let gen =
      Generator::new(r#"{"a": {"dtype": "object", "value": 1}}"#);
    let mut n = Node::new();
    assert!(matches!(
      gen.walk(&mut n),
      Err(ConduitErr::ParseError { .. })
    ));
  }

  #[test]
  fn unknown_protocol_fails() {
    assert!(matches!(
      Generator::with_protocol("{}", "msgpack"),
      Err(ConduitErr::ParseError { .. })
    ));
  }

  #[test]
  fn malformed_json_fails() {
    let gen = Generator::new("{\"a\": ");
    let mut n = Node::new();
    assert!(matches!(
      gen.walk(&mut n),
      Err(ConduitErr::ParseError { .. })
    ));
  }

  #[test]
  fn pure_json_inference() {
    let gen = Generator::with_protocol(
      r#"{"name": "mesh", "dims": [10, 20, 30], "spacing": [0.5, 0.5, 2.0],
          "active": true, "mixed": [1, "two"]}"#,
      "json",
    )
    .unwrap();
    let mut n = Node::new();
    gen.walk(&mut n).unwrap();
    assert_eq!(n["name"].as_string().unwrap(), "mesh");
    assert_eq!(n["dims"].kind(), DataKind::Int64);
    assert_eq!(
      n["dims"].as_int64_array().unwrap().to_vec(),
      vec![10, 20, 30]
    );
    assert_eq!(n["spacing"].kind(), DataKind::Float64);
    assert_eq!(n["active"].as_uint8().unwrap(), 1);
    assert_eq!(n["mixed"].kind(), DataKind::List);
    assert_eq!(n["mixed"][1].as_string().unwrap(), "two");
  }

  #[test]
  fn base64_round_trip() {
    let mut src = Node::new();
    src.fetch("a").unwrap().set_int32(7);
    src.fetch("b").unwrap().set_float64_slice(&[1.5, 2.5]);
    let envelope = src.to_json("base64_json", 0, 0, "", "").unwrap();

    let gen = Generator::with_protocol(&envelope, "base64_json").unwrap();
    let mut back = Node::new();
    gen.walk(&mut back).unwrap();
    assert!(back.equals(&src));
  }

  #[test]
  fn external_walk_overlays_without_copying() {
    let mut schema = Schema::new();
    schema
      .fetch("a")
      .unwrap()
      .set_dtype(crate::DataType::uint32(2));
    let mut dense = Schema::new();
    schema.compact_to(&mut dense);

    let mut backing: [u32; 2] = [11, 22];
    let gen = Generator::new(&dense.to_json());
    let mut n = Node::new();
    unsafe {
      gen
        .walk_external(&mut n, backing.as_mut_ptr() as *mut u8)
        .unwrap();
    }
    assert_eq!(n["a"].as_uint32().unwrap(), 11);

    // The overlay aliases the caller's memory.
    backing[0] = 33;
    assert_eq!(n["a"].as_uint32().unwrap(), 33);
  }

  #[test]
  fn external_walk_packs_omitted_offsets() {
    let mut backing: [u32; 2] = [5, 6];
    let gen = Generator::new(
      r#"{"a": {"dtype": "uint32"}, "b": {"dtype": "uint32"}}"#,
    );
    let mut n = Node::new();
    unsafe {
      gen
        .walk_external(&mut n, backing.as_mut_ptr() as *mut u8)
        .unwrap();
    }
    assert_eq!(n["a"].as_uint32().unwrap(), 5);
    assert_eq!(n["b"].as_uint32().unwrap(), 6);
  }

  #[test]
  fn walk_schema_infers_from_pure_json() {
    let gen =
      Generator::with_protocol(r#"{"xs": [1.0, 2.5]}"#, "json").unwrap();
    let mut schema = Schema::new();
    gen.walk_schema(&mut schema).unwrap();
    assert_eq!(
      schema.fetch_ptr("xs").unwrap().dtype().kind(),
      DataKind::Float64
    );
  }
}
