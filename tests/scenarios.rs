//! Concrete end-to-end scenarios with literal inputs and outputs.

use conduit::{ConduitErr, Endianness, Node};

#[test]
fn scalar_round_trip_through_pure_json() {
  let mut n = Node::new();
  n.set_int32(42);
  assert_eq!(n.to_json("json", 0, 0, "", "").unwrap(), "42");

  // Pure JSON infers the widest integer kind; the value carries over.
  let back = Node::parse("42", "json").unwrap();
  assert_eq!(back.as_int64().unwrap(), 42);
  assert_eq!(back.to_int32().unwrap(), 42);
}

#[test]
fn strided_external_array_reads_every_other_word() {
  let mut backing: [u32; 6] = [1, 2, 3, 4, 5, 6];
  let mut n = Node::new();
  unsafe {
    n.set_external_uint32_ptr(
      backing.as_mut_ptr(),
      3,
      0,
      8,
      4,
      Endianness::Default,
    )
    .unwrap();
  }
  assert_eq!(n.as_uint32_array().unwrap().to_vec(), vec![1, 3, 5]);
}

#[test]
fn compact_serialization_layout() {
  let mut n = Node::new();
  n.fetch("a").unwrap().set_int32(7);
  n.fetch("b").unwrap().set_float64_slice(&[1.5, 2.5]);
  assert_eq!(n.total_bytes_compact(), 20);

  let mut bytes = Vec::new();
  n.serialize(&mut bytes);
  assert_eq!(bytes.len(), 20);

  #[cfg(target_endian = "little")]
  assert_eq!(
    bytes,
    [
      0x07, 0x00, 0x00, 0x00, // a = 7i32
      0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF8, 0x3F, // b[0] = 1.5
      0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x40, // b[1] = 2.5
    ]
  );
}

#[test]
fn endian_swap_reverses_stored_bytes() {
  let mut n = Node::new();
  n.set_uint32(0x0102_0304);
  n.endian_swap(Endianness::Big);
  assert_eq!(n.dtype().endianness(), Endianness::Big);
  #[cfg(target_endian = "little")]
  assert_eq!(n.as_uint32().unwrap(), 0x0403_0201);
}

#[test]
fn path_create_then_read_back() {
  let mut n = Node::new();
  n.set_path_string("mesh/topo/type", "structured").unwrap();
  assert_eq!(n["mesh/topo/type"].as_string().unwrap(), "structured");
  assert!(n.has_path("mesh/topo"));
}

#[test]
fn coercion_table_for_a_float_scalar() {
  let mut n = Node::new();
  n.set_float64(3.7);
  assert_eq!(n.to_int32().unwrap(), 3);
  assert_eq!(n.to_uint8().unwrap(), 3);
  assert!(matches!(
    n.as_int32(),
    Err(ConduitErr::TypeMismatch { .. })
  ));
}
