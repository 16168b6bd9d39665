//! Structural and round-trip properties of the schema/node core.

use conduit::{
  ConduitErr, DataKind, DataType, Endianness, Node, Schema,
};
use rand::{Rng, SeedableRng};

fn sample_schema() -> Schema {
  let mut s = Schema::new();
  s.fetch("a").unwrap().set_dtype(DataType::int32(1));
  s.fetch("b/c").unwrap().set_dtype(
    DataType::new(DataKind::Float64, 3, 0, 16, 8, Endianness::Little)
      .unwrap(),
  );
  s.fetch("b/d").unwrap().set_dtype(DataType::char8_str(6));
  s
}

fn sample_node() -> Node {
  let mut n = Node::new();
  n.fetch("a").unwrap().set_int32(-7);
  n.fetch("b/c").unwrap().set_float64_slice(&[0.25, -1.5, 1e9]);
  n.fetch("b/d").unwrap().set_string("hello");
  n.fetch("e").unwrap().append().unwrap().set_uint16_slice(&[1, 2]);
  n
}

#[test]
fn schema_json_round_trip_is_structural_identity() {
  let s = sample_schema();
  let back = Schema::from_json(&s.to_json()).unwrap();
  assert_eq!(s, back);

  // Compaction assigns the same offsets on both sides.
  let mut dense_a = Schema::new();
  let mut dense_b = Schema::new();
  s.compact_to(&mut dense_a);
  back.compact_to(&mut dense_b);
  assert_eq!(dense_a, dense_b);
}

#[test]
fn node_survives_serialize_and_rebind() {
  let n = sample_node();

  let mut dense = Node::new();
  n.compact_to(&mut dense);
  let mut bytes = Vec::new();
  dense.serialize(&mut bytes);

  let rebound =
    Node::from_schema_and_bytes(&dense.schema(), bytes).unwrap();
  assert!(rebound.equals(&dense));
  assert_eq!(rebound["a"].as_int32().unwrap(), -7);
  assert_eq!(
    rebound["b/c"].as_float64_array().unwrap().to_vec(),
    vec![0.25, -1.5, 1e9]
  );
  assert_eq!(rebound["b/d"].as_string().unwrap(), "hello");
}

#[test]
fn compaction_is_idempotent() {
  let n = sample_node();
  let mut once = Node::new();
  n.compact_to(&mut once);
  let mut twice = Node::new();
  once.compact_to(&mut twice);
  assert!(once.equals(&twice));
  assert_eq!(once.schema(), twice.schema());
}

#[test]
fn endian_swaps_compose_to_identity() {
  let mut n = Node::new();
  n.fetch("u16").unwrap().set_uint16_slice(&[0x0102, 0x0304]);
  n.fetch("u32").unwrap().set_uint32(0xDEAD_BEEF);
  n.fetch("f64").unwrap().set_float64_slice(&[1.5, -2.5]);
  let before = n.clone();

  n.endian_swap(Endianness::Big);
  n.endian_swap(Endianness::Little);
  n.endian_swap(Endianness::Default);
  assert!(n.equals(&before));
  assert_eq!(n["u32"].as_uint32().unwrap(), 0xDEAD_BEEF);
}

#[test]
fn strict_reads_match_coercing_reads_on_the_same_kind() {
  let mut n = Node::new();
  n.set_int16(-123);
  assert_eq!(n.as_int16().unwrap(), n.to_int16().unwrap());
  assert!(matches!(
    n.as_int64(),
    Err(ConduitErr::TypeMismatch { .. })
  ));
  assert_eq!(n.to_int64().unwrap(), -123i64);
  assert_eq!(n.to_uint8().unwrap(), -123i16 as u8);
  assert_eq!(n.to_float32().unwrap(), -123.0f32);
}

#[test]
fn external_buffers_alias_both_ways() {
  let mut backing: [u32; 4] = [1, 2, 3, 4];
  {
    let mut n = Node::new();
    unsafe {
      n.set_external_uint32_ptr(
        backing.as_mut_ptr(),
        4,
        0,
        4,
        4,
        Endianness::Default,
      )
      .unwrap();
    }

    // Writes through the node land in the caller's buffer.
    unsafe {
      *n.as_uint32_ptr().unwrap() = 100;
    }
    assert_eq!(backing[0], 100);

    // Writes to the buffer are visible through the node.
    backing[3] = 44;
    assert_eq!(n.as_uint32_array().unwrap().get(3), Some(44));
  }
  // The node is gone; the caller's buffer is untouched by its teardown.
  assert_eq!(backing, [100, 2, 3, 44]);
}

#[test]
fn update_applies_a_set_theoretic_overlay() {
  let mut base = Node::new();
  base.fetch("keep").unwrap().set_int32(1);
  base.fetch("swap").unwrap().set_int32(2);

  let mut overlay = Node::new();
  overlay.fetch("swap").unwrap().set_int32(20);
  overlay.fetch("add/deep").unwrap().set_float64(0.5);

  base.update(&overlay).unwrap();

  let mut expected = Node::new();
  expected.fetch("keep").unwrap().set_int32(1);
  expected.fetch("swap").unwrap().set_int32(20);
  expected.fetch("add/deep").unwrap().set_float64(0.5);
  assert!(base.equals(&expected));
}

#[test]
fn fetch_creates_paths_that_has_path_then_sees() {
  let mut n = Node::new();
  assert!(!n.has_path("a/b/c"));
  n.fetch("a/b/c").unwrap();
  assert!(n.has_path("a"));
  assert!(n.has_path("a/b"));
  assert!(n.has_path("a/b/c"));
  assert_eq!(n["a/b"].kind(), DataKind::Object);
}

#[test]
fn randomized_trees_round_trip_through_base64() {
  let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
  for _ in 0..16 {
    let mut n = Node::new();
    let ints: Vec<i32> =
      (0..rng.gen_range(1..40)).map(|_| rng.gen()).collect();
    let floats: Vec<f64> =
      (0..rng.gen_range(1..40)).map(|_| rng.gen()).collect();
    n.fetch("ints").unwrap().set_int32_slice(&ints);
    n.fetch("floats").unwrap().set_float64_slice(&floats);
    n.fetch("tag").unwrap().set_string("case");

    let envelope = n.to_json("base64_json", 0, 0, "", "").unwrap();
    let back = Node::parse(&envelope, "base64_json").unwrap();
    assert!(back.equals(&n));
    assert_eq!(back["ints"].as_int32_array().unwrap().to_vec(), ints);
    assert_eq!(
      back["floats"].as_float64_array().unwrap().to_vec(),
      floats
    );
  }
}
