//! Persistence of the `{schema json, data bin}` pair, and mapped trees.

use conduit::{DataType, Node, Schema};

#[test]
fn save_writes_the_pair_and_load_restores_it() {
  let dir = tempfile::tempdir().unwrap();
  let base = dir.path().join("tree");
  let base = base.to_string_lossy().to_string();

  let mut n = Node::new();
  n.fetch("counts").unwrap().set_int32_slice(&[3, 1, 4, 1, 5]);
  n.fetch("label").unwrap().set_string("pi");
  n.save(&base).unwrap();

  assert!(std::path::Path::new(&format!("{}.conduit_json", base)).exists());
  assert!(std::path::Path::new(&format!("{}.conduit_bin", base)).exists());

  let back = Node::load(&base).unwrap();
  assert!(back.equals(&n));
  assert_eq!(
    back["counts"].as_int32_array().unwrap().to_vec(),
    vec![3, 1, 4, 1, 5]
  );
  assert_eq!(back["label"].as_string().unwrap(), "pi");
}

#[test]
fn truncated_data_file_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let base = dir.path().join("short");
  let base = base.to_string_lossy().to_string();

  let mut n = Node::new();
  n.fetch("xs").unwrap().set_float64_slice(&[1.0, 2.0, 3.0]);
  n.save(&base).unwrap();

  // Chop the payload; the schema now spans more than the file holds.
  std::fs::write(format!("{}.conduit_bin", base), [0u8; 4]).unwrap();
  assert!(Node::load(&base).is_err());
}

#[test]
fn schema_files_round_trip() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("layout.conduit_json");

  let mut s = Schema::new();
  s.fetch("a").unwrap().set_dtype(DataType::int64(4));
  s.fetch("b").unwrap().set_dtype(DataType::char8_str(8));
  s.save(&path).unwrap();

  let back = Schema::load(&path).unwrap();
  assert_eq!(s, back);
}

#[cfg(feature = "mmap")]
#[test]
fn mapped_trees_write_through_to_the_file() {
  let dir = tempfile::tempdir().unwrap();
  let base = dir.path().join("mapped");
  let base = base.to_string_lossy().to_string();

  let mut n = Node::new();
  n.fetch("xs").unwrap().set_float64_slice(&[1.0, 2.0]);
  n.save(&base).unwrap();

  {
    let mapped = Node::mmap(&base).unwrap();
    assert_eq!(
      mapped["xs"].as_float64_array().unwrap().to_vec(),
      vec![1.0, 2.0]
    );
    // Mutate element 1 through the map.
    unsafe {
      let p = mapped["xs"].as_float64_ptr().unwrap();
      *p.add(1) = 9.5;
    }

    // The map shows up in the memory report.
    let mut report = Node::new();
    mapped.info(&mut report).unwrap();
    assert_eq!(report["total_bytes_mmaped"].as_uint64().unwrap(), 16);
  }

  // The write went to the backing file.
  let back = Node::load(&base).unwrap();
  assert_eq!(
    back["xs"].as_float64_array().unwrap().to_vec(),
    vec![1.0, 9.5]
  );
}
