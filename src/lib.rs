//! An in-memory hierarchical data model for scientific and HPC codes.
//!
//! # Overview
//!
//! Simulation codes pass around heterogeneous numeric data: typed scalars,
//! strided typed arrays, nested objects, and ordered lists.  This crate
//! describes such data with a self-describing schema that can be
//! serialized, reconstructed, and overlaid onto externally owned memory
//! without copying.
//!
//! - __Self-Describing__.  Every leaf carries a [`DataType`]: its primitive
//!   kind, element count, offset, stride, element width, and byte order.
//!   A [`Schema`] composes descriptors into a tree with named object
//!   children and ordered list children, and is the single source of truth
//!   for layout.
//! - __Zero Copy__.  A [`Node`] binds a schema to memory it owns, borrows,
//!   or maps.  External trees walk a caller's buffer in place; typed reads
//!   go through the descriptors, so a strided slice of a larger allocation
//!   is just another leaf.
//! - __Coercing__.  Strict readers (`as_int32()`) demand an exact kind
//!   match; coercing readers (`to_int32()`) cast elementwise across the
//!   numeric kinds.
//!
//! # The Node
//!
//! [`Node`] is the unit of data.  Leaves hold elements; composites hold
//! children reached by `/`-separated paths, created on demand:
//!
//! ```
//! use conduit::Node;
//!
//! let mut n = Node::new();
//! n.fetch("mesh/coords/x").unwrap().set_float64_slice(&[0.0, 0.5, 1.0]);
//! n.fetch("mesh/topo/type").unwrap().set_string("structured");
//!
//! assert!(n.has_path("mesh/coords"));
//! assert_eq!(n["mesh/topo/type"].as_string().unwrap(), "structured");
//!
//! let mut bytes = Vec::new();
//! n.serialize(&mut bytes);
//! assert_eq!(bytes.len(), n.total_bytes_compact() as usize);
//! ```
//!
//! # JSON Protocols
//!
//! The [`Generator`] parses three JSON encodings -- `conduit_json`
//! (explicit dtypes, optional inline values), `json` (pure JSON, kinds
//! inferred), and `base64_json` (schema plus a base64 payload) -- and
//! [`Node::to_json`] emits them.  The persisted binary form is the pair
//! `{schema json, data bin}` written by [`Node::save`].
//!
//! # Threading
//!
//! A tree is single-writer.  Disjoint trees may be used from different
//! threads (`Node` is `Send`); a single tree must not be mutated
//! concurrently, and concurrent reads are safe only while no writer is
//! active.

/// Internal macros.
#[macro_use]
mod macros;

mod array;
mod dtype;
mod endian;
mod error;
mod generator;
mod node;
mod schema;
mod util;
mod value;

pub use self::{
  array::DataArray,
  dtype::{DataKind, DataType, Element, Scalar},
  endian::Endianness,
  error::ConduitErr,
  generator::{Generator, Protocol},
  node::Node,
  schema::Schema,
  value::Value,
};

/// The index type for element counts, offsets, and strides.
///
/// The width is a compile-time choice (feature `index64`, on by default)
/// and must match between the writer and reader of a serialized tree.
#[cfg(feature = "index64")]
pub type IndexT = u64;

/// The index type for element counts, offsets, and strides.
///
/// The width is a compile-time choice (feature `index64`, on by default)
/// and must match between the writer and reader of a serialized tree.
#[cfg(not(feature = "index64"))]
pub type IndexT = u32;
