//! spmdl binary container formats
//!
//! Every container is a fixed file header, a format-specific info block,
//! a section descriptor table and the section payloads. Payloads start on
//! 16-byte boundaries and are zstd-compressed independently, or stored raw
//! when compression does not pay off.
//!
//! All records implement the [`BinarySerializable`] trait for consistent
//! serialization/deserialization.

pub mod container;
pub mod model;
mod serialization;
pub mod string_pool;

pub use container::*;
pub use model::*;
pub use serialization::{BinarySerializable, ByteReader, read_table, write_table};
pub use string_pool::{StringPool, StringRef};
