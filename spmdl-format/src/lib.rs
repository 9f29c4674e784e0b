//! Shared types and utilities for the spmdl model format
//!
//! This crate provides the pieces shared between:
//! - `spmdl-export` (asset pipeline)
//! - runtime loaders that read `.spmdl` containers
//!
//! # Modules
//!
//! - [`vertex_format`] - Declarative vertex layout schema (`pos_rgb32f,nrm_rgb10a2un;uv_rg16f`)
//! - [`packing`] - Attribute quantization (f32 → unorm/snorm/uint/sint/f16/10-10-10-2)
//! - [`formats`] - Section container, string pool and model record layouts

mod error;
pub mod formats;
pub mod packing;
pub mod vertex_format;

pub use error::FormatError;

// Re-export commonly used schema items
pub use vertex_format::{
    AttributeSlot, Encoding, Format, MAX_ATTRIBUTES, MAX_STREAMS, Semantic, VertexFormat,
};

// Re-export commonly used packing items
pub use packing::{encode_attribute, encode_weights, normalize_quantized_weights};

// Re-export commonly used format items
pub use formats::{
    AttribRecord, BinarySerializable, BoneRecord, BufferRef, CompressOptions, CompressedSection,
    CompressionKind, ContainerBuilder, ContainerReader, FileHeader, MODEL_MAGIC, MeshRecord,
    ModelFile, ModelInfo, NO_INDEX, NodeRecord, SectionDescriptor, StringPool, StringRef,
};
