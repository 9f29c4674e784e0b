//! spmdl-export library
//!
//! Turns imported scenes into `.spmdl` model containers:
//! build per-material mesh parts, optionally merge them, split them to fit
//! vertex/bone budgets, quantize the vertex streams and serialize everything
//! into a compressed section container.

pub mod config;
pub mod error;
pub mod import;
pub mod mesh;
pub mod model;
pub mod nodes;
pub mod parallel;
pub mod scene;

pub use config::{CombineMode, CompressionConfig, ExportConfig};
pub use error::{ExportError, Result};
pub use import::{import_gltf, import_gltf_slice, GltfImporter, SceneImporter};
pub use mesh::{Bone, MeshLimits, MeshPart};
pub use model::{export_scene, write_model, ExportedModel};
pub use scene::{Face, IndexedAttribute, SkinCluster, SourceMesh, SourceNode, SourceScene};

// Re-export the schema and container types from spmdl-format
pub use spmdl_format::{FormatError, ModelFile, Semantic, VertexFormat};
