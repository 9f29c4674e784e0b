//! Mesh packing pipeline (source mesh -> budgeted, encoded mesh parts)

mod builder;
mod encode;
mod merge;
mod optimize;
mod skin;
mod split;
mod tangent;
mod types;

// Re-export public API
pub use builder::{build_mesh_parts, BuildOptions};
pub use encode::{encode_index_buffer, encode_stream, IndexBuffer};
pub use merge::{merge_mesh_parts, merge_into};
pub use optimize::{
    optimize_mesh_part, optimize_overdraw, optimize_vertex_fetch, spatial_sort_triangles,
    MeshOptimizer, VertexOptimizer,
};
pub use skin::{select_influences, Influence};
pub use split::split_mesh_part;
pub use tangent::{FlatTangentMesh, TangentMesh, TangentSpaceGenerator, TriangleTangents};
pub use types::{Bone, MeshLimits, MeshPart};
