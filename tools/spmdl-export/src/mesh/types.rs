//! Types shared by the mesh packing stages

use std::sync::Arc;

use glam::Mat4;
use serde::{Deserialize, Serialize};
use spmdl_format::{Semantic, VertexFormat};

/// Default vertex budget (largest 16-bit index)
pub const DEFAULT_MAX_VERTICES: usize = u16::MAX as usize;

/// Default bone budget
pub const DEFAULT_MAX_BONES: usize = 64;

/// Per-part vertex and bone budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshLimits {
    pub max_vertices: usize,
    pub max_bones: usize,
}

impl Default for MeshLimits {
    fn default() -> Self {
        Self {
            max_vertices: DEFAULT_MAX_VERTICES,
            max_bones: DEFAULT_MAX_BONES,
        }
    }
}

/// Skinning bone; identity is the exact `(node, bind_matrix)` pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bone {
    pub node: usize,
    /// Mesh space to bone space
    pub bind_matrix: Mat4,
}

/// One (source mesh, material) combination in one vertex format
#[derive(Debug, Clone)]
pub struct MeshPart {
    /// Source mesh index
    pub mesh: usize,
    /// Node that owns the mesh
    pub node: usize,
    pub material: Option<String>,
    /// Topmost skeleton node, if skinned
    pub root_bone: Option<usize>,
    pub format: Arc<VertexFormat>,
    /// Canonical float rows, `format.vertex_floats()` per vertex
    pub vertex_data: Vec<f32>,
    pub vertex_count: usize,
    /// Triangle list
    pub indices: Vec<u32>,
    /// Bones referenced by the bone index attribute, in local index order
    pub bones: Vec<Bone>,
}

impl MeshPart {
    pub fn empty(mesh: usize, node: usize, material: Option<String>, format: Arc<VertexFormat>) -> Self {
        Self {
            mesh,
            node,
            material,
            root_bone: None,
            format,
            vertex_data: Vec::new(),
            vertex_count: 0,
            indices: Vec::new(),
            bones: Vec::new(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Canonical float row of one vertex
    #[inline]
    pub fn vertex(&self, index: usize) -> &[f32] {
        let stride = self.format.vertex_floats();
        &self.vertex_data[index * stride..(index + 1) * stride]
    }

    /// Range of the bone index attribute inside a row, if the part carries bones
    pub fn bone_index_range(&self) -> Option<std::ops::Range<usize>> {
        if self.bones.is_empty() {
            return None;
        }
        self.format
            .find(Semantic::BoneIndex)
            .map(|a| a.float_offset..a.float_offset + a.float_width)
    }

    /// Whether the part fits the budget without splitting
    pub fn fits(&self, limits: &MeshLimits) -> bool {
        self.vertex_count <= limits.max_vertices && self.bones.len() <= limits.max_bones
    }

    /// Human readable identity for diagnostics
    pub fn label(&self) -> String {
        format!(
            "mesh {} (material {})",
            self.mesh,
            self.material.as_deref().unwrap_or("<none>")
        )
    }
}
