//! Source scene data model
//!
//! This is what an importer hands to the exporter: a node tree and meshes
//! whose attributes are indexed per corner, like most DCC interchange
//! formats store them. Everything here is read-only to the pipeline.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Scene graph node
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    pub name: String,
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Parent space transform
    pub local: Mat4,
    /// Scene root space transform
    pub world: Mat4,
}

impl SourceNode {
    /// Node with an identity transform
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
        }
    }
}

/// Attribute values plus one value index per face corner
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedAttribute<T> {
    pub values: Vec<T>,
    pub indices: Vec<u32>,
}

impl<T: Copy> IndexedAttribute<T> {
    pub fn new(values: Vec<T>, indices: Vec<u32>) -> Self {
        Self { values, indices }
    }

    /// Value of a face corner
    #[inline]
    pub fn get(&self, corner: usize) -> T {
        self.values[self.indices[corner] as usize]
    }
}

/// A polygon; its corners are `index_begin..index_begin + num_indices`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub index_begin: u32,
    pub num_indices: u32,
}

/// Influence of one bone over the mesh's control points
#[derive(Debug, Clone, PartialEq)]
pub struct SkinCluster {
    /// Bone node
    pub bone: usize,
    /// Mesh space to bone space at bind time
    pub mesh_to_bind: Mat4,
    /// Control point (position value) indices
    pub vertices: Vec<u32>,
    pub weights: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMesh {
    pub name: String,
    /// Node instancing this mesh
    pub node: usize,
    /// Position values are the mesh's control points; skin clusters index them
    pub positions: IndexedAttribute<Vec3>,
    pub normals: Option<IndexedAttribute<Vec3>>,
    pub uvs: Option<IndexedAttribute<Vec2>>,
    pub colors: Option<IndexedAttribute<Vec4>>,
    pub faces: Vec<Face>,
    /// Material slot per face; empty means every face uses slot 0
    pub face_materials: Vec<u32>,
    pub materials: Vec<String>,
    pub skin: Vec<SkinCluster>,
}

impl SourceMesh {
    /// Number of control points
    pub fn vertex_count(&self) -> usize {
        self.positions.values.len()
    }

    pub fn face_material(&self, face: usize) -> u32 {
        self.face_materials.get(face).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceScene {
    pub nodes: Vec<SourceNode>,
    pub meshes: Vec<SourceMesh>,
}

impl SourceScene {
    /// Topmost ancestor of `node` that is still below the scene root
    pub fn root_bone(&self, mut node: usize) -> usize {
        while let Some(parent) = self.nodes[node].parent {
            if self.nodes[parent].parent.is_none() {
                break;
            }
            node = parent;
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_bone_stops_below_scene_root() {
        let scene = SourceScene {
            nodes: vec![
                SourceNode::new("root", None),
                SourceNode::new("Armature", Some(0)),
                SourceNode::new("Hips", Some(1)),
                SourceNode::new("Spine", Some(2)),
            ],
            meshes: Vec::new(),
        };
        assert_eq!(scene.root_bone(3), 1);
        assert_eq!(scene.root_bone(1), 1);
        assert_eq!(scene.root_bone(0), 0);
    }

    #[test]
    fn test_indexed_attribute() {
        let uvs = IndexedAttribute::new(vec![Vec2::ZERO, Vec2::ONE], vec![1, 0, 1]);
        assert_eq!(uvs.get(0), Vec2::ONE);
        assert_eq!(uvs.get(1), Vec2::ZERO);
    }
}
