//! glTF/GLB scene import
//!
//! The default scene (or the first one) is flattened below a synthetic root
//! node. Every node that instances a mesh becomes one [`SourceMesh`] whose
//! triangle primitives are concatenated, one face per triangle. Skins are
//! regrouped from per-vertex JOINTS_0/WEIGHTS_0 into per-joint clusters.

use std::path::{Path, PathBuf};

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use hashbrown::HashMap;

use crate::error::{ExportError, Result};
use crate::scene::{Face, IndexedAttribute, SkinCluster, SourceMesh, SourceNode, SourceScene};

/// Name of the node every glTF scene root is parented to
pub const SCENE_ROOT_NAME: &str = "scene_root";

/// Import a `.gltf` or `.glb` file
pub fn import_gltf(path: &Path) -> Result<SourceScene> {
    let (document, buffers, _images) = gltf::import(path).map_err(|e| ExportError::Import {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    convert_document(&document, &buffers, path)
}

/// Import a GLB (or self-contained glTF) held in memory
pub fn import_gltf_slice(bytes: &[u8]) -> Result<SourceScene> {
    let path = PathBuf::from("<memory>");
    let (document, buffers, _images) = gltf::import_slice(bytes).map_err(|e| ExportError::Import {
        path: path.clone(),
        message: e.to_string(),
    })?;
    convert_document(&document, &buffers, &path)
}

fn import_error(path: &Path, message: impl Into<String>) -> ExportError {
    ExportError::Import {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

// ============================================================================
// Nodes
// ============================================================================

struct NodeImport<'a> {
    nodes: Vec<SourceNode>,
    /// glTF node index -> scene node index
    remap: HashMap<usize, usize>,
    mesh_nodes: Vec<gltf::Node<'a>>,
}

impl<'a> NodeImport<'a> {
    fn visit(&mut self, node: gltf::Node<'a>, parent: usize) {
        let (translation, rotation, scale) = node.transform().decomposed();
        let local = Mat4::from_cols_array_2d(&node.transform().matrix());
        let world = self.nodes[parent].world * local;

        let index = self.nodes.len();
        self.nodes.push(SourceNode {
            name: node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node_{}", node.index())),
            parent: Some(parent),
            translation: Vec3::from_array(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from_array(scale),
            local,
            world,
        });
        self.remap.insert(node.index(), index);

        if node.mesh().is_some() {
            self.mesh_nodes.push(node.clone());
        }
        for child in node.children() {
            self.visit(child, index);
        }
    }
}

fn convert_document(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    path: &Path,
) -> Result<SourceScene> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| import_error(path, "no scene found"))?;

    let mut import = NodeImport {
        nodes: vec![SourceNode::new(SCENE_ROOT_NAME, None)],
        remap: HashMap::new(),
        mesh_nodes: Vec::new(),
    };
    for node in scene.nodes() {
        import.visit(node, 0);
    }

    let mut meshes = Vec::with_capacity(import.mesh_nodes.len());
    for node in &import.mesh_nodes {
        if let Some(mesh) = convert_mesh(node, buffers, &import.remap, path)? {
            meshes.push(mesh);
        }
    }

    tracing::info!(
        "Imported {:?}: {} nodes, {} meshes",
        path,
        import.nodes.len(),
        meshes.len()
    );

    Ok(SourceScene {
        nodes: import.nodes,
        meshes,
    })
}

// ============================================================================
// Meshes
// ============================================================================

fn material_name(material: &gltf::Material<'_>) -> String {
    match (material.name(), material.index()) {
        (Some(name), _) => name.to_string(),
        (None, Some(index)) => format!("material_{}", index),
        (None, None) => "default".to_string(),
    }
}

/// Per-attribute value arrays; missing attributes are filled with defaults
/// only once some primitive provides them
#[derive(Default)]
struct Attributes {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    uvs: Option<Vec<Vec2>>,
    colors: Option<Vec<Vec4>>,
}

fn append_optional<T: Copy>(
    target: &mut Option<Vec<T>>,
    base: usize,
    values: Option<Vec<T>>,
    count: usize,
    default: T,
) {
    let Some(mut values) = values else {
        if let Some(existing) = target.as_mut() {
            existing.resize(base + count, default);
        }
        return;
    };
    values.resize(count, default);

    if let Some(existing) = target.as_mut() {
        existing.extend(values);
        return;
    }
    let mut filled = vec![default; base];
    filled.extend(values);
    *target = Some(filled);
}

fn convert_mesh(
    node: &gltf::Node<'_>,
    buffers: &[gltf::buffer::Data],
    remap: &HashMap<usize, usize>,
    path: &Path,
) -> Result<Option<SourceMesh>> {
    let Some(mesh) = node.mesh() else {
        return Ok(None);
    };
    let Some(&scene_node) = remap.get(&node.index()) else {
        return Ok(None);
    };
    let name = mesh
        .name()
        .or(node.name())
        .map(str::to_string)
        .unwrap_or_else(|| format!("mesh_{}", mesh.index()));

    let mut attributes = Attributes::default();
    let mut corners: Vec<u32> = Vec::new();
    let mut face_materials: Vec<u32> = Vec::new();
    let mut materials: Vec<String> = Vec::new();
    let mut joints: Vec<[u16; 4]> = Vec::new();
    let mut weights: Vec<[f32; 4]> = Vec::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            tracing::warn!(
                "Mesh '{}': skipping primitive {} with mode {:?}",
                name,
                primitive.index(),
                primitive.mode()
            );
            continue;
        }

        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(positions) = reader.read_positions() else {
            tracing::warn!("Mesh '{}': primitive {} has no positions", name, primitive.index());
            continue;
        };
        let base = attributes.positions.len();
        attributes.positions.extend(positions.map(Vec3::from_array));
        let count = attributes.positions.len() - base;

        append_optional(
            &mut attributes.normals,
            base,
            reader.read_normals().map(|n| n.map(Vec3::from_array).collect()),
            count,
            Vec3::ZERO,
        );
        append_optional(
            &mut attributes.uvs,
            base,
            reader
                .read_tex_coords(0)
                .map(|uv| uv.into_f32().map(Vec2::from_array).collect()),
            count,
            Vec2::ZERO,
        );
        append_optional(
            &mut attributes.colors,
            base,
            reader
                .read_colors(0)
                .map(|c| c.into_rgba_f32().map(Vec4::from_array).collect()),
            count,
            Vec4::ZERO,
        );

        let mut primitive_joints: Vec<[u16; 4]> = reader
            .read_joints(0)
            .map(|j| j.into_u16().collect())
            .unwrap_or_default();
        let mut primitive_weights: Vec<[f32; 4]> = reader
            .read_weights(0)
            .map(|w| w.into_f32().collect())
            .unwrap_or_default();
        primitive_joints.resize(count, [0; 4]);
        primitive_weights.resize(count, [0.0; 4]);
        joints.extend(primitive_joints);
        weights.extend(primitive_weights);

        let material = material_name(&primitive.material());
        let slot = match materials.iter().position(|m| *m == material) {
            Some(slot) => slot,
            None => {
                materials.push(material);
                materials.len() - 1
            }
        } as u32;

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..count as u32).collect(),
        };
        for triangle in indices.chunks_exact(3) {
            if triangle.iter().any(|&i| i as usize >= count) {
                return Err(import_error(
                    path,
                    format!("mesh '{}' has an index out of range", name),
                ));
            }
            corners.extend(triangle.iter().map(|&i| base as u32 + i));
            face_materials.push(slot);
        }
    }

    if corners.is_empty() {
        tracing::warn!("Mesh '{}' has no triangles, skipping", name);
        return Ok(None);
    }

    let faces = (0..face_materials.len() as u32)
        .map(|f| Face {
            index_begin: f * 3,
            num_indices: 3,
        })
        .collect();

    let skin = match node.skin() {
        Some(skin) => convert_skin(&skin, buffers, remap, &joints, &weights, path)?,
        None => Vec::new(),
    };

    Ok(Some(SourceMesh {
        name,
        node: scene_node,
        positions: IndexedAttribute::new(attributes.positions, corners.clone()),
        normals: attributes.normals.map(|n| IndexedAttribute::new(n, corners.clone())),
        uvs: attributes.uvs.map(|uv| IndexedAttribute::new(uv, corners.clone())),
        colors: attributes.colors.map(|c| IndexedAttribute::new(c, corners.clone())),
        faces,
        face_materials,
        materials,
        skin,
    }))
}

/// One cluster per joint holding the vertices it influences
fn convert_skin(
    skin: &gltf::Skin<'_>,
    buffers: &[gltf::buffer::Data],
    remap: &HashMap<usize, usize>,
    joints: &[[u16; 4]],
    weights: &[[f32; 4]],
    path: &Path,
) -> Result<Vec<SkinCluster>> {
    let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
    let inverse_binds: Vec<Mat4> = reader
        .read_inverse_bind_matrices()
        .map(|m| m.map(|m| Mat4::from_cols_array_2d(&m)).collect())
        .unwrap_or_default();

    let mut clusters = Vec::new();
    for (i, joint) in skin.joints().enumerate() {
        let bone = *remap.get(&joint.index()).ok_or_else(|| {
            import_error(
                path,
                format!("skin joint {} is not part of the scene", joint.index()),
            )
        })?;
        clusters.push(SkinCluster {
            bone,
            mesh_to_bind: inverse_binds.get(i).copied().unwrap_or(Mat4::IDENTITY),
            vertices: Vec::new(),
            weights: Vec::new(),
        });
    }

    for (vertex, (joint_set, weight_set)) in joints.iter().zip(weights).enumerate() {
        for (&joint, &weight) in joint_set.iter().zip(weight_set) {
            if weight <= 0.0 {
                continue;
            }
            let Some(cluster) = clusters.get_mut(joint as usize) else {
                return Err(import_error(
                    path,
                    format!("vertex {} references missing joint {}", vertex, joint),
                ));
            };
            cluster.vertices.push(vertex as u32);
            cluster.weights.push(weight);
        }
    }

    Ok(clusters)
}
