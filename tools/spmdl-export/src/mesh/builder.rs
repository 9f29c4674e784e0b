//! Mesh part builder (source mesh -> one MeshPart per material)

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use spmdl_format::{AttributeSlot, Semantic, VertexFormat};

use super::optimize::VertexOptimizer;
use super::skin::{select_influences, Influence};
use super::tangent::{FlatTangentMesh, TangentSpaceGenerator};
use super::types::{Bone, MeshPart};
use crate::error::{ExportError, Result};
use crate::scene::{SourceMesh, SourceScene};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Bake the mesh node's world transform into positions and normals
    pub transform_to_root: bool,
    /// Bone influences kept per vertex (K); must match the vertex format
    pub weights_per_vertex: usize,
}

/// Positions and normals after the optional root-space transform, indexed
/// like the source value arrays
struct ResolvedGeometry {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    /// Applied to bind matrices so bones keep matching the moved vertices
    root_to_mesh: Mat4,
}

fn resolve_geometry(scene: &SourceScene, mesh: &SourceMesh, transform_to_root: bool) -> ResolvedGeometry {
    if !transform_to_root {
        return ResolvedGeometry {
            positions: mesh.positions.values.clone(),
            normals: mesh.normals.as_ref().map(|n| n.values.clone()),
            root_to_mesh: Mat4::IDENTITY,
        };
    }

    let world = scene.nodes[mesh.node].world;
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    ResolvedGeometry {
        positions: mesh
            .positions
            .values
            .iter()
            .map(|&p| world.transform_point3(p))
            .collect(),
        normals: mesh.normals.as_ref().map(|n| {
            n.values
                .iter()
                .map(|&v| (normal_matrix * v).normalize_or_zero())
                .collect()
        }),
        root_to_mesh: world.inverse(),
    }
}

/// Fan-triangulated corner list of every face using `material`
fn triangulate(mesh: &SourceMesh, material: u32) -> Vec<usize> {
    let mut corners = Vec::new();
    for (face_index, face) in mesh.faces.iter().enumerate() {
        if mesh.face_material(face_index) != material || face.num_indices < 3 {
            continue;
        }
        let begin = face.index_begin as usize;
        for i in 1..face.num_indices as usize - 1 {
            corners.extend_from_slice(&[begin, begin + i, begin + i + 1]);
        }
    }
    corners
}

/// Lazily assigns part-local bone indices to skin clusters
struct BoneRegistry<'a> {
    scene_mesh: &'a SourceMesh,
    root_to_mesh: Mat4,
    local: Vec<Option<u32>>,
    bones: Vec<Bone>,
}

impl BoneRegistry<'_> {
    fn local_index(&mut self, cluster: u32) -> u32 {
        let Some(slot) = self.local.get_mut(cluster as usize) else {
            return 0;
        };
        *slot.get_or_insert_with(|| {
            let source = &self.scene_mesh.skin[cluster as usize];
            self.bones.push(Bone {
                node: source.bone,
                bind_matrix: source.mesh_to_bind * self.root_to_mesh,
            });
            (self.bones.len() - 1) as u32
        })
    }
}

fn write_values(row: &mut [f32], slot: &AttributeSlot, values: &[f32]) {
    let n = slot.float_width.min(values.len());
    row[slot.float_offset..slot.float_offset + n].copy_from_slice(&values[..n]);
}

/// Build one mesh part per material used by `scene.meshes[mesh_index]`.
///
/// Corners are written as canonical float rows, tangents are generated when
/// the format asks for them, then identical rows are merged and the
/// resulting triangle list is reordered for the vertex cache.
pub fn build_mesh_parts(
    scene: &SourceScene,
    mesh_index: usize,
    format: &Arc<VertexFormat>,
    options: &BuildOptions,
    tangents: &dyn TangentSpaceGenerator,
    optimizer: &dyn VertexOptimizer,
) -> Result<Vec<MeshPart>> {
    if options.weights_per_vertex != format.weights_per_vertex() {
        return Err(ExportError::SchemaMismatch {
            format: format.weights_per_vertex(),
            requested: options.weights_per_vertex,
        });
    }

    let mesh = &scene.meshes[mesh_index];
    let k = options.weights_per_vertex;
    let geometry = resolve_geometry(scene, mesh, options.transform_to_root);
    let influences = select_influences(mesh.vertex_count(), &mesh.skin, k);
    let root_bone = mesh.skin.first().map(|cluster| scene.root_bone(cluster.bone));

    for (semantic, present) in [
        (Semantic::Normal, mesh.normals.is_some()),
        (Semantic::Uv, mesh.uvs.is_some()),
        (Semantic::Color, mesh.colors.is_some()),
    ] {
        if format.find(semantic).is_some() && !present {
            tracing::debug!(
                "Mesh '{}' has no {} data, writing defaults",
                mesh.name,
                semantic.code()
            );
        }
    }

    let material_count = mesh.materials.len().max(1) as u32;
    let mut parts = Vec::new();

    for material in 0..material_count {
        let corners = triangulate(mesh, material);
        if corners.is_empty() {
            continue;
        }

        let mut registry = BoneRegistry {
            scene_mesh: mesh,
            root_to_mesh: geometry.root_to_mesh,
            local: vec![None; mesh.skin.len()],
            bones: Vec::new(),
        };
        let mut rows = write_corner_rows(mesh, format, &geometry, &influences, k, &corners, &mut registry);

        generate_tangents(format, &mut rows, tangents);

        let stride = format.vertex_floats();
        let (vertex_count, remap) = optimizer.remap(&rows, stride, corners.len());
        let mut vertex_data = vec![0.0f32; vertex_count * stride];
        for (corner, &vertex) in remap.iter().enumerate() {
            let vertex = vertex as usize;
            vertex_data[vertex * stride..(vertex + 1) * stride]
                .copy_from_slice(&rows[corner * stride..(corner + 1) * stride]);
        }
        let mut indices = remap;
        optimizer.optimize_cache(&mut indices, vertex_count);

        let material_name = mesh.materials.get(material as usize).cloned();
        tracing::debug!(
            "Built part: mesh '{}', material {:?}, {} corners -> {} vertices, {} triangles, {} bones",
            mesh.name,
            material_name,
            corners.len(),
            vertex_count,
            indices.len() / 3,
            registry.bones.len()
        );

        parts.push(MeshPart {
            mesh: mesh_index,
            node: mesh.node,
            material: material_name,
            root_bone,
            format: Arc::clone(format),
            vertex_data,
            vertex_count,
            indices,
            bones: registry.bones,
        });
    }

    Ok(parts)
}

/// One canonical float row per corner
fn write_corner_rows(
    mesh: &SourceMesh,
    format: &VertexFormat,
    geometry: &ResolvedGeometry,
    influences: &[Influence],
    k: usize,
    corners: &[usize],
    registry: &mut BoneRegistry<'_>,
) -> Vec<f32> {
    let stride = format.vertex_floats();
    let mut rows = vec![0.0f32; corners.len() * stride];

    for (row, &corner) in rows.chunks_exact_mut(stride.max(1)).zip(corners) {
        let vertex = mesh.positions.indices[corner] as usize;

        for slot in format.attributes() {
            match slot.semantic {
                Semantic::Position => {
                    write_values(row, slot, &geometry.positions[vertex].to_array());
                }
                Semantic::Normal => {
                    let normal = match (&mesh.normals, &geometry.normals) {
                        (Some(source), Some(values)) => values[source.indices[corner] as usize],
                        _ => Vec3::ZERO,
                    };
                    write_values(row, slot, &normal.to_array());
                }
                Semantic::Uv => {
                    let uv = mesh.uvs.as_ref().map_or(Vec2::ZERO, |uvs| uvs.get(corner));
                    write_values(row, slot, &uv.to_array());
                }
                Semantic::Color => {
                    let color = mesh
                        .colors
                        .as_ref()
                        .map_or(Vec4::ZERO, |colors| colors.get(corner));
                    write_values(row, slot, &color.to_array());
                }
                Semantic::BoneIndex => {
                    let vertex_influences = &influences[vertex * k..(vertex + 1) * k];
                    for (i, influence) in vertex_influences.iter().take(slot.float_width).enumerate() {
                        row[slot.float_offset + i] = registry.local_index(influence.bone) as f32;
                    }
                }
                Semantic::BoneWeight => {
                    let vertex_influences = &influences[vertex * k..(vertex + 1) * k];
                    for (i, influence) in vertex_influences.iter().take(slot.float_width).enumerate() {
                        row[slot.float_offset + i] = influence.weight;
                    }
                }
                // Filled by tangent generation; padding has no floats
                Semantic::Tangent | Semantic::TangentSign | Semantic::Padding => {}
            }
        }
    }

    rows
}

fn generate_tangents(format: &VertexFormat, rows: &mut [f32], generator: &dyn TangentSpaceGenerator) {
    let tangent = format.find(Semantic::Tangent).map(|a| a.float_offset);
    let tangent_sign = format.find(Semantic::TangentSign).map(|a| a.float_offset);
    if tangent.is_none() && tangent_sign.is_none() {
        return;
    }

    let (Some(position), Some(normal), Some(uv)) = (
        format.find(Semantic::Position),
        format.find(Semantic::Normal),
        format.find(Semantic::Uv),
    ) else {
        tracing::warn!("Tangents requested without position, normal and uv attributes, leaving them zero");
        return;
    };

    let mut mesh = FlatTangentMesh {
        rows,
        stride: format.vertex_floats(),
        position: position.float_offset,
        normal: normal.float_offset,
        uv: uv.float_offset,
        tangent,
        tangent_sign,
    };
    generator.generate(&mut mesh);
}
