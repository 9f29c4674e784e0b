//! Triangle budget splitter
//!
//! Greedy first-fit bin packing of triangles into sub-parts that each stay
//! within `max_vertices` unique vertices and `max_bones` unique bones.
//! A vertex used by triangles in different bins is copied into each of them.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use smallvec::SmallVec;

use super::types::{MeshLimits, MeshPart};
use crate::error::{ExportError, Result};

/// Keys inserted by one placement attempt
#[derive(Default)]
struct UndoLog {
    vertices: SmallVec<[u32; 3]>,
    bones: SmallVec<[u32; 16]>,
}

/// Packing state of one output bin
#[derive(Default)]
struct SplitPart {
    /// Source vertex id -> local id
    vertex_refs: HashMap<u32, u32>,
    /// Local id -> source vertex id
    vertices: Vec<u32>,
    /// Source bone id -> local id
    bone_refs: HashMap<u32, u32>,
    /// Local id -> source bone id
    bones: Vec<u32>,
    /// Local triangle list
    indices: Vec<u32>,
}

fn insert_ref(refs: &mut HashMap<u32, u32>, order: &mut Vec<u32>, key: u32, undo: &mut impl Extend<u32>) -> u32 {
    match refs.entry(key) {
        Entry::Occupied(entry) => *entry.get(),
        Entry::Vacant(entry) => {
            let local = order.len() as u32;
            order.push(key);
            entry.insert(local);
            undo.extend([key]);
            local
        }
    }
}

impl SplitPart {
    /// Add a triangle, keeping it only if the bin stays within budget
    fn try_add(&mut self, triangle: [u32; 3], vertex_bones: &VertexBones, limits: &MeshLimits) -> bool {
        let mut undo = UndoLog::default();
        let mut local = [0u32; 3];

        for (slot, &vertex) in local.iter_mut().zip(&triangle) {
            *slot = insert_ref(&mut self.vertex_refs, &mut self.vertices, vertex, &mut undo.vertices);
            for &bone in vertex_bones.get(vertex) {
                insert_ref(&mut self.bone_refs, &mut self.bones, bone, &mut undo.bones);
            }
        }
        self.indices.extend_from_slice(&local);

        if self.vertices.len() <= limits.max_vertices && self.bones.len() <= limits.max_bones {
            return true;
        }

        self.rollback(undo);
        false
    }

    /// Remove exactly the entries one failed attempt added
    fn rollback(&mut self, undo: UndoLog) {
        self.indices.truncate(self.indices.len() - 3);
        for vertex in undo.vertices.iter().rev() {
            self.vertex_refs.remove(vertex);
            let popped = self.vertices.pop();
            debug_assert_eq!(popped, Some(*vertex));
        }
        for bone in undo.bones.iter().rev() {
            self.bone_refs.remove(bone);
            let popped = self.bones.pop();
            debug_assert_eq!(popped, Some(*bone));
        }
    }
}

/// Bone ids referenced by each source vertex (`k` per vertex)
struct VertexBones {
    ids: Vec<u32>,
    k: usize,
}

impl VertexBones {
    fn new(part: &MeshPart) -> Self {
        let Some(range) = part.bone_index_range() else {
            return Self { ids: Vec::new(), k: 0 };
        };
        let ids = (0..part.vertex_count)
            .flat_map(|v| part.vertex(v)[range.clone()].iter().map(|&b| b as u32))
            .collect();
        Self { ids, k: range.len() }
    }

    #[inline]
    fn get(&self, vertex: u32) -> &[u32] {
        let v = vertex as usize;
        &self.ids[v * self.k..(v + 1) * self.k]
    }
}

/// Split `part` into sub-parts that each satisfy `limits`.
///
/// Triangles are placed in source order into the first open bin that can
/// take them; a new bin is opened when none can. A part already within
/// budget is returned unchanged.
pub fn split_mesh_part(part: MeshPart, limits: &MeshLimits) -> Result<Vec<MeshPart>> {
    if part.fits(limits) {
        return Ok(vec![part]);
    }

    let vertex_bones = VertexBones::new(&part);
    let mut bins: Vec<SplitPart> = vec![SplitPart::default()];

    for triangle in part.indices.chunks_exact(3) {
        let triangle = [triangle[0], triangle[1], triangle[2]];
        if bins.iter_mut().any(|bin| bin.try_add(triangle, &vertex_bones, limits)) {
            continue;
        }

        let mut bin = SplitPart::default();
        if !bin.try_add(triangle, &vertex_bones, limits) {
            return Err(ExportError::InfeasibleBudget {
                part: part.label(),
                max_vertices: limits.max_vertices,
                max_bones: limits.max_bones,
            });
        }
        bins.push(bin);
    }

    let outputs: Vec<MeshPart> = bins
        .iter()
        .filter(|bin| !bin.indices.is_empty())
        .map(|bin| materialize(&part, bin))
        .collect();

    tracing::debug!(
        "Split {} ({} vertices, {} bones) into {} parts",
        part.label(),
        part.vertex_count,
        part.bones.len(),
        outputs.len()
    );

    Ok(outputs)
}

/// Gather a bin's vertices and bones from the source part
fn materialize(source: &MeshPart, bin: &SplitPart) -> MeshPart {
    let stride = source.format.vertex_floats();
    let mut vertex_data = Vec::with_capacity(bin.vertices.len() * stride);
    for &vertex in &bin.vertices {
        vertex_data.extend_from_slice(source.vertex(vertex as usize));
    }

    if let Some(range) = source.bone_index_range() {
        for row in vertex_data.chunks_exact_mut(stride) {
            for value in &mut row[range.clone()] {
                if let Some(&local) = bin.bone_refs.get(&(*value as u32)) {
                    *value = local as f32;
                }
            }
        }
    }

    MeshPart {
        mesh: source.mesh,
        node: source.node,
        material: source.material.clone(),
        root_bone: source.root_bone,
        format: source.format.clone(),
        vertex_data,
        vertex_count: bin.vertices.len(),
        indices: bin.indices.clone(),
        bones: bin
            .bones
            .iter()
            .map(|&b| source.bones[b as usize])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glam::Mat4;
    use spmdl_format::VertexFormat;

    use crate::mesh::types::Bone;

    fn limits(max_vertices: usize, max_bones: usize) -> MeshLimits {
        MeshLimits {
            max_vertices,
            max_bones,
        }
    }

    fn unskinned(vertex_count: usize, indices: Vec<u32>) -> MeshPart {
        let format = Arc::new(VertexFormat::parse("pos_r32f").unwrap());
        let mut part = MeshPart::empty(0, 0, None, format);
        part.vertex_data = (0..vertex_count).flat_map(|v| [v as f32, 0.0, 0.0]).collect();
        part.vertex_count = vertex_count;
        part.indices = indices;
        part
    }

    #[test]
    fn test_within_budget_is_unchanged() {
        let part = unskinned(4, vec![0, 1, 2, 0, 2, 3]);
        let out = split_mesh_part(part.clone(), &limits(4, 1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].indices, part.indices);
        assert_eq!(out[0].vertex_data, part.vertex_data);
    }

    #[test]
    fn test_single_triangle_infeasible() {
        let part = unskinned(3, vec![0, 1, 2]);
        let err = split_mesh_part(part, &limits(2, 64)).unwrap_err();
        assert!(matches!(err, ExportError::InfeasibleBudget { max_vertices: 2, .. }));
    }

    #[test]
    fn test_shared_vertex_is_duplicated_across_bins() {
        // Two triangles sharing the edge 0-2, budget of 3 vertices per bin
        let part = unskinned(4, vec![0, 1, 2, 0, 2, 3]);
        let out = split_mesh_part(part, &limits(3, 64)).unwrap();

        assert_eq!(out.len(), 2);
        let xs = |part: &MeshPart| (0..part.vertex_count).map(|v| part.vertex(v)[0]).collect::<Vec<_>>();
        assert_eq!(xs(&out[0]), vec![0.0, 1.0, 2.0]);
        assert_eq!(xs(&out[1]), vec![0.0, 2.0, 3.0]);
        assert_eq!(out[1].indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_first_fit_reuses_earlier_bin() {
        // Triangle 1 cannot join bin 0, triangle 2 fits back into bin 0
        let part = unskinned(7, vec![0, 1, 2, 3, 4, 5, 0, 2, 1]);
        let out = split_mesh_part(part, &limits(3, 64)).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].triangle_count(), 2);
        assert_eq!(out[0].indices, vec![0, 1, 2, 0, 2, 1]);
    }

    #[test]
    fn test_rollback_restores_bin_state() {
        let format = Arc::new(VertexFormat::parse("pos_r32f,bonei_rg8u").unwrap());
        let mut part = MeshPart::empty(0, 0, None, format);
        // x, bone a, bone b
        let rows = [
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [2.0, 1.0, 0.0],
            [3.0, 2.0, 3.0],
            [4.0, 3.0, 2.0],
            [5.0, 2.0, 2.0],
            [6.0, 0.0, 0.0],
        ];
        part.vertex_data = rows.iter().flat_map(|r| [r[0], 0.0, 0.0, r[1], r[2]]).collect();
        part.vertex_count = 7;
        part.bones = (0..4)
            .map(|node| Bone {
                node,
                bind_matrix: Mat4::IDENTITY,
            })
            .collect();
        // The second triangle is tried against bin 0 and rolled back; the
        // third only fits bin 0 if that rollback left it untouched.
        part.indices = vec![0, 1, 2, 3, 4, 5, 6, 1, 2];

        let out = split_mesh_part(part, &limits(4, 2)).unwrap();
        assert_eq!(out.len(), 2);

        let first = &out[0];
        assert_eq!(first.vertex_count, 4);
        assert_eq!(first.indices, vec![0, 1, 2, 3, 1, 2]);
        assert_eq!(first.bones.iter().map(|b| b.node).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(first.vertex(3), &[6.0, 0.0, 0.0, 0.0, 0.0]);

        let second = &out[1];
        assert_eq!(second.vertex_count, 3);
        assert_eq!(second.bones.iter().map(|b| b.node).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(second.vertex(0), &[3.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(second.vertex(1), &[4.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(second.vertex(2), &[5.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
