//! Per-vertex skin influence selection

use crate::scene::SkinCluster;

/// One retained bone influence; `bone` indexes the mesh's skin clusters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Influence {
    pub bone: u32,
    pub weight: f32,
}

/// Keep the `k` strongest influences of every control point.
///
/// Returns `vertex_count * k` influences, sorted by descending weight within
/// each vertex and normalized to sum to 1. Vertices without influences keep
/// all-zero weights. Slots past the last nonzero weight repeat that bone with
/// weight 0, so every slot refers to a real bone.
pub fn select_influences(vertex_count: usize, clusters: &[SkinCluster], k: usize) -> Vec<Influence> {
    let mut slots = vec![Influence::default(); vertex_count * k];
    if k == 0 {
        return slots;
    }

    for (bone, cluster) in clusters.iter().enumerate() {
        for (&vertex, &weight) in cluster.vertices.iter().zip(&cluster.weights) {
            let Some(dst) = slots.get_mut(vertex as usize * k..(vertex as usize + 1) * k) else {
                tracing::warn!(
                    "Skin cluster {} references vertex {} outside the mesh, ignoring",
                    bone,
                    vertex
                );
                continue;
            };

            let mut candidate = Influence {
                bone: bone as u32,
                weight,
            };
            for slot in dst.iter_mut() {
                if candidate.weight > slot.weight {
                    std::mem::swap(&mut candidate, slot);
                }
            }
        }
    }

    for vertex in slots.chunks_exact_mut(k) {
        let total: f32 = vertex.iter().map(|i| i.weight).sum();
        if total <= 0.0 {
            continue;
        }

        let mut last_bone = 0;
        for influence in vertex.iter_mut() {
            if influence.weight > 0.0 {
                last_bone = influence.bone;
                influence.weight /= total;
            } else {
                influence.bone = last_bone;
            }
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn cluster(vertices: &[u32], weights: &[f32]) -> SkinCluster {
        SkinCluster {
            bone: 0,
            mesh_to_bind: Mat4::IDENTITY,
            vertices: vertices.to_vec(),
            weights: weights.to_vec(),
        }
    }

    #[test]
    fn test_keeps_strongest() {
        let clusters = [
            cluster(&[0], &[0.1]),
            cluster(&[0], &[0.5]),
            cluster(&[0], &[0.2]),
            cluster(&[0], &[0.3]),
        ];
        let slots = select_influences(1, &clusters, 2);

        assert_eq!(slots[0].bone, 1);
        assert_eq!(slots[1].bone, 3);
        assert!((slots[0].weight - 0.625).abs() < 1e-6);
        assert!((slots[1].weight - 0.375).abs() < 1e-6);
    }

    #[test]
    fn test_pads_with_last_bone() {
        let clusters = [cluster(&[0, 1], &[0.0, 2.0]), cluster(&[0], &[4.0])];
        let slots = select_influences(2, &clusters, 4);

        // Vertex 0: one influence from cluster 1
        assert_eq!(slots[0], Influence { bone: 1, weight: 1.0 });
        for slot in &slots[1..4] {
            assert_eq!(*slot, Influence { bone: 1, weight: 0.0 });
        }

        // Vertex 1: one influence from cluster 0
        assert_eq!(slots[4], Influence { bone: 0, weight: 1.0 });
        assert_eq!(slots[7].weight, 0.0);
    }

    #[test]
    fn test_no_influences() {
        let slots = select_influences(3, &[], 4);
        assert!(slots.iter().all(|s| s.weight == 0.0 && s.bone == 0));
    }

    #[test]
    fn test_sums_to_one() {
        let clusters: Vec<_> = (0..6)
            .map(|i| cluster(&[0, 1], &[i as f32 + 1.0, 0.25]))
            .collect();
        let slots = select_influences(2, &clusters, 4);
        for vertex in slots.chunks_exact(4) {
            let total: f32 = vertex.iter().map(|i| i.weight).sum();
            assert!((total - 1.0).abs() < 1e-6);
        }
    }
}
