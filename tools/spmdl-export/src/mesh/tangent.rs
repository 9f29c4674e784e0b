//! Tangent space generation
//!
//! Generators see the mesh only through [`TangentMesh`]: per (triangle, corner)
//! accessors for position, normal and uv, plus a setter for tangent + sign.
//! [`FlatTangentMesh`] adapts an unindexed canonical float buffer.

use glam::{Vec2, Vec3};
use hashbrown::HashMap;

/// Triangle-list view used by tangent generators
pub trait TangentMesh {
    fn triangle_count(&self) -> usize;
    fn position(&self, triangle: usize, corner: usize) -> Vec3;
    fn normal(&self, triangle: usize, corner: usize) -> Vec3;
    fn uv(&self, triangle: usize, corner: usize) -> Vec2;
    /// Store the tangent direction and bitangent sign (+1 or -1) of a corner
    fn set_tangent(&mut self, triangle: usize, corner: usize, tangent: Vec3, sign: f32);
}

/// Tangent space algorithm; must visit every triangle exactly once
pub trait TangentSpaceGenerator {
    fn generate(&self, mesh: &mut dyn TangentMesh);
}

// ============================================================================
// Flat buffer adapter
// ============================================================================

/// Canonical float rows, three consecutive rows per triangle
pub struct FlatTangentMesh<'a> {
    pub rows: &'a mut [f32],
    pub stride: usize,
    pub position: usize,
    pub normal: usize,
    pub uv: usize,
    /// xyz + sign
    pub tangent: Option<usize>,
    pub tangent_sign: Option<usize>,
}

impl FlatTangentMesh<'_> {
    #[inline]
    fn row(&self, triangle: usize, corner: usize) -> usize {
        (triangle * 3 + corner) * self.stride
    }

    #[inline]
    fn vec3(&self, triangle: usize, corner: usize, offset: usize) -> Vec3 {
        let i = self.row(triangle, corner) + offset;
        Vec3::from_slice(&self.rows[i..i + 3])
    }
}

impl TangentMesh for FlatTangentMesh<'_> {
    fn triangle_count(&self) -> usize {
        if self.stride == 0 {
            return 0;
        }
        self.rows.len() / self.stride / 3
    }

    fn position(&self, triangle: usize, corner: usize) -> Vec3 {
        self.vec3(triangle, corner, self.position)
    }

    fn normal(&self, triangle: usize, corner: usize) -> Vec3 {
        self.vec3(triangle, corner, self.normal)
    }

    fn uv(&self, triangle: usize, corner: usize) -> Vec2 {
        let i = self.row(triangle, corner) + self.uv;
        Vec2::from_slice(&self.rows[i..i + 2])
    }

    fn set_tangent(&mut self, triangle: usize, corner: usize, tangent: Vec3, sign: f32) {
        let row = self.row(triangle, corner);
        if let Some(offset) = self.tangent {
            self.rows[row + offset..row + offset + 4]
                .copy_from_slice(&tangent.extend(sign).to_array());
        }
        if let Some(offset) = self.tangent_sign {
            self.rows[row + offset] = sign;
        }
    }
}

// ============================================================================
// Default generator
// ============================================================================

/// Accumulates per-triangle tangent frames over corners that share the same
/// position, normal and uv, then Gram-Schmidt orthogonalizes against the
/// normal and derives the handedness sign from the bitangent.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleTangents;

fn corner_key(position: Vec3, normal: Vec3, uv: Vec2) -> [u32; 8] {
    let mut key = [0u32; 8];
    for (dst, v) in key
        .iter_mut()
        .zip(position.to_array().into_iter().chain(normal.to_array()).chain(uv.to_array()))
    {
        *dst = v.to_bits();
    }
    key
}

impl TangentSpaceGenerator for TriangleTangents {
    fn generate(&self, mesh: &mut dyn TangentMesh) {
        let triangles = mesh.triangle_count();
        let mut groups: HashMap<[u32; 8], usize> = HashMap::new();
        let mut corner_group = Vec::with_capacity(triangles * 3);
        let mut frames: Vec<(Vec3, Vec3)> = Vec::new();

        for t in 0..triangles {
            let p = [0, 1, 2].map(|c| mesh.position(t, c));
            let uv = [0, 1, 2].map(|c| mesh.uv(t, c));

            let e1 = p[1] - p[0];
            let e2 = p[2] - p[0];
            let d1 = uv[1] - uv[0];
            let d2 = uv[2] - uv[0];

            let det = d1.x * d2.y - d2.x * d1.y;
            let r = if det.abs() > f32::EPSILON { det.recip() } else { 0.0 };
            let tangent = (e1 * d2.y - e2 * d1.y) * r;
            let bitangent = (e2 * d1.x - e1 * d2.x) * r;

            for c in 0..3 {
                let key = corner_key(p[c], mesh.normal(t, c), uv[c]);
                let group = *groups.entry(key).or_insert_with(|| {
                    frames.push((Vec3::ZERO, Vec3::ZERO));
                    frames.len() - 1
                });
                frames[group].0 += tangent;
                frames[group].1 += bitangent;
                corner_group.push(group);
            }
        }

        for t in 0..triangles {
            for c in 0..3 {
                let n = mesh.normal(t, c).normalize_or_zero();
                let (tangent, bitangent) = frames[corner_group[t * 3 + c]];

                let mut ortho = (tangent - n * n.dot(tangent)).normalize_or_zero();
                if ortho == Vec3::ZERO {
                    ortho = if n == Vec3::ZERO {
                        Vec3::X
                    } else {
                        n.any_orthonormal_vector()
                    };
                }
                let sign = if n.cross(ortho).dot(bitangent) < 0.0 {
                    -1.0
                } else {
                    1.0
                };
                mesh.set_tangent(t, c, ortho, sign);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // pos(3) nrm(3) uv(2) tan(4)
    const STRIDE: usize = 12;

    fn quad_rows(flip_v: bool) -> Vec<f32> {
        let corners = [
            ([0.0, 0.0], [0.0, 0.0]),
            ([1.0, 0.0], [1.0, 0.0]),
            ([1.0, 1.0], [1.0, 1.0]),
            ([0.0, 0.0], [0.0, 0.0]),
            ([1.0, 1.0], [1.0, 1.0]),
            ([0.0, 1.0], [0.0, 1.0]),
        ];
        let mut rows = Vec::new();
        for (p, uv) in corners {
            let v = if flip_v { -uv[1] } else { uv[1] };
            rows.extend_from_slice(&[p[0], p[1], 0.0, 0.0, 0.0, 1.0, uv[0], v, 0.0, 0.0, 0.0, 0.0]);
        }
        rows
    }

    fn generate(rows: &mut [f32], sign_slot: bool) {
        let mut mesh = FlatTangentMesh {
            rows,
            stride: STRIDE,
            position: 0,
            normal: 3,
            uv: 6,
            tangent: (!sign_slot).then_some(8),
            tangent_sign: sign_slot.then_some(11),
        };
        assert_eq!(mesh.triangle_count(), 2);
        TriangleTangents.generate(&mut mesh);
    }

    #[test]
    fn test_planar_quad() {
        let mut rows = quad_rows(false);
        generate(&mut rows, false);

        for row in rows.chunks_exact(STRIDE) {
            let tangent = Vec3::from_slice(&row[8..11]);
            assert!((tangent - Vec3::X).length() < 1e-5, "tangent {tangent:?}");
            assert_eq!(row[11], 1.0);
        }
    }

    #[test]
    fn test_mirrored_uv_flips_sign() {
        let mut rows = quad_rows(true);
        generate(&mut rows, false);

        for row in rows.chunks_exact(STRIDE) {
            assert_eq!(row[11], -1.0);
        }
    }

    #[test]
    fn test_sign_only_slot() {
        let mut rows = quad_rows(true);
        generate(&mut rows, true);

        for row in rows.chunks_exact(STRIDE) {
            assert_eq!(&row[8..11], &[0.0, 0.0, 0.0]);
            assert_eq!(row[11], -1.0);
        }
    }

    #[test]
    fn test_degenerate_uvs_stay_orthogonal() {
        let mut rows = quad_rows(false);
        for row in rows.chunks_exact_mut(STRIDE) {
            row[6] = 0.5;
            row[7] = 0.5;
        }
        generate(&mut rows, false);

        for row in rows.chunks_exact(STRIDE) {
            let tangent = Vec3::from_slice(&row[8..11]);
            assert!((tangent.length() - 1.0).abs() < 1e-5);
            assert!(tangent.dot(Vec3::Z).abs() < 1e-5);
        }
    }
}
