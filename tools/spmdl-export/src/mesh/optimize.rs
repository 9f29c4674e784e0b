//! Vertex deduplication and GPU locality passes
//!
//! [`VertexOptimizer`] is the seam the builder and exporter use; the default
//! [`MeshOptimizer`] dedups rows by exact bit pattern and reorders triangles
//! with a Tipsify-style FIFO cache simulation.
//!
//! After splitting, [`optimize_mesh_part`] runs the full sequence on each
//! part: spatial sort, cache reorder, overdraw cluster sort and vertex fetch
//! reorder.

use bytemuck::cast_slice;
use glam::Vec3;
use hashbrown::HashMap;
use spmdl_format::Semantic;

use super::types::MeshPart;

/// Post-transform vertex cache size assumed by the triangle reorder
pub const CACHE_SIZE: usize = 16;

pub trait VertexOptimizer {
    /// Map every row of `rows` (`count` rows of `stride` floats) to a unique
    /// vertex id. Returns the unique count and one id per row; ids are
    /// assigned in first-seen order.
    fn remap(&self, rows: &[f32], stride: usize, count: usize) -> (usize, Vec<u32>);

    /// Reorder triangles for vertex cache locality. Triangle winding and
    /// the set of triangles are preserved.
    fn optimize_cache(&self, indices: &mut [u32], vertex_count: usize);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeshOptimizer;

impl VertexOptimizer for MeshOptimizer {
    fn remap(&self, rows: &[f32], stride: usize, count: usize) -> (usize, Vec<u32>) {
        if stride == 0 {
            // Every row is identical
            let unique = usize::from(count > 0);
            return (unique, vec![0; count]);
        }

        let bits: &[u32] = cast_slice(&rows[..count * stride]);
        let mut seen: HashMap<&[u32], u32> = HashMap::with_capacity(count);
        let remap = bits
            .chunks_exact(stride)
            .map(|row| {
                let next = seen.len() as u32;
                *seen.entry(row).or_insert(next)
            })
            .collect();
        (seen.len(), remap)
    }

    fn optimize_cache(&self, indices: &mut [u32], vertex_count: usize) {
        let reordered = tipsify(indices, vertex_count, CACHE_SIZE);
        indices.copy_from_slice(&reordered);
    }
}

/// Tipsify triangle reordering (Sander, Nehab, Barczak 2007)
fn tipsify(indices: &[u32], vertex_count: usize, cache_size: usize) -> Vec<u32> {
    let triangle_count = indices.len() / 3;
    if triangle_count == 0 || vertex_count == 0 {
        return indices.to_vec();
    }

    // Vertex -> triangle adjacency in CSR form
    let mut live = vec![0usize; vertex_count];
    for &v in indices {
        live[v as usize] += 1;
    }
    let mut offsets = vec![0usize; vertex_count + 1];
    for v in 0..vertex_count {
        offsets[v + 1] = offsets[v] + live[v];
    }
    let mut fill = offsets.clone();
    let mut adjacency = vec![0usize; indices.len()];
    for (i, &v) in indices.iter().enumerate() {
        adjacency[fill[v as usize]] = i / 3;
        fill[v as usize] += 1;
    }

    let mut cache_time = vec![0usize; vertex_count];
    let mut emitted = vec![false; triangle_count];
    let mut dead_end: Vec<u32> = Vec::new();
    let mut output = Vec::with_capacity(indices.len());

    let mut timestamp = cache_size + 1;
    let mut cursor = 0;
    let mut fanning = Some(indices[0] as usize);

    while let Some(f) = fanning {
        let mut candidates: Vec<u32> = Vec::new();

        for &t in &adjacency[offsets[f]..offsets[f + 1]] {
            if emitted[t] {
                continue;
            }
            emitted[t] = true;
            for &v in &indices[t * 3..t * 3 + 3] {
                output.push(v);
                dead_end.push(v);
                candidates.push(v);
                let v = v as usize;
                live[v] -= 1;
                if timestamp - cache_time[v] > cache_size {
                    cache_time[v] = timestamp;
                    timestamp += 1;
                }
            }
        }

        // Best candidate still in cache with live triangles
        let mut best = None;
        let mut best_priority = -1i64;
        for &v in &candidates {
            let v = v as usize;
            if live[v] == 0 {
                continue;
            }
            let age = timestamp - cache_time[v];
            let priority = if age + 2 * live[v] <= cache_size {
                age as i64
            } else {
                0
            };
            if priority > best_priority {
                best_priority = priority;
                best = Some(v);
            }
        }

        fanning = best.or_else(|| {
            while let Some(v) = dead_end.pop() {
                if live[v as usize] > 0 {
                    return Some(v as usize);
                }
            }
            while cursor < vertex_count {
                cursor += 1;
                if live[cursor - 1] > 0 {
                    return Some(cursor - 1);
                }
            }
            None
        });
    }

    output
}

// ============================================================================
// Spatial sort
// ============================================================================

fn position(vertex_data: &[f32], stride: usize, offset: usize, vertex: u32) -> Vec3 {
    let base = vertex as usize * stride + offset;
    Vec3::from_slice(&vertex_data[base..base + 3])
}

/// Spread the low 10 bits of `v` to every third bit
fn part1by2(v: u32) -> u32 {
    let mut x = v & 0x3FF;
    x = (x | (x << 16)) & 0x030000FF;
    x = (x | (x << 8)) & 0x0300F00F;
    x = (x | (x << 4)) & 0x030C30C3;
    (x | (x << 2)) & 0x09249249
}

/// Reorder triangles along a Morton curve through their centroids.
///
/// Positions are read from `vertex_data` rows of `stride` floats at
/// `offset`. Triangles with equal keys keep their relative order.
pub fn spatial_sort_triangles(indices: &mut [u32], vertex_data: &[f32], stride: usize, offset: usize) {
    let centroids: Vec<Vec3> = indices
        .chunks_exact(3)
        .map(|t| {
            (position(vertex_data, stride, offset, t[0])
                + position(vertex_data, stride, offset, t[1])
                + position(vertex_data, stride, offset, t[2]))
                / 3.0
        })
        .collect();
    if centroids.len() < 2 {
        return;
    }

    let min = centroids.iter().copied().fold(Vec3::INFINITY, Vec3::min);
    let max = centroids.iter().copied().fold(Vec3::NEG_INFINITY, Vec3::max);
    let extent = (max - min).max_element();
    let scale = if extent > 0.0 { 1023.0 / extent } else { 0.0 };

    let keys: Vec<u32> = centroids
        .iter()
        .map(|&c| {
            let q = ((c - min) * scale + 0.5).as_uvec3();
            part1by2(q.x) | (part1by2(q.y) << 1) | (part1by2(q.z) << 2)
        })
        .collect();

    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by_key(|&t| keys[t]);
    reorder_triangles(indices, &order);
}

fn reorder_triangles(indices: &mut [u32], order: &[usize]) {
    let source = indices.to_vec();
    for (dst, &t) in indices.chunks_exact_mut(3).zip(order) {
        dst.copy_from_slice(&source[t * 3..t * 3 + 3]);
    }
}

// ============================================================================
// Overdraw
// ============================================================================

/// FIFO post-transform cache simulation
struct CacheSim {
    cache_time: Vec<usize>,
    timestamp: usize,
}

impl CacheSim {
    fn new(vertex_count: usize) -> Self {
        Self {
            cache_time: vec![0; vertex_count],
            timestamp: CACHE_SIZE + 1,
        }
    }

    fn reset(&mut self) {
        self.timestamp += CACHE_SIZE + 1;
    }

    /// Cache misses caused by one triangle
    fn triangle(&mut self, triangle: &[u32]) -> usize {
        let mut misses = 0;
        for &v in triangle {
            let v = v as usize;
            if self.timestamp - self.cache_time[v] > CACHE_SIZE {
                self.cache_time[v] = self.timestamp;
                self.timestamp += 1;
                misses += 1;
            }
        }
        misses
    }
}

/// Cluster start triangles: a cluster opens wherever a triangle misses on
/// all three vertices, and again inside a cluster once the running miss
/// ratio falls to within `threshold` of the cluster's own ratio
fn cluster_boundaries(indices: &[u32], vertex_count: usize, threshold: f32) -> Vec<usize> {
    let triangle_count = indices.len() / 3;
    let mut cache = CacheSim::new(vertex_count);

    let mut hard = Vec::new();
    for t in 0..triangle_count {
        if cache.triangle(&indices[t * 3..t * 3 + 3]) == 3 {
            hard.push(t);
        }
    }
    if hard.first() != Some(&0) {
        hard.insert(0, 0);
    }

    let mut soft = Vec::new();
    for (i, &start) in hard.iter().enumerate() {
        let end = hard.get(i + 1).copied().unwrap_or(triangle_count);

        cache.reset();
        let misses: usize = (start..end)
            .map(|t| cache.triangle(&indices[t * 3..t * 3 + 3]))
            .sum();
        let target = misses as f32 / (end - start) as f32 * threshold;

        cache.reset();
        soft.push(start);
        let mut running_misses = 0;
        let mut running_triangles = 0;
        for t in start..end {
            running_misses += cache.triangle(&indices[t * 3..t * 3 + 3]);
            running_triangles += 1;
            if t + 1 < end && running_misses as f32 / running_triangles as f32 <= target {
                soft.push(t + 1);
                cache.reset();
                running_misses = 0;
                running_triangles = 0;
            }
        }
    }
    soft
}

/// Sort triangle clusters so outward facing ones draw first.
///
/// Clusters come from the cache order already in `indices`, so the cache
/// miss ratio grows by at most `threshold`. Each cluster is keyed by how far
/// its area-weighted centroid lies along its average normal, measured from
/// the mesh centroid.
pub fn optimize_overdraw(
    indices: &mut [u32],
    vertex_data: &[f32],
    stride: usize,
    offset: usize,
    vertex_count: usize,
    threshold: f32,
) {
    let triangle_count = indices.len() / 3;
    if triangle_count < 2 {
        return;
    }

    let boundaries = cluster_boundaries(indices, vertex_count, threshold);
    if boundaries.len() < 2 {
        return;
    }

    struct Cluster {
        start: usize,
        end: usize,
        centroid: Vec3,
        normal: Vec3,
        area: f32,
    }

    let mut clusters = Vec::with_capacity(boundaries.len());
    let mut mesh_centroid = Vec3::ZERO;
    let mut mesh_area = 0.0;
    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(triangle_count);
        let mut centroid = Vec3::ZERO;
        let mut normal = Vec3::ZERO;
        let mut area = 0.0;
        for t in indices[start * 3..end * 3].chunks_exact(3) {
            let a = position(vertex_data, stride, offset, t[0]);
            let b = position(vertex_data, stride, offset, t[1]);
            let c = position(vertex_data, stride, offset, t[2]);
            let cross = (b - a).cross(c - a);
            let weight = cross.length();
            centroid += (a + b + c) / 3.0 * weight;
            normal += cross;
            area += weight;
        }
        if area > 0.0 {
            centroid /= area;
        }
        mesh_centroid += centroid * area;
        mesh_area += area;
        clusters.push(Cluster {
            start,
            end,
            centroid,
            normal: normal.normalize_or_zero(),
            area,
        });
    }
    if mesh_area > 0.0 {
        mesh_centroid /= mesh_area;
    }

    let keys: Vec<f32> = clusters
        .iter()
        .map(|c| if c.area > 0.0 { (c.centroid - mesh_centroid).dot(c.normal) } else { 0.0 })
        .collect();
    let mut order: Vec<usize> = (0..clusters.len()).collect();
    order.sort_by(|&a, &b| keys[b].total_cmp(&keys[a]));

    let source = indices.to_vec();
    let mut cursor = 0;
    for &c in &order {
        let cluster = &clusters[c];
        let span = &source[cluster.start * 3..cluster.end * 3];
        indices[cursor..cursor + span.len()].copy_from_slice(span);
        cursor += span.len();
    }
}

// ============================================================================
// Vertex fetch
// ============================================================================

/// Renumber vertices in first-use order and drop unreferenced ones.
///
/// `vertex_data` holds `stride` floats per vertex. Returns the new vertex count.
pub fn optimize_vertex_fetch(indices: &mut [u32], vertex_data: &mut Vec<f32>, stride: usize) -> usize {
    let vertex_count = if stride == 0 {
        indices.iter().map(|&i| i as usize + 1).max().unwrap_or(0)
    } else {
        vertex_data.len() / stride
    };

    let mut remap = vec![u32::MAX; vertex_count];
    let mut order = Vec::with_capacity(vertex_count);
    for index in indices.iter_mut() {
        let old = *index as usize;
        if remap[old] == u32::MAX {
            remap[old] = order.len() as u32;
            order.push(old);
        }
        *index = remap[old];
    }

    let mut reordered = Vec::with_capacity(order.len() * stride);
    for &old in &order {
        reordered.extend_from_slice(&vertex_data[old * stride..(old + 1) * stride]);
    }
    *vertex_data = reordered;
    order.len()
}

/// Post-split locality passes over one part.
///
/// Spatial sort, cache reorder, overdraw sort, then vertex fetch reorder.
/// The position-based passes are skipped when the format has no position.
pub fn optimize_mesh_part(part: &mut MeshPart, optimizer: &dyn VertexOptimizer, overdraw_threshold: f32) {
    let stride = part.format.vertex_floats();
    let position = part.format.find(Semantic::Position).map(|p| p.float_offset);

    if let Some(offset) = position {
        spatial_sort_triangles(&mut part.indices, &part.vertex_data, stride, offset);
    }
    optimizer.optimize_cache(&mut part.indices, part.vertex_count);
    if let Some(offset) = position {
        optimize_overdraw(
            &mut part.indices,
            &part.vertex_data,
            stride,
            offset,
            part.vertex_count,
            overdraw_threshold,
        );
    }
    part.vertex_count = optimize_vertex_fetch(&mut part.indices, &mut part.vertex_data, stride);
}
