//! Mesh part merging
//!
//! Parts that share a `(material, vertex format)` key are concatenated into
//! the first part of their group. With [`CombineMode::Everything`] the
//! material is ignored and the first part's material wins.

use std::sync::Arc;

use hashbrown::HashMap;
use spmdl_format::VertexFormat;

use super::types::MeshPart;
use crate::config::CombineMode;

/// Merge `parts` according to `mode`. Groups keep first-seen order.
///
/// `scan_limit` caps bone deduplication: once a destination holds that many
/// bones, further source bones are appended without looking for a match.
pub fn merge_mesh_parts(parts: Vec<MeshPart>, mode: CombineMode, scan_limit: usize) -> Vec<MeshPart> {
    if mode == CombineMode::None {
        return parts;
    }

    let input_count = parts.len();
    let mut groups: HashMap<(Option<String>, Arc<VertexFormat>), usize> = HashMap::new();
    let mut merged: Vec<MeshPart> = Vec::new();

    for part in parts {
        let material = match mode {
            CombineMode::Materials => part.material.clone(),
            _ => None,
        };
        let key = (material, Arc::clone(&part.format));

        match groups.get(&key) {
            Some(&group) => merge_into(&mut merged[group], &part, scan_limit),
            None => {
                groups.insert(key, merged.len());
                merged.push(part);
            }
        }
    }

    tracing::debug!("Merged {} mesh parts into {}", input_count, merged.len());
    merged
}

/// Append `src` to `dst`, remapping `src`'s bone indices into `dst`'s bone list
pub fn merge_into(dst: &mut MeshPart, src: &MeshPart, scan_limit: usize) {
    let base = dst.vertex_count as u32;

    let mut bone_map = Vec::with_capacity(src.bones.len());
    for bone in &src.bones {
        let existing = if dst.bones.len() < scan_limit {
            dst.bones.iter().position(|b| b == bone)
        } else {
            None
        };
        let local = existing.unwrap_or_else(|| {
            dst.bones.push(*bone);
            dst.bones.len() - 1
        });
        bone_map.push(local as f32);
    }

    dst.indices.extend(src.indices.iter().map(|&i| i + base));

    let appended_from = dst.vertex_data.len();
    dst.vertex_data.extend_from_slice(&src.vertex_data);

    if let Some(range) = src.bone_index_range() {
        let stride = src.format.vertex_floats();
        for row in dst.vertex_data[appended_from..].chunks_exact_mut(stride) {
            for value in &mut row[range.clone()] {
                if let Some(&mapped) = bone_map.get(*value as usize) {
                    *value = mapped;
                }
            }
        }
    }

    dst.vertex_count += src.vertex_count;
    if dst.root_bone.is_none() {
        dst.root_bone = src.root_bone;
    }
}
