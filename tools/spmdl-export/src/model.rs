//! Model export (source scene -> .spmdl container)
//!
//! Pipeline: build mesh parts per source mesh, merge them per the combine
//! mode, split them to the configured budget, encode the vertex streams in
//! parallel and serialize everything into a six-section container.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use spmdl_format::formats::{
    write_table, BONE_TAG, INDEX_TAG, MESH_TAG, NODE_TAG, STRING_TAG, VERTEX_TAG,
};
use spmdl_format::{
    AttribRecord, BoneRecord, BufferRef, CompressedSection, ContainerBuilder, FormatError,
    MeshRecord, ModelInfo, Semantic, StringPool, VertexFormat, MAX_ATTRIBUTES, MAX_STREAMS,
    MODEL_MAGIC, NO_INDEX,
};

use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::mesh::{
    build_mesh_parts, encode_index_buffer, encode_stream, merge_mesh_parts, optimize_mesh_part,
    split_mesh_part, BuildOptions, MeshOptimizer, MeshPart, TriangleTangents,
};
use crate::nodes::{matrix3x4, NodeTable};
use crate::parallel::parallel_for;
use crate::scene::SourceScene;

/// Encoded model and what went into it
#[derive(Debug, Clone)]
pub struct ExportedModel {
    pub bytes: Vec<u8>,
    pub node_count: usize,
    pub bone_count: usize,
    pub mesh_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

fn to_u32(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| FormatError::Overflow(what).into())
}

/// One line per attribute: stream, offset, semantic, format and size
pub fn vertex_format_layout(format: &VertexFormat) -> String {
    let mut out = String::new();
    for (stream, stride) in format.strides().iter().enumerate() {
        out.push_str(&format!("stream {} (stride {}):\n", stream, stride));
        for attribute in format.stream_attributes(stream) {
            out.push_str(&format!(
                "  {:>3}  {:<5} {:<10} {} bytes\n",
                attribute.byte_offset,
                attribute.semantic.code(),
                attribute.format.to_string(),
                attribute.format.byte_size()
            ));
        }
    }
    out
}

// ============================================================================
// Mesh parts
// ============================================================================

/// Run the builder, merger, splitter and post-split optimizer over every mesh
pub fn build_parts(
    scene: &SourceScene,
    config: &ExportConfig,
    format: &Arc<VertexFormat>,
) -> Result<Vec<MeshPart>> {
    let options = BuildOptions {
        transform_to_root: config.transform_to_root,
        weights_per_vertex: format.weights_per_vertex(),
    };
    let optimizer = MeshOptimizer;

    let mut parts = Vec::new();
    for mesh_index in 0..scene.meshes.len() {
        parts.extend(build_mesh_parts(
            scene,
            mesh_index,
            format,
            &options,
            &TriangleTangents,
            &optimizer,
        )?);
    }
    tracing::debug!("Built {} mesh parts from {} meshes", parts.len(), scene.meshes.len());

    let merged = merge_mesh_parts(parts, config.combine, config.bone_merge_scan_limit);

    let mut split = Vec::with_capacity(merged.len());
    for part in merged {
        split.extend(split_mesh_part(part, &config.limits)?);
    }

    if config.optimize {
        for part in &mut split {
            optimize_mesh_part(part, &optimizer, config.overdraw_threshold);
        }
    }

    Ok(split)
}

fn log_position_bounds(part: &MeshPart) {
    let Some(position) = part.format.find(Semantic::Position) else {
        return;
    };
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for v in 0..part.vertex_count {
        let row = &part.vertex(v)[position.float_offset..position.float_offset + 3];
        for axis in 0..3 {
            min[axis] = min[axis].min(row[axis]);
            max[axis] = max[axis].max(row[axis]);
        }
    }
    tracing::debug!(
        "{}: {} vertices, {} triangles, {} bones, bounds {:?}..{:?}",
        part.label(),
        part.vertex_count,
        part.triangle_count(),
        part.bones.len(),
        min,
        max
    );
}

// ============================================================================
// Export
// ============================================================================

/// Export `scene` into an in-memory model container
pub fn export_scene(scene: &SourceScene, config: &ExportConfig) -> Result<ExportedModel> {
    config.validate()?;
    let format = config.parse_vertex_format()?;
    if config.verbose {
        tracing::debug!("Vertex format {}\n{}", format, vertex_format_layout(&format));
    }

    let parts = build_parts(scene, config, &format)?;
    if config.verbose {
        parts.iter().for_each(log_position_bounds);
    }

    // One encode job per (part, stream)
    let stream_count = format.stream_count();
    let streams = parallel_for(config.threads, parts.len() * stream_count, |job| {
        Ok(encode_stream(&parts[job / stream_count], job % stream_count))
    })?;

    let mut nodes = NodeTable::new(scene);
    let mut strings = StringPool::new();
    let mut bones = Vec::new();
    let mut meshes = Vec::with_capacity(parts.len());
    let mut vertex_data: Vec<u8> = Vec::new();
    let mut index_data: Vec<u8> = Vec::new();

    let attribs = attrib_records(&format);

    for (part_index, part) in parts.iter().enumerate() {
        let node = nodes.register(scene, part.node);
        let root_bone = part
            .root_bone
            .map(|bone| nodes.register(scene, bone))
            .unwrap_or(NO_INDEX);

        let bone_offset = bones.len();
        for bone in &part.bones {
            bones.push(BoneRecord {
                node: nodes.register(scene, bone.node),
                mesh_to_bone: matrix3x4(&bone.bind_matrix),
            });
        }

        let mut vertex_buffers = [BufferRef::default(); MAX_STREAMS];
        for (stream, buffer) in vertex_buffers.iter_mut().enumerate().take(stream_count) {
            let stride = format.strides()[stream];
            if stride > 0 {
                vertex_data.resize(vertex_data.len().next_multiple_of(stride), 0);
            }
            let bytes = &streams[part_index * stream_count + stream];
            *buffer = BufferRef {
                offset: to_u32(vertex_data.len(), "vertex section")?,
                encoded_size: to_u32(bytes.len(), "vertex stream")?,
                stride: to_u32(stride, "vertex stride")?,
            };
            vertex_data.extend_from_slice(bytes);
        }

        let indices = encode_index_buffer(&part.indices, part.vertex_count);
        let index_bytes = indices.to_bytes();
        let index_buffer = BufferRef {
            offset: to_u32(index_data.len(), "index section")?,
            encoded_size: to_u32(index_bytes.len(), "index buffer")?,
            stride: indices.stride() as u32,
        };
        index_data.extend_from_slice(&index_bytes);
        index_data.resize(index_data.len().next_multiple_of(4), 0);

        meshes.push(MeshRecord {
            node,
            root_bone,
            material: strings.intern(part.material.as_deref().unwrap_or("")),
            index_count: to_u32(part.indices.len(), "index count")?,
            vertex_count: to_u32(part.vertex_count, "vertex count")?,
            attrib_count: format.attributes().len() as u32,
            stream_count: stream_count as u32,
            bone_offset: to_u32(bone_offset, "bone offset")?,
            bone_count: to_u32(part.bones.len(), "bone count")?,
            index_buffer,
            vertex_buffers,
            attribs,
        });
    }

    let node_records = nodes.records(scene, &mut strings);
    let info = ModelInfo::new(
        to_u32(node_records.len(), "node count")?,
        to_u32(bones.len(), "bone count")?,
        to_u32(meshes.len(), "mesh count")?,
    );

    let payloads = [
        (NODE_TAG, write_table(&node_records)),
        (BONE_TAG, write_table(&bones)),
        (MESH_TAG, write_table(&meshes)),
        (STRING_TAG, strings.into_bytes()),
        (VERTEX_TAG, vertex_data),
        (INDEX_TAG, index_data),
    ];

    let options = config.compress_options();
    let sections = parallel_for(config.threads, payloads.len(), |i| {
        let (tag, payload) = &payloads[i];
        Ok(CompressedSection::compress(*tag, 0, payload.clone(), &options)?)
    })?;

    let mut builder = ContainerBuilder::new(MODEL_MAGIC, info.to_bytes().to_vec());
    for section in sections {
        builder.push(section);
    }
    let bytes = builder.build()?;

    let exported = ExportedModel {
        bytes,
        node_count: node_records.len(),
        bone_count: bones.len(),
        mesh_count: meshes.len(),
        vertex_count: parts.iter().map(|p| p.vertex_count).sum(),
        triangle_count: parts.iter().map(MeshPart::triangle_count).sum(),
    };

    tracing::info!(
        "Exported model: {} nodes, {} bones, {} meshes, {} vertices, {} triangles, {} bytes",
        exported.node_count,
        exported.bone_count,
        exported.mesh_count,
        exported.vertex_count,
        exported.triangle_count,
        exported.bytes.len()
    );

    Ok(exported)
}

fn attrib_records(format: &VertexFormat) -> [AttribRecord; MAX_ATTRIBUTES] {
    let mut records = [AttribRecord::default(); MAX_ATTRIBUTES];
    for (record, attribute) in records.iter_mut().zip(format.attributes()) {
        *record = AttribRecord {
            semantic: attribute.semantic as u8,
            format: attribute.format.id(),
            stream: attribute.stream as u8,
            _reserved: 0,
            offset: attribute.byte_offset as u32,
        };
    }
    records
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so a failed export never leaves a truncated container behind
pub fn write_model(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_error = |source: std::io::Error| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(bytes).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|e| io_error(e.error))?;

    tracing::debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Face, IndexedAttribute, SourceMesh, SourceNode};
    use glam::Vec3;

    fn triangle_scene() -> SourceScene {
        SourceScene {
            nodes: vec![SourceNode::new("root", None), SourceNode::new("tri", Some(0))],
            meshes: vec![SourceMesh {
                name: "tri".to_string(),
                node: 1,
                positions: IndexedAttribute::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]),
                normals: None,
                uvs: None,
                colors: None,
                faces: vec![Face {
                    index_begin: 0,
                    num_indices: 3,
                }],
                face_materials: Vec::new(),
                materials: vec!["stone".to_string()],
                skin: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_layout_lists_every_attribute() {
        let format = VertexFormat::parse("pos_rgb32f,nrm_rgba8sn;uv_rg16f").unwrap();
        let layout = vertex_format_layout(&format);
        assert!(layout.contains("stream 0 (stride 16)"));
        assert!(layout.contains("stream 1 (stride 4)"));
        assert!(layout.contains("nrm"));
    }

    #[test]
    fn test_export_single_triangle() {
        let config = ExportConfig {
            vertex_format: "pos_rgb32f".to_string(),
            ..ExportConfig::default()
        };
        let model = export_scene(&triangle_scene(), &config).unwrap();
        assert_eq!(model.mesh_count, 1);
        assert_eq!(model.node_count, 2);
        assert_eq!(model.triangle_count, 1);

        let file = spmdl_format::ModelFile::parse(&model.bytes).unwrap();
        assert_eq!(file.meshes[0].vertex_count, 3);
        assert_eq!(file.meshes[0].root_bone, NO_INDEX);
        assert_eq!(file.string(file.meshes[0].material), Some("stone"));
        assert_eq!(file.nodes[file.meshes[0].node as usize].parent, 0);
    }

    #[test]
    fn test_write_model_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.spmdl");
        std::fs::write(&path, b"old").unwrap();

        write_model(&path, b"new contents").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new contents");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
