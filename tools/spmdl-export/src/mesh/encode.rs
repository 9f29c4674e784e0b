//! Packed GPU buffers for a finished mesh part

use spmdl_format::{encode_attribute, encode_weights, Semantic};

use super::types::MeshPart;

/// Index buffer with the narrowest element type the vertex count allows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Bytes per index
    pub fn stride(&self) -> usize {
        match self {
            IndexBuffer::U16(_) => 2,
            IndexBuffer::U32(_) => 4,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            IndexBuffer::U16(v) => v.iter().flat_map(|i| i.to_le_bytes()).collect(),
            IndexBuffer::U32(v) => v.iter().flat_map(|i| i.to_le_bytes()).collect(),
        }
    }
}

/// 16-bit indices when every vertex fits, 32-bit otherwise
pub fn encode_index_buffer(indices: &[u32], vertex_count: usize) -> IndexBuffer {
    if vertex_count <= u16::MAX as usize {
        IndexBuffer::U16(indices.iter().map(|&i| i as u16).collect())
    } else {
        IndexBuffer::U32(indices.to_vec())
    }
}

/// Pack one vertex stream of `part`: `vertex_count * stride` bytes, padding
/// attributes left zero.
pub fn encode_stream(part: &MeshPart, stream: usize) -> Vec<u8> {
    let format = &part.format;
    let stride = format.strides()[stream];
    let mut out = vec![0u8; part.vertex_count * stride];
    if stride == 0 {
        return out;
    }

    for (v, dst) in out.chunks_exact_mut(stride).enumerate() {
        let row = part.vertex(v);
        for attribute in format.stream_attributes(stream) {
            if attribute.semantic == Semantic::Padding {
                continue;
            }
            let values = &row[attribute.float_offset..attribute.float_offset + attribute.float_width];
            let slot = &mut dst[attribute.byte_offset..attribute.byte_offset + attribute.format.byte_size()];
            if attribute.semantic == Semantic::BoneWeight {
                encode_weights(attribute.format, values, slot);
            } else {
                encode_attribute(attribute.format, values, slot);
            }
        }
    }

    out
}
