//! Model container (.spmdl)
//!
//! A model is a section container with magic `SPMD` and six sections:
//!
//! | Tag    | Payload                                              |
//! |--------|------------------------------------------------------|
//! | `NODE` | [`NodeRecord`] table, parents before children        |
//! | `BONE` | [`BoneRecord`] table, each mesh owns a contiguous run |
//! | `MESH` | [`MeshRecord`] table                                 |
//! | `STRS` | null-terminated string pool                          |
//! | `VTX ` | encoded vertex streams of every mesh                 |
//! | `IDX ` | encoded index buffers of every mesh                  |
//!
//! The info block is a [`ModelInfo`].

use super::container::{ContainerReader, fourcc};
use super::serialization::{BinarySerializable, ByteReader, put_f32s, put_u32, read_table};
use super::string_pool::StringRef;
use crate::vertex_format::{MAX_ATTRIBUTES, MAX_STREAMS};
use crate::FormatError;

/// Model container magic
pub const MODEL_MAGIC: u32 = fourcc(b"SPMD");

pub const NODE_TAG: u32 = fourcc(b"NODE");
pub const BONE_TAG: u32 = fourcc(b"BONE");
pub const MESH_TAG: u32 = fourcc(b"MESH");
pub const STRING_TAG: u32 = fourcc(b"STRS");
pub const VERTEX_TAG: u32 = fourcc(b"VTX ");
pub const INDEX_TAG: u32 = fourcc(b"IDX ");

/// Marks a missing node or bone reference
pub const NO_INDEX: u32 = u32::MAX;

/// 3x4 column-major affine matrix: [col0.xyz, col1.xyz, col2.xyz, col3.xyz]
pub type Matrix3x4 = [f32; 12];

// ============================================================================
// Info block
// ============================================================================

/// Model info block (16 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelInfo {
    pub node_count: u32,
    pub bone_count: u32,
    pub mesh_count: u32,
    pub _reserved: u32,
}

impl ModelInfo {
    pub const SIZE: usize = 16;

    pub fn new(node_count: u32, bone_count: u32, mesh_count: u32) -> Self {
        Self {
            node_count,
            bone_count,
            mesh_count,
            _reserved: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.node_count.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.bone_count.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.mesh_count.to_le_bytes());
        // reserved bytes stay 0
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(bytes);
        Some(Self {
            node_count: r.u32()?,
            bone_count: r.u32()?,
            mesh_count: r.u32()?,
            _reserved: r.u32()?,
        })
    }
}

// ============================================================================
// Records
// ============================================================================

/// Flattened scene graph node (148 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRecord {
    /// Parent node index or [`NO_INDEX`]
    pub parent: u32,
    pub name: StringRef,
    pub translation: [f32; 3],
    /// Quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub local: Matrix3x4,
    pub world: Matrix3x4,
}

impl NodeRecord {
    pub const SIZE: usize = 148;
}

/// Skinning bone (52 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneRecord {
    pub node: u32,
    /// Mesh space to bone space (inverse bind) matrix
    pub mesh_to_bone: Matrix3x4,
}

impl BoneRecord {
    pub const SIZE: usize = 52;
}

/// Location of an encoded buffer inside the vertex or index section (12 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferRef {
    pub offset: u32,
    pub encoded_size: u32,
    pub stride: u32,
}

impl BufferRef {
    pub const SIZE: usize = 12;

    fn write(&self, out: &mut Vec<u8>) {
        put_u32(out, self.offset);
        put_u32(out, self.encoded_size);
        put_u32(out, self.stride);
    }

    fn read(r: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            offset: r.u32()?,
            encoded_size: r.u32()?,
            stride: r.u32()?,
        })
    }
}

/// One vertex attribute of a mesh (8 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttribRecord {
    /// `Semantic` discriminant
    pub semantic: u8,
    /// `Format::id()`
    pub format: u8,
    pub stream: u8,
    pub _reserved: u8,
    /// Byte offset inside one vertex of its stream
    pub offset: u32,
}

impl AttribRecord {
    pub const SIZE: usize = 8;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.semantic, self.format, self.stream, 0]);
        put_u32(out, self.offset);
    }

    fn read(r: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            semantic: r.u8()?,
            format: r.u8()?,
            stream: r.u8()?,
            _reserved: r.u8()?,
            offset: r.u32()?,
        })
    }
}

/// Encoded mesh (228 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshRecord {
    pub node: u32,
    /// Topmost skeleton node of the mesh or [`NO_INDEX`]
    pub root_bone: u32,
    pub material: StringRef,
    pub index_count: u32,
    pub vertex_count: u32,
    pub attrib_count: u32,
    pub stream_count: u32,
    /// First bone of this mesh in the bone table
    pub bone_offset: u32,
    pub bone_count: u32,
    /// Stride 2 or 4
    pub index_buffer: BufferRef,
    pub vertex_buffers: [BufferRef; MAX_STREAMS],
    pub attribs: [AttribRecord; MAX_ATTRIBUTES],
}

impl MeshRecord {
    pub const SIZE: usize = 228;

    /// Attributes actually used by this mesh
    pub fn attribs(&self) -> &[AttribRecord] {
        &self.attribs[..(self.attrib_count as usize).min(MAX_ATTRIBUTES)]
    }

    /// Vertex streams actually used by this mesh
    pub fn vertex_buffers(&self) -> &[BufferRef] {
        &self.vertex_buffers[..(self.stream_count as usize).min(MAX_STREAMS)]
    }
}

impl BinarySerializable for ModelInfo {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for NodeRecord {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        put_u32(&mut out, self.parent);
        self.name.write(&mut out);
        put_f32s(&mut out, &self.translation);
        put_f32s(&mut out, &self.rotation);
        put_f32s(&mut out, &self.scale);
        put_f32s(&mut out, &self.local);
        put_f32s(&mut out, &self.world);
        out
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(bytes);
        Some(Self {
            parent: r.u32()?,
            name: StringRef::read(&mut r)?,
            translation: r.f32_array()?,
            rotation: r.f32_array()?,
            scale: r.f32_array()?,
            local: r.f32_array()?,
            world: r.f32_array()?,
        })
    }
}

impl BinarySerializable for BoneRecord {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        put_u32(&mut out, self.node);
        put_f32s(&mut out, &self.mesh_to_bone);
        out
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(bytes);
        Some(Self {
            node: r.u32()?,
            mesh_to_bone: r.f32_array()?,
        })
    }
}

impl BinarySerializable for MeshRecord {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        put_u32(&mut out, self.node);
        put_u32(&mut out, self.root_bone);
        self.material.write(&mut out);
        for value in [
            self.index_count,
            self.vertex_count,
            self.attrib_count,
            self.stream_count,
            self.bone_offset,
            self.bone_count,
        ] {
            put_u32(&mut out, value);
        }
        self.index_buffer.write(&mut out);
        for buffer in &self.vertex_buffers {
            buffer.write(&mut out);
        }
        for attrib in &self.attribs {
            attrib.write(&mut out);
        }
        out
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(bytes);
        let node = r.u32()?;
        let root_bone = r.u32()?;
        let material = StringRef::read(&mut r)?;
        let index_count = r.u32()?;
        let vertex_count = r.u32()?;
        let attrib_count = r.u32()?;
        let stream_count = r.u32()?;
        let bone_offset = r.u32()?;
        let bone_count = r.u32()?;
        let index_buffer = BufferRef::read(&mut r)?;
        let mut vertex_buffers = [BufferRef::default(); MAX_STREAMS];
        for buffer in &mut vertex_buffers {
            *buffer = BufferRef::read(&mut r)?;
        }
        let mut attribs = [AttribRecord::default(); MAX_ATTRIBUTES];
        for attrib in &mut attribs {
            *attrib = AttribRecord::read(&mut r)?;
        }
        Some(Self {
            node,
            root_bone,
            material,
            index_count,
            vertex_count,
            attrib_count,
            stream_count,
            bone_offset,
            bone_count,
            index_buffer,
            vertex_buffers,
            attribs,
        })
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Fully decoded model container
#[derive(Debug, Clone)]
pub struct ModelFile {
    pub info: ModelInfo,
    pub nodes: Vec<NodeRecord>,
    pub bones: Vec<BoneRecord>,
    pub meshes: Vec<MeshRecord>,
    pub strings: Vec<u8>,
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
}

impl ModelFile {
    /// Decode every section of a model container
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let reader = ContainerReader::parse(bytes, Some(MODEL_MAGIC))?;
        let info = ModelInfo::from_bytes(reader.info()).ok_or(FormatError::Truncated {
            what: "model info",
            needed: ModelInfo::SIZE,
            available: reader.info().len(),
        })?;

        let nodes = read_table(&reader.payload_by_tag(NODE_TAG, 0)?)
            .ok_or(FormatError::MalformedSection("node"))?;
        let bones = read_table(&reader.payload_by_tag(BONE_TAG, 0)?)
            .ok_or(FormatError::MalformedSection("bone"))?;
        let meshes = read_table(&reader.payload_by_tag(MESH_TAG, 0)?)
            .ok_or(FormatError::MalformedSection("mesh"))?;

        Ok(Self {
            info,
            nodes,
            bones,
            meshes,
            strings: reader.payload_by_tag(STRING_TAG, 0)?.into_owned(),
            vertex_data: reader.payload_by_tag(VERTEX_TAG, 0)?.into_owned(),
            index_data: reader.payload_by_tag(INDEX_TAG, 0)?.into_owned(),
        })
    }

    pub fn string(&self, name: StringRef) -> Option<&str> {
        name.resolve(&self.strings)
    }

    /// Encoded bytes of one vertex stream of a mesh
    pub fn vertex_stream(&self, mesh: &MeshRecord, stream: usize) -> Option<&[u8]> {
        let buffer = mesh.vertex_buffers().get(stream)?;
        let start = buffer.offset as usize;
        self.vertex_data
            .get(start..start + buffer.encoded_size as usize)
    }

    /// Decoded index buffer of a mesh
    pub fn indices(&self, mesh: &MeshRecord) -> Option<Vec<u32>> {
        let buffer = mesh.index_buffer;
        let start = buffer.offset as usize;
        let bytes = self
            .index_data
            .get(start..start + buffer.encoded_size as usize)?;
        match buffer.stride {
            2 => Some(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                    .collect(),
            ),
            4 => Some(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            _ => None,
        }
    }
}
