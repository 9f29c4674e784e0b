//! Section container
//!
//! # Layout
//! ```text
//! 0x00: magic u32
//! 0x04: version u32
//! 0x08: info_size u32
//! 0x0C: section_count u32
//! 0x10: info block (info_size bytes)
//! var:  section descriptors (section_count * 24 bytes)
//! var:  payloads, each starting on a 16-byte boundary, zero padded
//! ```
//!
//! Each descriptor records where its payload lives and how it is stored
//! (raw or zstd). Offsets are absolute file offsets.

use std::borrow::Cow;
use std::io::Cursor;

use super::serialization::{BinarySerializable, ByteReader};
use crate::FormatError;

/// Current container version
pub const CONTAINER_VERSION: u32 = 1;

/// Alignment of every section payload inside the file
pub const SECTION_ALIGNMENT: usize = 16;

/// Build a little-endian four character code
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Render a four character code for diagnostics
pub fn fourcc_name(tag: u32) -> String {
    tag.to_le_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

// ============================================================================
// Headers
// ============================================================================

/// Container file header (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub info_size: u32,
    pub section_count: u32,
}

impl FileHeader {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.info_size.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.section_count.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(bytes);
        Some(Self {
            magic: r.u32()?,
            version: r.u32()?,
            info_size: r.u32()?,
            section_count: r.u32()?,
        })
    }
}

/// How a section payload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CompressionKind {
    None = 0,
    Zstd = 1,
}

impl CompressionKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(CompressionKind::None),
            1 => Some(CompressionKind::Zstd),
            _ => None,
        }
    }
}

/// Section descriptor (24 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub tag: u32,
    pub index: u32,
    pub compression: u32,
    pub offset: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl SectionDescriptor {
    pub const SIZE: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        let fields = [
            self.tag,
            self.index,
            self.compression,
            self.offset,
            self.compressed_size,
            self.uncompressed_size,
        ];
        for (chunk, value) in bytes.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(bytes);
        Some(Self {
            tag: r.u32()?,
            index: r.u32()?,
            compression: r.u32()?,
            offset: r.u32()?,
            compressed_size: r.u32()?,
            uncompressed_size: r.u32()?,
        })
    }
}

impl BinarySerializable for FileHeader {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for SectionDescriptor {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

// ============================================================================
// Compression
// ============================================================================

/// Section compression settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    /// Compression level in [1, 20]
    pub level: i32,
    /// Payloads whose compressed size is at least `uncompressed * threshold`
    /// are stored raw
    pub threshold: f64,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: 10,
            threshold: 0.95,
        }
    }
}

impl CompressOptions {
    /// zstd level used for a caller level in [1, 20]
    pub fn zstd_level(&self) -> i32 {
        self.level.clamp(1, 20) - 1
    }
}

/// One section, compressed (or kept raw) and ready to place in a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSection {
    pub tag: u32,
    pub index: u32,
    pub kind: CompressionKind,
    pub uncompressed_size: usize,
    pub data: Vec<u8>,
}

impl CompressedSection {
    /// Compress `payload`, falling back to raw storage when zstd does not
    /// shrink it below the configured threshold
    pub fn compress(
        tag: u32,
        index: u32,
        payload: Vec<u8>,
        options: &CompressOptions,
    ) -> Result<Self, FormatError> {
        let uncompressed_size = payload.len();
        let compressed = zstd::encode_all(Cursor::new(&payload), options.zstd_level())
            .map_err(|e| FormatError::Compression(e.to_string()))?;

        let (kind, data) =
            if compressed.len() as f64 >= uncompressed_size as f64 * options.threshold {
                (CompressionKind::None, payload)
            } else {
                (CompressionKind::Zstd, compressed)
            };

        tracing::debug!(
            "Section {} #{}: {} -> {} bytes ({:?})",
            fourcc_name(tag),
            index,
            uncompressed_size,
            data.len(),
            kind
        );

        Ok(Self {
            tag,
            index,
            kind,
            uncompressed_size,
            data,
        })
    }

    /// Store `payload` without compression
    pub fn raw(tag: u32, index: u32, payload: Vec<u8>) -> Self {
        Self {
            tag,
            index,
            kind: CompressionKind::None,
            uncompressed_size: payload.len(),
            data: payload,
        }
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Assembles a container from an info block and compressed sections
pub struct ContainerBuilder {
    magic: u32,
    info: Vec<u8>,
    sections: Vec<CompressedSection>,
}

fn to_u32(value: usize, what: &'static str) -> Result<u32, FormatError> {
    u32::try_from(value).map_err(|_| FormatError::Overflow(what))
}

impl ContainerBuilder {
    pub fn new(magic: u32, info: Vec<u8>) -> Self {
        Self {
            magic,
            info,
            sections: Vec::new(),
        }
    }

    pub fn push(&mut self, section: CompressedSection) {
        self.sections.push(section);
    }

    /// Lay out header, descriptors and aligned payloads
    pub fn build(self) -> Result<Vec<u8>, FormatError> {
        let header = FileHeader {
            magic: self.magic,
            version: CONTAINER_VERSION,
            info_size: to_u32(self.info.len(), "info block")?,
            section_count: to_u32(self.sections.len(), "section count")?,
        };

        let table_end =
            FileHeader::SIZE + self.info.len() + self.sections.len() * SectionDescriptor::SIZE;

        let mut descriptors = Vec::with_capacity(self.sections.len());
        let mut offset = table_end;
        for section in &self.sections {
            offset = offset.next_multiple_of(SECTION_ALIGNMENT);
            descriptors.push(SectionDescriptor {
                tag: section.tag,
                index: section.index,
                compression: section.kind as u32,
                offset: to_u32(offset, "section offset")?,
                compressed_size: to_u32(section.data.len(), "section size")?,
                uncompressed_size: to_u32(section.uncompressed_size, "section size")?,
            });
            offset += section.data.len();
        }
        to_u32(offset, "container size")?;

        let mut out = Vec::with_capacity(offset);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.info);
        for descriptor in &descriptors {
            out.extend_from_slice(&descriptor.to_bytes());
        }
        for (section, descriptor) in self.sections.iter().zip(&descriptors) {
            out.resize(descriptor.offset as usize, 0);
            out.extend_from_slice(&section.data);
        }

        Ok(out)
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Parsed view over a container byte buffer
pub struct ContainerReader<'a> {
    bytes: &'a [u8],
    header: FileHeader,
    info: &'a [u8],
    sections: Vec<SectionDescriptor>,
}

impl<'a> ContainerReader<'a> {
    /// Parse the header and descriptor table. When `magic` is given the
    /// file's magic must match it.
    pub fn parse(bytes: &'a [u8], magic: Option<u32>) -> Result<Self, FormatError> {
        let truncated = |what, needed| FormatError::Truncated {
            what,
            needed,
            available: bytes.len(),
        };

        let header =
            FileHeader::from_bytes(bytes).ok_or_else(|| truncated("header", FileHeader::SIZE))?;
        if let Some(expected) = magic {
            if header.magic != expected {
                return Err(FormatError::BadMagic {
                    expected,
                    found: header.magic,
                });
            }
        }
        if header.version != CONTAINER_VERSION {
            return Err(FormatError::UnsupportedVersion(header.version));
        }

        let mut reader = ByteReader::new(&bytes[FileHeader::SIZE..]);
        let info_end = FileHeader::SIZE + header.info_size as usize;
        let info = reader
            .take(header.info_size as usize)
            .ok_or_else(|| truncated("info block", info_end))?;

        let table_end = info_end + header.section_count as usize * SectionDescriptor::SIZE;
        let mut sections = Vec::with_capacity(header.section_count as usize);
        for _ in 0..header.section_count {
            let descriptor = reader
                .take(SectionDescriptor::SIZE)
                .and_then(SectionDescriptor::from_bytes)
                .ok_or_else(|| truncated("section table", table_end))?;
            sections.push(descriptor);
        }

        Ok(Self {
            bytes,
            header,
            info,
            sections,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn info(&self) -> &'a [u8] {
        self.info
    }

    pub fn sections(&self) -> &[SectionDescriptor] {
        &self.sections
    }

    /// Position of the first section with the given tag and index
    pub fn find(&self, tag: u32, index: u32) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| s.tag == tag && s.index == index)
    }

    /// Stored bytes of a section, exactly as they appear in the file
    pub fn stored(&self, section: usize) -> Result<&'a [u8], FormatError> {
        let descriptor = &self.sections[section];
        let start = descriptor.offset as usize;
        let end = start + descriptor.compressed_size as usize;
        self.bytes
            .get(start..end)
            .ok_or(FormatError::Truncated {
                what: "section payload",
                needed: end,
                available: self.bytes.len(),
            })
    }

    /// Decoded payload of a section
    pub fn payload(&self, section: usize) -> Result<Cow<'a, [u8]>, FormatError> {
        let descriptor = &self.sections[section];
        let stored = self.stored(section)?;

        let data = match CompressionKind::from_u32(descriptor.compression) {
            Some(CompressionKind::None) => Cow::Borrowed(stored),
            Some(CompressionKind::Zstd) => Cow::Owned(
                zstd::decode_all(Cursor::new(stored))
                    .map_err(|e| FormatError::Decompression(e.to_string()))?,
            ),
            None => return Err(FormatError::UnknownCompression(descriptor.compression)),
        };

        if data.len() != descriptor.uncompressed_size as usize {
            return Err(FormatError::SizeMismatch {
                index: section,
                expected: descriptor.uncompressed_size as usize,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// Decoded payload of the first section with the given tag and index
    pub fn payload_by_tag(&self, tag: u32, index: u32) -> Result<Cow<'a, [u8]>, FormatError> {
        let section = self
            .find(tag, index)
            .ok_or_else(|| FormatError::MissingSection {
                tag: fourcc_name(tag),
                index,
            })?;
        self.payload(section)
    }
}
