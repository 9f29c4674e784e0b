//! Vertex format schema
//!
//! A vertex format is written as a list of `<attribute>_<format>` tuples.
//! `,` separates attributes inside a stream and `;` starts the next stream:
//!
//! ```text
//! pos_rgb32f,nrm_rgb10a2un,uv_rg16f;bonei_rgba8u,bonew_rgba8un
//! ```
//!
//! Parsing derives, for every attribute, its byte offset inside its stream
//! and its width in the canonical float row the mesh builder writes. The
//! resulting [`VertexFormat`] is immutable and shared by reference.

use std::fmt;
use std::str::FromStr;

use crate::FormatError;

/// Maximum number of attributes in one vertex format
pub const MAX_ATTRIBUTES: usize = 16;
/// Maximum number of vertex streams in one vertex format
pub const MAX_STREAMS: usize = 4;

// ============================================================================
// Semantics
// ============================================================================

/// What an attribute means to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Semantic {
    Position = 0,
    Normal = 1,
    Tangent = 2,
    TangentSign = 3,
    Uv = 4,
    Color = 5,
    BoneIndex = 6,
    BoneWeight = 7,
    Padding = 8,
}

impl Semantic {
    pub const ALL: [Semantic; 9] = [
        Semantic::Position,
        Semantic::Normal,
        Semantic::Tangent,
        Semantic::TangentSign,
        Semantic::Uv,
        Semantic::Color,
        Semantic::BoneIndex,
        Semantic::BoneWeight,
        Semantic::Padding,
    ];

    /// Short code used in vertex format strings
    pub fn code(self) -> &'static str {
        match self {
            Semantic::Position => "pos",
            Semantic::Normal => "nrm",
            Semantic::Tangent => "tan",
            Semantic::TangentSign => "tsgn",
            Semantic::Uv => "uv",
            Semantic::Color => "col",
            Semantic::BoneIndex => "bonei",
            Semantic::BoneWeight => "bonew",
            Semantic::Padding => "pad",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Number of floats this attribute occupies in the canonical vertex row.
    ///
    /// Bone indices and weights take their width (K) from the target format.
    pub fn float_width(self, format: Format) -> usize {
        match self {
            Semantic::Position | Semantic::Normal => 3,
            Semantic::Tangent | Semantic::Color => 4,
            Semantic::TangentSign => 1,
            Semantic::Uv => 2,
            Semantic::BoneIndex | Semantic::BoneWeight => format.components(),
            Semantic::Padding => 0,
        }
    }
}

// ============================================================================
// Formats
// ============================================================================

/// Numeric encoding of a plain attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    Unorm = 0,
    Snorm = 1,
    Uint = 2,
    Sint = 3,
    Float = 4,
}

impl Encoding {
    fn suffix(self) -> &'static str {
        match self {
            Encoding::Unorm => "un",
            Encoding::Snorm => "sn",
            Encoding::Uint => "u",
            Encoding::Sint => "i",
            Encoding::Float => "f",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "un" => Some(Encoding::Unorm),
            "sn" => Some(Encoding::Snorm),
            "u" => Some(Encoding::Uint),
            "i" => Some(Encoding::Sint),
            "f" => Some(Encoding::Float),
            _ => None,
        }
    }
}

/// Target binary encoding of one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// 1 to 4 channels of 8/16/32-bit components (floats are 16 or 32 bit)
    Plain {
        channels: u8,
        bits: u8,
        encoding: Encoding,
    },
    /// Three 10-bit unorm components packed into a u32
    Rgb10a2Unorm,
    /// Three 10-bit unsigned integer components packed into a u32
    Rgb10a2Uint,
}

const CHANNEL_NAMES: [&str; 4] = ["r", "rg", "rgb", "rgba"];
const BIT_WIDTHS: [u8; 3] = [8, 16, 32];

impl Format {
    pub const fn plain(channels: u8, bits: u8, encoding: Encoding) -> Self {
        Format::Plain {
            channels,
            bits,
            encoding,
        }
    }

    /// Parse a format name such as `rgb32f`, `rgba8un`, `rg16sn` or `rgb10a2un`
    pub fn parse(name: &str) -> Result<Self, FormatError> {
        let unknown = || FormatError::UnknownFormat(name.to_string());

        match name {
            "rgb10a2un" => return Ok(Format::Rgb10a2Unorm),
            "rgb10a2u" => return Ok(Format::Rgb10a2Uint),
            _ => {}
        }

        // Longest channel prefix first so "rgba" is not read as "rgb" + "a..."
        let (channels, rest) = CHANNEL_NAMES
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, prefix)| name.strip_prefix(prefix).map(|rest| (i as u8 + 1, rest)))
            .ok_or_else(unknown)?;

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let bits: u8 = rest[..digits].parse().map_err(|_| unknown())?;
        let encoding = Encoding::from_suffix(&rest[digits..]).ok_or_else(unknown)?;

        let valid_bits = match encoding {
            Encoding::Float => bits == 16 || bits == 32,
            _ => BIT_WIDTHS.contains(&bits),
        };
        if !valid_bits {
            return Err(unknown());
        }

        Ok(Format::plain(channels, bits, encoding))
    }

    /// Number of encoded components
    pub fn components(self) -> usize {
        match self {
            Format::Plain { channels, .. } => channels as usize,
            Format::Rgb10a2Unorm | Format::Rgb10a2Uint => 4,
        }
    }

    /// Encoded size in bytes
    pub fn byte_size(self) -> usize {
        match self {
            Format::Plain { channels, bits, .. } => channels as usize * bits as usize / 8,
            Format::Rgb10a2Unorm | Format::Rgb10a2Uint => 4,
        }
    }

    /// Largest non-negative integer every value up to which is stored
    /// exactly, or `None` for normalized encodings
    pub fn max_integer(self) -> Option<u64> {
        match self {
            Format::Plain {
                bits, encoding, ..
            } => match encoding {
                Encoding::Uint => Some((1u64 << bits) - 1),
                Encoding::Sint => Some((1u64 << (bits - 1)) - 1),
                Encoding::Float if bits == 16 => Some(1 << 11),
                Encoding::Float => Some(1 << 24),
                Encoding::Unorm | Encoding::Snorm => None,
            },
            Format::Rgb10a2Uint => Some(1023),
            Format::Rgb10a2Unorm => None,
        }
    }

    pub fn is_unorm(self) -> bool {
        matches!(
            self,
            Format::Rgb10a2Unorm
                | Format::Plain {
                    encoding: Encoding::Unorm,
                    ..
                }
        )
    }

    /// Stable numeric id stored in attribute records
    pub fn id(self) -> u8 {
        match self {
            Format::Plain {
                channels,
                bits,
                encoding,
            } => {
                let bits_index = BIT_WIDTHS.iter().position(|&b| b == bits).unwrap_or(0) as u8;
                1 + ((encoding as u8) * 3 + bits_index) * 4 + (channels - 1)
            }
            Format::Rgb10a2Unorm => 61,
            Format::Rgb10a2Uint => 62,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            61 => Some(Format::Rgb10a2Unorm),
            62 => Some(Format::Rgb10a2Uint),
            1..=60 => {
                let v = id - 1;
                let channels = v % 4 + 1;
                let bits = BIT_WIDTHS[(v / 4 % 3) as usize];
                let encoding = match v / 12 {
                    0 => Encoding::Unorm,
                    1 => Encoding::Snorm,
                    2 => Encoding::Uint,
                    3 => Encoding::Sint,
                    _ => Encoding::Float,
                };
                if encoding == Encoding::Float && bits == 8 {
                    return None;
                }
                Some(Format::plain(channels, bits, encoding))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Format::Plain {
                channels,
                bits,
                encoding,
            } => write!(
                f,
                "{}{}{}",
                CHANNEL_NAMES[channels as usize - 1],
                bits,
                encoding.suffix()
            ),
            Format::Rgb10a2Unorm => f.write_str("rgb10a2un"),
            Format::Rgb10a2Uint => f.write_str("rgb10a2u"),
        }
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::parse(s)
    }
}

// ============================================================================
// Vertex Format
// ============================================================================

/// One attribute of a vertex format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeSlot {
    pub semantic: Semantic,
    pub format: Format,
    /// Index of the vertex stream this attribute lives in
    pub stream: usize,
    /// Byte offset inside one vertex of its stream
    pub byte_offset: usize,
    /// Offset of this attribute in the canonical float row
    pub float_offset: usize,
    /// Floats this attribute occupies in the canonical float row
    pub float_width: usize,
}

/// Parsed vertex layout shared by every mesh part in an export run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    attributes: Vec<AttributeSlot>,
    strides: Vec<usize>,
    vertex_floats: usize,
    weights_per_vertex: usize,
}

impl VertexFormat {
    /// Parse a vertex format string (see module docs for the grammar)
    pub fn parse(spec: &str) -> Result<Self, FormatError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(FormatError::EmptyFormat);
        }

        let mut attributes: Vec<AttributeSlot> = Vec::new();
        let mut strides = Vec::new();
        let mut vertex_floats = 0;

        for (stream, stream_spec) in spec.split(';').enumerate() {
            if stream >= MAX_STREAMS {
                return Err(FormatError::TooManyStreams { max: MAX_STREAMS });
            }

            let mut byte_offset = 0;
            let mut stream_attributes = 0;
            for entry in stream_spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if attributes.len() >= MAX_ATTRIBUTES {
                    return Err(FormatError::TooManyAttributes {
                        max: MAX_ATTRIBUTES,
                    });
                }

                let (code, format_name) = entry
                    .split_once('_')
                    .ok_or_else(|| FormatError::MalformedAttribute(entry.to_string()))?;
                let semantic = Semantic::from_code(code)
                    .ok_or_else(|| FormatError::UnknownSemantic(code.to_string()))?;
                let format = Format::parse(format_name)?;

                if semantic != Semantic::Padding
                    && attributes.iter().any(|a| a.semantic == semantic)
                {
                    return Err(FormatError::DuplicateAttribute(semantic.code()));
                }

                let float_width = semantic.float_width(format);
                attributes.push(AttributeSlot {
                    semantic,
                    format,
                    stream,
                    byte_offset,
                    float_offset: vertex_floats,
                    float_width,
                });
                byte_offset += format.byte_size();
                vertex_floats += float_width;
                stream_attributes += 1;
            }

            if stream_attributes == 0 {
                return Err(FormatError::EmptyStream(stream));
            }
            strides.push(byte_offset);
        }

        let width_of = |semantic| {
            attributes
                .iter()
                .find(|a| a.semantic == semantic)
                .map(|a| a.float_width)
        };
        let weights_per_vertex = match (
            width_of(Semantic::BoneIndex),
            width_of(Semantic::BoneWeight),
        ) {
            (Some(indices), Some(weights)) if indices != weights => {
                return Err(FormatError::BoneComponentMismatch { indices, weights });
            }
            (Some(k), _) | (None, Some(k)) => k,
            (None, None) => 0,
        };

        Ok(Self {
            attributes,
            strides,
            vertex_floats,
            weights_per_vertex,
        })
    }

    pub fn attributes(&self) -> &[AttributeSlot] {
        &self.attributes
    }

    /// First attribute with the given semantic
    pub fn find(&self, semantic: Semantic) -> Option<&AttributeSlot> {
        self.attributes.iter().find(|a| a.semantic == semantic)
    }

    pub fn stream_count(&self) -> usize {
        self.strides.len()
    }

    /// Byte stride of every stream, in stream order
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Attributes stored in one stream, in declaration order
    pub fn stream_attributes(&self, stream: usize) -> impl Iterator<Item = &AttributeSlot> {
        self.attributes.iter().filter(move |a| a.stream == stream)
    }

    /// Width of one canonical float row
    pub fn vertex_floats(&self) -> usize {
        self.vertex_floats
    }

    /// Bone influences kept per vertex (K), 0 if the format is not skinned
    pub fn weights_per_vertex(&self) -> usize {
        self.weights_per_vertex
    }

    pub fn is_skinned(&self) -> bool {
        self.find(Semantic::BoneIndex).is_some()
    }
}

impl fmt::Display for VertexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stream in 0..self.stream_count() {
            if stream > 0 {
                f.write_str(";")?;
            }
            for (i, attribute) in self.stream_attributes(stream).enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}_{}", attribute.semantic.code(), attribute.format)?;
            }
        }
        Ok(())
    }
}

impl FromStr for VertexFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VertexFormat::parse(s)
    }
}
