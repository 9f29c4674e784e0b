//! Errors raised while parsing vertex formats or reading and writing containers

/// Error type for schema parsing and container encoding/decoding
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("vertex format is empty")]
    EmptyFormat,

    #[error("stream {0} of vertex format has no attributes")]
    EmptyStream(usize),

    #[error("malformed attribute '{0}' (expected <attribute>_<format>, e.g. pos_rgb32f)")]
    MalformedAttribute(String),

    #[error("unknown attribute '{0}' (expected pos, nrm, tan, tsgn, uv, col, bonei, bonew or pad)")]
    UnknownSemantic(String),

    #[error("unknown attribute format '{0}'")]
    UnknownFormat(String),

    #[error("attribute '{0}' appears more than once")]
    DuplicateAttribute(&'static str),

    #[error("too many attributes (max {max})")]
    TooManyAttributes { max: usize },

    #[error("too many vertex streams (max {max})")]
    TooManyStreams { max: usize },

    #[error("bone/weight size mismatch: bonei has {indices} components, bonew has {weights}")]
    BoneComponentMismatch { indices: usize, weights: usize },

    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("container has no '{tag}' section #{index}")]
    MissingSection { tag: String, index: u32 },

    #[error("malformed {0} section")]
    MalformedSection(&'static str),

    #[error("unknown compression kind {0}")]
    UnknownCompression(u32),

    #[error("section {index} decoded to {actual} bytes, descriptor says {expected}")]
    SizeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{0} does not fit in 32 bits")]
    Overflow(&'static str),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed: {0}")]
    Decompression(String),
}
