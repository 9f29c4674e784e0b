//! Binary serialization trait for container records.
//!
//! Every fixed-size record in a container implements `BinarySerializable`.
//! Tables of records are written back to back with [`write_table`] and read
//! with [`read_table`].

/// Trait for fixed-size little-endian records.
///
/// The trait uses `Vec<u8>` for the return type because associated const
/// generics in return types (`[u8; Self::SIZE]`) are not yet stable in Rust.
/// Records that are written often also expose a `to_bytes()` returning a
/// fixed-size array.
///
/// # Example
///
/// ```
/// use spmdl_format::formats::{BinarySerializable, StringRef};
///
/// let name = StringRef { offset: 16, length: 4 };
/// let bytes = name.serialize();
/// assert_eq!(bytes.len(), StringRef::SIZE);
/// assert_eq!(StringRef::deserialize(&bytes), Some(name));
/// ```
pub trait BinarySerializable: Sized {
    /// Size of the serialized record in bytes.
    const SIZE: usize;

    /// Serialize to bytes.
    fn serialize(&self) -> Vec<u8>;

    /// Deserialize from bytes.
    ///
    /// Returns `None` if the byte slice is too short or contains invalid data.
    fn deserialize(bytes: &[u8]) -> Option<Self>;
}

/// Serialize a slice of records back to back
pub fn write_table<T: BinarySerializable>(records: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * T::SIZE);
    for record in records {
        out.extend_from_slice(&record.serialize());
    }
    out
}

/// Parse a payload that holds a whole number of records
pub fn read_table<T: BinarySerializable>(bytes: &[u8]) -> Option<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return None;
    }
    bytes.chunks_exact(T::SIZE).map(T::deserialize).collect()
}

/// Cursor over a little-endian byte slice
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(slice)
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.take(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f32(&mut self) -> Option<f32> {
        self.u32().map(f32::from_bits)
    }

    pub fn f32_array<const N: usize>(&mut self) -> Option<[f32; N]> {
        let mut out = [0.0; N];
        for v in &mut out {
            *v = self.f32()?;
        }
        Some(out)
    }
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}
