//! Interned string pool
//!
//! Names are stored once as null-terminated UTF-8 in one append-only buffer
//! and referenced by `{offset, length}` (length excludes the terminator).

use hashbrown::HashTable;
use xxhash_rust::xxh3::xxh3_64;

use super::serialization::{BinarySerializable, ByteReader, put_u32};

/// Reference to a string inside a [`StringPool`] payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StringRef {
    pub offset: u32,
    pub length: u32,
}

impl StringRef {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        put_u32(out, self.offset);
        put_u32(out, self.length);
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            offset: reader.u32()?,
            length: reader.u32()?,
        })
    }

    /// Resolve this reference against a string pool payload
    pub fn resolve<'a>(&self, pool: &'a [u8]) -> Option<&'a str> {
        let start = self.offset as usize;
        let end = start.checked_add(self.length as usize)?;
        if pool.get(end) != Some(&0) {
            return None;
        }
        std::str::from_utf8(pool.get(start..end)?).ok()
    }
}

impl BinarySerializable for StringRef {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::read(&mut ByteReader::new(bytes))
    }
}

#[derive(Clone, Copy)]
struct Entry {
    hash: u64,
    name: StringRef,
}

/// Append-only string interner keyed by content hash
#[derive(Default)]
pub struct StringPool {
    data: Vec<u8>,
    index: HashTable<Entry>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value`, returning the existing reference if it was seen before
    pub fn intern(&mut self, value: &str) -> StringRef {
        let hash = xxh3_64(value.as_bytes());
        let data = &self.data;
        if let Some(entry) = self.index.find(hash, |e| {
            e.hash == hash && &data[e.name.offset as usize..][..e.name.length as usize] == value.as_bytes()
        }) {
            return entry.name;
        }

        let name = StringRef {
            offset: self.data.len() as u32,
            length: value.len() as u32,
        };
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index
            .insert_unique(hash, Entry { hash, name }, |e| e.hash);
        name
    }

    /// Look up a previously interned reference
    pub fn get(&self, name: StringRef) -> Option<&str> {
        name.resolve(&self.data)
    }

    /// Number of distinct strings
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Pool payload as stored in the string section
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
