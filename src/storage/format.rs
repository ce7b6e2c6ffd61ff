//! # Relation and Index File Formats
//!
//! ## Relation File (`<name>.rel`)
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Attribute count n
//! then n times:
//!         1     Name length l
//!         l     Name bytes
//!         1     Type code (1 = INT, 2 = DECIMAL, 3 = STRING)
//!         2     Byte offset inside the tuple (LE)
//!         2     Byte size (LE)
//! then fixed-size records:
//!         ceil(n / 8)  Null bitmap
//!         tuple_size   Attribute bytes
//! ```
//!
//! ## Index File (`<name>.<attr>.idx`)
//!
//! A sorted array of 16-byte `IndexEntry` values ordered by `(key,
//! record_offset)`. Entries for NULL keys are not stored.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I64, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::INDEX_ENTRY_SIZE;
use crate::schema::RelationHeader;
use crate::types::AttrType;

/// Serializes the header block written at the start of a relation file.
pub fn encode_header(header: &RelationHeader) -> Result<Vec<u8>> {
    ensure!(
        header.len() <= u8::MAX as usize,
        "relation has too many attributes to encode"
    );
    let mut out = Vec::with_capacity(1 + header.len() * 16);
    out.push(header.len() as u8);
    for attr in header.attributes() {
        let name = attr.name().as_bytes();
        ensure!(
            name.len() <= u8::MAX as usize,
            "attribute name '{}' too long",
            attr.name()
        );
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out.push(attr.ty().as_u8());
        out.extend_from_slice(&(attr.offset() as u16).to_le_bytes());
        out.extend_from_slice(&(attr.size() as u16).to_le_bytes());
    }
    Ok(out)
}

/// Parses a header block, returning it with its encoded length.
pub fn decode_header(bytes: &[u8]) -> Result<(RelationHeader, usize)> {
    ensure!(!bytes.is_empty(), "relation file is empty");
    let count = bytes[0] as usize;
    let mut pos = 1;
    let mut header = RelationHeader::new();
    for _ in 0..count {
        ensure!(pos < bytes.len(), "relation header truncated");
        let name_len = bytes[pos] as usize;
        pos += 1;
        ensure!(
            pos + name_len + 5 <= bytes.len(),
            "relation header truncated"
        );
        let name = std::str::from_utf8(&bytes[pos..pos + name_len])
            .map_err(|e| eyre::eyre!("attribute name is not UTF-8: {}", e))?;
        pos += name_len;
        let ty = AttrType::from_u8(bytes[pos])?;
        let offset = u16::from_le_bytes([bytes[pos + 1], bytes[pos + 2]]) as usize;
        let size = u16::from_le_bytes([bytes[pos + 3], bytes[pos + 4]]) as usize;
        pos += 5;
        ensure!(
            offset == header.tuple_size(),
            "attribute '{}' stored at offset {} but layout expects {}",
            name,
            offset,
            header.tuple_size()
        );
        header.push(name, None, ty, size)?;
    }
    Ok((header, pos))
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexEntry {
    key: I64,
    record_offset: U64,
}

const _: () = assert!(
    std::mem::size_of::<IndexEntry>() == INDEX_ENTRY_SIZE,
    "IndexEntry must match INDEX_ENTRY_SIZE"
);

impl IndexEntry {
    pub fn new(key: i64, record_offset: u64) -> Self {
        Self {
            key: I64::new(key),
            record_offset: U64::new(record_offset),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= INDEX_ENTRY_SIZE,
            "buffer too small for IndexEntry: {} < {}",
            bytes.len(),
            INDEX_ENTRY_SIZE
        );
        Self::read_from_bytes(&bytes[..INDEX_ENTRY_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse IndexEntry: {:?}", e))
    }

    crate::le_field_accessors! {
        key: i64 => I64,
        record_offset: u64 => U64,
    }
}
