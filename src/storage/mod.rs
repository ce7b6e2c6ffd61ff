//! # Storage Collaborator
//!
//! The query engine never touches files directly. Everything it needs from
//! persistent storage goes through the `Storage` trait: header loading,
//! handle-based sequential reads and writes, and index lookups.
//!
//! ## Contract
//!
//! | Operation | Used by |
//! |-----------|---------|
//! | `relation_exists`, `load_header` | FROM (scan construction), DML, DDL |
//! | `open`, `seek`, `read_bytes`, `close` | Scan, IndexOrderedJoin |
//! | `write_bytes`, `position` | INSERT, UPDATE, DELETE |
//! | `index_on`, `index_lookup`, `open_index` | access-path optimizer, index scans |
//! | `create_relation`, `create_index` | CREATE TABLE, CREATE INDEX |
//!
//! The engine assumes only the record layout described in `format`: a header
//! block followed by fixed-size records, each a null bitmap plus tuple bytes.
//!
//! ## Index Lookups
//!
//! `index_lookup` returns the byte offset, inside the index file, of the first
//! entry whose key is greater than or equal to the probe, or `None` when every
//! key is smaller. A scan bounded by `[lookup(lo), lookup(hi))` therefore visits
//! exactly the keys in `[lo, hi)`.
//!
//! ## Thread Safety
//!
//! `FileStorage` keeps its handle table behind a `parking_lot::Mutex` so the
//! trait can take `&self`. The engine itself is single-threaded; the lock only
//! makes the storage object safe to share.

mod file;
mod format;

pub use file::FileStorage;
pub use format::{decode_header, encode_header, IndexEntry};

use eyre::Result;

use crate::schema::RelationHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

/// Identifies an index of a relation. Indexes are single-attribute, so the
/// id is the indexed attribute's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Append,
    ReadWrite,
}

pub trait Storage {
    fn relation_exists(&self, name: &str) -> bool;

    fn load_header(&self, name: &str) -> Result<RelationHeader>;

    fn open(&self, name: &str, mode: OpenMode) -> Result<Handle>;

    /// Opens an index file for sequential reading of `IndexEntry` values.
    fn open_index(&self, relation: &str, index: IndexId) -> Result<Handle>;

    fn seek(&self, handle: Handle, offset: u64) -> Result<()>;

    fn position(&self, handle: Handle) -> Result<u64>;

    /// Fills `buf` completely and returns its length, or returns 0 at end of
    /// file. A partial record is an error.
    fn read_bytes(&self, handle: Handle, buf: &mut [u8]) -> Result<usize>;

    fn write_bytes(&self, handle: Handle, buf: &[u8]) -> Result<()>;

    fn close(&self, handle: Handle) -> Result<()>;

    /// Byte offset of the first record, just past the header block.
    fn records_start(&self, relation: &str) -> Result<u64>;

    fn index_on(&self, relation: &str, attribute_position: usize) -> Result<Option<IndexId>>;

    fn index_lookup(
        &self,
        relation: &str,
        index: IndexId,
        attribute_position: usize,
        key: i64,
    ) -> Result<Option<u64>>;

    /// Length in bytes of an index file, the exclusive end of a full index range.
    fn index_len(&self, relation: &str, index: IndexId) -> Result<u64>;

    fn create_relation(&self, name: &str, header: &RelationHeader) -> Result<()>;

    fn create_index(&self, relation: &str, attribute_position: usize) -> Result<IndexId>;
}
