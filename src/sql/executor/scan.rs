//! # Scan
//!
//! Reads records of one base relation, either sequentially from the first
//! record or through an index range. The index range is a half-open byte
//! range `[lower, upper)` over the relation's index file, as produced by
//! `Storage::index_lookup`; each 16-byte entry in the range names one record.
//!
//! ## Visibility
//!
//! Relations that declare the soft-delete attribute hide deleted rows from
//! ordinary scans. DML sub-statements use the other visibilities to find
//! reusable slots.

use eyre::{bail, Result, WrapErr};
use smallvec::SmallVec;
use tracing::debug;

use super::Next;
use crate::config::INDEX_ENTRY_SIZE;
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::context::ExecutionContext;
use crate::storage::{Handle, IndexEntry, IndexId, OpenMode, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Live,
    Deleted,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub index: IndexId,
    pub position: usize,
    pub lower: u64,
    pub upper: u64,
}

impl IndexRange {
    pub fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }

    pub fn entries(&self) -> u64 {
        self.upper.saturating_sub(self.lower) / INDEX_ENTRY_SIZE as u64
    }
}

#[derive(Debug)]
struct ScanState {
    handle: Handle,
    index_handle: Option<Handle>,
    cursor: u64,
    last_offset: u64,
    record: SmallVec<[u8; 64]>,
}

#[derive(Debug)]
pub struct ScanOp {
    relation: String,
    alias: String,
    header: RelationHeader,
    visibility: Visibility,
    soft_delete: Option<usize>,
    range: Option<IndexRange>,
    state: Option<ScanState>,
}

impl ScanOp {
    /// Loads the relation header and qualifies it with `alias`.
    pub fn new(storage: &dyn Storage, relation: &str, alias: &str) -> Result<ScanOp> {
        let header = storage
            .load_header(relation)
            .wrap_err_with(|| format!("failed to open relation '{}'", relation))?
            .qualified(alias);
        let soft_delete = header.soft_delete_position();
        Ok(ScanOp {
            relation: relation.to_ascii_lowercase(),
            alias: alias.to_string(),
            header,
            visibility: Visibility::Live,
            soft_delete,
            range: None,
            state: None,
        })
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn header(&self) -> &RelationHeader {
        &self.header
    }

    pub fn range(&self) -> Option<IndexRange> {
        self.range
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn set_range(&mut self, range: IndexRange) {
        debug!(
            relation = %self.relation,
            position = range.position,
            lower = range.lower,
            upper = range.upper,
            "scan narrowed to index range"
        );
        self.range = Some(range);
    }

    /// Computes the index range holding exactly the keys in `[low, high)`.
    pub fn key_range(
        storage: &dyn Storage,
        relation: &str,
        index: IndexId,
        position: usize,
        low: Option<i64>,
        high: Option<i64>,
    ) -> Result<IndexRange> {
        let end = storage.index_len(relation, index)?;
        let bound = |key: Option<i64>, default: u64| -> Result<u64> {
            match key {
                Some(key) => Ok(storage
                    .index_lookup(relation, index, position, key)?
                    .unwrap_or(end)),
                None => Ok(default),
            }
        };
        Ok(IndexRange {
            index,
            position,
            lower: bound(low, 0)?,
            upper: bound(high, end)?,
        })
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let handle = cx.storage.open(&self.relation, OpenMode::Read)?;
        let index_handle = match self.range {
            Some(range) => match cx.storage.open_index(&self.relation, range.index) {
                Ok(h) => Some(h),
                Err(e) => {
                    let _ = cx.storage.close(handle);
                    return Err(e);
                }
            },
            None => None,
        };
        let mut record = SmallVec::new();
        record.resize(self.header.record_size(), 0);
        self.state = Some(ScanState {
            handle,
            index_handle,
            cursor: 0,
            last_offset: 0,
            record,
        });
        self.rewind(cx)
    }

    /// Restarts iteration at the first record, or the lower index bound.
    pub fn rewind(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            bail!("scan of '{}' rewound before open", self.relation);
        };
        match (self.range, state.index_handle) {
            (Some(range), Some(index_handle)) => {
                state.cursor = range.lower;
                cx.storage.seek(index_handle, range.lower)?;
            }
            _ => {
                let start = cx.storage.records_start(&self.relation)?;
                state.cursor = start;
                cx.storage.seek(state.handle, start)?;
            }
        }
        Ok(())
    }

    /// Narrows an open index scan to the entries whose key equals `key`.
    pub fn probe(&mut self, cx: &ExecutionContext<'_, '_>, key: i64) -> Result<()> {
        let Some(range) = self.range else {
            bail!("probe on scan of '{}' without an index", self.relation);
        };
        let narrowed = Self::key_range(
            cx.storage,
            &self.relation,
            range.index,
            range.position,
            Some(key),
            Some(key.saturating_add(1)),
        )?;
        self.range = Some(narrowed);
        self.rewind(cx)
    }

    /// Byte offset in the relation file of the record produced last.
    pub fn last_offset(&self) -> Option<u64> {
        self.state.as_ref().map(|s| s.last_offset)
    }

    pub fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        loop {
            let range = self.range;
            let Some(state) = self.state.as_mut() else {
                bail!("scan of '{}' pulled before open", self.relation);
            };
            let offset = match (range, state.index_handle) {
                (Some(range), Some(index_handle)) => {
                    if state.cursor >= range.upper {
                        return Ok(Next::Exhausted);
                    }
                    let mut raw = [0u8; INDEX_ENTRY_SIZE];
                    if cx.storage.read_bytes(index_handle, &mut raw)? == 0 {
                        return Ok(Next::Exhausted);
                    }
                    state.cursor += INDEX_ENTRY_SIZE as u64;
                    let entry = IndexEntry::from_bytes(&raw)?;
                    cx.storage.seek(state.handle, entry.record_offset())?;
                    entry.record_offset()
                }
                _ => state.cursor,
            };
            if cx.storage.read_bytes(state.handle, &mut state.record)? == 0 {
                return Ok(Next::Exhausted);
            }
            if range.is_none() {
                state.cursor += state.record.len() as u64;
            }
            state.last_offset = offset;
            let visible = match self.soft_delete {
                Some(pos) => {
                    let deleted = is_deleted(&self.header, pos, &state.record);
                    match self.visibility {
                        Visibility::Live => !deleted,
                        Visibility::Deleted => deleted,
                        Visibility::All => true,
                    }
                }
                None => true,
            };
            if visible {
                out.load(cx.arena, &state.record);
                return Ok(Next::Produced);
            }
        }
    }

    pub fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        let index_result = match state.index_handle {
            Some(h) => cx.storage.close(h),
            None => Ok(()),
        };
        cx.storage.close(state.handle)?;
        index_result
    }
}

/// A row is deleted when its soft-delete attribute is non-null and equals 1.
fn is_deleted(header: &RelationHeader, pos: usize, record: &[u8]) -> bool {
    if record[pos / 8] & (1 << (pos % 8)) != 0 {
        return false;
    }
    let at = header.null_bitmap_len() + header.attribute(pos).offset();
    i32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]]) == 1
}
