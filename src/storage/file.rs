//! # Directory-Backed Storage
//!
//! `FileStorage` keeps one relation per file and one file per index inside a
//! root directory:
//!
//! ```text
//! root/
//! ├── people.rel          # header block + records
//! ├── people.id.idx       # sorted (key, record offset) entries on people.id
//! └── orders.rel
//! ```
//!
//! Relation and attribute names are case-insensitive and stored lowercase.
//!
//! ## Handles
//!
//! `open` hands out small integer handles backed by `std::fs::File`. Handles
//! opened for `Append` or `ReadWrite` rebuild every index of their relation
//! when closed, so an index never lags behind the records it points into.
//!
//! ## Catalog Cache
//!
//! Decoded headers and the set of indexed attributes are cached per relation
//! in the same mutex-guarded state as the handle table.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;
use zerocopy::IntoBytes;

use super::format::{decode_header, encode_header, IndexEntry};
use super::{Handle, IndexId, OpenMode, Storage};
use crate::config::{
    INDEX_ENTRY_SIZE, INDEX_FILE_EXTENSION, MAX_ATTRIBUTES, MAX_STRING_SIZE,
    RELATION_FILE_EXTENSION,
};
use crate::error::SchemaError;
use crate::schema::RelationHeader;
use crate::types::AttrType;

/// Upper bound on the encoded header block of any relation.
const MAX_HEADER_BYTES: u64 = 1 + (MAX_ATTRIBUTES as u64) * (1 + MAX_STRING_SIZE as u64 + 5);

#[derive(Debug, Clone)]
struct RelationMeta {
    header: RelationHeader,
    records_start: u64,
    indexes: SmallVec<[usize; 4]>,
}

#[derive(Debug)]
struct OpenFile {
    file: File,
    relation: String,
    mode: OpenMode,
    is_index: bool,
}

#[derive(Debug, Default)]
struct StorageState {
    next_handle: u32,
    handles: HashMap<u32, OpenFile>,
    catalog: HashMap<String, RelationMeta>,
}

#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    state: Mutex<StorageState>,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .wrap_err_with(|| format!("failed to create storage directory {:?}", root))?;
        Ok(Self {
            root,
            state: Mutex::new(StorageState::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_name(name: &str) -> Result<()> {
        ensure!(!name.is_empty(), "name cannot be empty");
        ensure!(
            name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "name '{}' can only contain alphanumeric characters and underscores",
            name
        );
        Ok(())
    }

    fn relation_path(&self, name: &str) -> PathBuf {
        self.root.join(format!(
            "{}.{}",
            name.to_ascii_lowercase(),
            RELATION_FILE_EXTENSION
        ))
    }

    fn index_path(&self, name: &str, attribute: &str) -> PathBuf {
        self.root.join(format!(
            "{}.{}.{}",
            name.to_ascii_lowercase(),
            attribute.to_ascii_lowercase(),
            INDEX_FILE_EXTENSION
        ))
    }

    fn load_meta(&self, name: &str) -> Result<RelationMeta> {
        Self::validate_name(name)?;
        let path = self.relation_path(name);
        if !path.exists() {
            bail!(SchemaError::new(format!("unknown relation '{}'", name)));
        }
        let file =
            File::open(&path).wrap_err_with(|| format!("failed to open relation {:?}", path))?;
        let mut bytes = Vec::new();
        file.take(MAX_HEADER_BYTES)
            .read_to_end(&mut bytes)
            .wrap_err_with(|| format!("failed to read header of {:?}", path))?;
        let (header, header_len) =
            decode_header(&bytes).wrap_err_with(|| format!("corrupt relation '{}'", name))?;

        let indexes = header
            .attributes()
            .iter()
            .enumerate()
            .filter(|(_, a)| a.ty() == AttrType::Int && self.index_path(name, a.name()).exists())
            .map(|(pos, _)| pos)
            .collect();

        Ok(RelationMeta {
            header,
            records_start: header_len as u64,
            indexes,
        })
    }

    fn meta(&self, state: &mut StorageState, name: &str) -> Result<RelationMeta> {
        let key = name.to_ascii_lowercase();
        if let Some(meta) = state.catalog.get(&key) {
            return Ok(meta.clone());
        }
        let meta = self.load_meta(name)?;
        state.catalog.insert(key, meta.clone());
        Ok(meta)
    }

    fn with_handle<T>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut OpenFile) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        match state.handles.get_mut(&handle.0) {
            Some(open) => f(open),
            None => bail!("invalid storage handle {}", handle.0),
        }
    }

    fn write_index(&self, name: &str, meta: &RelationMeta, position: usize) -> Result<()> {
        let header = &meta.header;
        let attr = header.attribute(position);
        let record_size = header.record_size();
        let data_start = header.null_bitmap_len() + attr.offset();

        let mut file = File::open(self.relation_path(name))
            .wrap_err_with(|| format!("failed to open relation '{}' for indexing", name))?;
        file.seek(SeekFrom::Start(meta.records_start))?;

        let mut entries = Vec::new();
        let mut record = vec![0u8; record_size];
        let mut offset = meta.records_start;
        loop {
            match file.read_exact(&mut record) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).wrap_err("failed to read record while indexing"),
            }
            let null = record[position / 8] & (1 << (position % 8)) != 0;
            if !null {
                let raw = [
                    record[data_start],
                    record[data_start + 1],
                    record[data_start + 2],
                    record[data_start + 3],
                ];
                entries.push(IndexEntry::new(i32::from_le_bytes(raw) as i64, offset));
            }
            offset += record_size as u64;
        }
        entries.sort_by_key(|e| (e.key(), e.record_offset()));

        let mut bytes = Vec::with_capacity(entries.len() * INDEX_ENTRY_SIZE);
        for entry in &entries {
            bytes.extend_from_slice(entry.as_bytes());
        }
        let path = self.index_path(name, attr.name());
        fs::write(&path, bytes).wrap_err_with(|| format!("failed to write index {:?}", path))?;
        debug!(relation = name, attribute = attr.name(), entries = entries.len(), "index rebuilt");
        Ok(())
    }

    fn rebuild_indexes(&self, state: &mut StorageState, name: &str) -> Result<()> {
        let meta = self.meta(state, name)?;
        for &position in &meta.indexes {
            self.write_index(name, &meta, position)?;
        }
        Ok(())
    }

    fn read_entry(file: &mut File, index: u64) -> Result<IndexEntry> {
        let mut raw = [0u8; INDEX_ENTRY_SIZE];
        file.seek(SeekFrom::Start(index * INDEX_ENTRY_SIZE as u64))?;
        file.read_exact(&mut raw)
            .wrap_err("failed to read index entry")?;
        IndexEntry::from_bytes(&raw)
    }
}

impl Storage for FileStorage {
    fn relation_exists(&self, name: &str) -> bool {
        Self::validate_name(name).is_ok() && self.relation_path(name).exists()
    }

    fn load_header(&self, name: &str) -> Result<RelationHeader> {
        let mut state = self.state.lock();
        Ok(self.meta(&mut state, name)?.header)
    }

    fn open(&self, name: &str, mode: OpenMode) -> Result<Handle> {
        let mut state = self.state.lock();
        self.meta(&mut state, name)?;
        let path = self.relation_path(name);
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Append => options.read(true).append(true),
            OpenMode::ReadWrite => options.read(true).write(true),
        };
        let file = options
            .open(&path)
            .wrap_err_with(|| format!("failed to open relation {:?}", path))?;

        let id = state.next_handle;
        state.next_handle = state.next_handle.wrapping_add(1);
        state.handles.insert(
            id,
            OpenFile {
                file,
                relation: name.to_ascii_lowercase(),
                mode,
                is_index: false,
            },
        );
        Ok(Handle(id))
    }

    fn open_index(&self, relation: &str, index: IndexId) -> Result<Handle> {
        let mut state = self.state.lock();
        let meta = self.meta(&mut state, relation)?;
        let position = index.0 as usize;
        ensure!(
            meta.indexes.contains(&position),
            "relation '{}' has no index {}",
            relation,
            index.0
        );
        let path = self.index_path(relation, meta.header.attribute(position).name());
        let file = File::open(&path).wrap_err_with(|| format!("failed to open index {:?}", path))?;

        let id = state.next_handle;
        state.next_handle = state.next_handle.wrapping_add(1);
        state.handles.insert(
            id,
            OpenFile {
                file,
                relation: relation.to_ascii_lowercase(),
                mode: OpenMode::Read,
                is_index: true,
            },
        );
        Ok(Handle(id))
    }

    fn seek(&self, handle: Handle, offset: u64) -> Result<()> {
        self.with_handle(handle, |open| {
            open.file
                .seek(SeekFrom::Start(offset))
                .wrap_err_with(|| format!("failed to seek in '{}'", open.relation))?;
            Ok(())
        })
    }

    fn position(&self, handle: Handle) -> Result<u64> {
        self.with_handle(handle, |open| {
            open.file
                .stream_position()
                .wrap_err_with(|| format!("failed to query position in '{}'", open.relation))
        })
    }

    fn read_bytes(&self, handle: Handle, buf: &mut [u8]) -> Result<usize> {
        self.with_handle(handle, |open| {
            let mut filled = 0;
            while filled < buf.len() {
                match open.file.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        return Err(e)
                            .wrap_err_with(|| format!("failed to read from '{}'", open.relation))
                    }
                }
            }
            ensure!(
                filled == 0 || filled == buf.len(),
                "truncated record in '{}': read {} of {} bytes",
                open.relation,
                filled,
                buf.len()
            );
            Ok(filled)
        })
    }

    fn write_bytes(&self, handle: Handle, buf: &[u8]) -> Result<()> {
        self.with_handle(handle, |open| {
            ensure!(
                open.mode != OpenMode::Read && !open.is_index,
                "handle on '{}' is not writable",
                open.relation
            );
            open.file
                .write_all(buf)
                .wrap_err_with(|| format!("failed to write to '{}'", open.relation))
        })
    }

    fn close(&self, handle: Handle) -> Result<()> {
        let mut state = self.state.lock();
        let Some(mut open) = state.handles.remove(&handle.0) else {
            bail!("invalid storage handle {}", handle.0);
        };
        if open.mode == OpenMode::Read || open.is_index {
            return Ok(());
        }
        open.file
            .flush()
            .wrap_err_with(|| format!("failed to flush '{}'", open.relation))?;
        drop(open.file);
        self.rebuild_indexes(&mut state, &open.relation)
    }

    fn records_start(&self, relation: &str) -> Result<u64> {
        let mut state = self.state.lock();
        Ok(self.meta(&mut state, relation)?.records_start)
    }

    fn index_on(&self, relation: &str, attribute_position: usize) -> Result<Option<IndexId>> {
        let mut state = self.state.lock();
        let meta = self.meta(&mut state, relation)?;
        Ok(meta
            .indexes
            .contains(&attribute_position)
            .then_some(IndexId(attribute_position as u16)))
    }

    fn index_lookup(
        &self,
        relation: &str,
        index: IndexId,
        attribute_position: usize,
        key: i64,
    ) -> Result<Option<u64>> {
        ensure!(
            index.0 as usize == attribute_position,
            "index {} does not cover attribute {}",
            index.0,
            attribute_position
        );
        let path = {
            let mut state = self.state.lock();
            let meta = self.meta(&mut state, relation)?;
            ensure!(
                meta.indexes.contains(&attribute_position),
                "relation '{}' has no index on attribute {}",
                relation,
                attribute_position
            );
            self.index_path(relation, meta.header.attribute(attribute_position).name())
        };
        let mut file =
            File::open(&path).wrap_err_with(|| format!("failed to open index {:?}", path))?;
        let count = file.metadata()?.len() / INDEX_ENTRY_SIZE as u64;

        let (mut lo, mut hi) = (0u64, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if Self::read_entry(&mut file, mid)?.key() < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok((lo < count).then_some(lo * INDEX_ENTRY_SIZE as u64))
    }

    fn index_len(&self, relation: &str, index: IndexId) -> Result<u64> {
        let path = {
            let mut state = self.state.lock();
            let meta = self.meta(&mut state, relation)?;
            let position = index.0 as usize;
            ensure!(
                meta.indexes.contains(&position),
                "relation '{}' has no index {}",
                relation,
                index.0
            );
            self.index_path(relation, meta.header.attribute(position).name())
        };
        Ok(fs::metadata(&path)
            .wrap_err_with(|| format!("failed to stat index {:?}", path))?
            .len())
    }

    fn create_relation(&self, name: &str, header: &RelationHeader) -> Result<()> {
        Self::validate_name(name)?;
        ensure!(!header.is_empty(), "relation '{}' needs at least one attribute", name);
        let path = self.relation_path(name);
        if path.exists() {
            bail!(SchemaError::new(format!("relation '{}' already exists", name)));
        }
        let bytes = encode_header(header)?;
        fs::write(&path, &bytes).wrap_err_with(|| format!("failed to create {:?}", path))?;

        let mut state = self.state.lock();
        state.catalog.insert(
            name.to_ascii_lowercase(),
            RelationMeta {
                header: header.clone(),
                records_start: bytes.len() as u64,
                indexes: SmallVec::new(),
            },
        );
        debug!(relation = name, attributes = header.len(), "relation created");
        Ok(())
    }

    fn create_index(&self, relation: &str, attribute_position: usize) -> Result<IndexId> {
        let mut state = self.state.lock();
        let mut meta = self.meta(&mut state, relation)?;
        ensure!(
            attribute_position < meta.header.len(),
            "attribute position {} out of range",
            attribute_position
        );
        let attr = meta.header.attribute(attribute_position);
        if attr.ty() != AttrType::Int {
            bail!(SchemaError::new(format!(
                "only INT attributes can be indexed, '{}' is {}",
                attr.name(),
                attr.ty().name()
            )));
        }
        if meta.indexes.contains(&attribute_position) {
            bail!(SchemaError::new(format!(
                "index on '{}.{}' already exists",
                relation,
                attr.name()
            )));
        }
        self.write_index(relation, &meta, attribute_position)?;
        meta.indexes.push(attribute_position);
        state.catalog.insert(relation.to_ascii_lowercase(), meta);
        Ok(IndexId(attribute_position as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn people() -> RelationHeader {
        RelationHeader::builder()
            .int("id")
            .string("name", 4)
            .build()
            .unwrap()
    }

    fn record(id: i32, name: &str) -> Vec<u8> {
        let mut rec = vec![0u8; 1 + 4 + 4];
        rec[1..5].copy_from_slice(&id.to_le_bytes());
        rec[5..5 + name.len()].copy_from_slice(name.as_bytes());
        rec
    }

    #[test]
    fn test_create_append_and_read_back() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.create_relation("People", &people()).unwrap();

        assert!(storage.relation_exists("people"));
        assert_eq!(storage.load_header("PEOPLE").unwrap(), people());

        let h = storage.open("people", OpenMode::Append).unwrap();
        storage.write_bytes(h, &record(1, "ann")).unwrap();
        storage.write_bytes(h, &record(2, "bob")).unwrap();
        storage.close(h).unwrap();

        let h = storage.open("people", OpenMode::Read).unwrap();
        storage
            .seek(h, storage.records_start("people").unwrap())
            .unwrap();
        let mut buf = vec![0u8; 9];
        assert_eq!(storage.read_bytes(h, &mut buf).unwrap(), 9);
        assert_eq!(buf, record(1, "ann"));
        assert_eq!(storage.read_bytes(h, &mut buf).unwrap(), 9);
        assert_eq!(storage.read_bytes(h, &mut buf).unwrap(), 0);
        assert!(storage.write_bytes(h, &buf).is_err());
        storage.close(h).unwrap();
    }

    #[test]
    fn test_unknown_relation_is_schema_error() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let err = storage.load_header("missing").unwrap_err();
        assert!(err.downcast_ref::<SchemaError>().is_some());
        assert!(!storage.relation_exists("../etc"));
    }

    #[test]
    fn test_index_lookup_finds_first_key_at_or_above_probe() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.create_relation("t", &people()).unwrap();
        let h = storage.open("t", OpenMode::Append).unwrap();
        for (id, name) in [(30, "c"), (10, "a"), (20, "b")] {
            storage.write_bytes(h, &record(id, name)).unwrap();
        }
        storage.close(h).unwrap();

        let index = storage.create_index("t", 0).unwrap();
        assert_eq!(storage.index_on("t", 0).unwrap(), Some(index));
        assert_eq!(storage.index_on("t", 1).unwrap(), None);
        assert_eq!(storage.index_len("t", index).unwrap(), 48);

        assert_eq!(storage.index_lookup("t", index, 0, 5).unwrap(), Some(0));
        assert_eq!(storage.index_lookup("t", index, 0, 20).unwrap(), Some(16));
        assert_eq!(storage.index_lookup("t", index, 0, 21).unwrap(), Some(32));
        assert_eq!(storage.index_lookup("t", index, 0, 31).unwrap(), None);
    }

    #[test]
    fn test_closing_writer_rebuilds_index() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.create_relation("t", &people()).unwrap();
        let index = storage.create_index("t", 0).unwrap();
        assert_eq!(storage.index_len("t", index).unwrap(), 0);

        let h = storage.open("t", OpenMode::Append).unwrap();
        storage.write_bytes(h, &record(7, "x")).unwrap();
        storage.close(h).unwrap();

        assert_eq!(storage.index_len("t", index).unwrap(), 16);
        let h = storage.open_index("t", index).unwrap();
        let mut raw = [0u8; 16];
        storage.read_bytes(h, &mut raw).unwrap();
        let entry = IndexEntry::from_bytes(&raw).unwrap();
        assert_eq!(entry.key(), 7);
        assert_eq!(entry.record_offset(), storage.records_start("t").unwrap());
        storage.close(h).unwrap();
    }

    #[test]
    fn test_index_requires_int_attribute() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.create_relation("t", &people()).unwrap();
        assert!(storage.create_index("t", 1).is_err());
        assert!(storage.create_relation("t", &people()).is_err());
    }
}
