//! # Relation Headers
//!
//! A `RelationHeader` describes the row shape produced by one operator: the
//! ordered attributes with their types, byte sizes and byte offsets inside the
//! tuple. Base relations load theirs from storage; joins concatenate the
//! headers of both inputs; projections and aggregates derive new ones.
//!
//! ## Tuple Layout
//!
//! ```text
//! +--------------------+------------+------------+-----+
//! | null bitmap        | attr 0     | attr 1     | ... |
//! | ceil(n / 8) bytes  | size bytes | size bytes |     |
//! +--------------------+------------+------------+-----+
//! ```
//!
//! Attribute offsets are relative to the start of the data part, so the
//! bitmap length can change (joins) without rewriting offsets.
//!
//! ## Qualifiers
//!
//! Each attribute remembers the alias of the scan it came from (`table`).
//! Attribute references resolve by name, optionally narrowed by that alias;
//! an unqualified name matching more than one attribute is ambiguous.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::config::{MAX_ATTRIBUTES, MAX_STRING_SIZE, SOFT_DELETE_ATTRIBUTE};
use crate::error::SchemaError;
use crate::types::AttrType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    table: Option<String>,
    ty: AttrType,
    offset: u16,
    size: u16,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn ty(&self) -> AttrType {
        self.ty
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationHeader {
    attributes: SmallVec<[Attribute; 8]>,
    tuple_size: usize,
}

impl RelationHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> HeaderBuilder {
        HeaderBuilder::default()
    }

    /// Appends an attribute at the end of the tuple.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        table: Option<String>,
        ty: AttrType,
        size: usize,
    ) -> Result<()> {
        let name = name.into();
        if self.attributes.len() >= MAX_ATTRIBUTES {
            bail!(SchemaError::new(format!(
                "too many attributes (limit {})",
                MAX_ATTRIBUTES
            )));
        }
        match ty.fixed_size() {
            Some(fixed) => ensure!(
                size == fixed,
                "{} attribute '{}' must be {} bytes, got {}",
                ty.name(),
                name,
                fixed,
                size
            ),
            None => {
                if size == 0 || size > MAX_STRING_SIZE {
                    bail!(SchemaError::new(format!(
                        "STRING size of '{}' must be between 1 and {}",
                        name, MAX_STRING_SIZE
                    )));
                }
            }
        }
        let offset = self.tuple_size;
        ensure!(
            offset + size <= u16::MAX as usize,
            "tuple of '{}' exceeds the addressable size",
            name
        );
        self.attributes.push(Attribute {
            name,
            table,
            ty,
            offset: offset as u16,
            size: size as u16,
        });
        self.tuple_size += size;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, position: usize) -> &Attribute {
        &self.attributes[position]
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn null_bitmap_len(&self) -> usize {
        self.attributes.len().div_ceil(8)
    }

    /// Bitmap plus data, the size of one stored record.
    pub fn record_size(&self) -> usize {
        self.null_bitmap_len() + self.tuple_size
    }

    /// First attribute with this name, ignoring qualifiers.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Resolves `[qualifier.]name`; unknown and ambiguous names are schema errors.
    pub fn resolve(&self, qualifier: Option<&str>, name: &str) -> Result<usize> {
        let mut found = None;
        for (pos, attr) in self.attributes.iter().enumerate() {
            if !attr.name.eq_ignore_ascii_case(name) {
                continue;
            }
            if let Some(q) = qualifier {
                match attr.table.as_deref() {
                    Some(t) if t.eq_ignore_ascii_case(q) => {}
                    _ => continue,
                }
            }
            if found.is_some() {
                bail!(SchemaError::new(format!("ambiguous attribute '{}'", name)));
            }
            found = Some(pos);
        }
        match (found, qualifier) {
            (Some(pos), _) => Ok(pos),
            (None, Some(q)) => bail!(SchemaError::new(format!(
                "unknown attribute '{}.{}'",
                q, name
            ))),
            (None, None) => bail!(SchemaError::new(format!("unknown attribute '{}'", name))),
        }
    }

    /// Positions of the attributes that came from the scan aliased `alias`.
    pub fn positions_of_table(&self, alias: &str) -> SmallVec<[usize; 8]> {
        self.attributes
            .iter()
            .enumerate()
            .filter(|(_, a)| matches!(a.table.as_deref(), Some(t) if t.eq_ignore_ascii_case(alias)))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Index of the scan that produced `position`, counting scans left to right.
    pub fn scan_index(&self, position: usize) -> usize {
        let mut scan = 0;
        for pos in 1..=position.min(self.attributes.len().saturating_sub(1)) {
            if self.attributes[pos].table != self.attributes[pos - 1].table {
                scan += 1;
            }
        }
        scan
    }

    /// Tags every attribute with the scan alias.
    pub fn qualified(mut self, alias: &str) -> Self {
        for attr in self.attributes.iter_mut() {
            attr.table = Some(alias.to_string());
        }
        self
    }

    /// Header of a join row: all of `self` followed by all of `right`.
    pub fn concat(&self, right: &RelationHeader) -> Result<RelationHeader> {
        let mut out = self.clone();
        for attr in right.attributes() {
            out.push(attr.name.clone(), attr.table.clone(), attr.ty, attr.size())?;
        }
        Ok(out)
    }

    /// Same attribute order, types, sizes and offsets (names may differ).
    pub fn same_layout(&self, other: &RelationHeader) -> bool {
        self.tuple_size == other.tuple_size
            && self.attributes.len() == other.attributes.len()
            && self
                .attributes
                .iter()
                .zip(other.attributes.iter())
                .all(|(a, b)| a.ty == b.ty && a.size == b.size && a.offset == b.offset)
    }

    pub fn soft_delete_position(&self) -> Option<usize> {
        self.position(SOFT_DELETE_ATTRIBUTE)
            .filter(|&pos| self.attributes[pos].ty == AttrType::Int)
    }
}

#[derive(Debug, Default)]
pub struct HeaderBuilder {
    columns: Vec<(String, AttrType, usize)>,
}

impl HeaderBuilder {
    pub fn int(mut self, name: &str) -> Self {
        self.columns.push((name.to_string(), AttrType::Int, 4));
        self
    }

    pub fn decimal(mut self, name: &str) -> Self {
        self.columns.push((name.to_string(), AttrType::Decimal, 8));
        self
    }

    pub fn string(mut self, name: &str, size: usize) -> Self {
        self.columns.push((name.to_string(), AttrType::String, size));
        self
    }

    pub fn column(mut self, name: &str, ty: AttrType, size: usize) -> Self {
        self.columns.push((name.to_string(), ty, size));
        self
    }

    pub fn build(self) -> Result<RelationHeader> {
        let mut header = RelationHeader::new();
        for (name, ty, size) in self.columns {
            if header.position(&name).is_some() {
                bail!(SchemaError::new(format!("duplicate attribute '{}'", name)));
            }
            header.push(name, None, ty, size)?;
        }
        Ok(header)
    }
}
