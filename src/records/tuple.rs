//! # Arena Tuples
//!
//! A `Tuple` is a handle to one row buffer living in a `QueryArena`: the null
//! bitmap followed by the fixed-size attribute bytes, exactly the layout of a
//! stored record. Scans therefore load records with a single byte copy and
//! the Sort operator can treat buffered records as tuples in place.
//!
//! ## Ownership
//!
//! The caller driving iteration allocates the root tuple once with
//! `Tuple::alloc`, passes it to every `next` call and releases it when done.
//! Operators write into it but never keep it. Operators own the child tuples
//! they pull into.
//!
//! ## Encoding
//!
//! | Type | Bytes | Encoding |
//! |------|-------|----------|
//! | INT | 4 | `i32` little endian |
//! | DECIMAL | 8 | `f64` little endian |
//! | STRING(n) | n | UTF-8, NUL padded |
//!
//! A NULL attribute has its bitmap bit set and all of its bytes zeroed.

use eyre::{bail, Result};
use smallvec::SmallVec;

use crate::error::SchemaError;
use crate::memory::{QueryArena, Region};
use crate::schema::RelationHeader;
use crate::types::{AttrType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuple {
    region: Region,
    bitmap_len: u16,
    count: u16,
}

impl Tuple {
    /// Allocates a zeroed tuple sized for `header` at the arena front.
    pub fn alloc(arena: &QueryArena<'_>, header: &RelationHeader) -> Result<Tuple> {
        let region = arena.allocate_front_zeroed(header.record_size())?;
        Ok(Self::view(region, header))
    }

    /// Interprets an existing record-sized region as a tuple of `header`.
    pub fn view(region: Region, header: &RelationHeader) -> Tuple {
        debug_assert_eq!(region.len(), header.record_size());
        Tuple {
            region,
            bitmap_len: header.null_bitmap_len() as u16,
            count: header.len() as u16,
        }
    }

    pub fn release(self, arena: &QueryArena<'_>) {
        arena.free_front(self.region);
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn data_offset(&self) -> usize {
        self.region.offset() + self.bitmap_len as usize
    }

    fn data_len(&self) -> usize {
        self.region.len() - self.bitmap_len as usize
    }

    pub fn clear(&self, arena: &QueryArena<'_>) {
        arena.fill(self.region, 0);
    }

    pub fn is_null(&self, arena: &QueryArena<'_>, pos: usize) -> bool {
        let byte = arena.get_u8(self.region.offset() + pos / 8);
        byte & (1 << (pos % 8)) != 0
    }

    pub fn set_null(&self, arena: &QueryArena<'_>, pos: usize, null: bool) {
        let at = self.region.offset() + pos / 8;
        let byte = arena.get_u8(at);
        let bit = 1 << (pos % 8);
        arena.set_u8(at, if null { byte | bit } else { byte & !bit });
    }

    pub fn get(&self, arena: &QueryArena<'_>, header: &RelationHeader, pos: usize) -> Value {
        let attr = header.attribute(pos);
        self.get_raw(arena, pos, attr.ty(), attr.offset(), attr.size())
    }

    /// Reads attribute `pos` from an explicit layout, as bound EET nodes do.
    pub fn get_raw(
        &self,
        arena: &QueryArena<'_>,
        pos: usize,
        ty: AttrType,
        offset: usize,
        size: usize,
    ) -> Value {
        if self.is_null(arena, pos) {
            return Value::Null;
        }
        let at = self.data_offset() + offset;
        match ty {
            AttrType::Int => Value::Int(arena.read_i32(at) as i64),
            AttrType::Decimal => Value::Decimal(arena.read_f64(at)),
            AttrType::String => {
                let mut text: SmallVec<[u8; 24]> = SmallVec::new();
                for cell in arena.cells(Region::new(at, size)) {
                    match cell.get() {
                        0 => break,
                        b => text.push(b),
                    }
                }
                Value::Text(text)
            }
        }
    }

    /// Writes `value` into attribute `pos`, converting numerics where lossless.
    pub fn set(
        &self,
        arena: &QueryArena<'_>,
        header: &RelationHeader,
        pos: usize,
        value: &Value,
    ) -> Result<()> {
        let attr = header.attribute(pos);
        let at = self.data_offset() + attr.offset();
        let field = Region::new(at, attr.size());
        match (attr.ty(), value) {
            (_, Value::Null) => {
                arena.fill(field, 0);
                self.set_null(arena, pos, true);
                return Ok(());
            }
            (AttrType::Int, Value::Int(_) | Value::Bool(_)) => {
                let v = value.as_int().unwrap_or_default();
                let Ok(narrow) = i32::try_from(v) else {
                    bail!(SchemaError::new(format!(
                        "value {} out of range for INT attribute '{}'",
                        v,
                        attr.name()
                    )));
                };
                arena.write_i32(at, narrow);
            }
            (AttrType::Decimal, Value::Int(i)) => arena.write_f64(at, *i as f64),
            (AttrType::Decimal, Value::Decimal(d)) => arena.write_f64(at, *d),
            (AttrType::String, Value::Text(bytes)) => {
                if bytes.len() > attr.size() {
                    bail!(SchemaError::new(format!(
                        "string of {} bytes too long for STRING({}) attribute '{}'",
                        bytes.len(),
                        attr.size(),
                        attr.name()
                    )));
                }
                arena.fill(field, 0);
                arena.write_from(at, bytes);
            }
            (ty, v) => bail!(SchemaError::new(format!(
                "cannot store {} value in {} attribute '{}'",
                v.kind().name(),
                ty.name(),
                attr.name()
            ))),
        }
        self.set_null(arena, pos, false);
        Ok(())
    }

    /// Copies a tuple of identical layout.
    pub fn copy_from(&self, arena: &QueryArena<'_>, src: &Tuple) {
        debug_assert_eq!(self.region.len(), src.region.len());
        arena.copy_within(src.region.offset(), self.region.offset(), self.region.len());
    }

    /// Fills this tuple with `left` followed by `right` (a join row).
    pub fn concat(&self, arena: &QueryArena<'_>, left: &Tuple, right: &Tuple) {
        arena.fill(Region::new(self.region.offset(), self.bitmap_len as usize), 0);
        for pos in 0..left.len() {
            if left.is_null(arena, pos) {
                self.set_null(arena, pos, true);
            }
        }
        for pos in 0..right.len() {
            if right.is_null(arena, pos) {
                self.set_null(arena, left.len() + pos, true);
            }
        }
        let out = self.data_offset();
        arena.copy_within(left.data_offset(), out, left.data_len());
        arena.copy_within(right.data_offset(), out + left.data_len(), right.data_len());
    }

    /// Loads a stored record (bitmap + data).
    pub fn load(&self, arena: &QueryArena<'_>, record: &[u8]) {
        debug_assert_eq!(record.len(), self.region.len());
        arena.write_from(self.region.offset(), record);
    }

    /// Serializes this tuple into a stored record.
    pub fn store(&self, arena: &QueryArena<'_>, record: &mut [u8]) {
        debug_assert_eq!(record.len(), self.region.len());
        arena.read_into(self.region.offset(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> RelationHeader {
        RelationHeader::builder()
            .int("id")
            .string("name", 5)
            .decimal("score")
            .build()
            .unwrap()
    }

    #[test]
    fn test_set_and_get_each_type() {
        let mut buf = [0u8; 128];
        let arena = QueryArena::new(&mut buf);
        let h = header();
        let t = Tuple::alloc(&arena, &h).unwrap();

        t.set(&arena, &h, 0, &Value::Int(-3)).unwrap();
        t.set(&arena, &h, 1, &Value::from("ab")).unwrap();
        t.set(&arena, &h, 2, &Value::Int(2)).unwrap();

        assert_eq!(t.get(&arena, &h, 0), Value::Int(-3));
        assert_eq!(t.get(&arena, &h, 1), Value::from("ab"));
        assert_eq!(t.get(&arena, &h, 2), Value::Decimal(2.0));
    }

    #[test]
    fn test_null_sets_bit_and_zeroes_bytes() {
        let mut buf = [0u8; 128];
        let arena = QueryArena::new(&mut buf);
        let h = header();
        let t = Tuple::alloc(&arena, &h).unwrap();
        t.set(&arena, &h, 0, &Value::Int(77)).unwrap();

        t.set(&arena, &h, 0, &Value::Null).unwrap();

        assert!(t.is_null(&arena, 0));
        assert_eq!(t.get(&arena, &h, 0), Value::Null);
        let mut record = vec![0u8; h.record_size()];
        t.store(&arena, &mut record);
        assert_eq!(record[0], 0b001);
        assert_eq!(&record[1..5], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_rejects_overlong_string_and_type_mismatch() {
        let mut buf = [0u8; 128];
        let arena = QueryArena::new(&mut buf);
        let h = header();
        let t = Tuple::alloc(&arena, &h).unwrap();

        assert!(t.set(&arena, &h, 1, &Value::from("toolong")).is_err());
        assert!(t.set(&arena, &h, 0, &Value::from("x")).is_err());
        assert!(t.set(&arena, &h, 0, &Value::Decimal(1.5)).is_err());
        assert!(t.set(&arena, &h, 0, &Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn test_concat_merges_bitmaps_and_data() {
        let mut buf = [0u8; 256];
        let arena = QueryArena::new(&mut buf);
        let left_h = RelationHeader::builder().int("a").build().unwrap();
        let right_h = RelationHeader::builder().int("b").int("c").build().unwrap();
        let joined_h = left_h.concat(&right_h).unwrap();

        let left = Tuple::alloc(&arena, &left_h).unwrap();
        let right = Tuple::alloc(&arena, &right_h).unwrap();
        let out = Tuple::alloc(&arena, &joined_h).unwrap();
        left.set(&arena, &left_h, 0, &Value::Int(1)).unwrap();
        right.set(&arena, &right_h, 0, &Value::Null).unwrap();
        right.set(&arena, &right_h, 1, &Value::Int(3)).unwrap();

        out.concat(&arena, &left, &right);

        assert_eq!(out.get(&arena, &joined_h, 0), Value::Int(1));
        assert_eq!(out.get(&arena, &joined_h, 1), Value::Null);
        assert_eq!(out.get(&arena, &joined_h, 2), Value::Int(3));
    }
}
