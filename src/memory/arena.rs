//! # Dual-Direction Query Arena
//!
//! `QueryArena` is a bump allocator over one caller-supplied byte buffer. It
//! grows from both ends toward the middle:
//!
//! ```text
//! 0                front ->                 <- back              capacity
//! +------------------+-----------------------+-----------------------+
//! | long-lived front |        free           | LIFO scratch (back)   |
//! +------------------+-----------------------+-----------------------+
//! ```
//!
//! - Front allocations outlive compilation sub-phases: tuples, EET node
//!   sequences, nested statement scopes. `free_front` retracts the cursor when
//!   the freed region is the most recent one; otherwise the bytes are counted
//!   as wasted until `reset`.
//! - Back allocations are scratch: clause records, sort buffers. They are
//!   released in bulk with a `BackMark` checkpoint, never individually.
//!
//! Every operation is O(1) cursor arithmetic. `front <= back` holds after every
//! call; a request that would cross the cursors fails with `MemoryError` and
//! leaves both cursors where they were.
//!
//! ## Interior Mutability
//!
//! The buffer is viewed as `&[Cell<u8>]` so the arena can be shared by
//! reference between the compiler, the operator tree and nested scopes on a
//! single thread. Regions are plain `(offset, len)` handles into this arena;
//! they carry no lifetime and are only meaningful for the arena that issued
//! them.

use std::cell::Cell;
use std::ops::{Deref, Range};

use eyre::{bail, ensure, Result};

use crate::memory::{Direction, MemoryError};

/// A contiguous byte range handed out by a `QueryArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    offset: usize,
    len: usize,
}

impl Region {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Sub-range `[start, start + len)` relative to this region.
    pub fn slice(&self, start: usize, len: usize) -> Region {
        debug_assert!(start + len <= self.len);
        Region {
            offset: self.offset + start,
            len,
        }
    }
}

/// Checkpoint of the back cursor, restored by `release_back`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackMark(usize);

pub struct QueryArena<'buf> {
    bytes: &'buf [Cell<u8>],
    front: Cell<usize>,
    back: Cell<usize>,
    wasted: Cell<usize>,
}

impl<'buf> QueryArena<'buf> {
    pub fn new(buffer: &'buf mut [u8]) -> Self {
        Self::over_cells(Cell::from_mut(buffer).as_slice_of_cells())
    }

    fn over_cells(bytes: &'buf [Cell<u8>]) -> Self {
        Self {
            bytes,
            front: Cell::new(0),
            back: Cell::new(bytes.len()),
            wasted: Cell::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes between the two cursors.
    pub fn available(&self) -> usize {
        self.back.get() - self.front.get()
    }

    pub fn front_cursor(&self) -> usize {
        self.front.get()
    }

    pub fn back_cursor(&self) -> usize {
        self.back.get()
    }

    /// Bytes freed out of order that stay unusable until `reset`.
    pub fn wasted(&self) -> usize {
        self.wasted.get()
    }

    pub fn allocate_front(&self, size: usize) -> Result<Region> {
        let front = self.front.get();
        if size > self.available() {
            bail!(MemoryError {
                direction: Direction::Front,
                requested: size,
                available: self.available(),
            });
        }
        self.front.set(front + size);
        Ok(Region::new(front, size))
    }

    /// Allocates `size` zeroed bytes at the front.
    pub fn allocate_front_zeroed(&self, size: usize) -> Result<Region> {
        let region = self.allocate_front(size)?;
        self.fill(region, 0);
        Ok(region)
    }

    pub fn allocate_back(&self, size: usize) -> Result<Region> {
        if size > self.available() {
            bail!(MemoryError {
                direction: Direction::Back,
                requested: size,
                available: self.available(),
            });
        }
        let back = self.back.get() - size;
        self.back.set(back);
        Ok(Region::new(back, size))
    }

    /// Grows the most recent back allocation by `size` bytes. The new bytes
    /// sit at the start of the returned region, the old contents keep their
    /// absolute position.
    pub fn extend_back(&self, region: Region, size: usize) -> Result<Region> {
        ensure!(
            region.offset == self.back.get(),
            "extend_back on a region that is not the most recent back allocation"
        );
        if size > self.available() {
            bail!(MemoryError {
                direction: Direction::Back,
                requested: size,
                available: self.available(),
            });
        }
        let back = self.back.get() - size;
        self.back.set(back);
        Ok(Region::new(back, region.len + size))
    }

    /// Grows a front region by `additional` bytes. The region grows in place
    /// when it is the most recent front allocation; otherwise its contents
    /// move to a fresh allocation and the old bytes are freed.
    pub fn grow_front(&self, region: Region, additional: usize) -> Result<Region> {
        if region.end() == self.front.get() {
            self.allocate_front(additional)?;
            return Ok(Region::new(region.offset, region.len + additional));
        }
        let grown = self.allocate_front(region.len + additional)?;
        self.copy_within(region.offset, grown.offset, region.len);
        self.free_front(region);
        Ok(grown)
    }

    pub fn free_front(&self, region: Region) {
        if region.is_empty() {
            return;
        }
        if region.end() == self.front.get() {
            self.front.set(region.offset);
        } else {
            self.wasted.set(self.wasted.get() + region.len);
        }
    }

    pub fn mark_back(&self) -> BackMark {
        BackMark(self.back.get())
    }

    pub fn release_back(&self, mark: BackMark) {
        debug_assert!(mark.0 >= self.back.get() && mark.0 <= self.capacity());
        self.back.set(mark.0.min(self.capacity()));
    }

    pub fn reset(&self) {
        self.front.set(0);
        self.back.set(self.capacity());
        self.wasted.set(0);
    }

    /// Carves `size` bytes off the front and exposes them as an independent
    /// arena. The bytes go back to the parent when the scope is dropped.
    pub fn nested(&self, size: usize) -> Result<NestedArena<'_, 'buf>> {
        let region = self.allocate_front(size)?;
        Ok(NestedArena {
            parent: self,
            region,
            arena: QueryArena::over_cells(&self.bytes[region.range()]),
        })
    }

    // ------------------------------------------------------------------
    // Byte access
    // ------------------------------------------------------------------

    pub fn cells(&self, region: Region) -> &[Cell<u8>] {
        &self.bytes[region.range()]
    }

    pub fn get_u8(&self, offset: usize) -> u8 {
        self.bytes[offset].get()
    }

    pub fn set_u8(&self, offset: usize, value: u8) {
        self.bytes[offset].set(value);
    }

    pub fn read_into(&self, offset: usize, out: &mut [u8]) {
        let len = out.len();
        for (dst, src) in out.iter_mut().zip(&self.bytes[offset..offset + len]) {
            *dst = src.get();
        }
    }

    pub fn write_from(&self, offset: usize, data: &[u8]) {
        for (dst, src) in self.bytes[offset..offset + data.len()].iter().zip(data) {
            dst.set(*src);
        }
    }

    pub fn fill(&self, region: Region, value: u8) {
        for cell in self.cells(region) {
            cell.set(value);
        }
    }

    /// Moves `len` bytes from `src` to `dst`; the ranges may overlap.
    pub fn copy_within(&self, src: usize, dst: usize, len: usize) {
        if src == dst || len == 0 {
            return;
        }
        if dst < src {
            for i in 0..len {
                self.bytes[dst + i].set(self.bytes[src + i].get());
            }
        } else {
            for i in (0..len).rev() {
                self.bytes[dst + i].set(self.bytes[src + i].get());
            }
        }
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        let mut raw = [0u8; 2];
        self.read_into(offset, &mut raw);
        u16::from_le_bytes(raw)
    }

    pub fn write_u16(&self, offset: usize, value: u16) {
        self.write_from(offset, &value.to_le_bytes());
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        self.read_into(offset, &mut raw);
        u32::from_le_bytes(raw)
    }

    pub fn write_u32(&self, offset: usize, value: u32) {
        self.write_from(offset, &value.to_le_bytes());
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        let mut raw = [0u8; 4];
        self.read_into(offset, &mut raw);
        i32::from_le_bytes(raw)
    }

    pub fn write_i32(&self, offset: usize, value: i32) {
        self.write_from(offset, &value.to_le_bytes());
    }

    pub fn read_i64(&self, offset: usize) -> i64 {
        let mut raw = [0u8; 8];
        self.read_into(offset, &mut raw);
        i64::from_le_bytes(raw)
    }

    pub fn write_i64(&self, offset: usize, value: i64) {
        self.write_from(offset, &value.to_le_bytes());
    }

    pub fn read_f64(&self, offset: usize) -> f64 {
        let mut raw = [0u8; 8];
        self.read_into(offset, &mut raw);
        f64::from_le_bytes(raw)
    }

    pub fn write_f64(&self, offset: usize, value: f64) {
        self.write_from(offset, &value.to_le_bytes());
    }
}

impl std::fmt::Debug for QueryArena<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryArena")
            .field("capacity", &self.capacity())
            .field("front", &self.front.get())
            .field("back", &self.back.get())
            .field("wasted", &self.wasted.get())
            .finish()
    }
}

/// An arena scope carved from a parent arena, used for nested sub-statements.
pub struct NestedArena<'p, 'buf> {
    parent: &'p QueryArena<'buf>,
    region: Region,
    arena: QueryArena<'p>,
}

impl<'p> Deref for NestedArena<'p, '_> {
    type Target = QueryArena<'p>;

    fn deref(&self) -> &Self::Target {
        &self.arena
    }
}

impl Drop for NestedArena<'_, '_> {
    fn drop(&mut self) {
        self.parent.free_front(self.region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_and_back_grow_toward_each_other() {
        let mut buf = [0u8; 64];
        let arena = QueryArena::new(&mut buf);

        let a = arena.allocate_front(10).unwrap();
        let b = arena.allocate_back(20).unwrap();

        assert_eq!(a, Region::new(0, 10));
        assert_eq!(b, Region::new(44, 20));
        assert_eq!(arena.available(), 34);
    }

    #[test]
    fn test_out_of_memory_leaves_cursors_unchanged() {
        let mut buf = [0u8; 32];
        let arena = QueryArena::new(&mut buf);
        arena.allocate_front(12).unwrap();
        arena.allocate_back(12).unwrap();

        let err = arena.allocate_front(9).unwrap_err();
        let mem = err.downcast_ref::<MemoryError>().unwrap();
        assert_eq!(mem.requested, 9);
        assert_eq!(mem.available, 8);
        assert!(arena.allocate_back(9).is_err());

        assert_eq!(arena.front_cursor(), 12);
        assert_eq!(arena.back_cursor(), 20);
    }

    #[test]
    fn test_cursor_invariant_over_mixed_sequence() {
        let mut buf = [0u8; 100];
        let arena = QueryArena::new(&mut buf);
        for size in [7usize, 13, 1, 30, 2, 9, 40, 5] {
            let _ = arena.allocate_front(size);
            assert!(arena.front_cursor() <= arena.back_cursor());
            let _ = arena.allocate_back(size);
            assert!(arena.front_cursor() <= arena.back_cursor());
        }
    }

    #[test]
    fn test_exact_fit_succeeds() {
        let mut buf = [0u8; 16];
        let arena = QueryArena::new(&mut buf);
        arena.allocate_front(8).unwrap();
        arena.allocate_back(8).unwrap();
        assert_eq!(arena.available(), 0);
        assert!(arena.allocate_front(0).is_ok());
        assert!(arena.allocate_front(1).is_err());
    }

    #[test]
    fn test_extend_back_prepends_and_keeps_old_bytes() {
        let mut buf = [0u8; 32];
        let arena = QueryArena::new(&mut buf);

        let r = arena.allocate_back(2).unwrap();
        arena.write_u16(r.offset(), 0xBEEF);
        let r = arena.extend_back(r, 3).unwrap();

        assert_eq!(r, Region::new(27, 5));
        assert_eq!(arena.read_u16(30), 0xBEEF);
    }

    #[test]
    fn test_extend_back_requires_most_recent_allocation() {
        let mut buf = [0u8; 32];
        let arena = QueryArena::new(&mut buf);
        let first = arena.allocate_back(4).unwrap();
        arena.allocate_back(4).unwrap();
        assert!(arena.extend_back(first, 1).is_err());
    }

    #[test]
    fn test_extend_back_fails_at_front_cursor() {
        let mut buf = [0u8; 16];
        let arena = QueryArena::new(&mut buf);
        arena.allocate_front(10).unwrap();
        let r = arena.allocate_back(4).unwrap();
        assert!(arena.extend_back(r, 3).is_err());
        assert_eq!(arena.back_cursor(), 12);
    }

    #[test]
    fn test_free_front_lifo_retracts_cursor() {
        let mut buf = [0u8; 32];
        let arena = QueryArena::new(&mut buf);
        let a = arena.allocate_front(4).unwrap();
        let b = arena.allocate_front(4).unwrap();

        arena.free_front(b);
        arena.free_front(a);

        assert_eq!(arena.front_cursor(), 0);
        assert_eq!(arena.wasted(), 0);
    }

    #[test]
    fn test_free_front_out_of_order_is_wasted() {
        let mut buf = [0u8; 32];
        let arena = QueryArena::new(&mut buf);
        let a = arena.allocate_front(4).unwrap();
        arena.allocate_front(4).unwrap();

        arena.free_front(a);

        assert_eq!(arena.front_cursor(), 8);
        assert_eq!(arena.wasted(), 4);

        arena.reset();
        assert_eq!(arena.wasted(), 0);
        assert_eq!(arena.available(), 32);
    }

    #[test]
    fn test_grow_front_in_place_and_by_move() {
        let mut buf = [0u8; 64];
        let arena = QueryArena::new(&mut buf);
        let a = arena.allocate_front(4).unwrap();
        arena.write_i32(a.offset(), 11);

        let a = arena.grow_front(a, 4).unwrap();
        assert_eq!(a, Region::new(0, 8));

        arena.allocate_front(2).unwrap();
        let moved = arena.grow_front(a, 4).unwrap();
        assert_eq!(moved, Region::new(10, 12));
        assert_eq!(arena.read_i32(10), 11);
        assert_eq!(arena.wasted(), 8);
    }

    #[test]
    fn test_mark_and_release_back() {
        let mut buf = [0u8; 32];
        let arena = QueryArena::new(&mut buf);
        arena.allocate_back(4).unwrap();
        let mark = arena.mark_back();
        arena.allocate_back(8).unwrap();
        arena.allocate_back(8).unwrap();

        arena.release_back(mark);

        assert_eq!(arena.back_cursor(), 28);
    }

    #[test]
    fn test_nested_scope_returns_bytes_on_drop() {
        let mut buf = [0u8; 64];
        let arena = QueryArena::new(&mut buf);
        {
            let nested = arena.nested(32).unwrap();
            assert_eq!(nested.capacity(), 32);
            let r = nested.allocate_front(4).unwrap();
            nested.write_i32(r.offset(), -7);
            assert_eq!(nested.read_i32(r.offset()), -7);
            assert_eq!(arena.read_i32(0), -7);
        }
        assert_eq!(arena.front_cursor(), 0);
    }

    #[test]
    fn test_copy_within_overlapping() {
        let mut buf = [0u8; 8];
        let arena = QueryArena::new(&mut buf);
        arena.write_from(0, &[1, 2, 3, 4]);
        arena.copy_within(0, 2, 4);
        let mut out = [0u8; 6];
        arena.read_into(0, &mut out);
        assert_eq!(out, [1, 2, 1, 2, 3, 4]);

        arena.copy_within(2, 0, 4);
        arena.read_into(0, &mut out);
        assert_eq!(out[..4], [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_into_copies_exactly_out_len_bytes() {
        let mut buf = [0u8; 8];
        let arena = QueryArena::new(&mut buf);
        arena.write_from(0, &[9, 8, 7, 6, 5, 4, 3, 2]);

        let mut out = [0u8; 3];
        arena.read_into(5, &mut out);
        assert_eq!(out, [4, 3, 2]);

        let mut empty = [0u8; 0];
        arena.read_into(8, &mut empty);
    }
}
