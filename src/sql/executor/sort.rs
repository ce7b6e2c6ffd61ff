//! # Sort
//!
//! Materializes the whole input on the arena's back stack during `open`,
//! keeping the buffer ordered by binary insertion as rows arrive. Rows are
//! stored as raw records, so emitting one is a single byte copy.
//!
//! ```text
//! back stack (grows down)
//! ┌───────────────┐ <- region.offset (row 0, smallest)
//! │ row 0         │
//! │ row 1         │
//! │ ...           │
//! │ row n-1       │
//! └───────────────┘ <- mark taken at open
//! ```
//!
//! Each new row extends the region downward; rows ranking before the new one
//! shift down by one slot and the new row fills the gap. Insertion goes after
//! equal keys, so the sort is stable.
//!
//! ## Budget
//!
//! With a budget configured, buffering more bytes than the budget fails with
//! `MemoryError` exactly as an exhausted arena does. There is no spilling.

use std::cmp::Ordering;

use eyre::{bail, Result};
use smallvec::SmallVec;

use super::{Executor, Next, Operator};
use crate::memory::{BackMark, Direction, MemoryError, QueryArena, Region};
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::context::ExecutionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub position: usize,
    pub descending: bool,
}

#[derive(Debug)]
struct SortState {
    mark: BackMark,
    scratch: Tuple,
    rows: Option<Region>,
    count: usize,
    cursor: usize,
}

#[derive(Debug)]
pub struct SortOp {
    child: Operator,
    keys: SmallVec<[SortKey; 4]>,
    budget: Option<usize>,
    state: Option<SortState>,
}

impl SortOp {
    pub fn new(child: Operator, keys: SmallVec<[SortKey; 4]>, budget: Option<usize>) -> SortOp {
        SortOp {
            child,
            keys,
            budget,
            state: None,
        }
    }

    pub fn child(&self) -> &Operator {
        &self.child
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    fn compare(&self, arena: &QueryArena<'_>, a: &Tuple, b: &Tuple) -> Ordering {
        let header = self.child.header();
        for key in &self.keys {
            let left = a.get(arena, header, key.position);
            let right = b.get(arena, header, key.position);
            let ordering = left.sort_cmp(&right);
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn insert(&mut self, arena: &QueryArena<'_>) -> Result<()> {
        let size = self.child.header().record_size();
        let Some(state) = self.state.as_ref() else {
            bail!("sort buffer used before open");
        };
        let (scratch, rows, count) = (state.scratch, state.rows, state.count);

        if let Some(budget) = self.budget {
            let used = count * size;
            if used + size > budget {
                bail!(MemoryError {
                    direction: Direction::Back,
                    requested: size,
                    available: budget.saturating_sub(used),
                });
            }
        }
        let region = match rows {
            None => arena.allocate_back(size)?,
            Some(rows) => arena.extend_back(rows, size)?,
        };

        let header = self.child.header();
        let row = |i: usize| Tuple::view(region.slice(i * size, size), header);
        // Existing rows now sit at slots 1..=count.
        let (mut lo, mut hi) = (0, count);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.compare(arena, &row(mid + 1), &scratch) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        arena.copy_within(region.offset() + size, region.offset(), lo * size);
        arena.copy_within(scratch.region().offset(), region.offset() + lo * size, size);

        if let Some(state) = self.state.as_mut() {
            state.rows = Some(region);
            state.count = count + 1;
        }
        Ok(())
    }
}

impl Executor for SortOp {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let mark = cx.arena.mark_back();
        let scratch = Tuple::alloc(cx.arena, self.child.header())?;
        self.state = Some(SortState {
            mark,
            scratch,
            rows: None,
            count: 0,
            cursor: 0,
        });
        self.child.open(cx)?;
        while self.child.next(cx, &scratch)? == Next::Produced {
            self.insert(cx.arena)?;
        }
        Ok(())
    }

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        let size = self.child.header().record_size();
        let Some(state) = self.state.as_mut() else {
            bail!("sort pulled before open");
        };
        let Some(rows) = state.rows else {
            return Ok(Next::Exhausted);
        };
        if state.cursor >= state.count {
            return Ok(Next::Exhausted);
        }
        let at = rows.offset() + state.cursor * size;
        cx.arena.copy_within(at, out.region().offset(), size);
        state.cursor += 1;
        Ok(Next::Produced)
    }

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let Some(state) = self.state.take() else {
            return self.child.close(cx);
        };
        cx.arena.release_back(state.mark);
        let result = self.child.close(cx);
        state.scratch.release(cx.arena);
        result
    }

    fn header(&self) -> &RelationHeader {
        self.child.header()
    }
}
