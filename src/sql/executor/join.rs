//! # Joins
//!
//! Join chains are left-deep: the left input is any operator, the right
//! input is always a base scan. Two strategies share one operator struct:
//!
//! - **Nested loop**: for every left row the right scan is rewound and read
//!   to the end. Cost is |left| x |right|.
//! - **Index ordered**: for every left row the right scan is narrowed to the
//!   index entries whose key equals the left row's join attribute. Rows with
//!   a NULL join key cannot match and are skipped.
//!
//! In both strategies the attached predicate (merged `ON`/`WHERE`
//! conjunction) is evaluated on every concatenated row.

use eyre::{bail, Result};

use super::{Executor, Next, Operator, ScanOp};
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::context::ExecutionContext;
use crate::sql::eet::Eet;
use crate::types::Value;

#[derive(Debug)]
struct JoinState {
    left_row: Tuple,
    right_row: Tuple,
    left_valid: bool,
}

#[derive(Debug)]
pub struct JoinOp {
    left: Operator,
    right: ScanOp,
    header: RelationHeader,
    predicate: Option<Eet>,
    /// Left-side attribute whose value probes the right scan's index.
    probe_key: Option<usize>,
    state: Option<JoinState>,
    released: bool,
}

impl JoinOp {
    /// `header` is the concatenation of both input headers.
    pub fn new(left: Operator, right: ScanOp, header: RelationHeader) -> JoinOp {
        debug_assert_eq!(header.len(), left.header().len() + right.header().len());
        JoinOp {
            left,
            right,
            header,
            predicate: None,
            probe_key: None,
            state: None,
            released: false,
        }
    }

    pub fn left(&self) -> &Operator {
        &self.left
    }

    pub fn right(&self) -> &ScanOp {
        &self.right
    }

    pub fn right_mut(&mut self) -> &mut ScanOp {
        &mut self.right
    }

    pub fn predicate(&self) -> Option<Eet> {
        self.predicate
    }

    pub fn set_predicate(&mut self, predicate: Eet) {
        self.predicate = Some(predicate);
    }

    /// Switches to index-ordered probing on `left_key`. The right scan must
    /// already carry an index range on its join attribute.
    pub fn set_probe_key(&mut self, left_key: usize) {
        self.probe_key = Some(left_key);
    }

    fn release_predicate(&mut self, cx: &ExecutionContext<'_, '_>) {
        if !self.released {
            if let Some(predicate) = self.predicate {
                predicate.release(cx.arena);
            }
            self.released = true;
        }
    }
}

impl Executor for JoinOp {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        if self.released {
            bail!("join reopened after close");
        }
        let left_row = Tuple::alloc(cx.arena, self.left.header())?;
        let right_row = match Tuple::alloc(cx.arena, self.right.header()) {
            Ok(t) => t,
            Err(e) => {
                left_row.release(cx.arena);
                return Err(e);
            }
        };
        self.state = Some(JoinState {
            left_row,
            right_row,
            left_valid: false,
        });
        self.left.open(cx)?;
        Executor::open(&mut self.right, cx)
    }

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        let Some(state) = self.state.as_mut() else {
            bail!("join pulled before open");
        };
        loop {
            if !state.left_valid {
                if self.left.next(cx, &state.left_row)? == Next::Exhausted {
                    return Ok(Next::Exhausted);
                }
                match self.probe_key {
                    Some(pos) => {
                        let key = state
                            .left_row
                            .get(cx.arena, self.left.header(), pos);
                        let Value::Int(key) = key else {
                            continue;
                        };
                        self.right.probe(cx, key)?;
                    }
                    None => self.right.rewind(cx)?,
                }
                state.left_valid = true;
            }

            if self.right.next(cx, &state.right_row)? == Next::Exhausted {
                state.left_valid = false;
                continue;
            }
            out.concat(cx.arena, &state.left_row, &state.right_row);
            let accepted = match &self.predicate {
                Some(predicate) => predicate.evaluate(cx.arena, out)?.is_true(),
                None => true,
            };
            if accepted {
                return Ok(Next::Produced);
            }
        }
    }

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let children = self.left.close(cx).and(self.right.close(cx));
        if let Some(state) = self.state.take() {
            state.right_row.release(cx.arena);
            state.left_row.release(cx.arena);
        }
        self.release_predicate(cx);
        children
    }

    fn header(&self) -> &RelationHeader {
        &self.header
    }
}
