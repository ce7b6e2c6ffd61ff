//! # Operator Runtime - Pull-Based Iteration
//!
//! Every operator implements the `Executor` contract:
//!
//! - `open()`: acquire resources (file handles, child tuples, sort buffers)
//! - `next(out)`: write the next row into the caller's tuple, or report
//!   `Next::Exhausted`
//! - `close()`: release what `open` acquired and close children; calling it
//!   twice is a no-op
//!
//! The operator set is closed, so the tree is an enum (`Operator`) rather
//! than boxed trait objects. Child arity is explicit per variant:
//!
//! ```text
//! Projection
//!     └── Selection
//!             └── NestedLoopJoin
//!                     ├── Scan a
//!                     └── Scan b
//! ```
//!
//! ## Tuples
//!
//! The caller allocates the root tuple from the root header and passes it to
//! every `next`. Operators that need their child's row in a different shape
//! (joins, projections, aggregates, sorts) allocate their own child tuples in
//! `open` and free them in `close`. Selection passes the caller's tuple
//! straight down because its input and output shapes are identical.
//!
//! ## Context
//!
//! Operators hold no borrowed state. The arena and storage arrive through
//! `ExecutionContext` on every call, which lets a DML sub-statement run a
//! plan inside a nested arena scope.
//!
//! ## Failure
//!
//! A failing `open` closes whatever it already acquired before returning the
//! error, so a failed open never leaks handles or arena space.

mod aggregate;
mod join;
mod project;
mod scan;
mod sort;

pub use aggregate::{AggFunc, AggItem, AggregateOp};
pub use join::JoinOp;
pub use project::{ProjectItem, ProjectionOp, SelectionOp};
pub use scan::{IndexRange, ScanOp, Visibility};
pub use sort::{SortKey, SortOp};

use eyre::Result;
use tracing::warn;

use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::context::ExecutionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Produced,
    Exhausted,
}

pub trait Executor {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()>;

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next>;

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()>;

    /// Shape of the rows this operator yields.
    fn header(&self) -> &RelationHeader;
}

#[derive(Debug)]
pub enum Operator {
    Scan(ScanOp),
    NestedLoopJoin(Box<JoinOp>),
    IndexOrderedJoin(Box<JoinOp>),
    Selection(Box<SelectionOp>),
    Projection(Box<ProjectionOp>),
    Sort(Box<SortOp>),
    Aggregate(Box<AggregateOp>),
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Scan(_) => "SCAN",
            Operator::NestedLoopJoin(_) => "NTJOIN",
            Operator::IndexOrderedJoin(_) => "OSIJOIN",
            Operator::Selection(_) => "SELECT",
            Operator::Projection(_) => "PROJECT",
            Operator::Sort(_) => "SORT",
            Operator::Aggregate(_) => "AGGREGATE",
        }
    }

    /// Renders the tree one operator per line, each prefixed by `+`
    /// repeated depth + 1 times.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        if let Operator::Scan(scan) = self {
            Operator::explain_scan(scan, out, depth);
            return;
        }
        for _ in 0..=depth {
            out.push('+');
        }
        out.push_str(self.name());
        out.push('\n');
        match self {
            Operator::Scan(_) => {}
            Operator::NestedLoopJoin(join) | Operator::IndexOrderedJoin(join) => {
                join.left().explain_into(out, depth + 1);
                Operator::explain_scan(join.right(), out, depth + 1);
            }
            Operator::Selection(op) => op.child().explain_into(out, depth + 1),
            Operator::Projection(op) => op.child().explain_into(out, depth + 1),
            Operator::Sort(op) => op.child().explain_into(out, depth + 1),
            Operator::Aggregate(op) => op.child().explain_into(out, depth + 1),
        }
    }

    fn explain_scan(scan: &ScanOp, out: &mut String, depth: usize) {
        for _ in 0..=depth {
            out.push('+');
        }
        out.push_str("SCAN ");
        out.push_str(scan.relation());
        if !scan.alias().eq_ignore_ascii_case(scan.relation()) {
            out.push_str(" AS ");
            out.push_str(scan.alias());
        }
        if scan.range().is_some() {
            out.push_str(" (index range)");
        }
        out.push('\n');
    }

    /// File offset of the base record behind the row produced last, for
    /// plans made of one scan under optional selections.
    pub fn record_offset(&self) -> Option<u64> {
        match self {
            Operator::Scan(scan) => scan.last_offset(),
            Operator::Selection(op) => op.child().record_offset(),
            _ => None,
        }
    }

    pub fn as_scan_mut(&mut self) -> Option<&mut ScanOp> {
        match self {
            Operator::Scan(scan) => Some(scan),
            _ => None,
        }
    }

    /// Closes the tree during error teardown. A failing close is logged and
    /// swallowed so the error that caused the teardown is the one reported.
    pub fn teardown(&mut self, cx: &ExecutionContext<'_, '_>) {
        if let Err(e) = self.close(cx) {
            warn!(operator = self.name(), error = %e, "close failed during teardown");
        }
    }
}

impl Executor for ScanOp {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        ScanOp::open(self, cx)
    }

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        ScanOp::next(self, cx, out)
    }

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        ScanOp::close(self, cx)
    }

    fn header(&self) -> &RelationHeader {
        ScanOp::header(self)
    }
}

impl Executor for Operator {
    fn open(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        let result = match self {
            Operator::Scan(op) => Executor::open(op, cx),
            Operator::NestedLoopJoin(op) | Operator::IndexOrderedJoin(op) => op.open(cx),
            Operator::Selection(op) => op.open(cx),
            Operator::Projection(op) => op.open(cx),
            Operator::Sort(op) => op.open(cx),
            Operator::Aggregate(op) => op.open(cx),
        };
        if result.is_err() {
            self.teardown(cx);
        }
        result
    }

    fn next(&mut self, cx: &ExecutionContext<'_, '_>, out: &Tuple) -> Result<Next> {
        match self {
            Operator::Scan(op) => Executor::next(op, cx, out),
            Operator::NestedLoopJoin(op) | Operator::IndexOrderedJoin(op) => op.next(cx, out),
            Operator::Selection(op) => op.next(cx, out),
            Operator::Projection(op) => op.next(cx, out),
            Operator::Sort(op) => op.next(cx, out),
            Operator::Aggregate(op) => op.next(cx, out),
        }
    }

    fn close(&mut self, cx: &ExecutionContext<'_, '_>) -> Result<()> {
        match self {
            Operator::Scan(op) => Executor::close(op, cx),
            Operator::NestedLoopJoin(op) | Operator::IndexOrderedJoin(op) => op.close(cx),
            Operator::Selection(op) => op.close(cx),
            Operator::Projection(op) => op.close(cx),
            Operator::Sort(op) => op.close(cx),
            Operator::Aggregate(op) => op.close(cx),
        }
    }

    fn header(&self) -> &RelationHeader {
        match self {
            Operator::Scan(op) => ScanOp::header(op),
            Operator::NestedLoopJoin(op) | Operator::IndexOrderedJoin(op) => op.header(),
            Operator::Selection(op) => op.header(),
            Operator::Projection(op) => op.header(),
            Operator::Sort(op) => op.header(),
            Operator::Aggregate(op) => op.header(),
        }
    }
}
