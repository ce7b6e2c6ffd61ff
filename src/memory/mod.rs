//! # Memory Management
//!
//! petitdb never allocates per-statement state on the general heap when it can
//! avoid it. Each statement runs against a `QueryArena` sized by the caller:
//! clause records, compiled expressions, tuples and sort buffers are carved
//! out of that one buffer and handed back in bulk.
//!
//! ## Layout
//!
//! ```text
//! caller buffer
//! ├── front (grows up)    tuples, EET node sequences, nested scopes
//! └── back  (grows down)  clause list, sort buffers (LIFO, mark/release)
//! ```
//!
//! ## Exhaustion
//!
//! Running out of arena space is an expected outcome, not a bug. Every
//! allocation returns `eyre::Result`; the report carries a `MemoryError` that
//! callers can downcast to decide whether to retry with a larger buffer:
//!
//! ```ignore
//! match engine.prepare(sql, &arena) {
//!     Err(e) if e.downcast_ref::<MemoryError>().is_some() => retry_with_more_memory(),
//!     other => other,
//! }
//! ```
//!
//! ## Nested Scopes
//!
//! Sub-statements (DELETE executed as UPDATE, the INSERT slot lookup) run in a
//! `NestedArena` carved from the front of the caller arena, so they never alias
//! the outer statement's live operator tree.

mod arena;

pub use arena::{BackMark, NestedArena, QueryArena, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Front,
    Back,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Front => "front",
            Direction::Back => "back",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryError {
    pub direction: Direction,
    pub requested: usize,
    pub available: usize,
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arena exhausted: {} allocation requested {} bytes but only {} available",
            self.direction.name(),
            self.requested,
            self.available
        )
    }
}

impl std::error::Error for MemoryError {}
