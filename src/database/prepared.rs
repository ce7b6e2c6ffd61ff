//! # Prepared Statements
//!
//! `Engine::prepare` plans a statement and hands back one of two things:
//!
//! - `Prepared::Query`: an operator tree ready to be opened and iterated
//! - `Prepared::Executed`: the outcome of a DML or DDL statement, which runs
//!   to completion while it is planned
//!
//! ## Arena Ownership
//!
//! A `QueryPlan` owns EETs and (once open) tuples that live in the arena the
//! statement was prepared against. Every call must pass that same arena, and
//! the plan must be closed before the arena is reset or reused:
//!
//! ```ignore
//! let arena = QueryArena::new(&mut buf);
//! if let Prepared::Query(mut plan) = engine.prepare("SELECT name FROM T", &arena)? {
//!     let row = Tuple::alloc(&arena, plan.header())?;
//!     plan.open(&arena)?;
//!     while plan.next(&arena, &row)? == Next::Produced {
//!         println!("{}", row.get(&arena, plan.header(), 0));
//!     }
//!     plan.close(&arena)?;
//! }
//! ```

use eyre::Result;

use crate::memory::QueryArena;
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::{ExecutionContext, Executor, Next, Operator};
use crate::storage::Storage;

#[derive(Debug)]
pub enum ExecuteResult {
    CreateTable { created: bool },
    CreateIndex { created: bool },
    Insert { rows_affected: usize },
    Update { rows_affected: usize },
    Delete { rows_affected: usize },
}

impl ExecuteResult {
    pub fn rows_affected(&self) -> usize {
        match self {
            ExecuteResult::Insert { rows_affected }
            | ExecuteResult::Update { rows_affected }
            | ExecuteResult::Delete { rows_affected } => *rows_affected,
            ExecuteResult::CreateTable { .. } | ExecuteResult::CreateIndex { .. } => 0,
        }
    }
}

pub enum Prepared<'e> {
    Query(QueryPlan<'e>),
    Executed(ExecuteResult),
}

/// A planned query bound to the storage it reads from.
pub struct QueryPlan<'e> {
    root: Operator,
    storage: &'e dyn Storage,
}

impl<'e> QueryPlan<'e> {
    pub(crate) fn new(root: Operator, storage: &'e dyn Storage) -> Self {
        Self { root, storage }
    }

    /// Shape of the rows `next` writes; allocate the output tuple from it.
    pub fn header(&self) -> &RelationHeader {
        self.root.header()
    }

    pub fn open(&mut self, arena: &QueryArena<'_>) -> Result<()> {
        let cx = ExecutionContext::new(arena, self.storage);
        self.root.open(&cx)
    }

    pub fn next(&mut self, arena: &QueryArena<'_>, out: &Tuple) -> Result<Next> {
        let cx = ExecutionContext::new(arena, self.storage);
        self.root.next(&cx, out)
    }

    /// Releases the tree's handles and arena space. Safe to call more than
    /// once; a closed plan cannot be reopened.
    pub fn close(&mut self, arena: &QueryArena<'_>) -> Result<()> {
        let cx = ExecutionContext::new(arena, self.storage);
        self.root.close(&cx)
    }

    /// One operator per line, children indented with an extra `+`.
    pub fn explain(&self) -> String {
        self.root.explain()
    }
}
