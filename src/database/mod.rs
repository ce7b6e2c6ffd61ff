//! # Database Module
//!
//! `Engine` is the entry point: it pairs a `Storage` collaborator with an
//! `EngineConfig` and compiles statements against a caller-supplied arena.
//!
//! ## Statement Pipeline
//!
//! ```text
//! SQL text
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ 1. SEGMENT: text → clause records (arena back)      │
//! └─────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ 2. PLAN: clauses → EETs + operator tree (arena      │
//! │    front); DML/DDL run to completion here           │
//! └─────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ 3. EXECUTE: open() → next() ... → close()           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Entry Points
//!
//! - `prepare`: plans a statement and leaves the tree in the caller's arena;
//!   the caller drives and closes it
//! - `query`: prepares, drains and closes a query, returning owned rows
//! - `execute`: runs a DML or DDL statement
//!
//! `query` and `execute` work inside a nested scope carved from the arena,
//! so the arena's cursors are back where they started once they return,
//! whether the statement succeeded or not.
//!
//! ## Errors
//!
//! Failures are `eyre::Report`s carrying `SyntaxError`, `SchemaError` or
//! `MemoryError`. Use `ErrorClass::of` to tell them apart.

mod config;
mod prepared;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use prepared::{ExecuteResult, Prepared, QueryPlan};

use eyre::{bail, Result, WrapErr};
use tracing::{debug, warn};

use crate::memory::QueryArena;
use crate::records::Tuple;
use crate::sql::{ExecutionContext, Next, Plan, Planner};
use crate::storage::Storage;
use crate::types::Value;

pub struct Engine<S: Storage> {
    storage: S,
    config: EngineConfig,
}

impl<S: Storage> Engine<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn prepare<'e>(&'e self, sql: &str, arena: &QueryArena<'_>) -> Result<Prepared<'e>> {
        let cx = ExecutionContext::new(arena, &self.storage);
        let plan = Planner::new(cx, sql, self.config).plan()?;
        Ok(match plan {
            Plan::Query(root) => {
                debug!(root = root.name(), "query prepared");
                Prepared::Query(QueryPlan::new(root, &self.storage))
            }
            Plan::Executed(result) => Prepared::Executed(result),
        })
    }

    /// Runs a query to completion and returns its rows as owned values.
    pub fn query(&self, sql: &str, arena: &QueryArena<'_>) -> Result<Vec<Vec<Value>>> {
        let scope = arena.nested(arena.available())?;
        let arena: &QueryArena<'_> = &scope;
        let mut plan = match self.prepare(sql, arena)? {
            Prepared::Query(plan) => plan,
            Prepared::Executed(_) => bail!("statement is not a query, use execute()"),
        };

        let rows = Tuple::alloc(arena, plan.header())
            .and_then(|row| Self::drain(&mut plan, arena, &row));
        match rows {
            Ok(rows) => {
                plan.close(arena)?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(close_err) = plan.close(arena) {
                    warn!(error = %close_err, "close failed after query error");
                }
                Err(e)
            }
        }
    }

    fn drain(
        plan: &mut QueryPlan<'_>,
        arena: &QueryArena<'_>,
        row: &Tuple,
    ) -> Result<Vec<Vec<Value>>> {
        plan.open(arena).wrap_err("failed to open query plan")?;
        let header = plan.header().clone();
        let mut rows = Vec::new();
        while plan.next(arena, row)? == Next::Produced {
            rows.push(
                (0..header.len())
                    .map(|pos| row.get(arena, &header, pos))
                    .collect(),
            );
        }
        debug!(rows = rows.len(), "query drained");
        Ok(rows)
    }

    /// Runs INSERT, UPDATE, DELETE, CREATE TABLE or CREATE INDEX.
    pub fn execute(&self, sql: &str, arena: &QueryArena<'_>) -> Result<ExecuteResult> {
        let scope = arena.nested(arena.available())?;
        let arena: &QueryArena<'_> = &scope;
        match self.prepare(sql, arena)? {
            Prepared::Executed(result) => Ok(result),
            Prepared::Query(mut plan) => {
                plan.close(arena)?;
                bail!("statement is a query, use query()")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::storage::FileStorage;
    use tempfile::tempdir;

    #[test]
    fn test_query_restores_arena_cursors() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(FileStorage::open(dir.path()).unwrap());
        let mut buf = vec![0u8; 8192];
        let arena = QueryArena::new(&mut buf);

        engine
            .execute("CREATE TABLE t (id INT, name STRING(8))", &arena)
            .unwrap();
        engine
            .execute("INSERT INTO t VALUES (1, 'a')", &arena)
            .unwrap();
        let rows = engine.query("SELECT id, name FROM t", &arena).unwrap();

        assert_eq!(rows, vec![vec![Value::Int(1), Value::text("a")]]);
        assert_eq!(arena.front_cursor(), 0);
        assert_eq!(arena.back_cursor(), arena.capacity());
    }

    #[test]
    fn test_execute_rejects_queries() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(FileStorage::open(dir.path()).unwrap());
        let mut buf = vec![0u8; 8192];
        let arena = QueryArena::new(&mut buf);

        engine.execute("CREATE TABLE t (id INT)", &arena).unwrap();
        let err = engine.execute("SELECT id FROM t", &arena).unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Other);
        assert_eq!(arena.front_cursor(), 0);
    }
}
