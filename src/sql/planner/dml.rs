//! # DML Execution
//!
//! INSERT, UPDATE and DELETE run to completion during planning and report
//! the number of affected rows.
//!
//! ## Nested Scopes
//!
//! Each sub-statement (the UPDATE scan, the INSERT free-slot lookup) runs in
//! a `NestedArena` carved from the front of the statement arena. Its tuples,
//! EETs and operator state are independent of the outer statement and are
//! reclaimed in one step when the scope drops.
//!
//! ## DELETE
//!
//! Rows are never physically removed. DELETE is the UPDATE sub-statement
//! `SET __delete = 1` driven by the DELETE statement's own WHERE clause, so
//! it requires the relation to declare the `__delete` attribute.
//!
//! ## Slot Reuse
//!
//! When a relation declares `__delete`, INSERT first scans for a
//! soft-deleted record and overwrites it in place (with `__delete = 0`)
//! before falling back to appending.

use eyre::{bail, Result};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::{Cursor, Planner};
use crate::config::SOFT_DELETE_ATTRIBUTE;
use crate::database::ExecuteResult;
use crate::error::{SchemaError, SyntaxError};
use crate::memory::QueryArena;
use crate::records::Tuple;
use crate::schema::RelationHeader;
use crate::sql::clause::{Clause, ClauseKind, ClauseList};
use crate::sql::context::ExecutionContext;
use crate::sql::eet::Eet;
use crate::sql::executor::{Executor, Next, Operator, ScanOp, SelectionOp, Visibility};
use crate::sql::expr::compile;
use crate::sql::optimizer;
use crate::sql::token::{Keyword, Operator as TokenOp, Punct};
use crate::storage::{Handle, OpenMode, Storage};
use crate::types::Value;

#[derive(Debug, Clone)]
enum AssignedValue {
    /// Expression span in the statement text, bound against the target row.
    Expr { start: usize, end: usize },
    Const(Value),
}

#[derive(Debug, Clone)]
struct Assignment<'s> {
    column: &'s str,
    value: AssignedValue,
}

enum Resolved {
    Expr(Eet),
    Const(Value),
}

/// Writes one record, in place at `at` or appended at the end.
fn write_record(
    storage: &dyn Storage,
    relation: &str,
    at: Option<u64>,
    record: &[u8],
) -> Result<()> {
    let mode = match at {
        Some(_) => OpenMode::ReadWrite,
        None => OpenMode::Append,
    };
    let handle = storage.open(relation, mode)?;
    let written = match at {
        Some(offset) => storage
            .seek(handle, offset)
            .and_then(|()| storage.write_bytes(handle, record)),
        None => storage.write_bytes(handle, record),
    };
    let closed = storage.close(handle);
    written.and(closed)
}

impl<'s, 'a, 'buf> Planner<'s, 'a, 'buf> {
    /// `INSERT [INTO] t [(col, ...)] VALUES (value, ...)`
    pub(super) fn insert(&self, command: Clause) -> Result<ExecuteResult> {
        let mut cur = Cursor::new(self.sql, command.start, command.end);
        cur.eat_keyword(Keyword::Into);
        let table = cur.expect_identifier("table name")?;
        let table = cur.text(table);

        let mut columns: SmallVec<[&'s str; 8]> = SmallVec::new();
        if cur.eat_punct(Punct::LParen) {
            for (start, end) in cur.comma_items(|t| t.is_punct(Punct::RParen))? {
                let mut item = Cursor::new(self.sql, start, end);
                let name = item.expect_identifier("column name")?;
                item.expect_end()?;
                columns.push(item.text(name));
            }
            cur.expect_punct(Punct::RParen, "')' after column list")?;
        }
        cur.expect_keyword(Keyword::Values)?;
        cur.expect_punct(Punct::LParen, "'(' after VALUES")?;
        let values = cur.comma_items(|t| t.is_punct(Punct::RParen))?;
        cur.expect_punct(Punct::RParen, "')' after VALUES list")?;
        cur.expect_end()?;

        let storage = self.cx.storage;
        if !storage.relation_exists(table) {
            bail!(SchemaError::new(format!("unknown table '{}'", table)));
        }
        let header = storage.load_header(table)?;
        let soft_delete = header.soft_delete_position();

        let mut targets: SmallVec<[usize; 8]> = SmallVec::new();
        if columns.is_empty() {
            targets.extend((0..header.len()).filter(|&pos| Some(pos) != soft_delete));
        } else {
            for column in &columns {
                let pos = header.resolve(None, column)?;
                if targets.contains(&pos) {
                    bail!(SchemaError::new(format!("column '{}' listed twice", column)));
                }
                targets.push(pos);
            }
        }
        if targets.len() != values.len() {
            bail!(SchemaError::new(format!(
                "INSERT into '{}' names {} columns but supplies {} values",
                table,
                targets.len(),
                values.len()
            )));
        }

        let scope = self.cx.arena.nested(self.scope_size())?;
        let arena: &QueryArena<'_> = &scope;
        trace!(relation = table, bytes = arena.capacity(), "nested scope for INSERT");

        let row = Tuple::alloc(arena, &header)?;
        for pos in 0..header.len() {
            row.set_null(arena, pos, true);
        }
        let constants = RelationHeader::new();
        for (&pos, &(start, end)) in targets.iter().zip(values.iter()) {
            let eet = self.bind_expression(arena, start, end, &constants)?;
            let value = eet.evaluate(arena, &row);
            eet.release(arena);
            row.set(arena, &header, pos, &value?)?;
        }
        if let Some(pos) = soft_delete {
            row.set(arena, &header, pos, &Value::Int(0))?;
        }
        let mut record: SmallVec<[u8; 64]> = SmallVec::from_elem(0, header.record_size());
        row.store(arena, &mut record);

        let slot = match soft_delete {
            Some(_) => self.deleted_slot(arena, table)?,
            None => None,
        };
        write_record(storage, table, slot, &record)?;
        debug!(relation = table, reused_slot = slot.is_some(), "row inserted");
        Ok(ExecuteResult::Insert { rows_affected: 1 })
    }

    /// File offset of the first soft-deleted record of `table`.
    fn deleted_slot(&self, arena: &QueryArena<'_>, table: &str) -> Result<Option<u64>> {
        let cx = ExecutionContext::new(arena, self.cx.storage);
        let mut scan = ScanOp::new(cx.storage, table, table)?.with_visibility(Visibility::Deleted);
        let probe = Tuple::alloc(arena, scan.header())?;
        let found = scan.open(&cx).and_then(|()| scan.next(&cx, &probe));
        let offset = scan.last_offset();
        let closed = scan.close(&cx);
        probe.release(arena);
        let found = found?;
        closed?;
        Ok(match found {
            Next::Produced => offset,
            Next::Exhausted => None,
        })
    }

    /// `UPDATE [TABLE] t SET col = expr, ...` with a mandatory WHERE.
    pub(super) fn update(&self, clauses: &ClauseList, command: Clause) -> Result<ExecuteResult> {
        let Some(predicate) = clauses.find(self.cx.arena, ClauseKind::Where) else {
            bail!(SyntaxError::new(self.sql.len(), "UPDATE requires a WHERE clause"));
        };
        let mut cur = Cursor::new(self.sql, command.start, command.end);
        cur.eat_keyword(Keyword::Table);
        let table = cur.expect_identifier("table name")?;
        let table = cur.text(table);
        cur.expect_keyword(Keyword::Set)?;

        let mut assignments: SmallVec<[Assignment<'s>; 8]> = SmallVec::new();
        for (start, end) in cur.comma_items(|_| false)? {
            let mut item = Cursor::new(self.sql, start, end);
            let column = item.expect_identifier("column name")?;
            match item.next() {
                Some(t) if t.is_operator(TokenOp::Eq) => {}
                Some(t) => bail!(SyntaxError::new(t.start, "expected '=' in SET")),
                None => bail!(SyntaxError::new(end, "expected '=' in SET")),
            }
            let (value_start, value_end) = item.span_until(|_| false);
            if value_start == value_end {
                bail!(SyntaxError::new(end, "missing value in SET"));
            }
            assignments.push(Assignment {
                column: item.text(column),
                value: AssignedValue::Expr {
                    start: value_start,
                    end: value_end,
                },
            });
        }

        let rows = self.run_update(table, &assignments, predicate)?;
        debug!(relation = table, rows, "rows updated");
        Ok(ExecuteResult::Update {
            rows_affected: rows,
        })
    }

    /// `DELETE FROM t WHERE predicate`
    pub(super) fn delete(&self, clauses: &ClauseList, command: Clause) -> Result<ExecuteResult> {
        let arena = self.cx.arena;
        if !command.is_empty() {
            bail!(SyntaxError::new(command.start, "unexpected text after DELETE"));
        }
        let Some(from) = clauses.find(arena, ClauseKind::From) else {
            bail!(SyntaxError::new(self.sql.len(), "DELETE requires a FROM clause"));
        };
        let Some(predicate) = clauses.find(arena, ClauseKind::Where) else {
            bail!(SyntaxError::new(self.sql.len(), "DELETE requires a WHERE clause"));
        };
        let mut cur = Cursor::new(self.sql, from.start, from.end);
        let table = cur.expect_identifier("table name")?;
        cur.expect_end()?;
        let table = cur.text(table);

        let storage = self.cx.storage;
        if !storage.relation_exists(table) {
            bail!(SchemaError::new(format!("unknown table '{}'", table)));
        }
        if storage.load_header(table)?.soft_delete_position().is_none() {
            bail!(SchemaError::new(format!(
                "relation '{}' has no {} attribute",
                table, SOFT_DELETE_ATTRIBUTE
            )));
        }
        let mark_deleted = [Assignment {
            column: SOFT_DELETE_ATTRIBUTE,
            value: AssignedValue::Const(Value::Int(1)),
        }];
        let rows = self.run_update(table, &mark_deleted, predicate)?;
        debug!(relation = table, rows, "rows deleted");
        Ok(ExecuteResult::Delete {
            rows_affected: rows,
        })
    }

    /// Rewrites every live row of `table` matching `predicate` in a nested
    /// scope and returns how many were written.
    fn run_update(
        &self,
        table: &str,
        assignments: &[Assignment<'_>],
        predicate: Clause,
    ) -> Result<usize> {
        let storage = self.cx.storage;
        if !storage.relation_exists(table) {
            bail!(SchemaError::new(format!("unknown table '{}'", table)));
        }
        let scope = self.cx.arena.nested(self.scope_size())?;
        let arena: &QueryArena<'_> = &scope;
        let cx = ExecutionContext::new(arena, storage);
        trace!(relation = table, bytes = arena.capacity(), "nested scope for UPDATE");

        let mut scan = ScanOp::new(storage, table, table)?;
        let header = scan.header().clone();
        let mut resolved: SmallVec<[(usize, Resolved); 8]> = SmallVec::new();
        for assignment in assignments {
            let pos = header.resolve(None, assignment.column)?;
            if resolved.iter().any(|(p, _)| *p == pos) {
                bail!(SchemaError::new(format!(
                    "column '{}' assigned twice",
                    assignment.column
                )));
            }
            let value = match &assignment.value {
                AssignedValue::Expr { start, end } => {
                    Resolved::Expr(self.bind_expression(arena, *start, *end, &header)?)
                }
                AssignedValue::Const(value) => Resolved::Const(value.clone()),
            };
            resolved.push((pos, value));
        }

        let mut condition = compile(arena, self.sql, predicate.start, predicate.end, None)?;
        self.bind_predicate(arena, &mut condition, &header)?;
        optimizer::narrow_scan(storage, arena, &mut scan, &condition)?;
        let mut plan = Operator::Selection(Box::new(SelectionOp::new(
            Operator::Scan(scan),
            condition,
        )));

        let result = self.rewrite_rows(&cx, &mut plan, table, &header, &resolved);
        let closed = plan.close(&cx);
        trace!(relation = table, "leaving nested scope");
        let rows = result?;
        closed?;
        Ok(rows)
    }

    fn rewrite_rows(
        &self,
        cx: &ExecutionContext<'_, '_>,
        plan: &mut Operator,
        table: &str,
        header: &RelationHeader,
        resolved: &[(usize, Resolved)],
    ) -> Result<usize> {
        let row = Tuple::alloc(cx.arena, header)?;
        let writer = cx.storage.open(table, OpenMode::ReadWrite)?;
        let result = Self::rewrite_loop(cx, plan, header, resolved, row, writer);
        // The scan must be finished before the writer's close rebuilds indexes.
        let closed_plan = plan.close(cx);
        let closed_writer = cx.storage.close(writer);
        let rows = result?;
        closed_plan?;
        closed_writer?;
        Ok(rows)
    }

    fn rewrite_loop(
        cx: &ExecutionContext<'_, '_>,
        plan: &mut Operator,
        header: &RelationHeader,
        resolved: &[(usize, Resolved)],
        row: Tuple,
        writer: Handle,
    ) -> Result<usize> {
        let mut record: SmallVec<[u8; 64]> = SmallVec::from_elem(0, header.record_size());
        let mut values: SmallVec<[Value; 8]> = SmallVec::new();
        let mut rows = 0;

        plan.open(cx)?;
        while plan.next(cx, &row)? == Next::Produced {
            let Some(offset) = plan.record_offset() else {
                bail!("UPDATE plan lost the record position");
            };
            values.clear();
            for (_, value) in resolved {
                values.push(match value {
                    Resolved::Expr(eet) => eet.evaluate(cx.arena, &row)?,
                    Resolved::Const(value) => value.clone(),
                });
            }
            for ((pos, _), value) in resolved.iter().zip(values.iter()) {
                row.set(cx.arena, header, *pos, value)?;
            }
            row.store(cx.arena, &mut record);
            cx.storage.seek(writer, offset)?;
            cx.storage.write_bytes(writer, &record)?;
            rows += 1;
        }
        Ok(rows)
    }
}
