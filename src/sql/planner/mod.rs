//! # Operator Tree Builder
//!
//! Turns one segmented statement into either a ready-to-iterate operator tree
//! (queries) or an executed result (DML and DDL). Clauses are consumed in
//! canonical order, so every stage can rely on what the earlier ones built:
//!
//! ```text
//! FROM      scans, left-deep NestedLoopJoin chain, ON predicates
//! WHERE     appended to the pending ON conjunction
//!           -> bound against the root, access path chosen
//! GROUP BY  remembered until SELECT
//! SELECT    Projection, or Aggregate over a Sort on the group keys
//! ORDER BY  Sort over the projected rows
//! ```
//!
//! ## Module Structure
//!
//! - `from`: table references and join chains
//! - `select`: predicate attachment, projection lists, aggregates, ORDER BY
//! - `dml`: INSERT, UPDATE and DELETE, each run in a nested arena scope
//! - `ddl`: CREATE TABLE and CREATE INDEX
//!
//! ## Failure
//!
//! A statement either yields a complete tree or nothing. On any error the
//! partially built tree is closed (which releases the EETs its operators own)
//! and a predicate that was compiled but not yet attached is released.
//!
//! ## Memory
//!
//! Clause records live on the arena back stack only while the statement is
//! being planned. EETs are allocated at the arena front and owned by the
//! operators that evaluate them.

mod ddl;
mod dml;
mod from;
mod select;

use eyre::{bail, eyre, Result};
use smallvec::SmallVec;
use tracing::debug;

use super::clause::{segment, Clause, ClauseKind, ClauseList};
use super::context::ExecutionContext;
use super::eet::{Eet, Node};
use super::executor::Operator;
use super::expr::compile;
use super::lexer::Lexer;
use super::token::{Keyword, Punct, Token, TokenKind};
use crate::database::{EngineConfig, ExecuteResult};
use crate::error::{SchemaError, SyntaxError};
use crate::memory::QueryArena;
use crate::schema::RelationHeader;
use crate::types::ValueKind;

/// Outcome of planning one statement.
#[derive(Debug)]
pub enum Plan {
    Query(Operator),
    Executed(ExecuteResult),
}

pub struct Planner<'s, 'a, 'buf> {
    cx: ExecutionContext<'a, 'buf>,
    sql: &'s str,
    config: EngineConfig,
}

/// Query state threaded through the clause stages.
#[derive(Default)]
struct QueryBuild {
    root: Option<Operator>,
    /// ON and WHERE conjunction, compiled but not yet bound.
    predicate: Option<Eet>,
    group_by: Option<Clause>,
}

impl QueryBuild {
    fn root(&self) -> Result<&Operator> {
        self.root
            .as_ref()
            .ok_or_else(|| eyre!("query has no FROM operator"))
    }

    fn abandon(&mut self, cx: &ExecutionContext<'_, '_>) {
        if let Some(mut root) = self.root.take() {
            root.teardown(cx);
        }
        if let Some(predicate) = self.predicate.take() {
            predicate.release(cx.arena);
        }
    }
}

impl<'s, 'a, 'buf> Planner<'s, 'a, 'buf> {
    pub fn new(cx: ExecutionContext<'a, 'buf>, sql: &'s str, config: EngineConfig) -> Self {
        Self { cx, sql, config }
    }

    pub fn plan(&self) -> Result<Plan> {
        let arena = self.cx.arena;
        let mark = arena.mark_back();
        let result = segment(arena, self.sql).and_then(|clauses| self.dispatch(&clauses));
        arena.release_back(mark);
        result
    }

    fn dispatch(&self, clauses: &ClauseList) -> Result<Plan> {
        let arena = self.cx.arena;
        let Some(command) = clauses.command(arena) else {
            debug!(clauses = clauses.len(), "planning query");
            return self.query(clauses).map(Plan::Query);
        };
        debug!(command = command.kind.name(), "planning command");
        let result = match command.kind {
            ClauseKind::Insert => {
                self.allow_only(clauses, &[ClauseKind::Insert])?;
                self.insert(command)?
            }
            ClauseKind::Update => {
                self.allow_only(clauses, &[ClauseKind::Where, ClauseKind::Update])?;
                self.update(clauses, command)?
            }
            ClauseKind::Delete => {
                self.allow_only(
                    clauses,
                    &[ClauseKind::From, ClauseKind::Where, ClauseKind::Delete],
                )?;
                self.delete(clauses, command)?
            }
            _ => {
                self.allow_only(clauses, &[ClauseKind::Create])?;
                self.create(command)?
            }
        };
        Ok(Plan::Executed(result))
    }

    fn allow_only(&self, clauses: &ClauseList, allowed: &[ClauseKind]) -> Result<()> {
        for i in 0..clauses.len() {
            let clause = clauses.get(self.cx.arena, i);
            if !allowed.contains(&clause.kind) {
                bail!(SyntaxError::new(
                    clause.start,
                    format!("unexpected {} clause", clause.kind.name())
                ));
            }
        }
        Ok(())
    }

    fn query(&self, clauses: &ClauseList) -> Result<Operator> {
        let arena = self.cx.arena;
        for required in [ClauseKind::From, ClauseKind::Select] {
            if clauses.find(arena, required).is_none() {
                bail!(SyntaxError::new(
                    self.sql.len(),
                    format!("missing {} clause", required.name())
                ));
            }
        }

        let mut build = QueryBuild::default();
        match self.build_query(clauses, &mut build) {
            Ok(()) => build.root.take().ok_or_else(|| eyre!("query has no FROM operator")),
            Err(e) => {
                build.abandon(&self.cx);
                Err(e)
            }
        }
    }

    fn build_query(&self, clauses: &ClauseList, build: &mut QueryBuild) -> Result<()> {
        let arena = self.cx.arena;
        for i in 0..clauses.len() {
            let clause = clauses.get(arena, i);
            if clause.kind > ClauseKind::Where {
                self.finish_predicate(build)?;
            }
            match clause.kind {
                ClauseKind::From => self.plan_from(clause, build)?,
                ClauseKind::Where => {
                    let predicate = compile(
                        arena,
                        self.sql,
                        clause.start,
                        clause.end,
                        build.predicate,
                    )?;
                    build.predicate = Some(predicate);
                }
                ClauseKind::GroupBy => build.group_by = Some(clause),
                ClauseKind::Select => self.plan_select(clause, build)?,
                ClauseKind::OrderBy => self.plan_order_by(clause, build)?,
                other => bail!(SyntaxError::new(
                    clause.start,
                    format!("unexpected {} clause in a query", other.name())
                )),
            }
        }
        Ok(())
    }

    /// Bytes carved out of the arena for a nested sub-statement.
    fn scope_size(&self) -> usize {
        self.config.nested_scope_size.min(self.cx.arena.available())
    }

    /// Compiles `sql[start..end]` into `arena` and binds it to `header`.
    /// Nothing stays allocated when either step fails.
    fn bind_expression(
        &self,
        arena: &QueryArena<'_>,
        start: usize,
        end: usize,
        header: &RelationHeader,
    ) -> Result<Eet> {
        let mut eet = compile(arena, self.sql, start, end, None)?;
        if let Err(e) = eet.verify_and_bind(arena, self.sql, header) {
            eet.release(arena);
            return Err(e);
        }
        Ok(eet)
    }

    /// Binds a WHERE/ON conjunction; the caller keeps ownership on failure.
    fn bind_predicate(
        &self,
        arena: &QueryArena<'_>,
        predicate: &mut Eet,
        header: &RelationHeader,
    ) -> Result<()> {
        predicate.verify_and_bind(arena, self.sql, header)?;
        if !matches!(predicate.kind(), ValueKind::Bool | ValueKind::Null) {
            bail!(SchemaError::new(format!(
                "predicate must be a boolean expression, got {}",
                predicate.kind().name()
            )));
        }
        Ok(())
    }
}

/// Position of the attribute when `eet` is a single attribute reference.
fn single_attribute(arena: &QueryArena<'_>, eet: &Eet) -> Result<Option<usize>> {
    if eet.node_count() != 1 {
        return Ok(None);
    }
    Ok(match eet.nodes(arena)?.first() {
        Some(Node::Bound(attr)) => Some(attr.position as usize),
        _ => None,
    })
}

/// Token reader bounded to one clause's byte range.
pub(crate) struct Cursor<'s> {
    lexer: Lexer<'s>,
    end: usize,
    peeked: Option<Token>,
    done: bool,
}

impl<'s> Cursor<'s> {
    pub(crate) fn new(sql: &'s str, start: usize, end: usize) -> Self {
        let mut lexer = Lexer::new(sql);
        lexer.set_offset(start);
        Self {
            lexer,
            end,
            peeked: None,
            done: false,
        }
    }

    pub(crate) fn peek(&mut self) -> Option<Token> {
        if self.peeked.is_none() && !self.done {
            if self.lexer.advance() && self.lexer.token().start < self.end {
                self.peeked = Some(self.lexer.token());
            } else {
                self.done = true;
            }
        }
        self.peeked
    }

    pub(crate) fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.peeked = None;
        token
    }

    /// Offset of the next token, or the end of the range.
    pub(crate) fn position(&mut self) -> usize {
        self.peek().map(|t| t.start).unwrap_or(self.end)
    }

    pub(crate) fn text(&self, token: Token) -> &'s str {
        self.lexer.text(token)
    }

    pub(crate) fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    pub(crate) fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        match self.peek() {
            Some(t) if t.is_keyword(keyword) => {
                self.peeked = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn eat_punct(&mut self, punct: Punct) -> bool {
        match self.peek() {
            Some(t) if t.is_punct(punct) => {
                self.peeked = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.eat_keyword(keyword) {
            return Ok(());
        }
        let at = self.position();
        bail!(SyntaxError::new(at, format!("expected {}", keyword.as_str())))
    }

    pub(crate) fn expect_punct(&mut self, punct: Punct, what: &str) -> Result<()> {
        if self.eat_punct(punct) {
            return Ok(());
        }
        let at = self.position();
        bail!(SyntaxError::new(at, format!("expected {}", what)))
    }

    pub(crate) fn expect_identifier(&mut self, what: &str) -> Result<Token> {
        match self.next() {
            Some(t) if t.kind == TokenKind::Identifier => Ok(t),
            Some(t) => bail!(SyntaxError::new(t.start, format!("expected {}", what))),
            None => bail!(SyntaxError::new(self.end, format!("expected {}", what))),
        }
    }

    pub(crate) fn expect_end(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => bail!(SyntaxError::new(
                t.start,
                format!("unexpected '{}'", self.text(t))
            )),
        }
    }

    /// Consumes tokens up to (not including) the first token at parenthesis
    /// depth 0 for which `stop` holds, returning the covered byte span.
    pub(crate) fn span_until(&mut self, stop: impl Fn(&Token) -> bool) -> (usize, usize) {
        let start = self.position();
        let mut end = start;
        let mut depth = 0u32;
        while let Some(token) = self.peek() {
            if depth == 0 && stop(&token) {
                break;
            }
            if token.is_punct(Punct::LParen) {
                depth += 1;
            } else if token.is_punct(Punct::RParen) {
                depth = depth.saturating_sub(1);
            }
            end = token.end;
            self.peeked = None;
        }
        (start, end)
    }

    /// Spans of the top-level comma-separated items of the rest of the range.
    /// An empty item is a dangling comma.
    pub(crate) fn comma_items(
        &mut self,
        stop: impl Fn(&Token) -> bool,
    ) -> Result<SmallVec<[(usize, usize); 8]>> {
        let mut items = SmallVec::new();
        loop {
            let (start, end) = self.span_until(|t| t.is_punct(Punct::Comma) || stop(t));
            let comma = self.peek().filter(|t| t.is_punct(Punct::Comma));
            if start == end {
                let at = comma.map(|t| t.start).unwrap_or(start);
                let message = if comma.is_some() || !items.is_empty() {
                    "dangling comma"
                } else {
                    "empty list"
                };
                bail!(SyntaxError::new(at, message));
            }
            items.push((start, end));
            if comma.is_none() {
                return Ok(items);
            }
            self.peeked = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_stays_inside_range() {
        let sql = "a, b FROM t";
        let mut cur = Cursor::new(sql, 0, 4);
        let items = cur.comma_items(|_| false).unwrap();
        assert_eq!(items.as_slice(), &[(0, 1), (3, 4)]);
        assert!(cur.at_end());
    }

    #[test]
    fn test_span_until_respects_parentheses() {
        let sql = "f(a, b), c";
        let mut cur = Cursor::new(sql, 0, sql.len());
        let items = cur.comma_items(|_| false).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(&sql[items[0].0..items[0].1], "f(a, b)");
    }

    #[test]
    fn test_dangling_comma_is_reported() {
        let sql = "a, , b";
        let mut cur = Cursor::new(sql, 0, sql.len());
        let err = cur.comma_items(|_| false).unwrap_err();
        let syntax = err.downcast_ref::<SyntaxError>().unwrap();
        assert_eq!(syntax.message, "dangling comma");
        assert_eq!(syntax.offset, 3);

        let sql = "a,";
        let mut cur = Cursor::new(sql, 0, sql.len());
        assert!(cur.comma_items(|_| false).is_err());
    }
}
