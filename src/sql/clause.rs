//! # Clause Segmentation
//!
//! A statement is scanned once and cut into clauses at every clause-introducing
//! reserved word. Each clause is recorded as a fixed-size record on the arena's
//! back stack:
//!
//! ```text
//! +------+-----------+-----------+-------+
//! | kind | start u32 | end u32   | terms |
//! | 1 B  | LE        | LE        | u16   |
//! +------+-----------+-----------+-------+
//! ```
//!
//! `start` is the offset just past the introducing keyword(s), `end` the end of
//! the clause's last token, so a clause with no tokens has `start == end`.
//! `terms` counts top-level comma-separated items.
//!
//! ## Canonical Order
//!
//! After scanning, records are stably sorted by clause priority so later
//! stages always see FROM before WHERE before SELECT, whatever the surface
//! order was:
//!
//! ```text
//! FROM < WHERE < GROUP BY < SELECT < ORDER BY < INSERT < UPDATE < DELETE < CREATE
//! ```
//!
//! ## Errors
//!
//! Text before the first introducer, a repeated clause kind, text after the
//! terminator, `GROUP`/`ORDER` without `BY`, and an empty clause body are
//! syntax errors. DELETE is the one clause allowed to be empty: its table and
//! predicate live in the FROM and WHERE clauses that follow it.

use eyre::{bail, Result};
use tracing::trace;

use super::lexer::Lexer;
use super::token::{Keyword, Punct, TokenKind};
use crate::config::CLAUSE_RECORD_SIZE;
use crate::error::SyntaxError;
use crate::memory::{QueryArena, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ClauseKind {
    From = 0,
    Where = 1,
    GroupBy = 2,
    Select = 3,
    OrderBy = 4,
    Insert = 5,
    Update = 6,
    Delete = 7,
    Create = 8,
}

impl ClauseKind {
    fn from_u8(code: u8) -> ClauseKind {
        match code {
            0 => ClauseKind::From,
            1 => ClauseKind::Where,
            2 => ClauseKind::GroupBy,
            3 => ClauseKind::Select,
            4 => ClauseKind::OrderBy,
            5 => ClauseKind::Insert,
            6 => ClauseKind::Update,
            7 => ClauseKind::Delete,
            _ => ClauseKind::Create,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClauseKind::From => "FROM",
            ClauseKind::Where => "WHERE",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::Select => "SELECT",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Insert => "INSERT",
            ClauseKind::Update => "UPDATE",
            ClauseKind::Delete => "DELETE",
            ClauseKind::Create => "CREATE",
        }
    }

    /// Clause kinds that turn the statement into DML or DDL.
    pub fn is_command(&self) -> bool {
        *self >= ClauseKind::Insert
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub start: usize,
    pub end: usize,
    pub terms: u16,
}

impl Clause {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Clause records on the arena back stack, in canonical order once built.
#[derive(Debug, Clone, Copy)]
pub struct ClauseList {
    region: Region,
    count: usize,
}

impl ClauseList {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Records are appended toward lower addresses; record 0 sits at the top.
    fn record_offset(&self, index: usize) -> usize {
        self.region.end() - (index + 1) * CLAUSE_RECORD_SIZE
    }

    pub fn get(&self, arena: &QueryArena<'_>, index: usize) -> Clause {
        let at = self.record_offset(index);
        Clause {
            kind: ClauseKind::from_u8(arena.get_u8(at)),
            start: arena.read_u32(at + 1) as usize,
            end: arena.read_u32(at + 5) as usize,
            terms: arena.read_u16(at + 9),
        }
    }

    fn set(&self, arena: &QueryArena<'_>, index: usize, clause: Clause) {
        write_record(arena, self.record_offset(index), clause);
    }

    pub fn find(&self, arena: &QueryArena<'_>, kind: ClauseKind) -> Option<Clause> {
        (0..self.count)
            .map(|i| self.get(arena, i))
            .find(|c| c.kind == kind)
    }

    /// Highest-priority command clause, if the statement is DML or DDL.
    pub fn command(&self, arena: &QueryArena<'_>) -> Option<Clause> {
        (0..self.count)
            .rev()
            .map(|i| self.get(arena, i))
            .find(|c| c.kind.is_command())
    }

    fn sort(&self, arena: &QueryArena<'_>) {
        for i in 1..self.count {
            let current = self.get(arena, i);
            let mut j = i;
            while j > 0 && self.get(arena, j - 1).kind > current.kind {
                let prev = self.get(arena, j - 1);
                self.set(arena, j, prev);
                j -= 1;
            }
            self.set(arena, j, current);
        }
    }
}

fn write_record(arena: &QueryArena<'_>, at: usize, clause: Clause) {
    arena.set_u8(at, clause.kind as u8);
    arena.write_u32(at + 1, clause.start as u32);
    arena.write_u32(at + 5, clause.end as u32);
    arena.write_u16(at + 9, clause.terms);
}

fn introducer(keyword: Keyword) -> Option<ClauseKind> {
    Some(match keyword {
        Keyword::Select => ClauseKind::Select,
        Keyword::From => ClauseKind::From,
        Keyword::Where => ClauseKind::Where,
        Keyword::Insert => ClauseKind::Insert,
        Keyword::Update => ClauseKind::Update,
        Keyword::Delete => ClauseKind::Delete,
        Keyword::Create => ClauseKind::Create,
        Keyword::Group => ClauseKind::GroupBy,
        Keyword::Order => ClauseKind::OrderBy,
        _ => return None,
    })
}

struct OpenClause {
    kind: ClauseKind,
    start: usize,
    end: usize,
    commas: u16,
    depth: u32,
}

impl OpenClause {
    fn finish(&self) -> Clause {
        let empty = self.start == self.end;
        Clause {
            kind: self.kind,
            start: self.start,
            end: self.end,
            terms: if empty { 0 } else { self.commas + 1 },
        }
    }
}

/// Segments `sql` into clause records allocated on the arena back stack.
///
/// The caller owns the scratch: take a `mark_back` before and release it once
/// the clauses have been consumed.
pub fn segment(arena: &QueryArena<'_>, sql: &str) -> Result<ClauseList> {
    let mut lexer = Lexer::new(sql);
    let mut list = ClauseList {
        region: Region::new(arena.back_cursor(), 0),
        count: 0,
    };
    let mut open: Option<OpenClause> = None;
    let mut seen: u16 = 0;
    let mut terminated = false;

    while lexer.advance() {
        let token = lexer.token();
        if terminated {
            bail!(SyntaxError::new(token.start, "unexpected text after ';'"));
        }
        match token.kind {
            TokenKind::Error(message) => bail!(SyntaxError::new(token.start, message)),
            TokenKind::Terminator => {
                terminated = true;
                continue;
            }
            _ => {}
        }

        let starts = match token.kind {
            TokenKind::Reserved(keyword) => introducer(keyword),
            _ => None,
        };
        if let Some(kind) = starts {
            if seen & (1 << kind as u8) != 0 {
                bail!(SyntaxError::new(
                    token.start,
                    format!("duplicate {} clause", kind.name())
                ));
            }
            seen |= 1 << kind as u8;

            let mut start = token.end;
            if matches!(kind, ClauseKind::GroupBy | ClauseKind::OrderBy) {
                if !lexer.advance() || !lexer.token().is_keyword(Keyword::By) {
                    bail!(SyntaxError::new(
                        token.end,
                        format!("missing BY after {}", lexer.text(token).to_ascii_uppercase())
                    ));
                }
                start = lexer.token().end;
            }

            if let Some(prev) = open.take() {
                list = push(arena, list, prev.finish())?;
            }
            open = Some(OpenClause {
                kind,
                start,
                end: start,
                commas: 0,
                depth: 0,
            });
            continue;
        }

        let Some(clause) = open.as_mut() else {
            bail!(SyntaxError::new(
                token.start,
                "statement must start with a clause keyword"
            ));
        };
        match token.kind {
            TokenKind::Punctuation(Punct::LParen) => clause.depth += 1,
            TokenKind::Punctuation(Punct::RParen) => clause.depth = clause.depth.saturating_sub(1),
            TokenKind::Punctuation(Punct::Comma) if clause.depth == 0 => clause.commas += 1,
            _ => {}
        }
        clause.end = token.end;
    }

    if let Some(last) = open.take() {
        list = push(arena, list, last.finish())?;
    }
    if list.is_empty() {
        bail!(SyntaxError::new(0, "empty statement"));
    }

    for i in 0..list.count {
        let clause = list.get(arena, i);
        trace!(
            kind = clause.kind.name(),
            start = clause.start,
            end = clause.end,
            terms = clause.terms,
            "segmented clause"
        );
        if clause.is_empty() && clause.kind != ClauseKind::Delete {
            bail!(SyntaxError::new(
                clause.start,
                format!("empty {} clause", clause.kind.name())
            ));
        }
    }

    list.sort(arena);
    Ok(list)
}

fn push(arena: &QueryArena<'_>, list: ClauseList, clause: Clause) -> Result<ClauseList> {
    let region = if list.count == 0 {
        arena.allocate_back(CLAUSE_RECORD_SIZE)?
    } else {
        arena.extend_back(list.region, CLAUSE_RECORD_SIZE)?
    };
    write_record(arena, region.offset(), clause);
    Ok(ClauseList {
        region,
        count: list.count + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyntaxError;

    fn kinds(arena: &QueryArena<'_>, list: &ClauseList) -> Vec<ClauseKind> {
        (0..list.len()).map(|i| list.get(arena, i).kind).collect()
    }

    #[test]
    fn test_canonical_order_independent_of_surface_order() {
        let mut buf = [0u8; 256];
        let arena = QueryArena::new(&mut buf);
        let list = segment(&arena, "SELECT a FROM t WHERE a > 1 ORDER BY a;").unwrap();
        assert_eq!(
            kinds(&arena, &list),
            vec![
                ClauseKind::From,
                ClauseKind::Where,
                ClauseKind::Select,
                ClauseKind::OrderBy
            ]
        );
    }

    #[test]
    fn test_offsets_exclude_keyword_and_terminator() {
        let mut buf = [0u8; 256];
        let arena = QueryArena::new(&mut buf);
        let sql = "SELECT a, b FROM t;";
        let list = segment(&arena, sql).unwrap();

        let select = list.find(&arena, ClauseKind::Select).unwrap();
        assert_eq!(&sql[select.start..select.end], " a, b");
        assert_eq!(select.terms, 2);

        let from = list.find(&arena, ClauseKind::From).unwrap();
        assert_eq!(&sql[from.start..from.end], " t");
        assert_eq!(from.terms, 1);
    }

    #[test]
    fn test_records_live_on_back_stack() {
        let mut buf = [0u8; 256];
        let arena = QueryArena::new(&mut buf);
        let mark = arena.mark_back();
        let list = segment(&arena, "SELECT a FROM t").unwrap();
        assert_eq!(arena.back_cursor(), 256 - 2 * CLAUSE_RECORD_SIZE);
        assert_eq!(list.len(), 2);
        arena.release_back(mark);
        assert_eq!(arena.back_cursor(), 256);
    }

    #[test]
    fn test_delete_may_be_empty_but_others_may_not() {
        let mut buf = [0u8; 256];
        let arena = QueryArena::new(&mut buf);
        let list = segment(&arena, "DELETE FROM t WHERE id = 1").unwrap();
        assert_eq!(list.command(&arena).unwrap().kind, ClauseKind::Delete);

        let err = segment(&arena, "SELECT FROM t").unwrap_err();
        let syntax = err.downcast_ref::<SyntaxError>().unwrap();
        assert_eq!(syntax.message, "empty SELECT clause");
        assert_eq!(syntax.offset, 6);
    }

    #[test]
    fn test_group_and_order_need_by() {
        let mut buf = [0u8; 256];
        let arena = QueryArena::new(&mut buf);
        let list = segment(&arena, "SELECT a FROM t GROUP BY a").unwrap();
        let group = list.find(&arena, ClauseKind::GroupBy).unwrap();
        assert_eq!(group.start, 24);
        assert!(segment(&arena, "SELECT a FROM t ORDER a").is_err());
    }

    #[test]
    fn test_structural_errors() {
        let mut buf = [0u8; 256];
        let arena = QueryArena::new(&mut buf);
        assert!(segment(&arena, "a FROM t").is_err());
        assert!(segment(&arena, "SELECT a FROM t FROM u").is_err());
        assert!(segment(&arena, "SELECT a FROM t; SELECT b").is_err());
        assert!(segment(&arena, "   ").is_err());
        assert!(segment(&arena, "SELECT 'open FROM t").is_err());
    }

    #[test]
    fn test_out_of_memory_propagates() {
        let mut buf = [0u8; 16];
        let arena = QueryArena::new(&mut buf);
        let err = segment(&arena, "SELECT a FROM t WHERE a = 1").unwrap_err();
        assert!(crate::error::ErrorClass::is_out_of_memory(&err));
    }
}
