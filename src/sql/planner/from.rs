//! FROM clause: `ref ((',' | [INNER | CROSS] JOIN) ref [ON expr])*` where
//! `ref` is `table [[AS] alias]`.
//!
//! Every reference becomes a scan; the scans are folded left to right into
//! NestedLoopJoin operators. ON predicates are compiled as they are met and
//! appended to one pending conjunction, bound later against the full join
//! header together with WHERE.

use eyre::{bail, Result};
use smallvec::SmallVec;

use super::{Cursor, Planner, QueryBuild};
use crate::error::{SchemaError, SyntaxError};
use crate::sql::clause::Clause;
use crate::sql::executor::{Executor, JoinOp, Operator, ScanOp};
use crate::sql::expr::compile;
use crate::sql::token::{Keyword, Punct, Token, TokenKind};

fn is_join_word(token: &Token) -> bool {
    token.is_keyword(Keyword::Join)
        || token.is_keyword(Keyword::Inner)
        || token.is_keyword(Keyword::Cross)
}

impl<'s, 'a, 'buf> Planner<'s, 'a, 'buf> {
    pub(super) fn plan_from(&self, clause: Clause, build: &mut QueryBuild) -> Result<()> {
        let mut cur = Cursor::new(self.sql, clause.start, clause.end);
        let mut aliases: SmallVec<[String; 4]> = SmallVec::new();
        let mut joined = false;

        if let Some(first) = cur.peek().filter(is_join_word) {
            bail!(SyntaxError::new(first.start, "JOIN without a left table"));
        }

        loop {
            let scan = self.table_ref(&mut cur, &mut aliases)?;
            let header = match build.root.as_ref() {
                Some(left) => Some(left.header().concat(scan.header())?),
                None => None,
            };
            build.root = Some(match (build.root.take(), header) {
                (Some(left), Some(header)) => {
                    Operator::NestedLoopJoin(Box::new(JoinOp::new(left, scan, header)))
                }
                _ => Operator::Scan(scan),
            });

            if let Some(on) = cur.peek().filter(|t| t.is_keyword(Keyword::On)) {
                cur.next();
                if !joined {
                    bail!(SyntaxError::new(on.start, "ON without JOIN"));
                }
                let (start, end) = cur.span_until(|t| t.is_punct(Punct::Comma) || is_join_word(t));
                if start == end {
                    bail!(SyntaxError::new(on.end, "empty ON condition"));
                }
                let predicate = compile(self.cx.arena, self.sql, start, end, build.predicate)?;
                build.predicate = Some(predicate);
            }

            let Some(separator) = cur.next() else {
                return Ok(());
            };
            if separator.is_punct(Punct::Comma) {
                joined = false;
                if cur.at_end() {
                    bail!(SyntaxError::new(separator.start, "dangling comma"));
                }
                continue;
            }
            if separator.is_keyword(Keyword::Inner) || separator.is_keyword(Keyword::Cross) {
                if !cur.eat_keyword(Keyword::Join) {
                    let at = cur.position();
                    bail!(SyntaxError::new(at, "missing JOIN"));
                }
            } else if !separator.is_keyword(Keyword::Join) {
                bail!(SyntaxError::new(
                    separator.start,
                    format!("unexpected '{}' in FROM", cur.text(separator))
                ));
            }
            joined = true;
            if cur.at_end() {
                bail!(SyntaxError::new(separator.end, "JOIN without a right table"));
            }
        }
    }

    fn table_ref(
        &self,
        cur: &mut Cursor<'s>,
        aliases: &mut SmallVec<[String; 4]>,
    ) -> Result<ScanOp> {
        let name = cur.expect_identifier("table name")?;
        let alias = if cur.eat_keyword(Keyword::As) {
            cur.expect_identifier("alias after AS")?
        } else {
            match cur.peek() {
                Some(t) if t.kind == TokenKind::Identifier => {
                    cur.next();
                    t
                }
                _ => name,
            }
        };
        let (name, alias) = (cur.text(name), cur.text(alias));

        if aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            bail!(SchemaError::new(format!("duplicate table alias '{}'", alias)));
        }
        if !self.cx.storage.relation_exists(name) {
            bail!(SchemaError::new(format!("unknown table '{}'", name)));
        }
        let scan = ScanOp::new(self.cx.storage, name, alias)?;
        aliases.push(alias.to_string());
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Plan, Planner};
    use crate::database::EngineConfig;
    use crate::error::{ErrorClass, SyntaxError};
    use crate::memory::QueryArena;
    use crate::schema::RelationHeader;
    use crate::sql::context::ExecutionContext;
    use crate::storage::{FileStorage, Storage};
    use tempfile::tempdir;

    fn plan_error(storage: &FileStorage, sql: &str) -> eyre::Report {
        let mut buf = vec![0u8; 4096];
        let arena = QueryArena::new(&mut buf);
        let cx = ExecutionContext::new(&arena, storage);
        match Planner::new(cx, sql, EngineConfig::default()).plan() {
            Ok(Plan::Query(_)) | Ok(Plan::Executed(_)) => panic!("'{}' should not plan", sql),
            Err(e) => {
                assert_eq!(arena.front_cursor(), 0, "'{}' leaked front bytes", sql);
                assert_eq!(arena.back_cursor(), arena.capacity());
                e
            }
        }
    }

    fn storage_with_t() -> (tempfile::TempDir, FileStorage) {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let header = RelationHeader::builder().int("a").build().unwrap();
        storage.create_relation("t", &header).unwrap();
        (dir, storage)
    }

    fn message(err: &eyre::Report) -> String {
        err.downcast_ref::<SyntaxError>()
            .map(|e| e.message.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_join_without_left_table() {
        let (_dir, storage) = storage_with_t();
        let err = plan_error(&storage, "SELECT a FROM JOIN t");
        assert_eq!(message(&err), "JOIN without a left table");
    }

    #[test]
    fn test_on_without_join() {
        let (_dir, storage) = storage_with_t();
        let err = plan_error(&storage, "SELECT a FROM t ON a = 1");
        assert_eq!(message(&err), "ON without JOIN");
    }

    #[test]
    fn test_inner_requires_join() {
        let (_dir, storage) = storage_with_t();
        let err = plan_error(&storage, "SELECT x.a FROM t x INNER t y");
        assert_eq!(message(&err), "missing JOIN");
    }

    #[test]
    fn test_join_without_right_table() {
        let (_dir, storage) = storage_with_t();
        let err = plan_error(&storage, "SELECT a FROM t JOIN");
        assert_eq!(message(&err), "JOIN without a right table");
    }

    #[test]
    fn test_duplicate_alias_and_unknown_table_are_schema_errors() {
        let (_dir, storage) = storage_with_t();
        let err = plan_error(&storage, "SELECT x.a FROM t AS x, t AS x");
        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);

        let err = plan_error(&storage, "SELECT a FROM missing");
        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }

    #[test]
    fn test_failed_on_predicate_releases_join() {
        let (_dir, storage) = storage_with_t();
        let err = plan_error(&storage, "SELECT x.a FROM t x JOIN t y ON x.a = y.nope");
        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }
}
