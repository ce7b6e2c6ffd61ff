//! DDL: `CREATE TABLE t (col type, ...)` and `CREATE INDEX [name] ON t (col)`.
//!
//! Column types are `INT`/`INTEGER`, `DECIMAL` and `STRING(n)`. Catalog
//! persistence belongs to the storage collaborator; indexes cover a single
//! INT attribute and the optional index name is informational only.

use eyre::{bail, Result};
use tracing::debug;

use super::{Cursor, Planner};
use crate::config::{DECIMAL_SIZE, INT_SIZE};
use crate::database::ExecuteResult;
use crate::error::{SchemaError, SyntaxError};
use crate::schema::RelationHeader;
use crate::sql::clause::Clause;
use crate::sql::token::{Keyword, Punct, TokenKind};
use crate::types::AttrType;

impl<'s, 'a, 'buf> Planner<'s, 'a, 'buf> {
    pub(super) fn create(&self, command: Clause) -> Result<ExecuteResult> {
        let mut cur = Cursor::new(self.sql, command.start, command.end);
        if cur.eat_keyword(Keyword::Table) {
            return self.create_table(&mut cur);
        }
        if cur.eat_keyword(Keyword::Index) {
            return self.create_index(&mut cur);
        }
        let at = cur.position();
        bail!(SyntaxError::new(at, "expected TABLE or INDEX after CREATE"))
    }

    fn create_table(&self, cur: &mut Cursor<'s>) -> Result<ExecuteResult> {
        let name = cur.expect_identifier("table name")?;
        let name = cur.text(name);
        cur.expect_punct(Punct::LParen, "'(' after table name")?;
        let definitions = cur.comma_items(|t| t.is_punct(Punct::RParen))?;
        cur.expect_punct(Punct::RParen, "')' after column definitions")?;
        cur.expect_end()?;

        let mut builder = RelationHeader::builder();
        for (start, end) in definitions {
            let mut item = Cursor::new(self.sql, start, end);
            let column = item.expect_identifier("column name")?;
            let (ty, size) = match item.next() {
                Some(t) if t.is_keyword(Keyword::Int) || t.is_keyword(Keyword::Integer) => {
                    (AttrType::Int, INT_SIZE)
                }
                Some(t) if t.is_keyword(Keyword::Decimal) => (AttrType::Decimal, DECIMAL_SIZE),
                Some(t) if t.is_keyword(Keyword::String) => {
                    item.expect_punct(Punct::LParen, "'(' after STRING")?;
                    let size = match item.next() {
                        Some(n) if n.kind == TokenKind::Integer => {
                            item.text(n).parse::<usize>().unwrap_or(0)
                        }
                        Some(n) => bail!(SyntaxError::new(n.start, "expected STRING size")),
                        None => bail!(SyntaxError::new(end, "expected STRING size")),
                    };
                    item.expect_punct(Punct::RParen, "')' after STRING size")?;
                    (AttrType::String, size)
                }
                Some(t) => bail!(SyntaxError::new(
                    t.start,
                    format!("unknown column type '{}'", item.text(t))
                )),
                None => bail!(SyntaxError::new(end, "expected column type")),
            };
            item.expect_end()?;
            builder = builder.column(item.text(column), ty, size);
        }
        let header = builder.build()?;

        self.cx.storage.create_relation(name, &header)?;
        debug!(relation = name, attributes = header.len(), "table created");
        Ok(ExecuteResult::CreateTable { created: true })
    }

    fn create_index(&self, cur: &mut Cursor<'s>) -> Result<ExecuteResult> {
        let index_name = match cur.peek() {
            Some(t) if t.kind == TokenKind::Identifier => {
                cur.next();
                Some(cur.text(t))
            }
            _ => None,
        };
        cur.expect_keyword(Keyword::On)?;
        let table = cur.expect_identifier("table name")?;
        cur.expect_punct(Punct::LParen, "'(' after table name")?;
        let column = cur.expect_identifier("column name")?;
        cur.expect_punct(Punct::RParen, "')' after column name")?;
        cur.expect_end()?;
        let (table, column) = (cur.text(table), cur.text(column));

        let storage = self.cx.storage;
        if !storage.relation_exists(table) {
            bail!(SchemaError::new(format!("unknown table '{}'", table)));
        }
        let position = storage.load_header(table)?.resolve(None, column)?;
        storage.create_index(table, position)?;
        debug!(
            relation = table,
            attribute = column,
            name = index_name.unwrap_or(""),
            "index created"
        );
        Ok(ExecuteResult::CreateIndex { created: true })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Plan, Planner};
    use crate::database::{EngineConfig, ExecuteResult};
    use crate::error::{ErrorClass, SyntaxError};
    use crate::memory::QueryArena;
    use crate::sql::context::ExecutionContext;
    use crate::storage::{FileStorage, Storage};
    use crate::types::AttrType;
    use tempfile::tempdir;

    fn run(storage: &FileStorage, sql: &str) -> eyre::Result<ExecuteResult> {
        let mut buf = vec![0u8; 1024];
        let arena = QueryArena::new(&mut buf);
        let cx = ExecutionContext::new(&arena, storage);
        match Planner::new(cx, sql, EngineConfig::default()).plan()? {
            Plan::Executed(result) => Ok(result),
            Plan::Query(_) => panic!("'{}' planned as a query", sql),
        }
    }

    #[test]
    fn test_create_table_layout() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        run(
            &storage,
            "CREATE TABLE people (id INTEGER, score DECIMAL, name STRING(12))",
        )
        .unwrap();

        let header = storage.load_header("PEOPLE").unwrap();
        let layout: Vec<(&str, AttrType, usize, usize)> = header
            .attributes()
            .iter()
            .map(|a| (a.name(), a.ty(), a.offset(), a.size()))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("id", AttrType::Int, 0, 4),
                ("score", AttrType::Decimal, 4, 8),
                ("name", AttrType::String, 12, 12),
            ]
        );
    }

    #[test]
    fn test_create_requires_table_or_index() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let err = run(&storage, "CREATE VIEW v").unwrap_err();
        let syntax = err.downcast_ref::<SyntaxError>().unwrap();
        assert_eq!(syntax.message, "expected TABLE or INDEX after CREATE");
    }

    #[test]
    fn test_string_needs_size() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let err = run(&storage, "CREATE TABLE t (name STRING)").unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Syntax);
        assert!(!storage.relation_exists("t"));
    }

    #[test]
    fn test_duplicate_column_is_schema_error() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let err = run(&storage, "CREATE TABLE t (a INT, a INT)").unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }

    #[test]
    fn test_index_on_unknown_column() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        run(&storage, "CREATE TABLE t (a INT)").unwrap();

        let err = run(&storage, "CREATE INDEX ON t (b)").unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
        let result = run(&storage, "CREATE INDEX t_a ON t (a)").unwrap();
        assert!(matches!(result, ExecuteResult::CreateIndex { created: true }));
        assert!(storage.index_on("t", 0).unwrap().is_some());
    }
}
