//! # DML and DDL Integration Tests
//!
//! INSERT, UPDATE, DELETE, CREATE TABLE and CREATE INDEX through the public
//! `Engine` API, including the soft-delete attribute and the on-disk record
//! layout they produce.
//!
//! ## Test Categories
//!
//! 1. **DDL**: table and index creation, schema errors
//! 2. **INSERT**: full and partial column lists, NULL layout on disk
//! 3. **UPDATE**: literal and expression assignments
//! 4. **DELETE**: soft deletion and slot reuse
//!
//! ## Running Tests
//!
//! ```sh
//! cargo test --test dml_statements
//! ```

use std::fs;

use petitdb::storage::decode_header;
use petitdb::{Engine, ErrorClass, ExecuteResult, FileStorage, QueryArena, Value};
use tempfile::{tempdir, TempDir};

fn engine() -> (TempDir, Engine<FileStorage>) {
    let dir = tempdir().unwrap();
    let engine = Engine::new(FileStorage::open(dir.path()).unwrap());
    (dir, engine)
}

fn execute(engine: &Engine<FileStorage>, sql: &str) -> eyre::Result<ExecuteResult> {
    let mut buf = vec![0u8; 8192];
    let arena = QueryArena::new(&mut buf);
    engine.execute(sql, &arena)
}

fn query(engine: &Engine<FileStorage>, sql: &str) -> Vec<Vec<Value>> {
    let mut buf = vec![0u8; 8192];
    let arena = QueryArena::new(&mut buf);
    engine.query(sql, &arena).unwrap()
}

mod ddl {
    use super::*;

    #[test]
    fn create_table_reports_created() {
        let (_dir, engine) = engine();

        let result = execute(&engine, "CREATE TABLE T (id INT, score DECIMAL, name STRING(8))")
            .unwrap();

        assert!(matches!(result, ExecuteResult::CreateTable { created: true }));
    }

    #[test]
    fn create_existing_table_is_schema_error() {
        let (_dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (id INT)").unwrap();

        let err = execute(&engine, "CREATE TABLE t (id INT)").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }

    #[test]
    fn unknown_column_type_is_syntax_error() {
        let (_dir, engine) = engine();

        let err = execute(&engine, "CREATE TABLE T (id BLOB)").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Syntax);
    }

    #[test]
    fn index_on_string_attribute_is_schema_error() {
        let (_dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (id INT, name STRING(8))").unwrap();

        let err = execute(&engine, "CREATE INDEX by_name ON T (name)").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }

    #[test]
    fn named_index_is_created() {
        let (_dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (id INT)").unwrap();

        let result = execute(&engine, "CREATE INDEX by_id ON T (id)").unwrap();

        assert!(matches!(result, ExecuteResult::CreateIndex { created: true }));
    }
}

mod insert {
    use super::*;

    #[test]
    fn partial_insert_leaves_other_attributes_null_and_zeroed() {
        let (dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (id INT, name STRING(4))").unwrap();

        let result = execute(&engine, "INSERT INTO T (name) VALUES ('x')").unwrap();
        assert_eq!(result.rows_affected(), 1);

        let bytes = fs::read(dir.path().join("t.rel")).unwrap();
        let (header, start) = decode_header(&bytes).unwrap();
        let record = &bytes[start..start + header.record_size()];
        let bitmap = record[0];
        assert_eq!(bitmap & 0b01, 0b01, "id null bit must be set");
        assert_eq!(bitmap & 0b10, 0, "name null bit must be clear");
        assert_eq!(&record[1..5], &[0, 0, 0, 0], "null INT bytes must be zero");
        assert_eq!(record[5], b'x');

        let rows = query(&engine, "SELECT id, name FROM T");
        assert_eq!(rows, vec![vec![Value::Null, Value::text("x")]]);
    }

    #[test]
    fn insert_with_explicit_null() {
        let (_dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (id INT, name STRING(4))").unwrap();

        execute(&engine, "INSERT T VALUES (NULL, 'y')").unwrap();

        let rows = query(&engine, "SELECT id FROM T");
        assert_eq!(rows, vec![vec![Value::Null]]);
    }

    #[test]
    fn value_count_mismatch_is_schema_error() {
        let (_dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (id INT, name STRING(4))").unwrap();

        let err = execute(&engine, "INSERT INTO T VALUES (1)").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }

    #[test]
    fn string_longer_than_attribute_is_rejected() {
        let (_dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (name STRING(2))").unwrap();

        let err = execute(&engine, "INSERT INTO T VALUES ('abc')").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
        assert!(query(&engine, "SELECT name FROM T").is_empty());
    }

    #[test]
    fn unknown_table_is_schema_error() {
        let (_dir, engine) = engine();

        let err = execute(&engine, "INSERT INTO nope VALUES (1)").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }
}

mod update {
    use super::*;

    fn people(engine: &Engine<FileStorage>) {
        execute(engine, "CREATE TABLE T (id INT, name STRING(10))").unwrap();
        execute(engine, "INSERT INTO T VALUES (1, 'a')").unwrap();
        execute(engine, "INSERT INTO T VALUES (2, 'b')").unwrap();
        execute(engine, "INSERT INTO T VALUES (3, 'c')").unwrap();
    }

    #[test]
    fn update_rewrites_matching_row() {
        let (_dir, engine) = engine();
        people(&engine);

        let result = execute(&engine, "UPDATE T SET name = 'z' WHERE id = 2").unwrap();
        assert!(matches!(result, ExecuteResult::Update { rows_affected: 1 }));

        let rows = query(&engine, "SELECT name FROM T WHERE id = 2");
        assert_eq!(rows, vec![vec![Value::text("z")]]);
        let rows = query(&engine, "SELECT name FROM T WHERE id = 1");
        assert_eq!(rows, vec![vec![Value::text("a")]]);
    }

    #[test]
    fn update_assignment_may_reference_the_row() {
        let (_dir, engine) = engine();
        people(&engine);

        let result = execute(&engine, "UPDATE TABLE T SET id = id + 10 WHERE id >= 2").unwrap();
        assert_eq!(result.rows_affected(), 2);

        let rows = query(&engine, "SELECT id FROM T");
        assert_eq!(
            rows,
            vec![vec![Value::Int(1)], vec![Value::Int(12)], vec![Value::Int(13)]]
        );
    }

    #[test]
    fn update_without_where_is_syntax_error() {
        let (_dir, engine) = engine();
        people(&engine);

        let err = execute(&engine, "UPDATE T SET name = 'z'").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Syntax);
    }

    #[test]
    fn update_of_unknown_column_is_schema_error() {
        let (_dir, engine) = engine();
        people(&engine);

        let err = execute(&engine, "UPDATE T SET missing = 1 WHERE id = 1").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
    }
}

mod delete {
    use super::*;

    fn ledger(engine: &Engine<FileStorage>) {
        execute(engine, "CREATE TABLE L (id INT, memo STRING(6), __delete INT)").unwrap();
        execute(engine, "INSERT INTO L VALUES (1, 'one')").unwrap();
        execute(engine, "INSERT INTO L VALUES (2, 'two')").unwrap();
        execute(engine, "INSERT INTO L VALUES (3, 'three')").unwrap();
    }

    #[test]
    fn delete_hides_rows_from_queries() {
        let (_dir, engine) = engine();
        ledger(&engine);

        let result = execute(&engine, "DELETE FROM L WHERE id = 2").unwrap();
        assert!(matches!(result, ExecuteResult::Delete { rows_affected: 1 }));

        let rows = query(&engine, "SELECT id FROM L");
        assert_eq!(rows, vec![vec![Value::Int(1)], vec![Value::Int(3)]]);
    }

    #[test]
    fn insert_reuses_deleted_slot() {
        let (dir, engine) = engine();
        ledger(&engine);
        let path = dir.path().join("l.rel");
        let before = fs::metadata(&path).unwrap().len();

        execute(&engine, "DELETE FROM L WHERE id = 1").unwrap();
        execute(&engine, "INSERT INTO L VALUES (4, 'four')").unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), before);
        let rows = query(&engine, "SELECT id, memo FROM L");
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(4), Value::text("four")],
                vec![Value::Int(2), Value::text("two")],
                vec![Value::Int(3), Value::text("three")],
            ]
        );
    }

    #[test]
    fn deleting_twice_affects_nothing() {
        let (_dir, engine) = engine();
        ledger(&engine);
        execute(&engine, "DELETE FROM L WHERE id = 3").unwrap();

        let result = execute(&engine, "DELETE FROM L WHERE id = 3").unwrap();

        assert_eq!(result.rows_affected(), 0);
    }

    #[test]
    fn delete_requires_soft_delete_attribute() {
        let (_dir, engine) = engine();
        execute(&engine, "CREATE TABLE T (id INT)").unwrap();
        execute(&engine, "INSERT INTO T VALUES (1)").unwrap();

        let err = execute(&engine, "DELETE FROM T WHERE id = 1").unwrap_err();

        assert_eq!(ErrorClass::of(&err), ErrorClass::Schema);
        assert_eq!(query(&engine, "SELECT id FROM T").len(), 1);
    }

    #[test]
    fn delete_with_small_nested_scope_still_runs() {
        let dir = tempdir().unwrap();
        let config = petitdb::EngineConfig::builder()
            .nested_scope_size(512)
            .build();
        let engine = Engine::with_config(FileStorage::open(dir.path()).unwrap(), config);
        ledger(&engine);

        let result = execute(&engine, "DELETE FROM L WHERE id >= 2").unwrap();

        assert_eq!(result.rows_affected(), 2);
        assert_eq!(query(&engine, "SELECT memo FROM L"), vec![vec![Value::text("one")]]);
    }
}
