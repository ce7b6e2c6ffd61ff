//! # Index Access Path Tests
//!
//! A single comparison between an indexed INT attribute and an integer
//! constant narrows the scan to an index range. These tests check that the
//! narrowed plan is chosen and that it returns exactly the rows a full scan
//! would, for every comparison operator and for both operand orders.
//!
//! ## Running Tests
//!
//! ```sh
//! cargo test --test index_access
//! ```

use petitdb::{Engine, FileStorage, Prepared, QueryArena, Value};
use tempfile::{tempdir, TempDir};

fn engine() -> (TempDir, Engine<FileStorage>) {
    let dir = tempdir().unwrap();
    let engine = Engine::new(FileStorage::open(dir.path()).unwrap());
    (dir, engine)
}

fn execute(engine: &Engine<FileStorage>, sql: &str) {
    let mut buf = vec![0u8; 8192];
    let arena = QueryArena::new(&mut buf);
    engine.execute(sql, &arena).unwrap();
}

fn sorted_ids(engine: &Engine<FileStorage>, sql: &str) -> Vec<i64> {
    let mut buf = vec![0u8; 8192];
    let arena = QueryArena::new(&mut buf);
    let mut ids: Vec<i64> = engine
        .query(sql, &arena)
        .unwrap()
        .into_iter()
        .map(|row| match row[0] {
            Value::Int(id) => id,
            ref other => panic!("expected INT id, got {:?}", other),
        })
        .collect();
    ids.sort_unstable();
    ids
}

fn explain(engine: &Engine<FileStorage>, sql: &str) -> String {
    let mut buf = vec![0u8; 8192];
    let arena = QueryArena::new(&mut buf);
    let Prepared::Query(mut plan) = engine.prepare(sql, &arena).unwrap() else {
        panic!("expected a query plan");
    };
    let text = plan.explain();
    plan.close(&arena).unwrap();
    text
}

/// Twin tables with the same rows inserted out of key order; only `I` is
/// indexed on `id`.
fn twins(engine: &Engine<FileStorage>) {
    execute(engine, "CREATE TABLE F (id INT, name STRING(4))");
    execute(engine, "CREATE TABLE I (id INT, name STRING(4))");
    execute(engine, "CREATE INDEX ON I (id)");
    for (id, name) in [(5, "e"), (1, "a"), (4, "d"), (2, "b"), (3, "c"), (4, "dd")] {
        for table in ["F", "I"] {
            execute(
                engine,
                &format!("INSERT INTO {} VALUES ({}, '{}')", table, id, name),
            );
        }
    }
}

#[test]
fn comparison_on_indexed_attribute_uses_index_range() {
    let (_dir, engine) = engine();
    twins(&engine);

    assert_eq!(
        explain(&engine, "SELECT id FROM I WHERE id >= 3"),
        "+PROJECT\n++SELECT\n+++SCAN i (index range)\n"
    );
    assert_eq!(
        explain(&engine, "SELECT id FROM F WHERE id >= 3"),
        "+PROJECT\n++SELECT\n+++SCAN f\n"
    );
}

#[test]
fn narrowed_scan_matches_full_scan_for_every_operator() {
    let (_dir, engine) = engine();
    twins(&engine);

    for predicate in [
        "id = 4", "id < 3", "id <= 3", "id > 3", "id >= 3", "2 < id", "4 = id", "id = 9",
        "id < 1",
    ] {
        let full = sorted_ids(&engine, &format!("SELECT id FROM F WHERE {}", predicate));
        let narrowed = sorted_ids(&engine, &format!("SELECT id FROM I WHERE {}", predicate));
        assert_eq!(narrowed, full, "predicate {}", predicate);
    }
}

#[test]
fn duplicate_keys_are_all_returned() {
    let (_dir, engine) = engine();
    twins(&engine);

    assert_eq!(sorted_ids(&engine, "SELECT id FROM I WHERE id = 4"), vec![4, 4]);
}

#[test]
fn not_equal_and_compound_predicates_fall_back_to_full_scan() {
    let (_dir, engine) = engine();
    twins(&engine);

    assert_eq!(
        explain(&engine, "SELECT id FROM I WHERE id <> 3"),
        "+PROJECT\n++SELECT\n+++SCAN i\n"
    );
    assert_eq!(
        explain(&engine, "SELECT id FROM I WHERE id > 1 AND id < 4"),
        "+PROJECT\n++SELECT\n+++SCAN i\n"
    );
    assert_eq!(
        sorted_ids(&engine, "SELECT id FROM I WHERE id > 1 AND id < 4"),
        vec![2, 3]
    );
}

#[test]
fn index_sees_rows_written_after_creation() {
    let (_dir, engine) = engine();
    twins(&engine);

    execute(&engine, "INSERT INTO I VALUES (10, 'j')");
    execute(&engine, "UPDATE I SET id = 20 WHERE id = 1");

    assert_eq!(sorted_ids(&engine, "SELECT id FROM I WHERE id >= 10"), vec![10, 20]);
    assert!(sorted_ids(&engine, "SELECT id FROM I WHERE id = 1").is_empty());
}

#[test]
fn index_ordered_join_is_chosen_for_indexed_equi_join() {
    let (_dir, engine) = engine();
    twins(&engine);

    let text = explain(&engine, "SELECT F.name FROM F JOIN I ON F.id = I.id");

    assert_eq!(
        text,
        "+PROJECT\n++OSIJOIN\n+++SCAN f\n+++SCAN i (index range)\n"
    );
}

#[test]
fn decimal_key_join_stays_nested_loop_over_int_index() {
    let (_dir, engine) = engine();
    execute(&engine, "CREATE TABLE A (d DECIMAL)");
    execute(&engine, "CREATE TABLE B (aid INT, v INT)");
    execute(&engine, "INSERT INTO A VALUES (1.0)");
    execute(&engine, "INSERT INTO A VALUES (2.0)");
    execute(&engine, "INSERT INTO B VALUES (1, 10)");
    execute(&engine, "INSERT INTO B VALUES (2, 20)");
    let sql = "SELECT v FROM A JOIN B ON A.d = B.aid";
    let before = sorted_ids(&engine, sql);

    execute(&engine, "CREATE INDEX ON B (aid)");

    assert_eq!(before, vec![10, 20]);
    assert_eq!(sorted_ids(&engine, sql), before);
    assert_eq!(
        explain(&engine, sql),
        "+PROJECT\n++NTJOIN\n+++SCAN a\n+++SCAN b\n"
    );
}
