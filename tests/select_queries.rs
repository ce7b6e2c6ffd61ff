//! # Query Integration Tests
//!
//! End-to-end SELECT behavior through the public `Engine` API over a
//! directory-backed `FileStorage`.
//!
//! ## Test Categories
//!
//! 1. **Filtering**: WHERE over single tables
//! 2. **Joins**: comma and JOIN ... ON forms, aliases
//! 3. **Projection**: expressions, aliases, `*` forms
//! 4. **Ordering and Aggregation**: ORDER BY, GROUP BY, aggregate functions
//! 5. **Plan Shape**: explain output and cursor lifecycle
//!
//! ## Running Tests
//!
//! ```sh
//! cargo test --test select_queries
//! ```

use petitdb::{Engine, FileStorage, Next, Prepared, QueryArena, Tuple, Value};
use tempfile::{tempdir, TempDir};

fn engine() -> (TempDir, Engine<FileStorage>) {
    let dir = tempdir().unwrap();
    let engine = Engine::new(FileStorage::open(dir.path()).unwrap());
    (dir, engine)
}

fn run(engine: &Engine<FileStorage>, statements: &[&str]) {
    let mut buf = vec![0u8; 8192];
    let arena = QueryArena::new(&mut buf);
    for sql in statements {
        engine.execute(sql, &arena).unwrap();
    }
}

fn query(engine: &Engine<FileStorage>, sql: &str) -> Vec<Vec<Value>> {
    let mut buf = vec![0u8; 8192];
    let arena = QueryArena::new(&mut buf);
    engine.query(sql, &arena).unwrap()
}

fn people(engine: &Engine<FileStorage>) {
    run(
        engine,
        &[
            "CREATE TABLE T (id INT, name STRING(10))",
            "INSERT INTO T VALUES (1, 'a')",
            "INSERT INTO T VALUES (2, 'b')",
            "INSERT INTO T VALUES (3, 'c')",
        ],
    );
}

fn text(s: &str) -> Value {
    Value::text(s)
}

mod filtering {
    use super::*;

    #[test]
    fn where_selects_matching_rows_in_file_order() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(&engine, "SELECT name FROM T WHERE id >= 2");

        assert_eq!(rows, vec![vec![text("b")], vec![text("c")]]);
    }

    #[test]
    fn clauses_may_appear_in_any_order() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(&engine, "FROM T WHERE id = 1 SELECT name");

        assert_eq!(rows, vec![vec![text("a")]]);
    }

    #[test]
    fn compound_predicate_filters_with_and_or() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(
            &engine,
            "SELECT id FROM T WHERE (id = 1 OR id = 3) AND name <> 'c'",
        );

        assert_eq!(rows, vec![vec![Value::Int(1)]]);
    }

    #[test]
    fn null_comparison_excludes_row() {
        let (_dir, engine) = engine();
        people(&engine);
        run(&engine, &["INSERT INTO T (name) VALUES ('d')"]);

        let rows = query(&engine, "SELECT name FROM T WHERE id > 0");

        assert_eq!(rows.len(), 3);
        assert!(!rows.contains(&vec![text("d")]));
    }

    #[test]
    fn empty_table_yields_no_rows() {
        let (_dir, engine) = engine();
        run(&engine, &["CREATE TABLE T (id INT)"]);

        assert!(query(&engine, "SELECT id FROM T").is_empty());
    }
}

mod joins {
    use super::*;

    fn orders(engine: &Engine<FileStorage>) {
        run(
            engine,
            &[
                "CREATE TABLE A (id INT)",
                "CREATE TABLE B (aid INT, v INT)",
                "INSERT INTO A VALUES (1)",
                "INSERT INTO A VALUES (2)",
                "INSERT INTO B VALUES (2, 20)",
                "INSERT INTO B VALUES (1, 10)",
            ],
        );
    }

    #[test]
    fn join_on_pairs_matching_rows() {
        let (_dir, engine) = engine();
        orders(&engine);

        let rows = query(&engine, "SELECT B.v FROM A JOIN B ON A.id = B.aid");

        assert_eq!(rows, vec![vec![Value::Int(10)], vec![Value::Int(20)]]);
    }

    #[test]
    fn comma_join_with_where_matches_join_on() {
        let (_dir, engine) = engine();
        orders(&engine);

        let rows = query(&engine, "SELECT B.v FROM A, B WHERE A.id = B.aid");

        assert_eq!(rows, vec![vec![Value::Int(10)], vec![Value::Int(20)]]);
    }

    #[test]
    fn cross_join_without_predicate_is_cartesian() {
        let (_dir, engine) = engine();
        orders(&engine);

        let rows = query(&engine, "SELECT A.id, B.v FROM A CROSS JOIN B");

        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn aliases_qualify_attributes() {
        let (_dir, engine) = engine();
        orders(&engine);

        let rows = query(
            &engine,
            "SELECT x.id, y.v FROM A AS x JOIN B y ON x.id = y.aid WHERE y.v > 10",
        );

        assert_eq!(rows, vec![vec![Value::Int(2), Value::Int(20)]]);
    }

    #[test]
    fn index_ordered_join_returns_same_rows() {
        let (_dir, engine) = engine();
        orders(&engine);
        run(&engine, &["CREATE INDEX ON B (aid)"]);

        let rows = query(&engine, "SELECT A.id, B.v FROM A JOIN B ON A.id = B.aid");

        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Int(10)],
                vec![Value::Int(2), Value::Int(20)],
            ]
        );
    }

    fn labels(engine: &Engine<FileStorage>) {
        run(
            engine,
            &[
                "CREATE TABLE C (v INT, label STRING(8))",
                "INSERT INTO C VALUES (30, 'thirty')",
                "INSERT INTO C VALUES (10, 'ten')",
                "INSERT INTO C VALUES (20, 'twenty')",
            ],
        );
    }

    #[test]
    fn three_table_join_chain() {
        let (_dir, engine) = engine();
        orders(&engine);
        labels(&engine);

        let rows = query(
            &engine,
            "SELECT A.id, C.label FROM A JOIN B ON A.id = B.aid JOIN C ON B.v = C.v",
        );

        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), text("ten")],
                vec![Value::Int(2), text("twenty")],
            ]
        );
    }

    #[test]
    fn three_table_comma_join_filters_above_both_joins() {
        let (_dir, engine) = engine();
        orders(&engine);
        labels(&engine);
        let sql = "SELECT C.label FROM A, B, C \
                   WHERE A.id = B.aid AND B.v = C.v AND C.label <> 'ten'";
        let mut buf = vec![0u8; 8192];
        let arena = QueryArena::new(&mut buf);

        let Prepared::Query(mut plan) = engine.prepare(sql, &arena).unwrap() else {
            panic!("expected a query plan");
        };
        let explain = plan.explain();
        plan.close(&arena).unwrap();

        assert_eq!(
            explain,
            "+PROJECT\n++SELECT\n+++NTJOIN\n++++NTJOIN\n+++++SCAN a\n+++++SCAN b\n++++SCAN c\n"
        );
        assert_eq!(query(&engine, sql), vec![vec![text("twenty")]]);
    }
}

mod projection {
    use super::*;

    #[test]
    fn arithmetic_expression_is_evaluated() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(&engine, "SELECT id * 10 + 1 AS k FROM T WHERE id = 2");

        assert_eq!(rows, vec![vec![Value::Int(21)]]);
    }

    #[test]
    fn star_returns_every_attribute() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(&engine, "SELECT * FROM T WHERE id = 3");

        assert_eq!(rows, vec![vec![Value::Int(3), text("c")]]);
    }

    #[test]
    fn table_star_selects_one_side_of_a_join() {
        let (_dir, engine) = engine();
        people(&engine);
        run(
            &engine,
            &["CREATE TABLE U (tid INT)", "INSERT INTO U VALUES (2)"],
        );

        let rows = query(&engine, "SELECT T.* FROM T, U WHERE T.id = U.tid");

        assert_eq!(rows, vec![vec![Value::Int(2), text("b")]]);
    }

    #[test]
    fn output_names_come_from_aliases_and_source_text() {
        let (_dir, engine) = engine();
        people(&engine);
        let mut buf = vec![0u8; 8192];
        let arena = QueryArena::new(&mut buf);

        let Prepared::Query(mut plan) = engine
            .prepare("SELECT name AS who, id + 1 FROM T", &arena)
            .unwrap()
        else {
            panic!("expected a query plan");
        };
        let names: Vec<String> = plan
            .header()
            .attributes()
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        plan.close(&arena).unwrap();

        assert_eq!(names, vec!["who".to_string(), "id + 1".to_string()]);
    }
}

mod ordering_and_aggregation {
    use super::*;

    #[test]
    fn order_by_descending() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(&engine, "SELECT id FROM T ORDER BY id DESC");

        assert_eq!(
            rows,
            vec![vec![Value::Int(3)], vec![Value::Int(2)], vec![Value::Int(1)]]
        );
    }

    #[test]
    fn order_by_position_of_output_column() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(&engine, "SELECT name, id FROM T ORDER BY 2 DESC");

        assert_eq!(rows[0], vec![text("c"), Value::Int(3)]);
    }

    #[test]
    fn aggregates_over_whole_table() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(
            &engine,
            "SELECT COUNT(*), SUM(id), MIN(name), MAX(id), AVG(id) FROM T",
        );

        assert_eq!(
            rows,
            vec![vec![
                Value::Int(3),
                Value::Int(6),
                text("a"),
                Value::Int(3),
                Value::Decimal(2.0),
            ]]
        );
    }

    #[test]
    fn count_over_empty_input_is_zero() {
        let (_dir, engine) = engine();
        people(&engine);

        let rows = query(&engine, "SELECT COUNT(*), SUM(id) FROM T WHERE id > 10");

        assert_eq!(rows, vec![vec![Value::Int(0), Value::Null]]);
    }

    #[test]
    fn group_by_emits_one_row_per_key() {
        let (_dir, engine) = engine();
        run(
            &engine,
            &[
                "CREATE TABLE S (dept INT, pay INT)",
                "INSERT INTO S VALUES (2, 10)",
                "INSERT INTO S VALUES (1, 5)",
                "INSERT INTO S VALUES (2, 30)",
            ],
        );

        let rows = query(&engine, "SELECT dept, SUM(pay) AS total FROM S GROUP BY dept");

        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Int(5)],
                vec![Value::Int(2), Value::Int(40)],
            ]
        );
    }
}

mod plan_shape {
    use super::*;

    #[test]
    fn explain_renders_operator_tree() {
        let (_dir, engine) = engine();
        people(&engine);
        let mut buf = vec![0u8; 8192];
        let arena = QueryArena::new(&mut buf);

        let Prepared::Query(mut plan) = engine
            .prepare("SELECT name FROM T WHERE id >= 2", &arena)
            .unwrap()
        else {
            panic!("expected a query plan");
        };
        let explain = plan.explain();
        plan.close(&arena).unwrap();

        assert_eq!(explain, "+PROJECT\n++SELECT\n+++SCAN t\n");
    }

    #[test]
    fn close_is_idempotent_and_releases_arena() {
        let (_dir, engine) = engine();
        people(&engine);
        let mut buf = vec![0u8; 8192];
        let arena = QueryArena::new(&mut buf);

        let Prepared::Query(mut plan) = engine.prepare("SELECT name FROM T", &arena).unwrap()
        else {
            panic!("expected a query plan");
        };
        let row = Tuple::alloc(&arena, plan.header()).unwrap();
        plan.open(&arena).unwrap();
        assert_eq!(plan.next(&arena, &row).unwrap(), Next::Produced);
        plan.close(&arena).unwrap();
        plan.close(&arena).unwrap();
        row.release(&arena);

        assert_eq!(arena.back_cursor(), arena.capacity());
        assert!(plan.open(&arena).is_err());
    }
}
