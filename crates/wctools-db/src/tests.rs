//! Unit tests for the schema store.

use rusqlite::{params, ErrorCode};
use tempfile::TempDir;

use crate::error::StoreError;
use crate::registry::SchemaRegistry;
use crate::store::{Execution, SchemaStore};
use crate::{StoreOptions, Value};

/// Opens a default store in a fresh temp directory.
///
/// The directory must outlive the store, so both are returned.
fn test_store() -> (TempDir, SchemaStore) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let store = SchemaStore::open_default(dir.path().join("store.db")).expect("store should open");
    (dir, store)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

// ── execute ──────────────────────────────────────────────────────────

#[test]
fn execute_reports_affected_rows() {
    let (_dir, store) = test_store();

    let execution = store
        .execute(
            "INSERT INTO users (name, sid) VALUES (?, ?), (?, ?)",
            params!["alice", "s1", "bob", "s2"],
        )
        .expect("insert should succeed");
    assert_eq!(
        execution,
        Execution {
            affected: 2,
            rows: Vec::new()
        }
    );

    let execution = store
        .execute("UPDATE users SET sid = ?", params!["s9"])
        .expect("update should succeed");
    assert_eq!(execution.affected, 2);
}

#[test]
fn execute_returns_rows_for_queries() {
    let (_dir, store) = test_store();
    store
        .insert_row("INSERT INTO users (name, sid) VALUES (?, ?)", params!["alice", "s1"])
        .expect("insert should succeed");

    let execution = store
        .execute("SELECT name, sid FROM users WHERE name = ?", params!["alice"])
        .expect("select should succeed");
    assert_eq!(execution.affected, 0, "reads affect nothing");
    assert_eq!(execution.rows, vec![vec![text("alice"), text("s1")]]);
}

#[test]
fn execute_returning_counts_changes() {
    let (_dir, store) = test_store();

    let execution = store
        .execute(
            "INSERT INTO waiting_rooms (id, player_a_name) VALUES (?, ?) RETURNING id",
            params![42, "alice"],
        )
        .expect("insert returning should succeed");
    assert_eq!(execution.affected, 1);
    assert_eq!(execution.rows, vec![vec![Value::Integer(42)]]);
}

#[test]
fn execute_records_last_operation() {
    let (_dir, store) = test_store();

    store
        .execute("SELECT * FROM users WHERE name = ?", params!["carol"])
        .expect("select should succeed");

    let op = store.last_operation().expect("operation should be recorded");
    assert_eq!(op.sql, "SELECT * FROM users WHERE name = ?");
    assert_eq!(op.params, vec![text("carol")]);
}

#[test]
fn execute_failure_carries_statement_and_params() {
    let (_dir, store) = test_store();

    let err = store
        .execute("INSERT INTO nowhere VALUES (?)", params![7])
        .expect_err("missing table should fail");

    match &err {
        StoreError::Statement {
            context, operation, ..
        } => {
            assert_eq!(*context, "Execute query failed.");
            assert_eq!(operation.sql, "INSERT INTO nowhere VALUES (?)");
            assert_eq!(operation.params, vec![Value::Integer(7)]);
        }
        other => panic!("unexpected error type: {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("no such table: nowhere"), "message was: {msg}");
    assert!(msg.contains("params=(7)"), "message was: {msg}");
}

#[test]
fn failed_statement_is_rolled_back() {
    let (_dir, store) = test_store();
    store
        .insert_row("INSERT INTO users (name, sid) VALUES (?, ?)", params!["alice", "s1"])
        .expect("insert should succeed");

    // The second row conflicts, so the first must not survive either.
    store
        .execute(
            "INSERT INTO users (name, sid) VALUES (?, ?), (?, ?)",
            params!["bob", "s2", "alice", "s3"],
        )
        .expect_err("conflicting multi-row insert should fail");

    let rows = store
        .select("SELECT name FROM users ORDER BY name", &[])
        .expect("select should succeed");
    assert_eq!(rows, vec![vec![text("alice")]]);
}

// ── insert_row / create_table ────────────────────────────────────────

#[test]
fn insert_row_rejects_zero_affected() {
    let (_dir, store) = test_store();
    store
        .insert_row("INSERT INTO users (name, sid) VALUES (?, ?)", params!["alice", "s1"])
        .expect("first insert should succeed");

    let err = store
        .insert_row(
            "INSERT OR IGNORE INTO users (name, sid) VALUES (?, ?)",
            params!["alice", "s2"],
        )
        .expect_err("ignored insert should fail");

    match err {
        StoreError::RowCount {
            affected,
            operation,
            ..
        } => {
            assert_eq!(affected, 0);
            assert_eq!(operation.params, vec![text("alice"), text("s2")]);
        }
        other => panic!("unexpected error type: {other:?}"),
    }
}

#[test]
fn insert_row_rejects_multi_row_statements() {
    let (_dir, store) = test_store();

    let err = store
        .insert_row(
            "INSERT INTO users (name, sid) VALUES (?, ?), (?, ?)",
            params!["alice", "s1", "bob", "s2"],
        )
        .expect_err("two-row insert should fail");
    assert!(matches!(err, StoreError::RowCount { affected: 2, .. }));

    let rows = store
        .select("SELECT * FROM users", &[])
        .expect("select should succeed");
    assert!(rows.is_empty(), "rejected insert must be rolled back: {rows:?}");
}

#[test]
fn insert_row_rejection_keeps_earlier_rows() {
    let (_dir, store) = test_store();
    store
        .insert_row("INSERT INTO users (name, sid) VALUES (?, ?)", params!["alice", "s1"])
        .expect("insert should succeed");

    store
        .insert_row(
            "INSERT INTO users (name, sid) \
             SELECT name || '2', sid FROM users UNION ALL SELECT 'carol', 's3'",
            &[],
        )
        .expect_err("two-row insert should fail");

    let rows = store
        .select("SELECT name FROM users ORDER BY name", &[])
        .expect("select should succeed");
    assert_eq!(rows, vec![vec![text("alice")]]);
}

#[test]
fn create_table_fails_when_table_exists() {
    let (_dir, store) = test_store();

    store
        .create_table("CREATE TABLE scores(player TEXT, points INTEGER)")
        .expect("create should succeed");
    let err = store
        .create_table("CREATE TABLE scores(player TEXT, points INTEGER)")
        .expect_err("second create should fail");

    match &err {
        StoreError::Statement { context, .. } => {
            assert_eq!(*context, "Execute create table query failed.")
        }
        other => panic!("unexpected error type: {other:?}"),
    }
    assert_eq!(err.sqlite_error_code(), Some(ErrorCode::Unknown));
}

#[test]
fn prepare_failures_report_engine_code() {
    let (_dir, store) = test_store();

    for sql in ["SELECT nope FROM users", "SELECT * FROM ghosts", "SELEC 1"] {
        let err = store.select(sql, &[]).expect_err("statement should fail");
        assert_eq!(
            err.sqlite_error_code(),
            Some(ErrorCode::Unknown),
            "{sql} should carry the engine error code"
        );
    }
}

#[test]
fn execute_rejects_empty_statement() {
    let (_dir, store) = test_store();

    for sql in ["", "   ", "-- nothing to run\n", "/* still nothing */"] {
        let err = store
            .execute(sql, &[])
            .expect_err("statement without SQL should fail");
        match &err {
            StoreError::EmptyStatement { context, operation } => {
                assert_eq!(*context, "Execute query failed.");
                assert_eq!(operation.sql, sql);
            }
            other => panic!("unexpected error type for {sql:?}: {other:?}"),
        }
        assert!(err.to_string().contains("statement contains no SQL"));
    }
}

// ── select ───────────────────────────────────────────────────────────

#[test]
fn select_surfaces_original_error() {
    let (_dir, store) = test_store();

    let err = store
        .select("SELECT missing_column FROM users", &[])
        .expect_err("bad column should fail");
    match err {
        StoreError::Statement {
            context, source, ..
        } => {
            assert_eq!(context, "Select query failed.");
            assert!(source.to_string().contains("no such column"));
        }
        other => panic!("unexpected error type: {other:?}"),
    }
}

#[test]
fn select_preserves_column_types() {
    let (_dir, store) = test_store();
    store
        .insert_row(
            "INSERT INTO waiting_rooms (id, player_name, player_a_name, player_b_id, player_b_name) \
             VALUES (?, ?, ?, ?, ?)",
            params![1, Option::<i64>::None, "alice", 2, 3.5],
        )
        .expect("insert should succeed");

    let rows = store
        .select("SELECT * FROM waiting_rooms", &[])
        .expect("select should succeed");
    assert_eq!(
        rows,
        vec![vec![
            Value::Integer(1),
            Value::Null,
            text("alice"),
            Value::Integer(2),
            Value::Real(3.5),
        ]]
    );
}

// ── table and column listing ─────────────────────────────────────────

#[test]
fn table_names_lists_user_tables_only() {
    let (_dir, store) = test_store();
    store
        .create_table("CREATE TABLE seq_probe(id INTEGER PRIMARY KEY AUTOINCREMENT)")
        .expect("create should succeed");
    store
        .insert_row("INSERT INTO seq_probe DEFAULT VALUES", &[])
        .expect("insert should succeed");

    let names = store.table_names().expect("listing should succeed");
    assert_eq!(names, ["seq_probe", "users", "waiting_rooms"]);
}

#[test]
fn column_names_reads_storage() {
    let (_dir, store) = test_store();

    assert_eq!(
        store.column_names("users").expect("listing should succeed"),
        ["name", "sid"]
    );
    assert!(store
        .column_names("ghosts")
        .expect("listing should succeed")
        .is_empty());
}

// ── drop_all_tables ──────────────────────────────────────────────────

#[test]
fn drop_all_tables_ignores_foreign_keys() {
    let (_dir, store) = test_store();
    store
        .create_table("CREATE TABLE parent(id INTEGER PRIMARY KEY)")
        .expect("create parent");
    store
        .create_table("CREATE TABLE child(id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id))")
        .expect("create child");
    store
        .insert_row("INSERT INTO parent (id) VALUES (?)", params![1])
        .expect("insert parent");
    store
        .insert_row("INSERT INTO child (id, parent_id) VALUES (?, ?)", params![1, 1])
        .expect("insert child");

    let dropped = store.drop_all_tables().expect("drop should succeed");
    assert_eq!(dropped, 4);
    assert!(store.table_names().expect("listing").is_empty());
}

#[test]
fn drop_all_tables_on_empty_store_is_noop() {
    let (_dir, store) = test_store();
    assert_eq!(store.drop_all_tables().expect("first drop"), 2);
    assert_eq!(store.drop_all_tables().expect("second drop"), 0);
}

// ── item_exists ──────────────────────────────────────────────────────

#[test]
fn item_exists_binds_value() {
    let (_dir, store) = test_store();
    store
        .insert_row("INSERT INTO users (name, sid) VALUES (?, ?)", params!["alice", "s1"])
        .expect("insert should succeed");

    assert!(store.item_exists("users", "sid", &"s1").expect("lookup"));
    assert!(!store.item_exists("users", "sid", &"' OR '1'='1").expect("lookup"));
}

#[test]
fn item_exists_rejects_unknown_table() {
    let (_dir, store) = test_store();
    store
        .create_table("CREATE TABLE scratch(x)")
        .expect("create should succeed");

    let err = store
        .item_exists("scratch", "x", &1)
        .expect_err("non-registry table should be rejected");
    assert!(matches!(err, StoreError::UnknownTable { ref table } if table == "scratch"));
}

#[test]
fn item_exists_reports_missing_registry_table() {
    let (_dir, store) = test_store();
    store.drop_all_tables().expect("drop should succeed");

    let err = store
        .item_exists("users", "name", &"alice")
        .expect_err("lookup against a dropped table should fail");
    match err {
        StoreError::Statement { source, .. } => {
            assert!(
                source.to_string().contains("no such table: users"),
                "unexpected cause: {source}"
            );
        }
        other => panic!("unexpected error type: {other:?}"),
    }
}

#[test]
fn item_exists_rejects_unknown_column() {
    let (_dir, store) = test_store();

    let err = store
        .item_exists("users", "password", &"x")
        .expect_err("unknown column should be rejected");
    assert!(matches!(
        err,
        StoreError::UnknownColumn { ref table, ref column } if table == "users" && column == "password"
    ));
}

#[test]
fn item_exists_rejects_injected_identifiers() {
    let (_dir, store) = test_store();
    let before = store.last_operation();

    let err = store
        .item_exists("users", "name = name OR 1", &"x")
        .expect_err("injected column should be rejected");
    assert!(matches!(err, StoreError::InvalidIdentifier(_)));
    assert_eq!(
        store.last_operation(),
        before,
        "no statement should be issued for a rejected identifier"
    );
}

// ── construction ─────────────────────────────────────────────────────

#[test]
fn open_with_custom_registry() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let registry = SchemaRegistry::new([("scores", "CREATE TABLE scores(player TEXT, points INTEGER)")])
        .expect("registry should build");

    let store = SchemaStore::open(dir.path().join("custom.db"), registry, StoreOptions::default())
        .expect("store should open");

    assert_eq!(store.table_names().expect("listing"), ["scores"]);
    assert!(store.registry().contains("scores"));
    assert!(!store.registry().contains("users"));
}

#[test]
fn open_fails_on_bad_definition() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let registry =
        SchemaRegistry::new([("broken", "CREATE TABLE broken(")]).expect("registry should build");

    let err = SchemaStore::open(dir.path().join("broken.db"), registry, StoreOptions::default())
        .expect_err("bad definition should fail construction");
    match err {
        StoreError::Statement { operation, .. } => {
            assert_eq!(operation.sql, "CREATE TABLE broken(")
        }
        other => panic!("unexpected error type: {other:?}"),
    }
}

#[test]
fn init_tables_without_wipe_is_idempotent() {
    let (_dir, store) = test_store();

    assert!(store.init_tables(false).expect("init").is_empty());
    assert!(store.init_tables(false).expect("init again").is_empty());
    assert_eq!(
        store.init_tables(true).expect("init with wipe"),
        ["users", "waiting_rooms"]
    );
}

#[test]
fn store_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SchemaStore>();
}
