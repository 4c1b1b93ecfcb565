use datarepo_core::config::DatabaseSettings;
use datarepo_core::db::migrations::{current_user_version, latest_version};
use datarepo_core::db::{open_db, open_db_in_memory, open_db_with, DbError};
use rusqlite::{Connection, OptionalExtension};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "team");
    assert_table_exists(&conn, "member");
    assert_table_exists(&conn, "item");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datarepo.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute("INSERT INTO team (name) VALUES ('teamA')", [])
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let teams: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM team", [], |row| row.get(0))
        .unwrap();
    assert_eq!(teams, 1);
}

#[test]
fn settings_without_path_open_in_memory() {
    let conn = open_db_with(&DatabaseSettings::default()).unwrap();
    assert_eq!(schema_version(&conn), latest_version());

    let dir = tempfile::tempdir().unwrap();
    let file_settings = DatabaseSettings {
        path: Some(dir.path().join("configured.db")),
        busy_timeout_ms: 250,
    };
    open_db_with(&file_settings).unwrap();
    assert!(dir.path().join("configured.db").exists());
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let err = conn
        .execute(
            "INSERT INTO member (username, age, team_id) VALUES ('ghost', 1, 99)",
            [],
        )
        .unwrap_err();
    assert!(DbError::Sqlite(err).is_constraint_violation());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    current_user_version(conn).unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table_name],
            |row| row.get(0),
        )
        .optional()
        .unwrap();
    assert_eq!(found.as_deref(), Some(table_name), "missing table {table_name}");
}
