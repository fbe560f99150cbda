use rusqlite::Connection;
use threadkeep_core::db::migrations::latest_version;
use threadkeep_core::db::{open_configured, open_db, open_db_in_memory, DbError};
use threadkeep_core::{JournalMode, StoreConfig};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["owners", "containers", "groupings", "items"] {
        assert_object_exists(&conn, "table", table);
    }
    assert_object_exists(&conn, "index", "idx_items_grouping_created");
}

#[test]
fn foreign_keys_are_enforced_on_every_connection() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let err = conn
        .execute(
            "INSERT INTO containers (id, owner_id, name) VALUES ('c1', 'nobody', 'x');",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY"));
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threadkeep.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_object_exists(&conn_second, "table", "items");
}

#[test]
fn database_at_first_version_gets_only_the_index_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_init.sql"))
        .unwrap();
    conn.execute_batch("PRAGMA user_version = 1;").unwrap();
    conn.execute(
        "INSERT INTO owners (id, email, display_name) VALUES ('o1', 'a@b.co', 'A');",
        [],
    )
    .unwrap();
    drop(conn);

    let upgraded = open_db(&path).unwrap();
    assert_eq!(schema_version(&upgraded), latest_version());
    assert_object_exists(&upgraded, "index", "idx_containers_owner");
    let owners: i64 = upgraded
        .query_row("SELECT COUNT(*) FROM owners;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(owners, 1);
}

#[test]
fn file_databases_use_configured_journal_mode() {
    let dir = tempfile::tempdir().unwrap();

    let wal = open_db(dir.path().join("wal.db")).unwrap();
    assert_eq!(journal_mode(&wal), "wal");

    let mut config = StoreConfig::at_path(dir.path().join("rollback.db"));
    config.journal_mode = JournalMode::Delete;
    let rollback = open_configured(&config).unwrap();
    assert_eq!(journal_mode(&rollback), "delete");
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

#[test]
fn timestamps_default_to_epoch_milliseconds() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO owners (id, email, display_name) VALUES ('o1', 'a@b.co', 'A');",
        [],
    )
    .unwrap();
    let created_at: i64 = conn
        .query_row("SELECT created_at FROM owners WHERE id = 'o1';", [], |row| {
            row.get(0)
        })
        .unwrap();
    // 2020-01-01T00:00:00Z in epoch ms.
    assert!(created_at > 1_577_836_800_000, "got {created_at}");
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn journal_mode(conn: &Connection) -> String {
    conn.query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap()
}

fn assert_object_exists(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
