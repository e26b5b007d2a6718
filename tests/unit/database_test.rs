//! Unit tests for the SmartMark database layer (connection + migrations).

use smartmark::database::migrations::{get_schema_version, run_all, CURRENT_SCHEMA_VERSION};
use smartmark::database::Database;
use tempfile::TempDir;

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
}

#[test]
fn test_migrations_create_all_tables() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    for table in &["users", "bookmarks", "schema_version"] {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .unwrap_or(false);
        assert!(exists, "Table '{}' should exist after migrations", table);
    }
}

#[test]
fn test_migrations_create_bookmark_index() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='index' AND name=?1",
            ["idx_bookmarks_user_created"],
            |row| row.get(0),
        )
        .unwrap_or(false);
    assert!(exists, "Index 'idx_bookmarks_user_created' should exist");
}

#[test]
fn test_schema_version_is_current() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    assert_eq!(get_schema_version(&db.connection()), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    run_all(&conn).expect("second run should succeed");
    let versions: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, CURRENT_SCHEMA_VERSION as i64);
}

/// Data written to a file database survives reopening it.
#[test]
fn test_file_database_persists_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("smartmark.db");

    {
        let db = Database::open(&path).unwrap();
        db.connection()
            .execute(
                "INSERT INTO bookmarks (id, title, url, user_id, created_at) VALUES ('b1', 'Rust', 'https://rust-lang.org', 'u1', 1)",
                [],
            )
            .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let title: String = db
        .connection()
        .query_row("SELECT title FROM bookmarks WHERE id = 'b1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(title, "Rust");
}

#[test]
fn test_user_email_is_unique() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let insert = "INSERT INTO users (id, email, password_hash, salt, created_at) VALUES (?1, 'a@b.c', x'00', x'00', 0)";

    conn.execute(insert, ["u1"]).unwrap();
    assert!(conn.execute(insert, ["u2"]).is_err());
}
