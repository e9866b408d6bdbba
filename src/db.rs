//! Local SQLite storage for the POS.
//!
//! Uses rusqlite with WAL mode and `synchronous = FULL` so that a committed
//! order survives a crash or power loss. Provides schema migrations, the
//! key-based settings store and the shared connection handle.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{error, info};

/// Durability failures from the local store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create data dir {}: {source}", path.display())]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database connection lock poisoned")]
    LockPoisoned,
    #[error("order {0} already exists in the ledger")]
    DuplicateOrder(String),
    #[error("corrupt {what}: {detail}")]
    Corrupt { what: String, detail: String },
    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Shared handle to the database connection.
#[derive(Debug)]
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// In-memory database with the full schema applied.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }
}

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "pos.db";

/// Current schema version. Bump when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/pos.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas and
/// runs any pending migrations. An open failure is returned as is: the file
/// holds the order ledger and is never deleted to recover.
pub fn init(data_dir: &Path) -> Result<DbState, StorageError> {
    fs::create_dir_all(data_dir).map_err(|source| StorageError::DataDir {
        path: data_dir.to_path_buf(),
        source,
    })?;

    let db_path = data_dir.join(DB_FILE);
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = FULL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current = schema_version(conn)?;

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i32, StorageError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration v1: settings store and the order ledger.
fn migrate_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        -- orders (append-only ledger; seq preserves append order)
        CREATE TABLE IF NOT EXISTS orders (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            customer_name TEXT NOT NULL,
            items TEXT NOT NULL DEFAULT '[]',
            total TEXT NOT NULL,
            is_gift INTEGER NOT NULL DEFAULT 0,
            payment_method TEXT NOT NULL CHECK (payment_method IN ('cash', 'card')),
            cash_tendered TEXT,
            change_due TEXT,
            created_at TEXT NOT NULL,
            seller TEXT NOT NULL,
            event_name TEXT NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            synced_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_orders_synced ON orders(synced);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        e
    })?;

    info!("Applied migration v1 (local_settings, orders)");
    Ok(())
}

/// Migration v2: enforce append-only orders at the storage level. Only the
/// sync columns may change after insert, and rows can never be deleted.
fn migrate_v2(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TRIGGER IF NOT EXISTS orders_append_only
        BEFORE UPDATE OF seq, id, customer_name, items, total, is_gift, payment_method,
                         cash_tendered, change_due, created_at, seller, event_name
        ON orders
        BEGIN
            SELECT RAISE(ABORT, 'orders are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS orders_no_delete
        BEFORE DELETE ON orders
        BEGIN
            SELECT RAISE(ABORT, 'orders are append-only');
        END;

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        e
    })?;

    info!("Applied migration v2 (append-only triggers)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(
    conn: &Connection,
    category: &str,
    key: &str,
) -> Result<Option<String>, StorageError> {
    let value = conn
        .query_row(
            "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// Delete a single setting. Missing keys are not an error.
pub fn delete_setting(conn: &Connection, category: &str, key: &str) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
    )?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("pragma setup");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    fn insert_order_row(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO orders (id, customer_name, items, total, payment_method, created_at, seller, event_name)
             VALUES (?1, 'Ana', '[]', '70', 'cash', '2026-01-01T00:00:00Z', 'Luis', 'Feria')",
            params![id],
        )
        .expect("insert order");
    }

    #[test]
    fn test_migrations_v1_to_latest() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        let tables = table_names(&conn);
        assert!(tables.contains(&"local_settings".to_string()));
        assert!(tables.contains(&"orders".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run should succeed");

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .expect("read schema version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_wal_mode_on_file_db() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("test_wal.db");

        let conn = open_and_configure(&db_path).expect("open temp db");
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("read journal_mode");
        assert_eq!(mode.to_lowercase(), "wal", "journal_mode should be WAL");

        let sync: i64 = conn
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .expect("read synchronous");
        assert_eq!(sync, 2, "synchronous should be FULL");
    }

    #[test]
    fn test_orders_reject_content_updates() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");
        insert_order_row(&conn, "ord-1");

        let edit = conn.execute("UPDATE orders SET total = '0' WHERE id = 'ord-1'", []);
        assert!(edit.is_err(), "content columns must be immutable");

        let delete = conn.execute("DELETE FROM orders WHERE id = 'ord-1'", []);
        assert!(delete.is_err(), "orders must not be deletable");

        conn.execute(
            "UPDATE orders SET synced = 1, synced_at = datetime('now') WHERE id = 'ord-1'",
            [],
        )
        .expect("synced flag stays writable");
    }

    #[test]
    fn test_orders_reject_duplicate_id_and_bad_method() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");
        insert_order_row(&conn, "ord-dup");

        let dup = conn.execute(
            "INSERT INTO orders (id, customer_name, total, payment_method, created_at, seller, event_name)
             VALUES ('ord-dup', 'B', '1', 'card', '2026-01-01T00:00:00Z', 'S', 'E')",
            [],
        );
        assert!(dup.is_err());

        let bad = conn.execute(
            "INSERT INTO orders (id, customer_name, total, payment_method, created_at, seller, event_name)
             VALUES ('ord-bad', 'B', '1', 'bitcoin', '2026-01-01T00:00:00Z', 'S', 'E')",
            [],
        );
        assert!(bad.is_err(), "invalid payment_method should be rejected");
    }

    #[test]
    fn test_settings_crud() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        set_setting(&conn, "session", "event", "{}").expect("set");
        assert_eq!(
            get_setting(&conn, "session", "event").unwrap(),
            Some("{}".to_string())
        );

        set_setting(&conn, "session", "event", "[]").expect("update");
        assert_eq!(
            get_setting(&conn, "session", "event").unwrap(),
            Some("[]".to_string())
        );

        delete_setting(&conn, "session", "event").expect("delete");
        assert!(get_setting(&conn, "session", "event").unwrap().is_none());
        delete_setting(&conn, "session", "event").expect("delete missing is fine");
    }

    #[test]
    fn test_init_creates_data_dir_and_reopens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("nested").join("pos");

        let db = init(&data_dir).expect("init");
        assert!(db.db_path.exists());
        {
            let conn = db.lock().unwrap();
            set_setting(&conn, "test", "k", "v").unwrap();
        }
        drop(db);

        let reopened = init(&data_dir).expect("reopen");
        let conn = reopened.lock().unwrap();
        assert_eq!(get_setting(&conn, "test", "k").unwrap(), Some("v".into()));
    }
}
