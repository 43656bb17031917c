use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

const MIGRATION_0001: (&str, &str) = (
    "0001_init.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_init.sql"
    )),
);

const MIGRATION_0002: (&str, &str) = (
    "0002_notification_records.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0002_notification_records.sql"
    )),
);

fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![MIGRATION_0001, MIGRATION_0002]
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    Connection::open(path).map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open SQLite database")
            .with_details(e.to_string())
    })
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open in-memory SQLite database")
            .with_details(e.to_string())
    })
}

/// Opens an in-memory database with every migration applied.
pub fn open_in_memory_migrated() -> Result<Connection, AppError> {
    let mut conn = open_in_memory()?;
    migrate(&mut conn)?;
    Ok(conn)
}

pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    // Foreign keys are per-connection in SQLite; notification records depend on them.
    conn.execute_batch(
        r#"
      PRAGMA foreign_keys = ON;
      CREATE TABLE IF NOT EXISTS _migrations (
        name TEXT PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL
      );
    "#,
    )
    .map_err(AppError::wrap(
        "DB_MIGRATIONS_TABLE_FAILED",
        "Failed to ensure migrations table exists",
    ))?;

    let applied: HashSet<String> = {
        let mut stmt = conn
            .prepare("SELECT name FROM _migrations")
            .map_err(AppError::wrap(
                "DB_MIGRATIONS_QUERY_FAILED",
                "Failed to query applied migrations",
            ))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(AppError::wrap(
                "DB_MIGRATIONS_QUERY_FAILED",
                "Failed to read applied migrations",
            ))?;

        let mut set = HashSet::new();
        for r in rows {
            set.insert(r.map_err(AppError::wrap(
                "DB_MIGRATIONS_QUERY_FAILED",
                "Failed to read applied migration row",
            ))?);
        }
        set
    };

    for (name, sql) in migrations() {
        if applied.contains(name) {
            continue;
        }

        let tx = conn.transaction().map_err(AppError::wrap(
            "DB_TX_FAILED",
            "Failed to start migration transaction",
        ))?;

        tx.execute_batch(sql).map_err(|e| {
            AppError::new("DB_MIGRATION_FAILED", format!("Migration {name} failed"))
                .with_details(e.to_string())
        })?;

        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(|e| {
            AppError::new("DB_MIGRATION_FAILED", format!("Failed to record migration {name}"))
                .with_details(e.to_string())
        })?;

        tx.commit().map_err(AppError::wrap(
            "DB_TX_FAILED",
            "Failed to commit migration transaction",
        ))?;
        tracing::debug!(migration = name, "applied migration");
    }

    Ok(())
}
