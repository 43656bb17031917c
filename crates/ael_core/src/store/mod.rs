use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoreMetadata {
    pub db_path: String,
    pub incident_count: i64,
    pub specification_count: i64,
}

impl StoreMetadata {
    pub fn is_empty(&self) -> bool {
        self.incident_count == 0 && self.specification_count == 0
    }
}

fn validate_db_path(path: &Path) -> Result<(), AppError> {
    if path.as_os_str().is_empty() {
        return Err(AppError::new("STORE_INVALID_PATH", "Store DB path is empty"));
    }
    if path.exists() && path.is_dir() {
        return Err(AppError::new(
            "STORE_INVALID_PATH",
            "Store DB path must be a file (not a directory)",
        )
        .with_details(path.display().to_string()));
    }
    Ok(())
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, AppError> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .map_err(|e| {
        AppError::new("DB_QUERY_FAILED", format!("Failed to count rows in {table}"))
            .with_details(e.to_string())
    })
}

fn metadata_for(conn: &Connection, db_path: &Path) -> Result<StoreMetadata, AppError> {
    Ok(StoreMetadata {
        db_path: db_path.to_string_lossy().to_string(),
        incident_count: count_rows(conn, "incidents")?,
        specification_count: count_rows(conn, "specifications")?,
    })
}

fn remap(code: &'static str, message: &'static str) -> impl FnOnce(AppError) -> AppError {
    move |e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new(code, message).with_details(details)
    }
}

/// Opens an existing incident store and brings its schema up to date.
pub fn open_store_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;

    if !db_path.is_file() {
        return Err(AppError::new("STORE_DB_NOT_FOUND", "Store database file not found")
            .with_details(db_path.display().to_string()));
    }

    let mut conn = crate::db::open(db_path)
        .map_err(remap("STORE_OPEN_FAILED", "Failed to open store database"))?;
    crate::db::migrate(&mut conn)
        .map_err(remap("STORE_MIGRATION_FAILED", "Failed to migrate store database"))?;
    Ok(conn)
}

/// Creates a new store file (and its parent directory). Refuses to touch an existing file.
pub fn create_store_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;

    if db_path.exists() {
        return Err(AppError::new("STORE_CREATE_FAILED", "Store DB file already exists")
            .with_details(db_path.display().to_string()));
    }

    let parent = db_path.parent().ok_or_else(|| {
        AppError::new(
            "STORE_INVALID_PATH",
            "Store DB path must have a parent directory",
        )
        .with_details(db_path.display().to_string())
    })?;
    std::fs::create_dir_all(parent).map_err(|e| {
        AppError::new("STORE_CREATE_FAILED", "Failed to create store directory")
            .with_details(format!("path={}; err={}", parent.display(), e))
    })?;

    let mut conn = crate::db::open(db_path)
        .map_err(remap("STORE_CREATE_FAILED", "Failed to create store database"))?;
    crate::db::migrate(&mut conn).map_err(remap(
        "STORE_MIGRATION_FAILED",
        "Failed to migrate newly created store database",
    ))?;
    tracing::info!(path = %db_path.display(), "created incident store");
    Ok(conn)
}

/// Opens the store at `db_path`, creating it first when the file does not exist yet.
pub fn open_or_create_store(db_path: &Path) -> Result<Connection, AppError> {
    if db_path.exists() {
        open_store_connection(db_path)
    } else {
        create_store_connection(db_path)
    }
}

pub fn open_store(db_path: &Path) -> Result<StoreMetadata, AppError> {
    let conn = open_store_connection(db_path)?;
    metadata_for(&conn, db_path)
}

pub fn create_store(db_path: &Path) -> Result<StoreMetadata, AppError> {
    let conn = create_store_connection(db_path)?;
    metadata_for(&conn, db_path)
}

pub fn store_is_empty(db_path: &Path) -> Result<bool, AppError> {
    Ok(open_store(db_path)?.is_empty())
}
