use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::parse::parse_specification;
use super::SpecificationModel;
use crate::error::AppError;
use crate::normalize::timestamps::now_canonical;

/// Lookup seam used by the orchestrator. Absence is `Ok(None)`, never an error.
pub trait SpecificationStore {
    fn fetch_by_identifier(
        &self,
        api_identifier: &str,
    ) -> Result<Option<StoredSpecification>, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSpecification {
    pub id: String,
    pub api_identifier: String,
    pub spec_content: String,
    pub content_sha256: String,
    pub model: SpecificationModel,
    pub version: String,
    pub uploaded_by: Option<String>,
    pub uploaded_at: String,
    pub updated_at: String,
}

/// Listing row without the (potentially large) document text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecificationSummary {
    pub id: String,
    pub api_identifier: String,
    pub version: String,
    pub content_sha256: String,
    pub uploaded_by: Option<String>,
    pub updated_at: String,
}

pub struct SqliteSpecificationStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteSpecificationStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl SpecificationStore for SqliteSpecificationStore<'_> {
    fn fetch_by_identifier(
        &self,
        api_identifier: &str,
    ) -> Result<Option<StoredSpecification>, AppError> {
        get_specification_by_identifier(self.conn, api_identifier)
    }
}

fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

const SELECT_COLUMNS: &str = r#"
  SELECT id, api_identifier, spec_content, content_sha256, model_json, version,
         uploaded_by, uploaded_at, updated_at
  FROM specifications
"#;

fn map_row(row: &rusqlite::Row<'_>) -> Result<StoredSpecification, rusqlite::Error> {
    let model_json: String = row.get(4)?;
    let model: SpecificationModel = serde_json::from_str(&model_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredSpecification {
        id: row.get(0)?,
        api_identifier: row.get(1)?,
        spec_content: row.get(2)?,
        content_sha256: row.get(3)?,
        model,
        version: row.get(5)?,
        uploaded_by: row.get(6)?,
        uploaded_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn query_one(
    conn: &Connection,
    clause: &str,
    key: &str,
) -> Result<Option<StoredSpecification>, AppError> {
    conn.query_row(&format!("{SELECT_COLUMNS} WHERE {clause} = ?1"), [key], map_row)
        .optional()
        .map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to query specification",
        ))
}

pub fn get_specification_by_identifier(
    conn: &Connection,
    api_identifier: &str,
) -> Result<Option<StoredSpecification>, AppError> {
    query_one(conn, "api_identifier", api_identifier.trim())
}

pub fn get_specification(conn: &Connection, id: &str) -> Result<StoredSpecification, AppError> {
    query_one(conn, "id", id)?.ok_or_else(|| AppError::not_found("Specification", id))
}

pub fn list_specifications(conn: &Connection) -> Result<Vec<SpecificationSummary>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, api_identifier, version, content_sha256, uploaded_by, updated_at
      FROM specifications
      ORDER BY api_identifier ASC, id ASC
      "#,
        )
        .map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to prepare specification list query",
        ))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(SpecificationSummary {
                id: row.get(0)?,
                api_identifier: row.get(1)?,
                version: row.get(2)?,
                content_sha256: row.get(3)?,
                uploaded_by: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })
        .map_err(AppError::wrap("DB_QUERY_FAILED", "Failed to query specifications"))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to decode specification row",
        ))?);
    }
    Ok(out)
}

fn encode_model(model: &SpecificationModel) -> Result<String, AppError> {
    serde_json::to_string(model).map_err(AppError::wrap(
        "DB_ENCODE_FAILED",
        "Failed to encode specification model",
    ))
}

/// Parse and store a new interface description under `api_identifier`.
pub fn upload_specification(
    conn: &Connection,
    api_identifier: &str,
    spec_content: &str,
    uploaded_by: Option<&str>,
) -> Result<StoredSpecification, AppError> {
    let api_identifier = api_identifier.trim();
    if api_identifier.is_empty() {
        return Err(AppError::new(
            "SPEC_IDENTIFIER_REQUIRED",
            "API identifier is required",
        ));
    }

    let parsed = parse_specification(spec_content)?;

    if get_specification_by_identifier(conn, api_identifier)?.is_some() {
        return Err(AppError::new(
            "SPEC_ALREADY_EXISTS",
            format!(
                "Specification with identifier '{api_identifier}' already exists. Use update instead."
            ),
        ));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = now_canonical()?;
    conn.execute(
        r#"
        INSERT INTO specifications(
          id, api_identifier, spec_content, content_sha256, model_json, version,
          uploaded_by, uploaded_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
        "#,
        params![
            id,
            api_identifier,
            spec_content,
            content_hash(spec_content),
            encode_model(&parsed.model)?,
            parsed.version,
            uploaded_by,
            now
        ],
    )
    .map_err(AppError::wrap("DB_WRITE_FAILED", "Failed to store specification"))?;

    tracing::info!(
        api_identifier,
        spec_id = %id,
        version = %parsed.version,
        paths = parsed.model.paths.len(),
        "uploaded specification"
    );
    get_specification(conn, &id)
}

/// Replace the document behind an existing specification. Incidents already recorded keep the
/// verdict they were given.
pub fn update_specification(
    conn: &Connection,
    id: &str,
    spec_content: &str,
    updated_by: Option<&str>,
) -> Result<StoredSpecification, AppError> {
    let parsed = parse_specification(spec_content)?;
    let now = now_canonical()?;

    let changed = conn
        .execute(
            r#"
            UPDATE specifications
            SET spec_content = ?1, content_sha256 = ?2, model_json = ?3, version = ?4,
                uploaded_by = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
            params![
                spec_content,
                content_hash(spec_content),
                encode_model(&parsed.model)?,
                parsed.version,
                updated_by,
                now,
                id
            ],
        )
        .map_err(AppError::wrap("DB_WRITE_FAILED", "Failed to update specification"))?;

    if changed == 0 {
        return Err(AppError::not_found("Specification", id));
    }

    tracing::info!(spec_id = id, version = %parsed.version, "updated specification");
    get_specification(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_migrated;

    const DOC_V1: &str = r#"{"openapi":"3.0.0","info":{"version":"1.0"},"paths":{"/items":{"get":{}}}}"#;
    const DOC_V2: &str = r#"{"openapi":"3.0.0","info":{"version":"2.0"},"paths":{"/items":{"get":{},"post":{}}}}"#;

    #[test]
    fn upload_then_fetch_through_the_store_trait() {
        let conn = open_in_memory_migrated().unwrap();
        let stored = upload_specification(&conn, " orders ", DOC_V1, Some("alice")).unwrap();
        assert_eq!(stored.api_identifier, "orders");
        assert_eq!(stored.version, "1.0");
        assert_eq!(stored.content_sha256.len(), 64);

        let store = SqliteSpecificationStore::new(&conn);
        let fetched = store.fetch_by_identifier("orders").unwrap().expect("present");
        assert_eq!(fetched, stored);
        assert!(store.fetch_by_identifier("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let conn = open_in_memory_migrated().unwrap();
        upload_specification(&conn, "orders", DOC_V1, None).unwrap();
        let err = upload_specification(&conn, "orders", DOC_V2, None).unwrap_err();
        assert_eq!(err.code, "SPEC_ALREADY_EXISTS");
        assert!(err.message.contains("Use update instead"));
    }

    #[test]
    fn invalid_documents_are_not_stored() {
        let conn = open_in_memory_migrated().unwrap();
        let err = upload_specification(&conn, "orders", "{\"paths\":{}}", None).unwrap_err();
        assert_eq!(err.code, "SPEC_INVALID");
        assert!(list_specifications(&conn).unwrap().is_empty());

        let err = upload_specification(&conn, "  ", DOC_V1, None).unwrap_err();
        assert_eq!(err.code, "SPEC_IDENTIFIER_REQUIRED");
    }

    #[test]
    fn update_replaces_model_and_version() {
        let conn = open_in_memory_migrated().unwrap();
        let v1 = upload_specification(&conn, "orders", DOC_V1, None).unwrap();
        let v2 = update_specification(&conn, &v1.id, DOC_V2, Some("bob")).unwrap();
        assert_eq!(v2.id, v1.id);
        assert_eq!(v2.version, "2.0");
        assert_eq!(v2.uploaded_by.as_deref(), Some("bob"));
        assert_ne!(v2.content_sha256, v1.content_sha256);
        assert!(v2.updated_at >= v1.updated_at);
        assert_eq!(v2.model.paths[0].operations.allowed_methods().len(), 2);

        let err = update_specification(&conn, "nope", DOC_V2, None).unwrap_err();
        assert!(err.is_not_found());
    }
}
