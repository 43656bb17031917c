use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{
    HttpMethod, Incident, IncidentFilters, IncidentSummary, NotificationStatus, ValidationStatus,
};
use crate::error::AppError;
use crate::notify::{DeliveryOutcome, NewNotificationRecord, NotificationRecord};

fn invalid_column(idx: usize, what: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid {what}"),
        )),
    )
}

fn method_at(row: &rusqlite::Row<'_>, idx: usize) -> Result<HttpMethod, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    HttpMethod::parse(&raw).ok_or_else(|| invalid_column(idx, "http_method"))
}

fn validation_status_at(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<ValidationStatus, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    ValidationStatus::from_str(&raw).ok_or_else(|| invalid_column(idx, "validation_status"))
}

fn notification_status_at(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<NotificationStatus, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    NotificationStatus::from_str(&raw).ok_or_else(|| invalid_column(idx, "notification_status"))
}

fn map_incident(row: &rusqlite::Row<'_>) -> Result<Incident, rusqlite::Error> {
    Ok(Incident {
        id: row.get(0)?,
        api_endpoint: row.get(1)?,
        http_method: method_at(row, 2)?,
        request_payload: row.get(3)?,
        response_status: row.get(4)?,
        response_body: row.get(5)?,
        timestamp: row.get(6)?,
        environment: row.get(7)?,
        specification_id: row.get(8)?,
        validation_status: validation_status_at(row, 9)?,
        validation_detail: row.get(10)?,
        notification_status: notification_status_at(row, 11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Writes the incident in its final form. There is no update path: an incident row is written
/// exactly once.
pub fn insert_incident(conn: &Connection, incident: &Incident) -> Result<(), AppError> {
    if incident.validation_status == ValidationStatus::Unvalidated {
        return Err(AppError::new(
            "DB_INCIDENT_NOT_FINAL",
            "Refusing to persist an unvalidated incident",
        )
        .with_details(format!("id={}", incident.id)));
    }

    conn.execute(
        r#"
        INSERT INTO incidents(
          id, api_endpoint, http_method, request_payload, response_status, response_body,
          timestamp, environment, specification_id, validation_status, validation_detail,
          notification_status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            incident.id,
            incident.api_endpoint,
            incident.http_method.as_str(),
            incident.request_payload,
            incident.response_status,
            incident.response_body,
            incident.timestamp,
            incident.environment,
            incident.specification_id,
            incident.validation_status.as_str(),
            incident.validation_detail,
            incident.notification_status.as_str(),
            incident.created_at,
            incident.updated_at
        ],
    )
    .map_err(AppError::wrap("DB_WRITE_FAILED", "Failed to store incident"))?;
    Ok(())
}

pub fn get_incident(conn: &Connection, id: &str) -> Result<Incident, AppError> {
    conn.query_row(
        r#"
      SELECT
        id, api_endpoint, http_method, request_payload, response_status, response_body,
        timestamp, environment, specification_id, validation_status, validation_detail,
        notification_status, created_at, updated_at
      FROM incidents
      WHERE id = ?1
      "#,
        [id],
        map_incident,
    )
    .optional()
    .map_err(AppError::wrap("DB_QUERY_FAILED", "Failed to query incident"))?
    .ok_or_else(|| AppError::not_found("Incident", id))
}

pub fn count_incidents(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
        .map_err(AppError::wrap("DB_QUERY_FAILED", "Failed to count incidents"))
}

/// Filtered listing, newest observation first; `id` breaks ties so equal inputs list equally.
/// Date bounds must already be canonical timestamps.
pub fn list_incidents(
    conn: &Connection,
    filters: &IncidentFilters,
) -> Result<Vec<IncidentSummary>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT
        id, api_endpoint, http_method, response_status, timestamp, environment,
        validation_status, notification_status
      FROM incidents
      WHERE (?1 IS NULL OR timestamp >= ?1)
        AND (?2 IS NULL OR timestamp <= ?2)
        AND (?3 IS NULL OR api_endpoint = ?3)
        AND (?4 IS NULL OR validation_status = ?4)
        AND (?5 IS NULL OR environment = ?5)
      ORDER BY timestamp DESC, id ASC
      "#,
        )
        .map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to prepare incidents query",
        ))?;

    let rows = stmt
        .query_map(
            params![
                filters.start,
                filters.end,
                filters.api_endpoint,
                filters.validation_status.map(|s| s.as_str()),
                filters.environment
            ],
            |row| {
                Ok(IncidentSummary {
                    id: row.get(0)?,
                    api_endpoint: row.get(1)?,
                    http_method: method_at(row, 2)?,
                    response_status: row.get(3)?,
                    timestamp: row.get(4)?,
                    environment: row.get(5)?,
                    validation_status: validation_status_at(row, 6)?,
                    notification_status: notification_status_at(row, 7)?,
                })
            },
        )
        .map_err(AppError::wrap("DB_QUERY_FAILED", "Failed to query incidents"))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to decode incident row",
        ))?);
    }
    Ok(out)
}

pub fn insert_notification_record(
    conn: &Connection,
    record: &NewNotificationRecord,
) -> Result<NotificationRecord, AppError> {
    conn.execute(
        r#"
        INSERT INTO notification_records(incident_id, recipient, attempted_at, outcome, diagnostic)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            record.incident_id,
            record.recipient,
            record.attempted_at,
            record.outcome.as_str(),
            record.diagnostic
        ],
    )
    .map_err(AppError::wrap(
        "DB_WRITE_FAILED",
        "Failed to store notification record",
    ))?;

    Ok(NotificationRecord {
        id: conn.last_insert_rowid(),
        incident_id: record.incident_id.clone(),
        recipient: record.recipient.clone(),
        attempted_at: record.attempted_at.clone(),
        outcome: record.outcome,
        diagnostic: record.diagnostic.clone(),
    })
}

pub fn list_notification_records(
    conn: &Connection,
    incident_id: &str,
) -> Result<Vec<NotificationRecord>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, incident_id, recipient, attempted_at, outcome, diagnostic
      FROM notification_records
      WHERE incident_id = ?1
      ORDER BY id ASC
      "#,
        )
        .map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to prepare notification records query",
        ))?;

    let rows = stmt
        .query_map([incident_id], |row| {
            let outcome_raw: String = row.get(4)?;
            let outcome = DeliveryOutcome::from_str(&outcome_raw)
                .ok_or_else(|| invalid_column(4, "outcome"))?;
            Ok(NotificationRecord {
                id: row.get(0)?,
                incident_id: row.get(1)?,
                recipient: row.get(2)?,
                attempted_at: row.get(3)?,
                outcome,
                diagnostic: row.get(5)?,
            })
        })
        .map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to query notification records",
        ))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(AppError::wrap(
            "DB_QUERY_FAILED",
            "Failed to decode notification record row",
        ))?);
    }
    Ok(out)
}
