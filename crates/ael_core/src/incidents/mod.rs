//! Incident lifecycle: received -> spec resolved -> validated -> (notified) -> persisted.
//!
//! Each submission runs on one call chain. The slow parts (validation, delivery) hold no database
//! locks; the final write is one transaction, so callers see either a fully processed incident or
//! an error with nothing written.

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::domain::{
    HttpMethod, Incident, IncidentFilters, IncidentSubmission, IncidentSummary,
    NotificationStatus, ValidationStatus,
};
use crate::error::AppError;
use crate::normalize::timestamps::{normalize_timestamp, now_canonical};
use crate::notify::{
    DeliveryOutcome, MailTransport, NewNotificationRecord, NotificationRecord, NotificationService,
};
use crate::repo;
use crate::spec::store::{SpecificationStore, SqliteSpecificationStore, StoredSpecification};
use crate::validate::{validate_incident, ValidationVerdict};

/// Stored when a verdict cannot be serialized, so the incident is still recorded.
pub const VALIDATION_DETAIL_FALLBACK: &str =
    r#"{"error": "Failed to serialize validation details"}"#;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentDetail {
    pub incident: Incident,
    pub notification_records: Vec<NotificationRecord>,
}

/// Submission fields after the presence check, in their typed form.
#[derive(Debug)]
struct AcceptedSubmission {
    api_endpoint: String,
    http_method: HttpMethod,
    request_payload: String,
    response_status: i64,
    response_body: String,
    timestamp: String,
    environment: String,
    api_identifier: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn accept_submission(submission: &IncidentSubmission) -> Result<AcceptedSubmission, AppError> {
    let endpoint = present(&submission.api_endpoint);
    let method = present(&submission.http_method);
    let payload = present(&submission.request_payload);
    let body = present(&submission.response_body);
    let timestamp = present(&submission.timestamp);
    let environment = present(&submission.environment);

    let missing: Vec<&str> = [
        ("apiEndpoint", endpoint.is_none()),
        ("httpMethod", method.is_none()),
        ("requestPayload", payload.is_none()),
        ("responseStatus", submission.response_status.is_none()),
        ("responseBody", body.is_none()),
        ("timestamp", timestamp.is_none()),
        ("environment", environment.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, is_missing)| is_missing.then_some(name))
    .collect();

    let (
        Some(endpoint),
        Some(method),
        Some(payload),
        Some(response_status),
        Some(body),
        Some(timestamp),
        Some(environment),
    ) = (
        endpoint,
        method,
        payload,
        submission.response_status,
        body,
        timestamp,
        environment,
    )
    else {
        return Err(AppError::new(
            "INCIDENT_MISSING_FIELDS",
            format!("Missing required fields: {}", missing.join(", ")),
        )
        .with_details(format!("fields={}", missing.join(","))));
    };

    let http_method = HttpMethod::parse(method).ok_or_else(|| {
        AppError::new("INCIDENT_INVALID_METHOD", "Unsupported HTTP method")
            .with_details(format!("value={method:?}"))
    })?;

    let normalized = normalize_timestamp(timestamp)?.ok_or_else(|| {
        AppError::new("INCIDENT_INVALID_TIMESTAMP", "Unparseable incident timestamp")
            .with_details(format!("value={timestamp:?}"))
    })?;
    if normalized.assumed_utc {
        tracing::debug!(raw = timestamp, "incident timestamp had no zone; assumed UTC");
    }

    Ok(AcceptedSubmission {
        api_endpoint: endpoint.to_string(),
        http_method,
        request_payload: payload.to_string(),
        response_status,
        response_body: body.to_string(),
        timestamp: normalized.canonical,
        environment: environment.trim().to_string(),
        api_identifier: present(&submission.api_identifier).map(|s| s.trim().to_string()),
    })
}

/// Serialize a verdict for the incident row, degrading to the fixed fallback payload.
pub fn serialize_detail<S: Serialize>(value: &S) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize validation details");
        VALIDATION_DETAIL_FALLBACK.to_string()
    })
}

/// Read back a stored validation detail; `None` for the fallback payload or foreign JSON.
pub fn decode_verdict(validation_detail: &str) -> Option<ValidationVerdict> {
    serde_json::from_str(validation_detail).ok()
}

fn resolve_specification<S: SpecificationStore>(
    store: &S,
    api_identifier: Option<&str>,
) -> Result<Option<StoredSpecification>, AppError> {
    let Some(api_identifier) = api_identifier else {
        return Ok(None);
    };
    let found = store.fetch_by_identifier(api_identifier)?;
    match &found {
        Some(spec) => tracing::info!(
            api_identifier,
            spec_id = %spec.id,
            version = %spec.version,
            "associated incident with specification"
        ),
        None => tracing::warn!(api_identifier, "specification not found for API identifier"),
    }
    Ok(found)
}

fn evaluate<T: MailTransport>(
    conn: &Connection,
    notifier: &NotificationService<T>,
    accepted: AcceptedSubmission,
) -> Result<(Incident, Option<NewNotificationRecord>), AppError> {
    let store = SqliteSpecificationStore::new(conn);
    let specification = resolve_specification(&store, accepted.api_identifier.as_deref())?;

    let created_at = now_canonical()?;
    let mut incident = Incident {
        id: uuid::Uuid::new_v4().to_string(),
        api_endpoint: accepted.api_endpoint,
        http_method: accepted.http_method,
        request_payload: accepted.request_payload,
        response_status: accepted.response_status,
        response_body: accepted.response_body,
        timestamp: accepted.timestamp,
        environment: accepted.environment,
        specification_id: specification.as_ref().map(|s| s.id.clone()),
        validation_status: ValidationStatus::Unvalidated,
        validation_detail: String::new(),
        notification_status: NotificationStatus::NotSent,
        created_at: created_at.clone(),
        updated_at: created_at,
    };

    let verdict = validate_incident(&incident, specification.as_ref().map(|s| &s.model));
    // The missing-specification sentinel is reported like any other failed verdict.
    incident.validation_status = if verdict.is_valid {
        ValidationStatus::Passed
    } else {
        ValidationStatus::Failed
    };
    incident.validation_detail = serialize_detail(&verdict);

    let attempt = if incident.validation_status == ValidationStatus::Passed {
        Some(notifier.deliver(&incident, &verdict)?)
    } else {
        tracing::info!(incident_id = %incident.id, "validation failed; skipping notification");
        None
    };
    incident.notification_status = match attempt.as_ref().map(|a| a.outcome) {
        Some(DeliveryOutcome::Sent) => NotificationStatus::Sent,
        Some(DeliveryOutcome::Failed) => NotificationStatus::Failed,
        None => NotificationStatus::NotSent,
    };
    incident.updated_at = now_canonical()?;
    Ok((incident, attempt))
}

/// Record one API error incident: validate it against its specification, notify the
/// investigation channel when it is a genuine contract violation, and persist the result.
///
/// Lookup, validation and delivery run outside any transaction; the incident row and its
/// delivery record are then written together in one short write transaction. Missing or
/// unusable caller fields reject the submission before anything is written.
pub fn submit_incident<T: MailTransport>(
    conn: &mut Connection,
    notifier: &NotificationService<T>,
    submission: IncidentSubmission,
) -> Result<Incident, AppError> {
    tracing::info!(
        endpoint = submission.api_endpoint.as_deref().unwrap_or(""),
        "received incident submission"
    );

    let accepted = accept_submission(&submission).map_err(|e| {
        tracing::warn!(code = %e.code, error = %e.message, "rejected incident submission");
        e
    })?;

    let (incident, attempt) = evaluate(conn, notifier, accepted)?;

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(AppError::wrap("DB_TX_FAILED", "Failed to start incident transaction"))?;
    repo::insert_incident(&tx, &incident)?;
    if let Some(attempt) = &attempt {
        repo::insert_notification_record(&tx, attempt)?;
    }
    tx.commit()
        .map_err(AppError::wrap("DB_TX_FAILED", "Failed to commit incident transaction"))?;

    tracing::info!(
        incident_id = %incident.id,
        validation = incident.validation_status.as_str(),
        notification = incident.notification_status.as_str(),
        "completed incident processing"
    );
    Ok(incident)
}

pub fn get_incident(conn: &Connection, id: &str) -> Result<Incident, AppError> {
    tracing::debug!(incident_id = id, "retrieving incident");
    repo::get_incident(conn, id)
}

pub fn get_incident_detail(conn: &Connection, id: &str) -> Result<IncidentDetail, AppError> {
    let incident = repo::get_incident(conn, id)?;
    let notification_records = repo::list_notification_records(conn, id)?;
    Ok(IncidentDetail {
        incident,
        notification_records,
    })
}

fn canonical_bound(field: &str, raw: &Option<String>) -> Result<Option<String>, AppError> {
    let Some(raw) = present(raw) else {
        return Ok(None);
    };
    let normalized = normalize_timestamp(raw)?.ok_or_else(|| {
        AppError::new("INCIDENT_FILTER_INVALID", format!("Unparseable {field} filter"))
            .with_details(format!("value={raw:?}"))
    })?;
    Ok(Some(normalized.canonical))
}

/// List incident summaries matching every provided filter, newest first.
pub fn list_incidents(
    conn: &Connection,
    filters: &IncidentFilters,
) -> Result<Vec<IncidentSummary>, AppError> {
    let normalized = IncidentFilters {
        start: canonical_bound("start", &filters.start)?,
        end: canonical_bound("end", &filters.end)?,
        api_endpoint: present(&filters.api_endpoint).map(str::to_string),
        validation_status: filters.validation_status,
        environment: present(&filters.environment).map(|s| s.trim().to_string()),
    };
    tracing::debug!(?normalized, "listing incidents");
    repo::list_incidents(conn, &normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_submission() -> IncidentSubmission {
        IncidentSubmission {
            api_endpoint: Some("/items".to_string()),
            http_method: Some("post".to_string()),
            request_payload: Some("{}".to_string()),
            response_status: Some(500),
            response_body: Some("boom".to_string()),
            timestamp: Some("2026-03-01T08:00:00Z".to_string()),
            environment: Some(" staging ".to_string()),
            api_identifier: Some("  ".to_string()),
        }
    }

    #[test]
    fn accepted_submission_is_typed_and_trimmed() {
        let accepted = accept_submission(&full_submission()).unwrap();
        assert_eq!(accepted.http_method, HttpMethod::Post);
        assert_eq!(accepted.timestamp, "2026-03-01T08:00:00.000Z");
        assert_eq!(accepted.environment, "staging");
        assert_eq!(accepted.api_identifier, None);
    }

    #[test]
    fn every_missing_field_is_listed_in_fixed_order() {
        let err = accept_submission(&IncidentSubmission::default()).unwrap_err();
        assert_eq!(err.code, "INCIDENT_MISSING_FIELDS");
        assert_eq!(
            err.message,
            "Missing required fields: apiEndpoint, httpMethod, requestPayload, \
             responseStatus, responseBody, timestamp, environment"
        );
    }

    #[test]
    fn present_but_unusable_values_are_rejected() {
        let mut s = full_submission();
        s.http_method = Some("TRACE".to_string());
        assert_eq!(accept_submission(&s).unwrap_err().code, "INCIDENT_INVALID_METHOD");

        let mut s = full_submission();
        s.timestamp = Some("yesterday".to_string());
        assert_eq!(accept_submission(&s).unwrap_err().code, "INCIDENT_INVALID_TIMESTAMP");
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _s: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("nope"))
        }
    }

    #[test]
    fn serialization_failure_falls_back_to_fixed_payload() {
        assert_eq!(serialize_detail(&Unserializable), VALIDATION_DETAIL_FALLBACK);
        assert_eq!(decode_verdict(VALIDATION_DETAIL_FALLBACK), None);
    }
}
