use proptest::prelude::*;
use rusqlite::Connection;

use ael_core::config::NotificationConfig;
use ael_core::db::open_in_memory_migrated;
use ael_core::domain::{
    HttpMethod, Incident, IncidentSubmission, NotificationStatus, ValidationStatus,
};
use ael_core::error::AppError;
use ael_core::incidents::{get_incident, submit_incident};
use ael_core::notify::{MailTransport, NotificationService, OutgoingMessage};
use ael_core::repo::{count_incidents, list_notification_records};
use ael_core::spec::store::upload_specification;
use ael_core::validate::validate_incident;

const ITEMS_SPEC: &str = r#"{
  "openapi": "3.0.0",
  "info": {"version": "1.0.0"},
  "paths": {
    "/items": {
      "get": {},
      "post": {"requestBody": {"content": {"application/json": {"schema": {
        "type": "object", "required": ["data"]
      }}}}}
    },
    "/items/{id}": {"put": {"requestBody": {}}}
  }
}"#;

const FIELD_ORDER: [&str; 7] = [
    "apiEndpoint",
    "httpMethod",
    "requestPayload",
    "responseStatus",
    "responseBody",
    "timestamp",
    "environment",
];

struct Scripted {
    accept: bool,
}

impl MailTransport for Scripted {
    fn send(&self, _message: &OutgoingMessage) -> Result<(), AppError> {
        if self.accept {
            Ok(())
        } else {
            Err(AppError::new("NOTIFY_SEND_FAILED", "relay refused"))
        }
    }
}

fn notifier(accept: bool) -> NotificationService<Scripted> {
    NotificationService::new(NotificationConfig::default(), Scripted { accept })
}

fn seeded() -> Connection {
    let conn = open_in_memory_migrated().expect("db");
    upload_specification(&conn, "items-api", ITEMS_SPEC, None).expect("upload");
    conn
}

fn method() -> impl Strategy<Value = HttpMethod> {
    prop::sample::select(HttpMethod::ALL.to_vec())
}

fn text() -> impl Strategy<Value = String> {
    "\\PC{1,80}".prop_filter("non-blank", |s| !s.trim().is_empty())
}

fn submission(
    endpoint: &str,
    method: HttpMethod,
    payload: &str,
    body: &str,
    environment: &str,
) -> IncidentSubmission {
    IncidentSubmission {
        api_endpoint: Some(endpoint.to_string()),
        http_method: Some(method.as_str().to_string()),
        request_payload: Some(payload.to_string()),
        response_status: Some(500),
        response_body: Some(body.to_string()),
        timestamp: Some("2026-05-06T07:08:09Z".to_string()),
        environment: Some(environment.to_string()),
        api_identifier: Some("items-api".to_string()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn persisted_incident_reads_back_unchanged(
        method in method(),
        payload in text(),
        body in text(),
        environment in text(),
        status in -1000i64..1000,
        accept in any::<bool>(),
    ) {
        let mut conn = seeded();
        let mut s = submission("/items", method, &payload, &body, &environment);
        s.response_status = Some(status);
        let stored = submit_incident(&mut conn, &notifier(accept), s).expect("submit");

        let fetched = get_incident(&conn, &stored.id).expect("fetch");
        prop_assert_eq!(&fetched, &stored);
        prop_assert_eq!(&fetched.request_payload, &payload);
        prop_assert_eq!(&fetched.response_body, &body);
        prop_assert_eq!(fetched.environment.as_str(), environment.trim());
        prop_assert_eq!(fetched.http_method, method);
        prop_assert_eq!(fetched.response_status, status);
    }

    #[test]
    fn notification_happens_exactly_when_validation_passes(
        endpoint in prop::sample::select(vec!["/items", "/items/9", "/items/9/x", "/orders", "/"]),
        method in method(),
        payload in prop::sample::select(vec![
            r#"{"data":1}"#, r#"{"id":1}"#, "{}", "[]", "not json",
        ]),
        accept in any::<bool>(),
        known_spec in any::<bool>(),
    ) {
        let mut conn = seeded();
        let mut s = submission(endpoint, method, payload, "err", "prod");
        if !known_spec {
            s.api_identifier = Some("unregistered".to_string());
        }
        let incident = submit_incident(&mut conn, &notifier(accept), s).expect("submit");
        let records = list_notification_records(&conn, &incident.id).unwrap();

        if incident.validation_status == ValidationStatus::Passed {
            let expected = if accept { NotificationStatus::Sent } else { NotificationStatus::Failed };
            prop_assert_eq!(incident.notification_status, expected);
            prop_assert_eq!(records.len(), 1);
        } else {
            prop_assert_eq!(incident.validation_status, ValidationStatus::Failed);
            prop_assert_eq!(incident.notification_status, NotificationStatus::NotSent);
            prop_assert!(records.is_empty());
        }
    }

    #[test]
    fn absent_specification_always_yields_the_sentinel(
        method in method(),
        endpoint in "/[a-z{}/]{0,24}",
        payload in "\\PC{0,40}",
        environment in text(),
    ) {
        let incident = Incident {
            id: "any".to_string(),
            api_endpoint: endpoint,
            http_method: method,
            request_payload: payload,
            response_status: 503,
            response_body: String::new(),
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
            environment,
            specification_id: None,
            validation_status: ValidationStatus::Unvalidated,
            validation_detail: String::new(),
            notification_status: NotificationStatus::NotSent,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        };
        let verdict = validate_incident(&incident, None);
        prop_assert!(!verdict.is_valid);
        prop_assert_eq!(verdict.errors.len(), 1);
        prop_assert_eq!(verdict.errors[0].field.as_str(), "specification");
        prop_assert!(verdict.errors[0].message.contains("not found"));
    }

    #[test]
    fn rejection_names_missing_fields_in_fixed_order(
        mask in 1u8..128,
        blank_instead_of_absent in any::<bool>(),
    ) {
        let missing = |i: usize| mask & (1 << i) != 0;
        let gap = || if blank_instead_of_absent { Some("  ".to_string()) } else { None };

        let mut s = submission("/items", HttpMethod::Post, r#"{"data":1}"#, "err", "prod");
        if missing(0) { s.api_endpoint = gap(); }
        if missing(1) { s.http_method = gap(); }
        if missing(2) { s.request_payload = gap(); }
        if missing(3) { s.response_status = None; }
        if missing(4) { s.response_body = gap(); }
        if missing(5) { s.timestamp = gap(); }
        if missing(6) { s.environment = gap(); }

        let expected: Vec<&str> = FIELD_ORDER
            .iter()
            .enumerate()
            .filter(|(i, _)| missing(*i))
            .map(|(_, name)| *name)
            .collect();

        let mut conn = seeded();
        let err = submit_incident(&mut conn, &notifier(true), s).unwrap_err();
        prop_assert_eq!(err.code.as_str(), "INCIDENT_MISSING_FIELDS");
        prop_assert_eq!(
            err.message,
            format!("Missing required fields: {}", expected.join(", "))
        );
        prop_assert_eq!(count_incidents(&conn).unwrap(), 0);
    }
}
