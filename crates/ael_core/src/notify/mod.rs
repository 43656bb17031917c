use std::panic::{self, AssertUnwindSafe};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::NotificationConfig;
use crate::domain::Incident;
use crate::error::AppError;
use crate::normalize::timestamps::now_canonical;
use crate::repo::insert_notification_record;
use crate::validate::ValidationVerdict;

pub mod message;

pub use message::{compose_message, escape_html, OutgoingMessage};

/// Delivery backend for investigation notices. Implementations should bound their own
/// latency and report an expired deadline as an error.
pub trait MailTransport {
    fn send(&self, message: &OutgoingMessage) -> Result<(), AppError>;
}

impl<T: MailTransport + ?Sized> MailTransport for &T {
    fn send(&self, message: &OutgoingMessage) -> Result<(), AppError> {
        (**self).send(message)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNotificationRecord {
    pub incident_id: String,
    pub recipient: String,
    pub attempted_at: String,
    pub outcome: DeliveryOutcome,
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: i64,
    pub incident_id: String,
    pub recipient: String,
    pub attempted_at: String,
    pub outcome: DeliveryOutcome,
    /// Always present and non-blank when `outcome` is `Failed`.
    pub diagnostic: Option<String>,
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "transport panicked".to_string()
    }
}

fn failure_diagnostic(err: &AppError) -> String {
    let text = err.diagnostic();
    if text.trim().is_empty() {
        format!("delivery failed ({})", err.code)
    } else {
        text
    }
}

pub struct NotificationService<T: MailTransport> {
    config: NotificationConfig,
    transport: T,
}

impl<T: MailTransport> NotificationService<T> {
    pub fn new(config: NotificationConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn attempt_delivery(
        &self,
        incident: &Incident,
        verdict: &ValidationVerdict,
    ) -> Result<(), AppError> {
        let message = compose_message(&self.config, incident, verdict)?;
        match panic::catch_unwind(AssertUnwindSafe(|| self.transport.send(&message))) {
            Ok(result) => result,
            Err(payload) => Err(AppError::new("NOTIFY_UNEXPECTED", "Unexpected error")
                .with_details(panic_text(payload))),
        }
    }

    /// Attempt one delivery without touching storage. The returned record is what `notify`
    /// persists; callers that batch their writes persist it themselves.
    ///
    /// Delivery problems never surface as `Err`: they become a `Failed` outcome with a
    /// non-blank diagnostic.
    pub fn deliver(
        &self,
        incident: &Incident,
        verdict: &ValidationVerdict,
    ) -> Result<NewNotificationRecord, AppError> {
        tracing::info!(incident_id = %incident.id, "attempting investigation notification");
        let attempted_at = now_canonical()?;

        let (outcome, diagnostic) = match self.attempt_delivery(incident, verdict) {
            Ok(()) => {
                tracing::info!(incident_id = %incident.id, "notification sent");
                (DeliveryOutcome::Sent, None)
            }
            Err(e) => {
                tracing::error!(
                    incident_id = %incident.id,
                    code = %e.code,
                    error = %e.diagnostic(),
                    "notification delivery failed"
                );
                (DeliveryOutcome::Failed, Some(failure_diagnostic(&e)))
            }
        };

        Ok(NewNotificationRecord {
            incident_id: incident.id.clone(),
            recipient: self.config.investigation_team.clone(),
            attempted_at,
            outcome,
            diagnostic,
        })
    }

    /// Attempt one delivery and record its outcome. `Err` is reserved for failing to write
    /// the record itself.
    pub fn notify(
        &self,
        conn: &Connection,
        incident: &Incident,
        verdict: &ValidationVerdict,
    ) -> Result<bool, AppError> {
        let attempt = self.deliver(incident, verdict)?;
        let record = insert_notification_record(conn, &attempt)?;
        Ok(record.outcome == DeliveryOutcome::Sent)
    }
}
