use serde::{Deserialize, Serialize};

/// HTTP methods an interface description can declare, in the fixed precedence used whenever
/// allowed methods are enumerated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Key under which the method appears inside an interface-description path item.
    pub fn document_key(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Head => "head",
            HttpMethod::Options => "options",
        }
    }

    /// Case-insensitive parse; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Unvalidated,
    Passed,
    Failed,
    UnableToValidate,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Unvalidated => "unvalidated",
            ValidationStatus::Passed => "passed",
            ValidationStatus::Failed => "failed",
            ValidationStatus::UnableToValidate => "unable_to_validate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unvalidated" => Some(Self::Unvalidated),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "unable_to_validate" => Some(Self::UnableToValidate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    NotSent,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::NotSent => "not_sent",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_sent" => Some(Self::NotSent),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One observed API error, in the shape it is persisted.
///
/// Notes:
/// - `timestamp`, `created_at` and `updated_at` are canonical RFC3339 UTC strings with
///   millisecond precision, so lexical order equals chronological order.
/// - `validation_detail` holds the serialized verdict (errors + warnings).
/// - Only the orchestrator sets the three status/detail fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: String,
    pub api_endpoint: String,
    pub http_method: HttpMethod,
    pub request_payload: String,
    pub response_status: i64,
    pub response_body: String,
    pub timestamp: String,
    pub environment: String,
    pub specification_id: Option<String>,
    pub validation_status: ValidationStatus,
    pub validation_detail: String,
    pub notification_status: NotificationStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Caller-supplied fields for a new incident. Everything is optional here so the orchestrator
/// can report every missing field at once instead of failing on the first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IncidentSubmission {
    pub api_endpoint: Option<String>,
    pub http_method: Option<String>,
    pub request_payload: Option<String>,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub timestamp: Option<String>,
    pub environment: Option<String>,
    pub api_identifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentSummary {
    pub id: String,
    pub api_endpoint: String,
    pub http_method: HttpMethod,
    pub response_status: i64,
    pub timestamp: String,
    pub environment: String,
    pub validation_status: ValidationStatus,
    pub notification_status: NotificationStatus,
}

/// Optional filters for incident listing; `None` means "no constraint". Date bounds are
/// inclusive and accept the same timestamp forms as submissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IncidentFilters {
    pub start: Option<String>,
    pub end: Option<String>,
    pub api_endpoint: Option<String>,
    pub validation_status: Option<ValidationStatus>,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse(" Options "), Some(HttpMethod::Options));
        assert_eq!(HttpMethod::parse("TRACE"), None);
        assert_eq!(HttpMethod::parse(""), None);
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            ValidationStatus::Unvalidated,
            ValidationStatus::Passed,
            ValidationStatus::Failed,
            ValidationStatus::UnableToValidate,
        ] {
            assert_eq!(ValidationStatus::from_str(s.as_str()), Some(s));
        }
        for s in [
            NotificationStatus::NotSent,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
        ] {
            assert_eq!(NotificationStatus::from_str(s.as_str()), Some(s));
        }
    }
}
