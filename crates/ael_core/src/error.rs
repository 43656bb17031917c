use serde::{Deserialize, Serialize};
use std::fmt;

pub const NOT_FOUND: &str = "DB_NOT_FOUND";

/// Single structured error shape used across the pipeline and returned to the service layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Lookup miss for a stored record, e.g. `Incident with ID 'x' not found`.
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::new(NOT_FOUND, format!("{kind} with ID '{id}' not found"))
            .with_details(format!("id={id}"))
    }

    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND
    }

    /// Builds a `map_err` adapter that keeps the source error text as details.
    pub fn wrap<E: fmt::Display>(
        code: &'static str,
        message: &'static str,
    ) -> impl FnOnce(E) -> AppError {
        move |e| AppError::new(code, message).with_details(e.to_string())
    }

    /// Message plus details, for places that persist a single diagnostic line.
    pub fn diagnostic(&self) -> String {
        match self.details.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => format!("{}: {d}", self.message),
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
