//! Matches a recorded incident against an interface description and produces a verdict.
//!
//! Three checks run in order and accumulate into one verdict:
//! 1. path + method resolution (a miss here ends the run),
//! 2. required parameters (advisory warnings only),
//! 3. request payload against the declared body schema.
//!
//! The engine is pure: it reads the model, never mutates it, and never returns an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Incident, ValidationWarning};
use crate::error::AppError;
use crate::spec::{BodySchema, Operation, PathEntry, SpecificationModel};

pub const SPECIFICATION_NOT_FOUND: &str = "specification not found - unable to validate";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub expected_type: Option<String>,
    pub actual_value: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            expected_type: None,
            actual_value: None,
        }
    }

    pub fn expected(mut self, expected_type: impl Into<String>) -> Self {
        self.expected_type = Some(expected_type.into());
        self
    }

    pub fn actual(mut self, actual_value: impl Into<String>) -> Self {
        self.actual_value = Some(actual_value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationVerdict {
    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: false,
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn specification_missing() -> Self {
        Self::failure(vec![ValidationError::new(
            "specification",
            SPECIFICATION_NOT_FOUND,
        )])
    }

    /// True for the sentinel verdict produced when no specification was available.
    pub fn is_specification_missing(&self) -> bool {
        matches!(self.errors.as_slice(), [only] if only.field == "specification")
    }
}

/// Errors and warnings threaded through the checks; validity is decided once at the end.
#[derive(Debug, Default)]
struct VerdictAccumulator {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
}

impl VerdictAccumulator {
    fn error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    fn warn(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    fn finish(self) -> ValidationVerdict {
        ValidationVerdict {
            is_valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

/// Path segments the way the incident log has always counted them: a leading `/` yields an
/// empty first segment and trailing empty segments are dropped.
fn segments(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').collect();
    while parts.len() > 1 && parts.last() == Some(&"") {
        parts.pop();
    }
    parts
}

fn is_placeholder(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}')
}

/// `/users/{id}` matches `/users/42`: equal segment counts, literal segments equal, each
/// placeholder segment matches exactly one segment.
pub fn matches_path_pattern(endpoint: &str, pattern: &str) -> bool {
    let endpoint_parts = segments(endpoint);
    let pattern_parts = segments(pattern);
    endpoint_parts.len() == pattern_parts.len()
        && pattern_parts
            .iter()
            .zip(&endpoint_parts)
            .all(|(p, e)| is_placeholder(p) || p == e)
}

/// Exact match first, then the first declared pattern that matches. Overlapping patterns are
/// decided by declaration order, not specificity.
pub fn resolve_path<'m>(model: &'m SpecificationModel, endpoint: &str) -> Option<&'m PathEntry> {
    model
        .paths
        .iter()
        .find(|p| p.pattern == endpoint)
        .or_else(|| {
            model
                .paths
                .iter()
                .find(|p| matches_path_pattern(endpoint, &p.pattern))
        })
}

fn check_model(model: &SpecificationModel) -> Result<(), AppError> {
    for entry in &model.paths {
        if entry.pattern.trim().is_empty() || !entry.pattern.starts_with('/') {
            return Err(AppError::new(
                "VALIDATION_MODEL_INVALID",
                "Specification model contains an invalid path pattern",
            )
            .with_details(format!("pattern={:?}", entry.pattern)));
        }
    }
    Ok(())
}

fn resolve_operation<'m>(
    incident: &Incident,
    model: &'m SpecificationModel,
    acc: &mut VerdictAccumulator,
) -> Option<&'m Operation> {
    let endpoint = incident.api_endpoint.as_str();
    let Some(entry) = resolve_path(model, endpoint) else {
        acc.error(
            ValidationError::new("apiEndpoint", "endpoint not found")
                .expected("valid endpoint")
                .actual(endpoint),
        );
        return None;
    };

    let method = incident.http_method;
    match entry.operations.operation(method) {
        Some(op) => Some(op),
        None => {
            let allowed: Vec<&str> = entry
                .operations
                .allowed_methods()
                .iter()
                .map(|m| m.as_str())
                .collect();
            acc.error(
                ValidationError::new("httpMethod", "method not allowed")
                    .expected(allowed.join(", "))
                    .actual(method.as_str()),
            );
            None
        }
    }
}

// Advisory only: the payload is not inspected for these parameters.
fn check_required_parameters(operation: &Operation, acc: &mut VerdictAccumulator) {
    for p in operation.parameters.iter().filter(|p| p.required) {
        acc.warn(
            ValidationWarning::new(
                "VALIDATION_REQUIRED_PARAMETER",
                format!("Required parameter '{}' should be present", p.name),
            )
            .with_details(format!("parameter={}", p.name)),
        );
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn kind_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        // Unknown type keywords are not ours to judge.
        _ => true,
    }
}

fn check_schema(payload: &Value, schema: &BodySchema, acc: &mut VerdictAccumulator) {
    if let Some(expected) = schema.schema_type.as_deref() {
        if !kind_matches(expected, payload) {
            acc.error(
                ValidationError::new("requestPayload", "payload type mismatch")
                    .expected(expected)
                    .actual(json_kind(payload)),
            );
            return;
        }
    }

    for field in &schema.required {
        let present = payload
            .as_object()
            .is_some_and(|obj| obj.contains_key(field));
        if !present {
            acc.error(
                ValidationError::new(format!("requestPayload.{field}"), "required field missing")
                    .expected("required")
                    .actual("missing"),
            );
        }
    }
}

fn check_payload(incident: &Incident, operation: &Operation, acc: &mut VerdictAccumulator) {
    let payload = incident.request_payload.as_str();
    if payload.trim().is_empty() {
        return;
    }

    let Some(body) = &operation.request_body else {
        acc.warn(ValidationWarning::new(
            "VALIDATION_PAYLOAD_NOT_EXPECTED",
            "Request body provided but not expected by specification",
        ));
        return;
    };

    let parsed: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            acc.error(
                ValidationError::new("requestPayload", format!("Invalid JSON payload: {e}"))
                    .expected("valid JSON")
                    .actual(payload),
            );
            return;
        }
    };

    if let Some(schema) = &body.schema {
        check_schema(&parsed, schema, acc);
    }
}

fn run_checks(
    incident: &Incident,
    model: &SpecificationModel,
) -> Result<ValidationVerdict, AppError> {
    check_model(model)?;

    let mut acc = VerdictAccumulator::default();
    let Some(operation) = resolve_operation(incident, model, &mut acc) else {
        return Ok(acc.finish());
    };
    check_required_parameters(operation, &mut acc);
    check_payload(incident, operation, &mut acc);
    Ok(acc.finish())
}

/// Validate an incident against its interface description.
///
/// `None` yields the missing-specification sentinel verdict. Internal faults become a failed
/// verdict with a single `validation` error rather than an `Err`.
pub fn validate_incident(
    incident: &Incident,
    specification: Option<&SpecificationModel>,
) -> ValidationVerdict {
    let Some(model) = specification else {
        tracing::warn!(
            incident_id = %incident.id,
            endpoint = %incident.api_endpoint,
            "no specification available; unable to validate"
        );
        return ValidationVerdict::specification_missing();
    };

    match run_checks(incident, model) {
        Ok(verdict) => {
            tracing::info!(
                incident_id = %incident.id,
                endpoint = %incident.api_endpoint,
                valid = verdict.is_valid,
                errors = verdict.errors.len(),
                warnings = verdict.warnings.len(),
                "validation completed"
            );
            verdict
        }
        Err(e) => {
            tracing::error!(incident_id = %incident.id, error = %e, "validation fault");
            ValidationVerdict::failure(vec![ValidationError::new(
                "validation",
                format!("Validation error: {}", e.diagnostic()),
            )])
        }
    }
}
