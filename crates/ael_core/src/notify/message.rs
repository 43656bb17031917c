use serde::{Deserialize, Serialize};

use crate::config::{is_plausible_address, NotificationConfig};
use crate::domain::Incident;
use crate::error::AppError;
use crate::normalize::timestamps::display_timestamp;
use crate::validate::ValidationVerdict;

const PRE_STYLE: &str =
    "background-color: #f5f5f5; padding: 10px; border-radius: 4px; overflow-x: auto;";
const LABEL_STYLE: &str =
    "border: 1px solid #ddd; padding: 8px; font-weight: bold; background-color: #f9f9f9;";
const VALUE_STYLE: &str = "border: 1px solid #ddd; padding: 8px;";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn table_row(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!(
        "<tr><td style='{LABEL_STYLE}'>{label}</td><td style='{VALUE_STYLE}'>{}</td></tr>",
        escape_html(value)
    ));
}

fn pre_block(out: &mut String, heading: &str, text: &str) {
    out.push_str(&format!(
        "<h3>{heading}</h3><pre style='{PRE_STYLE}'>{}</pre>",
        escape_html(text)
    ));
}

fn render_body(incident: &Incident, verdict: &ValidationVerdict) -> Result<String, AppError> {
    let mut out = String::new();
    out.push_str("<html><body style='font-family: Arial, sans-serif;'>");
    out.push_str("<h2 style='color: #d32f2f;'>API Error Notification</h2>");
    out.push_str("<p>A validated API error has been logged and requires investigation.</p>");

    out.push_str("<h3>Error Details</h3>");
    out.push_str("<table style='border-collapse: collapse; width: 100%;'>");
    table_row(&mut out, "Endpoint", &incident.api_endpoint);
    table_row(&mut out, "HTTP Method", incident.http_method.as_str());
    table_row(&mut out, "Response Status", &incident.response_status.to_string());
    table_row(&mut out, "Timestamp", &display_timestamp(&incident.timestamp)?);
    table_row(&mut out, "Environment", &incident.environment);
    out.push_str("</table>");

    pre_block(&mut out, "Request Payload", &incident.request_payload);
    pre_block(&mut out, "Response Body", &incident.response_body);

    out.push_str("<h3>Validation Results</h3>");
    out.push_str("<p style='color: #4caf50; font-weight: bold;'>&#10003; Validation Passed</p>");

    if !verdict.warnings.is_empty() {
        out.push_str("<h4>Warnings:</h4><ul>");
        for w in &verdict.warnings {
            out.push_str(&format!("<li>{}</li>", escape_html(&w.message)));
        }
        out.push_str("</ul>");
    }

    out.push_str("<hr style='margin-top: 20px;'>");
    out.push_str(
        "<p style='color: #666; font-size: 12px;'>This is an automated notification from the API Error Logger.</p>",
    );
    out.push_str("</body></html>");
    Ok(out)
}

fn checked_address(field: &str, address: &str) -> Result<String, AppError> {
    let address = address.trim();
    if !is_plausible_address(address) {
        return Err(AppError::new(
            "NOTIFY_ADDRESS_INVALID",
            format!("Invalid {field} address"),
        )
        .with_details(format!("value={address:?}")));
    }
    Ok(address.to_string())
}

/// Build the investigation notice. Fails only on addressing or rendering problems; both count
/// as delivery failures for the caller.
pub fn compose_message(
    config: &NotificationConfig,
    incident: &Incident,
    verdict: &ValidationVerdict,
) -> Result<OutgoingMessage, AppError> {
    let from = checked_address("sender", &config.from_address)?;
    let to = checked_address("recipient", &config.investigation_team)?;
    // Subjects are single-line headers.
    let endpoint: String = incident
        .api_endpoint
        .chars()
        .filter(|c| !c.is_control())
        .collect();

    Ok(OutgoingMessage {
        from,
        to,
        subject: format!("{} - {}", config.subject_prefix.trim(), endpoint),
        html_body: render_body(incident, verdict)?,
    })
}
