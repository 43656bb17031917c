use std::io;

use serde::Serialize;

use ael_core::error::AppError;
use ael_core::notify::{MailTransport, OutgoingMessage};

use crate::relay::RelayClient;

#[derive(Debug, Clone)]
pub struct RelayTransport {
    client: RelayClient,
}

impl RelayTransport {
    pub fn new(client: RelayClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }
}

#[derive(Debug, Clone, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

fn is_timeout(err: &ureq::Transport) -> bool {
    if err.kind() != ureq::ErrorKind::Io {
        return false;
    }
    let io_kind = std::error::Error::source(err)
        .and_then(|s| s.downcast_ref::<io::Error>())
        .map(io::Error::kind);
    match io_kind {
        Some(io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => true,
        _ => err.to_string().contains("timed out"),
    }
}

fn send_failed(status: u16) -> AppError {
    AppError::new("NOTIFY_SEND_FAILED", "Mail relay rejected the message")
        .with_details(format!("status={status}"))
}

impl MailTransport for RelayTransport {
    fn send(&self, message: &OutgoingMessage) -> Result<(), AppError> {
        let url = self.client.endpoint("send");
        let req = SendRequest {
            from: &message.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html_body,
        };
        let body = serde_json::to_value(req)
            .map_err(AppError::wrap("NOTIFY_SEND_FAILED", "Failed to encode relay request"))?;

        tracing::debug!(url = %url, to = %message.to, "posting message to mail relay");
        let resp = ureq::post(&url).timeout(self.client.timeout()).send_json(body);

        match resp {
            Ok(r) if (200..300).contains(&r.status()) => Ok(()),
            Ok(r) => Err(send_failed(r.status())),
            Err(ureq::Error::Status(code, _)) => Err(send_failed(code)),
            Err(ureq::Error::Transport(t)) if is_timeout(&t) => Err(AppError::new(
                "NOTIFY_TIMEOUT",
                "Mail relay did not answer in time",
            )
            .with_details("timeout")
            .with_retryable(true)),
            Err(e) => Err(AppError::new("NOTIFY_SEND_FAILED", "Failed to call mail relay")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}
