use std::time::Duration;

use ael_core::error::AppError;

use crate::config::RelayConfig;

#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    timeout: Duration,
}

fn invalid_url(reason: &str, base_url: &str) -> AppError {
    AppError::new("RELAY_URL_INVALID", format!("Mail relay URL {reason}"))
        .with_details(format!("base_url={base_url}"))
}

fn check_authority(authority: &str, base_url: &str) -> Result<(), AppError> {
    if authority.is_empty() {
        return Err(invalid_url("must include a host", base_url));
    }
    if authority.contains('@') {
        return Err(invalid_url("must not carry credentials", base_url));
    }

    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid_url("has an unterminated IPv6 host", base_url))?;
        match tail {
            "" => (host, None),
            t => match t.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(invalid_url("has a malformed host", base_url)),
            },
        }
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(invalid_url("must include a host", base_url));
    }
    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {}
            _ => return Err(invalid_url("has an invalid port", base_url)),
        }
    }
    Ok(())
}

impl RelayClient {
    /// Client for an HTTP mail relay at `base_url`, e.g. `http://127.0.0.1:8025` or
    /// `https://relay.internal/mail`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let rest = base_url
            .strip_prefix("http://")
            .or_else(|| base_url.strip_prefix("https://"))
            .ok_or_else(|| invalid_url("must use http or https", &base_url))?;
        if rest.contains('?') || rest.contains('#') {
            return Err(invalid_url("must not contain a query or fragment", &base_url));
        }
        let authority = rest.split('/').next().unwrap_or_default();
        check_authority(authority, &base_url)?;

        if timeout.is_zero() {
            return Err(AppError::new("RELAY_TIMEOUT_INVALID", "Relay timeout must be positive"));
        }

        Ok(Self { base_url, timeout })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, AppError> {
        config.validate()?;
        Self::new(&config.base_url, Duration::from_millis(config.timeout_ms))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let resp = ureq::get(&self.endpoint("health"))
            .timeout(self.timeout)
            .call();

        match resp {
            Ok(r) if (200..300).contains(&r.status()) => Ok(()),
            Ok(r) => Err(
                AppError::new("RELAY_UNHEALTHY", "Mail relay health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(code, _)) => Err(
                AppError::new("RELAY_UNHEALTHY", "Mail relay health check failed")
                    .with_details(format!("status={code}")),
            ),
            Err(e) => Err(AppError::new("RELAY_UNREACHABLE", "Failed to reach mail relay")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[test]
    fn accepts_http_and_https_relays() {
        assert!(RelayClient::new("http://127.0.0.1:8025", T).is_ok());
        assert!(RelayClient::new("https://relay.example.com", T).is_ok());
        assert!(RelayClient::new("https://relay.example.com/mail/", T).is_ok());
        assert!(RelayClient::new("http://[::1]:8025", T).is_ok());

        let c = RelayClient::new("http://127.0.0.1:8025/", T).unwrap();
        assert_eq!(c.base_url(), "http://127.0.0.1:8025");
        assert_eq!(c.endpoint("send"), "http://127.0.0.1:8025/send");
    }

    #[test]
    fn rejects_malformed_relay_urls() {
        for bad in [
            "",
            "127.0.0.1:8025",
            "ftp://relay.example.com",
            "http://",
            "http:///send",
            "http://:8025",
            "http://relay.example.com:",
            "http://relay.example.com:0",
            "http://relay.example.com:99999",
            "http://user@relay.example.com",
            "http://relay.example.com/?x=1",
            "http://relay.example.com/#frag",
            "http://[::1",
        ] {
            let err = RelayClient::new(bad, T).unwrap_err();
            assert_eq!(err.code, "RELAY_URL_INVALID", "{bad}");
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = RelayClient::new("http://127.0.0.1:8025", Duration::ZERO).unwrap_err();
        assert_eq!(err.code, "RELAY_TIMEOUT_INVALID");
    }
}
