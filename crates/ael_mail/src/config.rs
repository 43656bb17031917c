use std::env;

use serde::{Deserialize, Serialize};

use ael_core::error::AppError;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8025";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELAY_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `AEL_RELAY_URL` and `AEL_RELAY_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, AppError> {
        let mut cfg = Self::default();
        if let Ok(url) = env::var("AEL_RELAY_URL") {
            if !url.trim().is_empty() {
                cfg.base_url = url.trim().to_string();
            }
        }
        if let Ok(raw) = env::var("AEL_RELAY_TIMEOUT_MS") {
            if !raw.trim().is_empty() {
                cfg.timeout_ms = raw.trim().parse().map_err(|_| {
                    AppError::new("CONFIG_INVALID", "AEL_RELAY_TIMEOUT_MS must be an integer")
                        .with_details(format!("value={raw:?}"))
                })?;
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::new("CONFIG_INVALID", "base_url is required"));
        }
        if self.timeout_ms == 0 {
            return Err(AppError::new("CONFIG_INVALID", "timeout_ms must be positive"));
        }
        Ok(())
    }
}
