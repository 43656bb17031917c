use std::env;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_DB_PATH: &str = "api-error-log.sqlite";
pub const DEFAULT_SUBJECT_PREFIX: &str = "API Error Notification";
pub const DEFAULT_FROM_ADDRESS: &str = "api-error-logger@localhost";
pub const DEFAULT_INVESTIGATION_TEAM: &str = "investigations@localhost";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: String,
    pub notification: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            notification: NotificationConfig::default(),
        }
    }
}

/// Who investigation notices come from and go to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    pub from_address: String,
    pub investigation_team: String,
    pub subject_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
            investigation_team: DEFAULT_INVESTIGATION_TEAM.to_string(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }
}

/// Single `local@domain` mailbox, no display name, no whitespace.
pub fn is_plausible_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !address.chars().any(|c| c.is_whitespace() || c == '<' || c == '>' || c == ',')
}

fn env_override(target: &mut String, key: &str) {
    if let Ok(v) = env::var(key) {
        let v = v.trim();
        if !v.is_empty() {
            *target = v.to_string();
        }
    }
}

impl NotificationConfig {
    /// Defaults overridden by `AEL_MAIL_FROM`, `AEL_MAIL_TO` and `AEL_MAIL_SUBJECT_PREFIX`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        env_override(&mut cfg.from_address, "AEL_MAIL_FROM");
        env_override(&mut cfg.investigation_team, "AEL_MAIL_TO");
        env_override(&mut cfg.subject_prefix, "AEL_MAIL_SUBJECT_PREFIX");
        cfg
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("from_address", &self.from_address),
            ("investigation_team", &self.investigation_team),
        ] {
            if !is_plausible_address(value.trim()) {
                return Err(AppError::new(
                    "CONFIG_INVALID",
                    format!("{field} is not a valid mailbox address"),
                )
                .with_details(format!("value={value:?}")));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut db_path = DEFAULT_DB_PATH.to_string();
        env_override(&mut db_path, "AEL_DB_PATH");
        Self {
            db_path,
            notification: NotificationConfig::from_env(),
        }
    }

    /// Missing keys take their defaults; unknown keys are ignored.
    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        let cfg: Self = serde_json::from_str(text).map_err(AppError::wrap(
            "CONFIG_PARSE_FAILED",
            "Failed to parse configuration JSON",
        ))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.db_path.trim().is_empty() {
            return Err(AppError::new("CONFIG_INVALID", "db_path is required"));
        }
        self.notification.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_defaults() {
        let cfg = AppConfig::from_json_str(
            r#"{"notification":{"investigation_team":"oncall@example.com"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.db_path, DEFAULT_DB_PATH);
        assert_eq!(cfg.notification.investigation_team, "oncall@example.com");
        assert_eq!(cfg.notification.subject_prefix, DEFAULT_SUBJECT_PREFIX);
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        for bad in ["", "nobody", "a@b@c", "Ops <ops@example.com>", "a @b.com", "@b.com"] {
            let cfg = NotificationConfig {
                investigation_team: bad.to_string(),
                ..NotificationConfig::default()
            };
            assert_eq!(cfg.validate().unwrap_err().code, "CONFIG_INVALID", "{bad:?}");
        }
        assert!(NotificationConfig::default().validate().is_ok());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert_eq!(
            AppConfig::from_json_str("{").unwrap_err().code,
            "CONFIG_PARSE_FAILED"
        );
        assert_eq!(
            AppConfig::from_json_str(r#"{"db_path":"  "}"#).unwrap_err().code,
            "CONFIG_INVALID"
        );
    }
}
