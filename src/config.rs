//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Onboarding wizard configuration.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Scope key for the persisted onboarding attempt.
    pub user_id: String,
    /// Path of the libSQL database holding persisted progress.
    pub db_path: PathBuf,
    /// Quiet period before an async field validation is sent.
    pub validation_debounce: Duration,
    /// How long final submission waits for in-flight validations to settle.
    pub validation_settle_timeout: Duration,
    /// Whether a fresh session may be seeded from a remote progress record.
    pub remote_sync: bool,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            db_path: PathBuf::from("./data/onboarding.db"),
            validation_debounce: Duration::from_millis(600),
            validation_settle_timeout: Duration::from_secs(5),
            remote_sync: false,
        }
    }
}

impl WizardConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let user_id = std::env::var("ONBOARDING_USER_ID").unwrap_or(defaults.user_id);

        let db_path = std::env::var("ONBOARDING_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let validation_debounce = std::env::var("ONBOARDING_VALIDATION_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.validation_debounce);

        let validation_settle_timeout = std::env::var("ONBOARDING_VALIDATION_SETTLE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.validation_settle_timeout);

        let remote_sync = std::env::var("ONBOARDING_REMOTE_SYNC")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.remote_sync);

        Self {
            user_id,
            db_path,
            validation_debounce,
            validation_settle_timeout,
            remote_sync,
        }
    }

    /// Reject values the wizard cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_USER_ID".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.validation_settle_timeout < self.validation_debounce {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_VALIDATION_SETTLE_MS".to_string(),
                message: format!(
                    "settle timeout {:?} is shorter than the debounce {:?}",
                    self.validation_settle_timeout, self.validation_debounce
                ),
            });
        }
        Ok(())
    }
}
