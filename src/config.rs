//! SDK configuration.
//!
//! Resolution order: built-in defaults, then `SIWA_BASE_URL` /
//! `SIWA_TIMEOUT_SECS` from the environment, then the JSON options passed to
//! `siwa_init_ex`.

use std::time::Duration;

use serde::Deserialize;

use crate::error::SdkError;

/// Development backend on the loopback interface.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENV_BASE_URL: &str = "SIWA_BASE_URL";
const ENV_TIMEOUT_SECS: &str = "SIWA_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkConfig {
    /// Backend root, without trailing slash
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("siwa-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Options accepted by `siwa_init_ex`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitOptions {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl SdkConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self, SdkError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SdkError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.trim().is_empty()) {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                SdkError::Config(format!(
                    "{} must be a positive integer, got {:?}",
                    ENV_TIMEOUT_SECS, raw
                ))
            })?;
        }

        config.validate()
    }

    /// Apply `siwa_init_ex` options on top of this config.
    pub fn with_options_json(mut self, raw: &str) -> Result<Self, SdkError> {
        let options: InitOptions = serde_json::from_str(raw)
            .map_err(|e| SdkError::InvalidParam(format!("Invalid options_json: {}", e)))?;

        if let Some(url) = options.base_url {
            self.base_url = url;
        }
        if let Some(timeout) = options.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(agent) = options.user_agent {
            self.user_agent = agent;
        }

        self.validate()
    }

    fn validate(mut self) -> Result<Self, SdkError> {
        let url = self.base_url.trim().trim_end_matches('/').to_string();
        let host = match url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
        {
            Some(rest) => rest,
            None => {
                return Err(SdkError::Config(format!(
                    "base_url must start with http:// or https://, got {:?}",
                    self.base_url
                )))
            }
        };
        if host.is_empty() {
            return Err(SdkError::Config("base_url has no host".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(SdkError::Config("timeout_secs must be greater than zero".to_string()));
        }

        self.base_url = url;
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
