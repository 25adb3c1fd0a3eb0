//! Configuration management for flaresync.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::DEFAULT_RULE_DESCRIPTION;
use crate::planner::Comparison;

/// Default location of the optional config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flaresync/config.yaml";

/// Actions Cloud Armor accepts for an allowlist rule
const VALID_ACTIONS: &[&str] = &["allow", "deny(403)", "deny(404)", "deny(502)"];

/// Secure string type that zeroizes memory on drop
/// Used for the API access token
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL of the published ranges document
    pub source_url: String,

    /// Compute Engine REST endpoint
    pub api_endpoint: String,

    /// Description marking rules as managed by flaresync
    pub rule_description: String,

    /// Action written on managed rules
    pub rule_action: String,

    /// Batch comparison mode (ordered, unordered)
    pub comparison: Comparison,

    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: u64,

    /// Deadline for the whole run in seconds
    pub run_timeout_secs: u64,

    /// Environment variable holding a pre-issued OAuth access token.
    /// When unset or empty the GCE metadata server is used.
    pub access_token_env: String,

    /// Advisory lock file preventing overlapping runs on one host
    pub lock_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: "https://api.cloudflare.com/client/v4/ips".to_string(),
            api_endpoint: "https://compute.googleapis.com/compute/v1".to_string(),
            rule_description: DEFAULT_RULE_DESCRIPTION.to_string(),
            rule_action: "allow".to_string(),
            comparison: Comparison::Ordered,
            http_timeout_secs: 30,
            run_timeout_secs: 600,
            access_token_env: "GOOGLE_OAUTH_ACCESS_TOKEN".to_string(),
            lock_file: None,
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the config file if present, otherwise use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.source_url.starts_with("https://") {
            anyhow::bail!("source_url must use HTTPS: {}", self.source_url);
        }

        if !self.api_endpoint.starts_with("https://") {
            anyhow::bail!("api_endpoint must use HTTPS: {}", self.api_endpoint);
        }

        if self.rule_description.trim().is_empty() {
            anyhow::bail!("rule_description must not be empty");
        }

        if !VALID_ACTIONS.contains(&self.rule_action.as_str()) {
            anyhow::bail!(
                "Invalid rule_action '{}'. Valid values: {}",
                self.rule_action,
                VALID_ACTIONS.join(", ")
            );
        }

        if self.http_timeout_secs == 0 || self.run_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be greater than zero");
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Access token from the configured env var, if one is set
    /// Returns a SecureString that will be zeroed when dropped
    pub fn access_token_from_env(&self) -> Option<SecureString> {
        if self.access_token_env.is_empty() {
            return None;
        }
        env::var(&self.access_token_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecureString::new(v.trim().to_string()))
    }
}
