//! Environment-based configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "PODSHELL";

/// Environment variable reader.
///
/// Reads `<PREFIX>_<NAME>` from the process environment, or from a fixed
/// map when built with [`EnvConfig::from_map`].
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
    fixed: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a reader over the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fixed: None,
        }
    }

    /// Create a reader over a fixed set of variables instead of the process
    /// environment. Keys are full variable names.
    #[must_use]
    pub fn from_map<K, V>(prefix: impl Into<String>, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            fixed: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get an unprefixed variable.
    #[must_use]
    pub fn raw(&self, var_name: &str) -> Option<String> {
        match &self.fixed {
            Some(map) => map.get(var_name).cloned(),
            None => std::env::var(var_name).ok(),
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.raw(&self.var_name(name))
    }

    /// Get a parsed value. Unparseable values are logged and ignored.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        let value = self.get(name)?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(var = %self.var_name(name), value = %value, "Ignoring unparseable value");
                None
            }
        }
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in seconds.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_secs)
    }

    /// Check if a variable is set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The SSH agent socket from `SSH_AUTH_SOCK`. An empty value counts as
    /// unset.
    #[must_use]
    pub fn agent_socket(&self) -> Option<PathBuf> {
        self.raw(SSH_AUTH_SOCK)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }
}

/// Variables read with the `PODSHELL_` prefix.
pub mod vars {
    /// Seconds between pod status checks.
    pub const POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
    /// Maximum status checks before giving up (0 = unbounded).
    pub const POLL_MAX_ATTEMPTS: &str = "POLL_MAX_ATTEMPTS";
    /// SSH user override.
    pub const SSH_USER: &str = "SSH_USER";
    /// Private key path.
    pub const SSH_PRIVATE_KEY: &str = "SSH_PRIVATE_KEY";
    /// Private key passphrase.
    pub const SSH_PASSPHRASE: &str = "SSH_PASSPHRASE";
    /// Agent forwarding toggle.
    pub const SSH_AGENT_FORWARDING: &str = "SSH_AGENT_FORWARDING";
    /// SSH connect timeout in seconds.
    pub const SSH_CONNECT_TIMEOUT_SECS: &str = "SSH_CONNECT_TIMEOUT_SECS";
    /// Provider API base URL.
    pub const PROVIDER_API_BASE: &str = "PROVIDER_API_BASE";
    /// Provider data center.
    pub const PROVIDER_DATA_CENTER_ID: &str = "PROVIDER_DATA_CENTER_ID";
    /// Provider image id.
    pub const PROVIDER_IMAGE: &str = "PROVIDER_IMAGE";
    /// Provider image type.
    pub const PROVIDER_IMAGE_TYPE: &str = "PROVIDER_IMAGE_TYPE";
}

/// Unprefixed variable holding the SSH agent socket.
pub const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";
