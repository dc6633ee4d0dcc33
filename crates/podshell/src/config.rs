//! Configuration types for podshell.
//!
//! [`AppConfig`] is read from `<config_dir>/config.toml` and then overridden
//! by `PODSHELL_*` environment variables. Every field has a default, so a
//! missing file is not an error.
//!
//! ```toml
//! [poll]
//! interval_secs = 5
//! max_attempts = 120
//!
//! [ssh]
//! private_key = "/home/me/.ssh/id_ed25519"
//! agent_forwarding = true
//!
//! [provider]
//! data_center_id = 1
//! ```

pub mod env;
pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use env::EnvConfig;
use env::vars;
pub use paths::Paths;

use crate::error::{Error, Result};

/// Default interval between pod status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of status checks before giving up on a pod.
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 120;

/// Default SSH connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default provider API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.xiangongyun.com";

/// Default environment variable holding the provider token.
pub const DEFAULT_TOKEN_ENV: &str = "XGY_TOKEN";

/// Default base image for new pods.
pub const DEFAULT_IMAGE: &str = "2f98442f-1e6e-4531-8b92-88a09d5d8a20";

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Readiness polling.
    pub poll: PollConfig,
    /// SSH defaults applied to every pod connection.
    pub ssh: SshConfig,
    /// Pool provider settings.
    pub provider: ProviderConfig,
}

/// Readiness polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between status checks.
    pub interval_secs: u64,
    /// Maximum status checks; `0` polls forever.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Interval between status checks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// The attempt bound, or `None` when unbounded.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        if self.max_attempts == 0 {
            None
        } else {
            Some(self.max_attempts)
        }
    }
}

/// SSH connection defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Login user; the pod's advertised user when unset.
    pub user: Option<String>,
    /// Private key used when the pod has no password.
    pub private_key: Option<PathBuf>,
    /// Passphrase for `private_key`.
    pub passphrase: Option<String>,
    /// Forward the local SSH agent.
    pub agent_forwarding: bool,
    /// Seconds allowed for TCP connect plus handshake.
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: None,
            private_key: None,
            passphrase: None,
            agent_forwarding: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl SshConfig {
    /// Connect timeout as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Pool provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Environment variable holding the API token.
    pub token_env: String,
    /// API base URL.
    pub api_base: String,
    /// Data center new pods are placed in.
    pub data_center_id: u32,
    /// Image new pods boot from.
    pub image: String,
    /// Image visibility (`public` or `private`).
    pub image_type: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            data_center_id: 1,
            image: DEFAULT_IMAGE.to_string(),
            image_type: "public".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Read the API token from the configured environment variable.
    pub fn token(&self, env: &EnvConfig) -> Result<String> {
        env.raw(&self.token_env)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "provider token not set: export {} first",
                    self.token_env
                ))
            })
    }
}

impl AppConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid config: {e}")))
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "Loaded config file");
                toml::from_str(&text)
                    .map_err(|e| Error::config(format!("invalid config {}: {e}", path.display())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Load the config: `explicit` if given, otherwise the default file
    /// under `paths`; then apply environment overrides.
    pub fn load(paths: &Paths, explicit: Option<&Path>, env: &EnvConfig) -> Result<Self> {
        let mut config = match explicit {
            Some(path) if !path.exists() => {
                return Err(Error::config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            Some(path) => Self::from_file(path)?,
            None => Self::from_file(&paths.config_file())?,
        };
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Apply `PODSHELL_*` overrides.
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(v) = env.parse(vars::POLL_INTERVAL_SECS) {
            self.poll.interval_secs = v;
        }
        if let Some(v) = env.parse(vars::POLL_MAX_ATTEMPTS) {
            self.poll.max_attempts = v;
        }
        if let Some(v) = env.get(vars::SSH_USER) {
            self.ssh.user = Some(v);
        }
        if let Some(v) = env.get(vars::SSH_PRIVATE_KEY) {
            self.ssh.private_key = Some(PathBuf::from(v));
        }
        if let Some(v) = env.get(vars::SSH_PASSPHRASE) {
            self.ssh.passphrase = Some(v);
        }
        if let Some(v) = env.bool(vars::SSH_AGENT_FORWARDING) {
            self.ssh.agent_forwarding = v;
        }
        if let Some(v) = env.parse(vars::SSH_CONNECT_TIMEOUT_SECS) {
            self.ssh.connect_timeout_secs = v;
        }
        if let Some(v) = env.get(vars::PROVIDER_API_BASE) {
            self.provider.api_base = v;
        }
        if let Some(v) = env.parse(vars::PROVIDER_DATA_CENTER_ID) {
            self.provider.data_center_id = v;
        }
        if let Some(v) = env.get(vars::PROVIDER_IMAGE) {
            self.provider.image = v;
        }
        if let Some(v) = env.get(vars::PROVIDER_IMAGE_TYPE) {
            self.provider.image_type = v;
        }
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            return Err(Error::config("poll.interval_secs must be at least 1"));
        }
        if self.ssh.connect_timeout_secs == 0 {
            return Err(Error::config("ssh.connect_timeout_secs must be at least 1"));
        }
        if self.provider.api_base.is_empty() {
            return Err(Error::config("provider.api_base must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> EnvConfig {
        EnvConfig::from_map(env::DEFAULT_PREFIX, Vec::<(String, String)>::new())
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.poll.interval(), Duration::from_secs(5));
        assert_eq!(config.poll.max_attempts(), Some(120));
        assert!(config.ssh.agent_forwarding);
        assert_eq!(config.ssh.user, None);
        assert_eq!(config.provider.api_base, "https://api.xiangongyun.com");
        assert_eq!(config.provider.data_center_id, 1);
        assert_eq!(config.provider.image_type, "public");
    }

    #[test]
    fn zero_attempts_is_unbounded() {
        let poll = PollConfig {
            interval_secs: 5,
            max_attempts: 0,
        };
        assert_eq!(poll.max_attempts(), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [poll]
            max_attempts = 10

            [ssh]
            user = "root"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll.max_attempts, 10);
        assert_eq!(config.poll.interval_secs, 5);
        assert_eq!(config.ssh.user.as_deref(), Some("root"));
        assert!(config.ssh.agent_forwarding);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = AppConfig::from_toml_str("[poll]\ninterval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn env_overrides_file() {
        let mut config = AppConfig::from_toml_str("[ssh]\nagent_forwarding = true\n").unwrap();
        let env = EnvConfig::from_map(
            "PODSHELL",
            [
                ("PODSHELL_SSH_AGENT_FORWARDING", "false"),
                ("PODSHELL_POLL_INTERVAL_SECS", "2"),
                ("PODSHELL_SSH_PRIVATE_KEY", "/keys/id"),
                ("PODSHELL_PROVIDER_DATA_CENTER_ID", "3"),
            ],
        );
        config.apply_env(&env);
        assert!(!config.ssh.agent_forwarding);
        assert_eq!(config.poll.interval_secs, 2);
        assert_eq!(config.ssh.private_key, Some(PathBuf::from("/keys/id")));
        assert_eq!(config.provider.data_center_id, 3);
    }

    #[test]
    fn load_missing_default_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("cfg"));
        let config = AppConfig::load(&paths, None, &no_env()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("cfg"));
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load(&paths, Some(&missing), &no_env()).is_err());
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("podshell.toml");
        std::fs::write(&file, "[provider]\nimage = \"custom\"\n").unwrap();
        let paths = Paths::new(dir.path().join("cfg"));

        let config = AppConfig::load(&paths, Some(&file), &no_env()).unwrap();
        assert_eq!(config.provider.image, "custom");
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.poll.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn token_from_env() {
        let provider = ProviderConfig::default();
        let env = EnvConfig::from_map("PODSHELL", [("XGY_TOKEN", "secret")]);
        assert_eq!(provider.token(&env).unwrap(), "secret");

        let err = provider.token(&no_env()).unwrap_err();
        assert!(err.to_string().contains("XGY_TOKEN"));
    }
}
