//! SSH connection options.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_CONNECT_TIMEOUT;
use crate::config::env::EnvConfig;

/// Login user when neither the pod nor the config names one.
pub const DEFAULT_USER: &str = "envd";

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Everything needed to open one SSH connection.
///
/// Options are read-only once handed to a connector.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Server host name or address.
    pub server: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Password. Takes precedence over key and agent when non-empty.
    pub password: String,
    /// Private key file.
    pub private_key_path: Option<PathBuf>,
    /// Passphrase for an encrypted private key.
    pub private_key_passphrase: Option<String>,
    /// Forward the local SSH agent to the server.
    pub agent_forwarding: bool,
    /// Authenticate at all. When false only the `none` method is tried.
    pub auth: bool,
    /// Limit on TCP connect plus handshake.
    pub connect_timeout: Duration,
    /// Local agent socket, captured from the environment at startup.
    pub agent_socket: Option<PathBuf>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            private_key_path: None,
            private_key_passphrase: None,
            agent_forwarding: true,
            auth: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            agent_socket: None,
        }
    }
}

impl ConnectionOptions {
    /// Options for `server` with defaults for everything else.
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    /// Set port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set login user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set private key file and its optional passphrase.
    #[must_use]
    pub fn private_key(mut self, path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        self.private_key_path = Some(path.into());
        self.private_key_passphrase = passphrase;
        self
    }

    /// Enable or disable agent forwarding.
    #[must_use]
    pub const fn agent_forwarding(mut self, enabled: bool) -> Self {
        self.agent_forwarding = enabled;
        self
    }

    /// Enable or disable authentication.
    #[must_use]
    pub const fn auth(mut self, enabled: bool) -> Self {
        self.auth = enabled;
        self
    }

    /// Set connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the agent socket.
    #[must_use]
    pub fn agent_socket(mut self, socket: Option<PathBuf>) -> Self {
        self.agent_socket = socket;
        self
    }

    /// Take the agent socket from `SSH_AUTH_SOCK`. An empty value counts as
    /// unset.
    #[must_use]
    pub fn agent_socket_from(self, env: &EnvConfig) -> Self {
        self.agent_socket(env.agent_socket())
    }

    /// Get the address string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &!self.password.is_empty())
            .field("private_key_path", &self.private_key_path)
            .field("agent_forwarding", &self.agent_forwarding)
            .field("auth", &self.auth)
            .field("connect_timeout", &self.connect_timeout)
            .field("agent_socket", &self.agent_socket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::SSH_AUTH_SOCK;

    #[test]
    fn defaults() {
        let options = ConnectionOptions::new("gpu.example.com");
        assert_eq!(options.port, 22);
        assert_eq!(options.user, "envd");
        assert!(options.auth);
        assert!(options.agent_forwarding);
        assert!(options.password.is_empty());
        assert_eq!(options.address(), "gpu.example.com:22");
    }

    #[test]
    fn builder() {
        let options = ConnectionOptions::new("h")
            .port(2222)
            .user("root")
            .private_key("/keys/id", Some("pw".into()))
            .agent_forwarding(false)
            .connect_timeout(Duration::from_secs(3));
        assert_eq!(options.address(), "h:2222");
        assert_eq!(options.user, "root");
        assert_eq!(options.private_key_path, Some(PathBuf::from("/keys/id")));
        assert_eq!(options.private_key_passphrase.as_deref(), Some("pw"));
        assert!(!options.agent_forwarding);
    }

    #[test]
    fn agent_socket_from_env() {
        let env = EnvConfig::from_map("PODSHELL", [(SSH_AUTH_SOCK, "/run/agent.sock")]);
        let options = ConnectionOptions::new("h").agent_socket_from(&env);
        assert_eq!(options.agent_socket, Some(PathBuf::from("/run/agent.sock")));

        let env = EnvConfig::from_map("PODSHELL", [(SSH_AUTH_SOCK, "")]);
        assert!(ConnectionOptions::new("h").agent_socket_from(&env).agent_socket.is_none());
    }

    #[test]
    fn debug_hides_secrets() {
        let options = ConnectionOptions::new("h")
            .password("hunter2")
            .private_key("/k", Some("sesame".into()));
        let out = format!("{options:?}");
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("sesame"));
    }
}
