//! Credential resolution and SSH user authentication.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use russh::client;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};

use super::session::ClientHandler;
use super::{ConnectionOptions, agent, keys};
use crate::error::{AuthError, TransportError};

/// How the client proves its identity.
#[derive(Clone)]
pub enum AuthStrategy {
    /// The `none` method.
    None,
    /// Password authentication.
    Password(String),
    /// Public key authentication with a loaded key.
    Key(Arc<PrivateKey>),
    /// Public key authentication with identities from the agent at this
    /// socket.
    Agent(PathBuf),
}

impl AuthStrategy {
    /// Short method name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Password(_) => "password",
            Self::Key(_) => "publickey",
            Self::Agent(_) => "agent",
        }
    }
}

impl fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Password(_) => f.write_str("Password(..)"),
            Self::Key(key) => f
                .debug_tuple("Key")
                .field(&key.algorithm().as_str())
                .finish(),
            Self::Agent(socket) => f.debug_tuple("Agent").field(socket).finish(),
        }
    }
}

/// Resolved credentials for one connection.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Login user.
    pub user: String,
    /// Authentication method.
    pub strategy: AuthStrategy,
    /// Agent socket to forward, when forwarding is on and the agent is up.
    pub agent_socket: Option<PathBuf>,
}

/// Turns [`ConnectionOptions`] into [`Credentials`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticator;

impl Authenticator {
    /// Pick an authentication method.
    ///
    /// Precedence: `auth == false` uses `none`; a non-empty password wins and
    /// no key file is read; then the private key; then the agent.
    pub async fn resolve(options: &ConnectionOptions) -> Result<Credentials, AuthError> {
        let agent_socket = agent::detect(options).await?;

        let strategy = if !options.auth {
            AuthStrategy::None
        } else if !options.password.is_empty() {
            AuthStrategy::Password(options.password.clone())
        } else if let Some(path) = &options.private_key_path {
            let key =
                keys::load_private_key(path, options.private_key_passphrase.as_deref()).await?;
            AuthStrategy::Key(Arc::new(key))
        } else if let Some(socket) = &agent_socket {
            AuthStrategy::Agent(socket.clone())
        } else {
            return Err(AuthError::config(
                "set a password, a private key or SSH_AUTH_SOCK",
            ));
        };

        tracing::debug!(
            user = %options.user,
            method = strategy.name(),
            agent_forwarding = agent_socket.is_some(),
            "Resolved SSH credentials"
        );
        Ok(Credentials {
            user: options.user.clone(),
            strategy,
            agent_socket,
        })
    }

    /// Authenticate an established connection.
    pub(crate) async fn authenticate(
        handle: &mut client::Handle<ClientHandler>,
        credentials: &Credentials,
    ) -> Result<(), TransportError> {
        let user = credentials.user.as_str();
        tracing::debug!(user = %user, method = credentials.strategy.name(), "Authenticating with SSH server");

        let accepted = match &credentials.strategy {
            AuthStrategy::None => handle
                .authenticate_none(user)
                .await
                .map_err(|e| TransportError::authentication(user, e.to_string()))?
                .success(),
            AuthStrategy::Password(password) => handle
                .authenticate_password(user, password)
                .await
                .map_err(|e| TransportError::authentication(user, e.to_string()))?
                .success(),
            AuthStrategy::Key(key) => {
                let rsa_hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::clone(key), rsa_hash);
                handle
                    .authenticate_publickey(user, key_with_hash)
                    .await
                    .map_err(|e| TransportError::authentication(user, e.to_string()))?
                    .success()
            }
            AuthStrategy::Agent(socket) => authenticate_with_agent(handle, user, socket).await?,
        };

        if accepted {
            tracing::info!(user = %user, method = credentials.strategy.name(), "SSH authentication successful");
            Ok(())
        } else {
            Err(TransportError::authentication(
                user,
                format!("server rejected {} authentication", credentials.strategy.name()),
            ))
        }
    }
}

#[cfg(unix)]
async fn authenticate_with_agent(
    handle: &mut client::Handle<ClientHandler>,
    user: &str,
    socket: &std::path::Path,
) -> Result<bool, TransportError> {
    let mut agent = russh::keys::agent::client::AgentClient::connect_uds(socket)
        .await
        .map_err(|e| TransportError::authentication(user, format!("failed to connect to SSH agent: {e}")))?;
    let identities = agent
        .request_identities()
        .await
        .map_err(|e| TransportError::authentication(user, format!("failed to list agent identities: {e}")))?;
    tracing::debug!(user = %user, key_count = identities.len(), "Found keys in SSH agent");

    for key in identities {
        let rsa_hash = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        match handle
            .authenticate_publickey_with(user, key.clone(), rsa_hash, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => {
                tracing::debug!(
                    user = %user,
                    key_type = %key.algorithm().as_str(),
                    "SSH agent key rejected, trying next"
                );
            }
            Err(e) => {
                tracing::debug!(user = %user, error = %e, "SSH agent authentication error");
            }
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _handle: &mut client::Handle<ClientHandler>,
    user: &str,
    _socket: &std::path::Path,
) -> Result<bool, TransportError> {
    Err(TransportError::authentication(
        user,
        "SSH agent authentication is only supported on Unix",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_wins_without_reading_key() {
        let options = ConnectionOptions::new("h")
            .password("secret")
            .private_key("/nonexistent/podshell/id_rsa", None)
            .agent_forwarding(false);
        let credentials = Authenticator::resolve(&options).await.unwrap();
        assert!(matches!(credentials.strategy, AuthStrategy::Password(ref p) if p == "secret"));
        assert_eq!(credentials.user, "envd");
    }

    #[tokio::test]
    async fn auth_disabled_uses_none() {
        let options = ConnectionOptions::new("h")
            .auth(false)
            .password("ignored")
            .agent_forwarding(false);
        let credentials = Authenticator::resolve(&options).await.unwrap();
        assert!(matches!(credentials.strategy, AuthStrategy::None));
    }

    #[tokio::test]
    async fn key_is_read_when_no_password() {
        let options = ConnectionOptions::new("h")
            .private_key("/nonexistent/podshell/id_rsa", None)
            .agent_forwarding(false);
        let err = Authenticator::resolve(&options).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyRead { .. }));
    }

    #[tokio::test]
    async fn nothing_configured_is_a_config_error() {
        let options = ConnectionOptions::new("h").agent_socket(None);
        let err = Authenticator::resolve(&options).await.unwrap_err();
        assert!(matches!(err, AuthError::Config { .. }));
    }

    #[tokio::test]
    async fn unreachable_agent_fails_even_with_password() {
        let dir = tempfile::tempdir().unwrap();
        let options = ConnectionOptions::new("h")
            .password("secret")
            .agent_socket(Some(dir.path().join("missing.sock")));
        let err = Authenticator::resolve(&options).await.unwrap_err();
        assert!(matches!(err, AuthError::Agent { .. }));
    }

    #[test]
    fn debug_hides_password() {
        let out = format!("{:?}", AuthStrategy::Password("hunter2".into()));
        assert_eq!(out, "Password(..)");
    }
}
