//! Local SSH agent access.

use std::path::{Path, PathBuf};

use russh::Channel;
use russh::client::Msg;

use crate::error::AuthError;
use crate::transport::ConnectionOptions;

/// Decide whether agent forwarding can be used for `options`.
///
/// Returns the socket to forward to, or `None` when forwarding is off or no
/// socket is configured (the latter with a warning). A configured socket that
/// refuses connections is an error.
pub async fn detect(options: &ConnectionOptions) -> Result<Option<PathBuf>, AuthError> {
    if !options.agent_forwarding {
        return Ok(None);
    }
    let Some(socket) = options.agent_socket.as_deref() else {
        tracing::warn!("SSH_AUTH_SOCK is not set, continuing without agent forwarding");
        return Ok(None);
    };
    check_reachable(socket).await?;
    tracing::debug!(socket = %socket.display(), "SSH agent is reachable");
    Ok(Some(socket.to_path_buf()))
}

#[cfg(unix)]
async fn check_reachable(socket: &Path) -> Result<(), AuthError> {
    tokio::net::UnixStream::connect(socket)
        .await
        .map(drop)
        .map_err(|source| AuthError::Agent {
            socket: socket.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
async fn check_reachable(socket: &Path) -> Result<(), AuthError> {
    Err(AuthError::Agent {
        socket: socket.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "agent sockets are only supported on Unix",
        ),
    })
}

/// Relay an `auth-agent@openssh.com` channel opened by the server to the
/// local agent socket. Runs until either side closes.
pub async fn relay_channel(channel: Channel<Msg>, socket: PathBuf) {
    #[cfg(unix)]
    {
        let mut local = match tokio::net::UnixStream::connect(&socket).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(socket = %socket.display(), error = %e, "Failed to reach SSH agent for forwarded request");
                let _ = channel.close().await;
                return;
            }
        };
        let mut remote = channel.into_stream();
        match tokio::io::copy_bidirectional(&mut remote, &mut local).await {
            Ok((to_agent, from_agent)) => {
                tracing::trace!(to_agent, from_agent, "Agent channel closed");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Agent channel relay ended with an error");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tracing::warn!(socket = %socket.display(), "Agent forwarding is not supported on this platform");
        let _ = channel.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_forwarding_skips_socket_check() {
        let options = ConnectionOptions::new("h")
            .agent_forwarding(false)
            .agent_socket(Some(PathBuf::from("/nonexistent/agent.sock")));
        assert_eq!(detect(&options).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_socket_is_not_fatal() {
        let options = ConnectionOptions::new("h").agent_socket(None);
        assert_eq!(detect(&options).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_socket_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let options =
            ConnectionOptions::new("h").agent_socket(Some(dir.path().join("agent.sock")));
        let err = detect(&options).await.unwrap_err();
        assert!(matches!(err, AuthError::Agent { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listening_socket_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let _listener = tokio::net::UnixListener::bind(&path).unwrap();
        let options = ConnectionOptions::new("h").agent_socket(Some(path.clone()));
        assert_eq!(detect(&options).await.unwrap(), Some(path));
    }
}
