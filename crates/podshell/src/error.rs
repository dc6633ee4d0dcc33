//! Error types for podshell.
//!
//! One top-level [`Error`] wraps a per-layer enum for each part of the
//! system: [`ProviderError`] for the pool's HTTP API, [`AuthError`] for
//! credential resolution, [`TransportError`] for the SSH connection and
//! [`RelayError`] for individual forwarded connections.
//!
//! A failed destroy is reported as [`Error::Cleanup`]. Its message says the
//! pod may still be running so that nobody mistakes it for a routine failure.

use std::path::PathBuf;
use std::time::Duration;

use podshell_term::ShutdownSignal;
use thiserror::Error;

use crate::transport::relay::Direction;

/// Maximum number of bytes of captured remote output shown in an error message.
const MAX_OUTPUT_DISPLAY: usize = 512;

fn format_command_output(output: &[u8]) -> String {
    if output.is_empty() {
        return "(no output)".to_string();
    }
    let text = String::from_utf8_lossy(output);
    let text = text.trim_end();
    if text.len() <= MAX_OUTPUT_DISPLAY {
        return text.to_string();
    }
    let mut start = text.len() - MAX_OUTPUT_DISPLAY;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("... {}", &text[start..])
}

/// The main error type for podshell operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The pool's API failed or rejected a request.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The pool cannot provide the requested GPU model.
    #[error("unsupported GPU model {model} for pool {pool}")]
    UnsupportedResource {
        /// The requested model.
        model: String,
        /// The pool that rejected it.
        pool: String,
    },

    /// Credentials could not be resolved.
    #[error("authentication setup failed: {0}")]
    Auth(#[from] AuthError),

    /// SSH connection or channel failure.
    #[error("SSH error: {0}")]
    Transport(#[from] TransportError),

    /// A forwarded connection failed.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// The pod reported an error status while waiting for it to start.
    #[error("pod {pod_id} failed to start")]
    PodFailed {
        /// The pod that failed.
        pod_id: String,
    },

    /// The pod did not reach the running state within the polling bound.
    #[error("pod {pod_id} was not running after {attempts} status checks")]
    ReadyTimeout {
        /// The pod being waited on.
        pod_id: String,
        /// Number of status checks performed.
        attempts: u32,
    },

    /// The pod could not be destroyed.
    #[error(
        "failed to destroy pod {pod_id}: {source}\n\
         The pod may still be running and billed. Destroy it manually with \
         `podshell destroy {pod_id}`."
    )]
    Cleanup {
        /// The pod that may have been left running.
        pod_id: String,
        /// Why the destroy call failed.
        #[source]
        source: Box<Error>,
    },

    /// The flow was cancelled by a signal.
    #[error("interrupted by {signal}")]
    Interrupted {
        /// The signal that was received.
        signal: ShutdownSignal,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a pool provider's HTTP API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be sent or the response could not be read.
    #[error("request to {url} failed: {source}")]
    Http {
        /// The request URL.
        url: String,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success HTTP status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The response body, if any.
        body: String,
    },

    /// The API returned an application-level error code.
    #[error("{operation} failed with code {code}: {msg}")]
    Api {
        /// What was being attempted.
        operation: String,
        /// The provider's response code.
        code: i64,
        /// The provider's message.
        msg: String,
    },

    /// The response body was not the expected JSON.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// The request URL.
        url: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors resolving SSH credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential is configured.
    #[error("no usable credential: {reason}")]
    Config {
        /// What is missing.
        reason: String,
    },

    /// The private key file could not be read.
    #[error("failed to read private key {}: {source}", path.display())]
    KeyRead {
        /// The key path.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The key file does not contain a PEM block.
    #[error("{} does not contain a PEM-encoded private key", path.display())]
    KeyFormat {
        /// The key path.
        path: PathBuf,
    },

    /// The key is encrypted and the passphrase is missing or wrong.
    #[error("failed to decrypt private key {}: {reason}", path.display())]
    KeyDecrypt {
        /// The key path.
        path: PathBuf,
        /// Why decryption failed.
        reason: String,
    },

    /// The PEM block holds a key type that is not supported.
    #[error("unsupported key type \"{label}\" in {}", path.display())]
    UnsupportedKeyType {
        /// The key path.
        path: PathBuf,
        /// The PEM block label.
        label: String,
    },

    /// The key material could not be parsed.
    #[error("failed to parse private key {}: {reason}", path.display())]
    KeyParse {
        /// The key path.
        path: PathBuf,
        /// The parser's message.
        reason: String,
    },

    /// The SSH agent socket is configured but unreachable.
    #[error("SSH agent at {} is unreachable: {source}", socket.display())]
    Agent {
        /// The agent socket path.
        socket: PathBuf,
        /// The connect error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the SSH transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connection {
        /// The host that could not be connected to.
        host: String,
        /// The port that was used.
        port: u16,
        /// The reason for the failure.
        reason: String,
    },

    /// Connecting took longer than the configured timeout.
    #[error("connection to {host}:{port} timed out after {duration:?}")]
    Timeout {
        /// The host being connected to.
        host: String,
        /// The port that was used.
        port: u16,
        /// The duration that elapsed.
        duration: Duration,
    },

    /// Authentication failed.
    #[error("authentication failed for user '{user}': {reason}")]
    Authentication {
        /// The user that failed to authenticate.
        user: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Channel error.
    #[error("SSH channel error: {reason}")]
    Channel {
        /// The reason for the channel error.
        reason: String,
    },

    /// Session error.
    #[error("SSH session error: {reason}")]
    Session {
        /// The reason for the session error.
        reason: String,
    },

    /// The remote shell exited with a non-zero status.
    #[error("remote shell exited with status {status}")]
    RemoteExit {
        /// The exit status.
        status: u32,
    },

    /// The remote shell was killed by a signal.
    #[error("remote shell terminated by signal {signal}")]
    RemoteSignal {
        /// The signal name as reported by the server.
        signal: String,
    },

    /// A one-shot command exited with a non-zero status.
    #[error(
        "remote command exited with status {status}\n{}",
        format_command_output(output)
    )]
    CommandFailed {
        /// The exit status.
        status: u32,
        /// Combined stdout and stderr in arrival order.
        output: Vec<u8>,
    },

    /// Local I/O failed while relaying the session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a single forwarded connection.
///
/// These are reported and logged; they never stop the listener.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listener failed to accept a connection.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// The target could not be reached.
    #[error("failed to dial {target}: {reason}")]
    Dial {
        /// The address being dialed.
        target: String,
        /// Why it failed.
        reason: String,
    },

    /// Copying in one direction failed.
    #[error("{direction} copy for {peer} failed: {source}")]
    Copy {
        /// The peer the connection was accepted from.
        peer: String,
        /// Which half of the relay failed.
        direction: Direction,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for podshell operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unsupported resource error.
    pub fn unsupported_resource(model: impl Into<String>, pool: impl Into<String>) -> Self {
        Self::UnsupportedResource {
            model: model.into(),
            pool: pool.into(),
        }
    }

    /// Wrap a destroy failure.
    pub fn cleanup(pod_id: impl Into<String>, source: Self) -> Self {
        Self::Cleanup {
            pod_id: pod_id.into(),
            source: Box::new(source),
        }
    }

    /// Whether this failure may have left a pod running.
    #[must_use]
    pub const fn is_billing_risk(&self) -> bool {
        matches!(self, Self::Cleanup { .. })
    }

    /// Check if this is an interruption.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Process exit code for this error.
    ///
    /// Cleanup failures exit with 2, interruptions with the conventional
    /// `128 + signal`, everything else with 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Cleanup { .. } => 2,
            Self::Interrupted { signal } => signal.exit_code(),
            _ => 1,
        }
    }
}

impl AuthError {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a decryption error.
    pub fn key_decrypt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::KeyDecrypt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error.
    pub fn key_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::KeyParse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl TransportError {
    /// Create a connection error.
    pub fn connection(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::Connection {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(host: impl Into<String>, port: u16, duration: Duration) -> Self {
        Self::Timeout {
            host: host.into(),
            port,
            duration,
        }
    }

    /// Create an authentication error.
    pub fn authentication(user: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            user: user.into(),
            reason: reason.into(),
        }
    }

    /// Create a channel error.
    pub fn channel(reason: impl Into<String>) -> Self {
        Self::Channel {
            reason: reason.into(),
        }
    }

    /// Create a session error.
    pub fn session(reason: impl Into<String>) -> Self {
        Self::Session {
            reason: reason.into(),
        }
    }
}

impl RelayError {
    /// Create a dial error.
    pub fn dial(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dial {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_error_warns_about_billing() {
        let err = Error::cleanup(
            "abc123",
            ProviderError::Api {
                operation: "destroy pod".into(),
                code: 500,
                msg: "internal".into(),
            }
            .into(),
        );
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("billed"));
        assert!(msg.contains("code 500"));
        assert!(err.is_billing_risk());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn ordinary_errors_exit_with_one() {
        let err = Error::PodFailed {
            pod_id: "p1".into(),
        };
        assert!(!err.is_billing_risk());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn interrupted_exit_code_follows_signal() {
        let err = Error::Interrupted {
            signal: ShutdownSignal::Interrupt,
        };
        assert!(err.is_interrupted());
        assert_eq!(err.exit_code(), 130);
        assert_eq!(err.to_string(), "interrupted by SIGINT");
    }

    #[test]
    fn auth_error_display_includes_path() {
        let err = AuthError::KeyFormat {
            path: PathBuf::from("/tmp/id_test"),
        };
        assert_eq!(
            err.to_string(),
            "/tmp/id_test does not contain a PEM-encoded private key"
        );
    }

    #[test]
    fn command_failed_shows_output_tail() {
        let output = format!("{}tail-marker\n", "x".repeat(2000)).into_bytes();
        let err = TransportError::CommandFailed {
            status: 3,
            output,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("remote command exited with status 3"));
        assert!(msg.contains("tail-marker"));
        assert!(msg.contains("..."));
        assert!(msg.len() < 700);
    }

    #[test]
    fn command_failed_without_output() {
        let err = TransportError::CommandFailed {
            status: 1,
            output: Vec::new(),
        };
        assert!(err.to_string().contains("(no output)"));
    }

    #[test]
    fn transport_error_converts() {
        let err: Error = TransportError::channel("open failed").into();
        assert!(matches!(err, Error::Transport(TransportError::Channel { .. })));
        assert!(err.to_string().contains("open failed"));
    }
}
