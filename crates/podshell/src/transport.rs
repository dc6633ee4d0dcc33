//! SSH transport: authentication, interactive shells and port forwarding.
//!
//! The lifecycle controller only sees the [`Connector`] and
//! [`RemoteSession`] traits. [`SshConnector`] and [`SshSession`] implement
//! them over russh; test doubles implement the same traits.
//!
//! # Example
//!
//! ```ignore
//! use podshell::transport::{ConnectionOptions, SshSession};
//!
//! let options = ConnectionOptions::new("gpu.example.com").port(30022).password("...");
//! let session = SshSession::connect(&options).await?;
//! let output = session.exec_captured("nvidia-smi").await?;
//! ```

pub mod addr;
pub mod agent;
pub mod auth;
pub mod channel;
pub mod exit;
pub mod forward;
pub mod keys;
pub mod options;
pub mod relay;
pub mod session;

use async_trait::async_trait;

pub use addr::{Endpoint, ForwardSpec};
pub use auth::{AuthStrategy, Authenticator, Credentials};
pub use exit::{ExitOutcome, ExitReport};
pub use forward::{Acceptor, Dialer, serve};
pub use options::ConnectionOptions;
pub use relay::{Direction, RelayPair, report_channel};
pub use session::{Forwarder, SshConnector, SshSession};

use crate::error::Result;

/// Opens authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The session type produced.
    type Session: RemoteSession;

    /// Connect and authenticate.
    async fn connect(&self, options: &ConnectionOptions) -> Result<Self::Session>;
}

/// An open session on a pod.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run the interactive shell until it exits.
    async fn attach(&mut self) -> Result<()>;

    /// Tear down the connection.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}
