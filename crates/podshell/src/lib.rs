//! podshell: ephemeral GPU pods with an SSH shell and port forwarding
//!
//! This crate provisions a pod from a pool provider, waits until it is
//! reachable, attaches an interactive shell or tunnels ports over one SSH
//! connection, and destroys the pod when the session ends or the process is
//! interrupted.
//!
//! # Features
//!
//! - **Lifecycle controller** generic over the [`Pool`] and
//!   [`Connector`](transport::Connector) traits, with exactly-once teardown
//! - **SSH transport** over russh: password, key and agent authentication,
//!   agent forwarding, PTY shells, local and remote forwarding
//! - **Xiangongyun pool** adaptor for the provider HTTP API
//! - **Test doubles** for both seams (feature: `test-utils`)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use podshell::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> podshell::Result<()> {
//!     let paths = Paths::from_platform()?;
//!     let env = EnvConfig::default();
//!     let config = AppConfig::load(&paths, None, &env)?;
//!     let pool = Arc::new(XiangongyunPool::new(&config.provider.token(&env)?, &config.provider)?);
//!
//!     let mut controller = PodController::new(pool, SshConnector, config.poll, config.ssh);
//!     controller.run(&PodOptions::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod prelude;
pub mod transport;

pub use config::{AppConfig, EnvConfig, Paths};
pub use error::{AuthError, Error, ProviderError, RelayError, Result, TransportError};
pub use lifecycle::{DestroyOutcome, PodController, PodState, Teardown};
pub use podshell_term::ShutdownSignal;
pub use pool::{GpuModel, Pod, PodOptions, PodStatus, Pool, XiangongyunPool};
pub use transport::{ConnectionOptions, Endpoint, ForwardSpec, SshConnector, SshSession};

// Test utilities
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{MockConnector, MockSession, PodBuilder, ScriptedPool};
