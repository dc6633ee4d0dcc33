//! Test utilities for podshell.
//!
//! Doubles for the [`Pool`](crate::pool::Pool) and
//! [`Connector`](crate::transport::Connector) seams, so the lifecycle can be
//! exercised without a provider account or an SSH server.

mod builders;
mod mock_connector;
mod scripted_pool;

pub use builders::PodBuilder;
pub use mock_connector::{MockConnector, MockSession};
pub use scripted_pool::ScriptedPool;
