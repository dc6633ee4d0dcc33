//! Convenient re-exports for common podshell usage.
//!
//! ```ignore
//! use podshell::prelude::*;
//! ```

// Configuration
pub use crate::config::{AppConfig, EnvConfig, Paths, PollConfig, ProviderConfig, SshConfig};

// Error handling
pub use crate::error::{Error, Result};

// Pods and pools
pub use crate::pool::{GpuModel, Pod, PodOptions, PodStatus, Pool, XiangongyunPool};

// Lifecycle
pub use crate::lifecycle::{DestroyOutcome, LifecycleEvent, PodController, PodState, Teardown};

// Transport
pub use crate::transport::{
    ConnectionOptions, Connector, Endpoint, ForwardSpec, RemoteSession, SshConnector, SshSession,
};
