//! Pools: providers that create, report on and destroy pods.
//!
//! The lifecycle controller only talks to the [`Pool`] trait. Each provider
//! lives in its own submodule; [`xiangongyun`] is the one shipped today.

pub mod pod;
pub mod xiangongyun;

use async_trait::async_trait;

pub use pod::{GpuModel, Pod, PodOptions, PodStatus, SshCoordinates};
pub use xiangongyun::XiangongyunPool;

use crate::error::Result;

/// A source of pods.
///
/// Implementations perform no retries; a failed call is reported as-is.
#[async_trait]
pub trait Pool: Send + Sync {
    /// Stable identifier of the pool, used in qualified pod ids.
    fn id(&self) -> &str;

    /// All pods owned by the caller.
    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Current snapshot of one pod.
    async fn get_pod(&self, id: &str) -> Result<Pod>;

    /// Request a new pod. Fails with
    /// [`Error::UnsupportedResource`](crate::Error::UnsupportedResource)
    /// before contacting the provider when the GPU model is not offered.
    async fn create_pod(&self, options: &PodOptions) -> Result<Pod>;

    /// Shut down and release a pod.
    async fn destroy_pod(&self, id: &str) -> Result<()>;
}
