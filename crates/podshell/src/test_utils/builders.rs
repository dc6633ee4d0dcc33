//! Builder for test pods.

use crate::pool::{GpuModel, Pod, PodStatus};

/// Builds [`Pod`] values with sensible test defaults.
#[derive(Debug, Clone)]
pub struct PodBuilder {
    pod: Pod,
}

impl Default for PodBuilder {
    fn default() -> Self {
        Self::new("pod-1")
    }
}

impl PodBuilder {
    /// A creating pod with id `id` in pool `scripted`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            pod: Pod {
                id: id.into(),
                pool_id: "scripted".to_string(),
                name: "test-pod".to_string(),
                gpu_model: GpuModel::Rtx4090,
                gpu_count: 1,
                memory_size: 64 * 1024 * 1024 * 1024,
                status: PodStatus::Creating,
                provider_status: "creating".to_string(),
                ..Pod::default()
            },
        }
    }

    /// Set status.
    #[must_use]
    pub fn status(mut self, status: PodStatus) -> Self {
        self.pod.status = status;
        self.pod.provider_status = status.as_str().to_string();
        self
    }

    /// Set SSH coordinates.
    #[must_use]
    pub fn ssh(mut self, host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        self.pod.ssh_domain = host.into();
        self.pod.ssh_port = Some(port);
        self.pod.ssh_user = user.into();
        self
    }

    /// Set SSH password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.pod.password = password.into();
        self
    }

    /// Set pool id.
    #[must_use]
    pub fn pool_id(mut self, pool_id: impl Into<String>) -> Self {
        self.pod.pool_id = pool_id.into();
        self
    }

    /// Set GPU model and count.
    #[must_use]
    pub fn gpu(mut self, model: GpuModel, count: u32) -> Self {
        self.pod.gpu_model = model;
        self.pod.gpu_count = count;
        self
    }

    /// A running pod reachable at `ssh.test:2222` as `root`.
    #[must_use]
    pub fn running(id: impl Into<String>) -> Self {
        Self::new(id)
            .status(PodStatus::Running)
            .ssh("ssh.test", 2222, "root")
            .password("test-password")
    }

    /// Build the pod.
    #[must_use]
    pub fn build(self) -> Pod {
        self.pod
    }
}
