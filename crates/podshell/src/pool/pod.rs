//! Pod data model.

use std::fmt;
use std::str::FromStr;

/// Lifecycle status reported by a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PodStatus {
    /// Being created or booting.
    #[default]
    Creating,
    /// Up and accepting SSH connections.
    Running,
    /// Shut down or being destroyed.
    Stopped,
    /// The provider gave up on it.
    Error,
}

impl PodStatus {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPU model of a pod.
///
/// Unknown provider strings are preserved in [`GpuModel::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum GpuModel {
    /// NVIDIA A100 40 GB.
    A100x40G,
    /// NVIDIA A100 80 GB.
    A100x80G,
    /// NVIDIA A800 40 GB.
    A800x40G,
    /// NVIDIA A800 80 GB.
    A800x80G,
    /// NVIDIA GeForce RTX 4090.
    #[default]
    Rtx4090,
    /// NVIDIA GeForce RTX 4090 D.
    Rtx4090D,
    /// NVIDIA GeForce RTX 3090.
    Rtx3090,
    /// Any other model name.
    Other(String),
}

impl GpuModel {
    /// The models with a canonical short name.
    pub const KNOWN: [Self; 7] = [
        Self::A100x40G,
        Self::A100x80G,
        Self::A800x40G,
        Self::A800x80G,
        Self::Rtx4090,
        Self::Rtx4090D,
        Self::Rtx3090,
    ];

    /// Canonical short name, e.g. `RTX4090D`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::A100x40G => "A100-40G",
            Self::A100x80G => "A100-80G",
            Self::A800x40G => "A800-40G",
            Self::A800x80G => "A800-80G",
            Self::Rtx4090 => "RTX4090",
            Self::Rtx4090D => "RTX4090D",
            Self::Rtx3090 => "RTX3090",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for GpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpuModel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(Self::KNOWN
            .into_iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(s))
            .unwrap_or_else(|| Self::Other(s.to_string())))
    }
}

/// Resources requested for a new pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodOptions {
    /// GPU model.
    pub gpu_model: GpuModel,
    /// Number of GPUs.
    pub gpu_count: u32,
}

impl Default for PodOptions {
    fn default() -> Self {
        Self {
            gpu_model: GpuModel::Rtx4090,
            gpu_count: 1,
        }
    }
}

impl PodOptions {
    /// Create options for `gpu_count` GPUs of `gpu_model`.
    #[must_use]
    pub const fn new(gpu_model: GpuModel, gpu_count: u32) -> Self {
        Self {
            gpu_model,
            gpu_count,
        }
    }
}

/// Where and as whom to SSH into a pod.
#[derive(Clone, PartialEq, Eq)]
pub struct SshCoordinates {
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Advertised login user (may be empty).
    pub user: String,
    /// Advertised password (may be empty).
    pub password: String,
}

impl fmt::Debug for SshCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCoordinates")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

/// A remote compute instance as last reported by its pool.
///
/// Pods are snapshots: every status check yields a new value.
#[derive(Clone, PartialEq, Default)]
pub struct Pod {
    /// Provider-assigned id.
    pub id: String,
    /// Id of the pool that owns the pod.
    pub pool_id: String,
    /// Creation time, seconds since the epoch.
    pub create_timestamp: i64,
    /// Display name.
    pub name: String,
    /// Data center name.
    pub data_center_name: String,
    /// GPU model.
    pub gpu_model: GpuModel,
    /// Number of GPUs.
    pub gpu_count: u32,
    /// CPU model.
    pub cpu_model: String,
    /// CPU cores.
    pub cpu_core_count: u32,
    /// Memory in bytes.
    pub memory_size: i64,
    /// System disk in bytes.
    pub system_disk_size: i64,
    /// Data disk in bytes.
    pub data_disk_size: i64,
    /// How far the data disk can grow, in bytes.
    pub expandable_data_disk_size: i64,
    /// Where the data disk is mounted.
    pub data_disk_mount_path: String,
    /// Hourly price.
    pub price_per_hour: f64,
    /// SSH host.
    pub ssh_domain: String,
    /// SSH port, once assigned.
    pub ssh_port: Option<u16>,
    /// SSH user.
    pub ssh_user: String,
    /// SSH password.
    pub password: String,
    /// SSH public key installed on the pod.
    pub ssh_key: String,
    /// Normalized status.
    pub status: PodStatus,
    /// Status exactly as the provider reported it.
    pub provider_status: String,
    /// Image id.
    pub image_id: String,
    /// Image type.
    pub image_type: String,
    /// Whether the image is saved on destroy.
    pub image_save: bool,
}

impl Pod {
    /// `"<pool_id>-<id>"`, unique across pools.
    #[must_use]
    pub fn qualified_id(&self) -> String {
        format!("{}-{}", self.pool_id, self.id)
    }

    /// Check if the pod is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == PodStatus::Running
    }

    /// SSH coordinates, once the provider has assigned a host and port.
    #[must_use]
    pub fn ssh_coordinates(&self) -> Option<SshCoordinates> {
        if self.ssh_domain.is_empty() {
            return None;
        }
        let port = self.ssh_port?;
        Some(SshCoordinates {
            host: self.ssh_domain.clone(),
            port,
            user: self.ssh_user.clone(),
            password: self.password.clone(),
        })
    }
}

impl fmt::Debug for Pod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pod")
            .field("id", &self.id)
            .field("pool_id", &self.pool_id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("gpu_model", &self.gpu_model)
            .field("gpu_count", &self.gpu_count)
            .field("ssh_domain", &self.ssh_domain)
            .field("ssh_port", &self.ssh_port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_model_names() {
        let names: Vec<String> = GpuModel::KNOWN.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["A100-40G", "A100-80G", "A800-40G", "A800-80G", "RTX4090", "RTX4090D", "RTX3090"]
        );
    }

    #[test]
    fn gpu_model_parse() {
        assert_eq!("RTX4090D".parse::<GpuModel>().unwrap(), GpuModel::Rtx4090D);
        assert_eq!("rtx4090".parse::<GpuModel>().unwrap(), GpuModel::Rtx4090);
        assert_eq!(
            "H100".parse::<GpuModel>().unwrap(),
            GpuModel::Other("H100".to_string())
        );
        for model in GpuModel::KNOWN {
            assert_eq!(model.to_string().parse::<GpuModel>().unwrap(), model);
        }
    }

    #[test]
    fn qualified_id_joins_pool_and_id() {
        let pod = Pod {
            id: "abc".into(),
            pool_id: "xiangongyun".into(),
            ..Pod::default()
        };
        assert_eq!(pod.qualified_id(), "xiangongyun-abc");
    }

    #[test]
    fn coordinates_need_domain_and_port() {
        let mut pod = Pod {
            ssh_domain: "gpu.example.com".into(),
            ssh_user: "root".into(),
            ..Pod::default()
        };
        assert!(pod.ssh_coordinates().is_none());

        pod.ssh_port = Some(30022);
        let coords = pod.ssh_coordinates().unwrap();
        assert_eq!(coords.host, "gpu.example.com");
        assert_eq!(coords.port, 30022);
        assert_eq!(coords.user, "root");

        pod.ssh_domain.clear();
        assert!(pod.ssh_coordinates().is_none());
    }

    #[test]
    fn debug_hides_password() {
        let coords = SshCoordinates {
            host: "h".into(),
            port: 22,
            user: "u".into(),
            password: "hunter2".into(),
        };
        let out = format!("{coords:?}");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("<redacted>"));

        let pod = Pod {
            password: "hunter2".into(),
            ..Pod::default()
        };
        assert!(!format!("{pod:?}").contains("hunter2"));
    }

    #[test]
    fn default_options_match_create_defaults() {
        let options = PodOptions::default();
        assert_eq!(options.gpu_model, GpuModel::Rtx4090);
        assert_eq!(options.gpu_count, 1);
    }
}
