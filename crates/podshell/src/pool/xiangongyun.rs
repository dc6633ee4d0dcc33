//! Xiangongyun GPU cloud adaptor.
//!
//! JSON over HTTPS with a bearer token. Every response is wrapped in an
//! envelope carrying an application `code`; anything other than 200 is a
//! failure even when the HTTP status is 200.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::{GpuModel, Pod, PodOptions, PodStatus, Pool};
use crate::config::ProviderConfig;
use crate::error::{Error, ProviderError, Result};

/// Identifier of this pool.
pub const POOL_ID: &str = "xiangongyun";

/// Application code for success.
const CODE_OK: i64 = 200;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider name for a GPU model, or `None` when the provider does not
/// offer it.
#[must_use]
pub fn provider_gpu_model(model: &GpuModel) -> Option<&'static str> {
    match model {
        GpuModel::Rtx4090 => Some("NVIDIA GeForce RTX 4090"),
        GpuModel::Rtx4090D => Some("NVIDIA GeForce RTX 4090 D"),
        _ => None,
    }
}

/// Map a provider GPU name back to a model.
#[must_use]
pub fn gpu_model_from_provider(name: &str) -> GpuModel {
    match name {
        "NVIDIA GeForce RTX 4090" => GpuModel::Rtx4090,
        "NVIDIA GeForce RTX 4090 D" => GpuModel::Rtx4090D,
        other => other.parse().unwrap_or_else(|never| match never {}),
    }
}

/// Normalize a provider status string.
#[must_use]
pub fn status_from_provider(status: &str) -> PodStatus {
    match status.to_ascii_lowercase().as_str() {
        "running" => PodStatus::Running,
        "error" | "failed" => PodStatus::Error,
        "stopped" | "shutdown" | "destroyed" | "stopping" => PodStatus::Stopped,
        _ => PodStatus::Creating,
    }
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An instance as returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Instance {
    /// Instance id.
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Creation time.
    #[serde(deserialize_with = "nullable")]
    pub create_timestamp: i64,
    /// Data center name.
    #[serde(deserialize_with = "nullable")]
    pub data_center_name: String,
    /// Display name.
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    /// Provider GPU name.
    #[serde(deserialize_with = "nullable")]
    pub gpu_model: String,
    /// GPUs attached.
    #[serde(deserialize_with = "nullable")]
    pub gpu_used: u32,
    /// CPU model.
    #[serde(deserialize_with = "nullable")]
    pub cpu_model: String,
    /// CPU cores.
    #[serde(deserialize_with = "nullable")]
    pub cpu_core_count: u32,
    /// Memory in bytes.
    #[serde(deserialize_with = "nullable")]
    pub memory_size: i64,
    /// System disk in bytes.
    #[serde(deserialize_with = "nullable")]
    pub system_disk_size: i64,
    /// Data disk in bytes.
    #[serde(deserialize_with = "nullable")]
    pub data_disk_size: i64,
    /// Expandable data disk in bytes.
    #[serde(deserialize_with = "nullable")]
    pub expandable_data_disk_size: i64,
    /// Data disk mount point.
    #[serde(deserialize_with = "nullable")]
    pub data_disk_mount_path: String,
    /// Hourly price.
    #[serde(deserialize_with = "nullable")]
    pub price_per_hour: f64,
    /// Installed public key.
    #[serde(deserialize_with = "nullable")]
    pub ssh_key: String,
    /// SSH port; the API sends it as a string, sometimes as a number.
    pub ssh_port: serde_json::Value,
    /// SSH user.
    #[serde(deserialize_with = "nullable")]
    pub ssh_user: String,
    /// SSH password.
    #[serde(deserialize_with = "nullable")]
    pub password: String,
    /// Raw status.
    #[serde(deserialize_with = "nullable")]
    pub status: String,
    /// SSH host.
    #[serde(deserialize_with = "nullable")]
    pub ssh_domain: String,
    /// Image id.
    #[serde(deserialize_with = "nullable")]
    pub image_id: String,
    /// Image type.
    #[serde(deserialize_with = "nullable")]
    pub image_type: String,
    /// Whether the image is saved on destroy.
    #[serde(deserialize_with = "nullable")]
    pub image_save: bool,
}

impl Instance {
    fn ssh_port(&self) -> Option<u16> {
        match &self.ssh_port {
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            _ => None,
        }
    }

    /// Convert to a [`Pod`] owned by `pool_id`.
    #[must_use]
    pub fn into_pod(self, pool_id: &str) -> Pod {
        let ssh_port = self.ssh_port();
        Pod {
            pool_id: pool_id.to_string(),
            create_timestamp: self.create_timestamp,
            name: self.name,
            data_center_name: self.data_center_name,
            gpu_model: gpu_model_from_provider(&self.gpu_model),
            gpu_count: self.gpu_used,
            cpu_model: self.cpu_model,
            cpu_core_count: self.cpu_core_count,
            memory_size: self.memory_size,
            system_disk_size: self.system_disk_size,
            data_disk_size: self.data_disk_size,
            expandable_data_disk_size: self.expandable_data_disk_size,
            data_disk_mount_path: self.data_disk_mount_path,
            price_per_hour: self.price_per_hour,
            ssh_domain: self.ssh_domain,
            ssh_port,
            ssh_user: self.ssh_user,
            password: self.password,
            ssh_key: self.ssh_key,
            status: status_from_provider(&self.status),
            provider_status: self.status,
            image_id: self.image_id,
            image_type: self.image_type,
            image_save: self.image_save,
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default, deserialize_with = "nullable")]
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn check(self, operation: &str) -> Result<Option<T>> {
        if self.code == CODE_OK {
            Ok(self.data)
        } else {
            Err(ProviderError::Api {
                operation: operation.to_string(),
                code: self.code,
                msg: self.msg,
            }
            .into())
        }
    }

    fn into_data(self, operation: &str) -> Result<T> {
        self.check(operation)?.ok_or_else(|| {
            ProviderError::Api {
                operation: operation.to_string(),
                code: CODE_OK,
                msg: "response has no data".to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct InstanceList {
    #[serde(default, deserialize_with = "nullable")]
    list: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
struct Deployed {
    id: String,
}

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    gpu_model: &'a str,
    gpu_count: u32,
    data_center_id: u32,
    image: &'a str,
    image_type: &'a str,
}

#[derive(Debug, Serialize)]
struct DestroyRequest<'a> {
    id: &'a str,
}

/// Pool backed by the Xiangongyun API.
#[derive(Clone)]
pub struct XiangongyunPool {
    client: reqwest::Client,
    api_base: String,
    authorization: String,
    data_center_id: u32,
    image: String,
    image_type: String,
}

impl std::fmt::Debug for XiangongyunPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XiangongyunPool")
            .field("api_base", &self.api_base)
            .field("data_center_id", &self.data_center_id)
            .field("image", &self.image)
            .field("image_type", &self.image_type)
            .finish_non_exhaustive()
    }
}

impl XiangongyunPool {
    /// Create a pool using `token` and the deploy settings in `config`.
    pub fn new(token: &str, config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("podshell/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Http {
                url: config.api_base.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            authorization: format!("Bearer {token}"),
            data_center_id: config.data_center_id,
            image: config.image.clone(),
            image_type: config.image_type.clone(),
        })
    }

    /// The API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Envelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let url = format!("{}{path}", self.api_base);
        tracing::debug!(method = %method, url = %url, "Provider request");

        let mut request = self
            .client
            .request(method, url.as_str())
            .header(reqwest::header::AUTHORIZATION, &self.authorization);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ProviderError::Http {
            url: url.clone(),
            source: e,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ProviderError::Http {
            url: url.clone(),
            source: e,
        })?;
        tracing::debug!(url = %url, status = status.as_u16(), bytes = text.len(), "Provider response");

        if !status.is_success() {
            return Err(ProviderError::Status {
                url,
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        serde_json::from_str(&text).map_err(|e| ProviderError::Decode { url, source: e }.into())
    }
}

#[async_trait]
impl Pool for XiangongyunPool {
    fn id(&self) -> &str {
        POOL_ID
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let envelope: Envelope<InstanceList> = self
            .request(Method::GET, "/open/instances", None::<&()>)
            .await?;
        let list = envelope.check("list pods")?.unwrap_or_default().list;
        Ok(list.into_iter().map(|i| i.into_pod(POOL_ID)).collect())
    }

    async fn get_pod(&self, id: &str) -> Result<Pod> {
        let envelope: Envelope<Instance> = self
            .request(Method::GET, &format!("/open/instance/{id}"), None::<&()>)
            .await?;
        let pod = envelope.into_data("get pod")?.into_pod(POOL_ID);
        tracing::debug!(pod_id = %pod.id, status = %pod.provider_status, "Fetched pod");
        Ok(pod)
    }

    async fn create_pod(&self, options: &PodOptions) -> Result<Pod> {
        let gpu_model = provider_gpu_model(&options.gpu_model)
            .ok_or_else(|| Error::unsupported_resource(options.gpu_model.as_str(), POOL_ID))?;

        let payload = DeployRequest {
            gpu_model,
            gpu_count: options.gpu_count,
            data_center_id: self.data_center_id,
            image: &self.image,
            image_type: &self.image_type,
        };
        let envelope: Envelope<Deployed> = self
            .request(Method::POST, "/open/instance/deploy", Some(&payload))
            .await?;
        let deployed = envelope.into_data("deploy pod")?;
        tracing::info!(pod_id = %deployed.id, gpu_model, gpu_count = options.gpu_count, "Pod requested");

        match self.get_pod(&deployed.id).await {
            Ok(pod) => Ok(pod),
            Err(e) => {
                // The pod exists now; hand back its id so it can still be destroyed.
                tracing::warn!(pod_id = %deployed.id, error = %e, "Failed to fetch new pod");
                Ok(Pod {
                    id: deployed.id,
                    pool_id: POOL_ID.to_string(),
                    gpu_model: options.gpu_model.clone(),
                    gpu_count: options.gpu_count,
                    status: PodStatus::Creating,
                    ..Pod::default()
                })
            }
        }
    }

    async fn destroy_pod(&self, id: &str) -> Result<()> {
        let envelope: Envelope<serde_json::Value> = self
            .request(
                Method::POST,
                "/open/instance/shutdown_destroy",
                Some(&DestroyRequest { id }),
            )
            .await?;
        envelope.check("destroy pod")?;
        tracing::info!(pod_id = %id, "Pod destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE_JSON: &str = r#"{
        "id": "inst-42",
        "create_timestamp": 1718000000,
        "data_center_name": "Zone A",
        "name": "my-pod",
        "gpu_model": "NVIDIA GeForce RTX 4090 D",
        "gpu_used": 2,
        "cpu_model": "EPYC",
        "cpu_core_count": 32,
        "memory_size": 68719476736,
        "system_disk_size": 53687091200,
        "data_disk_size": 0,
        "expandable_data_disk_size": 107374182400,
        "data_disk_mount_path": "/data",
        "price_per_hour": 3.5,
        "ssh_key": "",
        "ssh_port": "30022",
        "ssh_user": "root",
        "password": "pw",
        "jupyter_token": "ignored",
        "status": "running",
        "ssh_domain": "ssh.example.com",
        "image_id": "img",
        "image_type": "public",
        "image_save": false
    }"#;

    #[test]
    fn gpu_model_mapping() {
        assert_eq!(
            provider_gpu_model(&GpuModel::Rtx4090),
            Some("NVIDIA GeForce RTX 4090")
        );
        assert_eq!(
            provider_gpu_model(&GpuModel::Rtx4090D),
            Some("NVIDIA GeForce RTX 4090 D")
        );
        assert_eq!(provider_gpu_model(&GpuModel::A100x80G), None);
        assert_eq!(provider_gpu_model(&GpuModel::Rtx3090), None);
    }

    #[test]
    fn gpu_model_reverse_mapping() {
        assert_eq!(gpu_model_from_provider("NVIDIA GeForce RTX 4090"), GpuModel::Rtx4090);
        assert_eq!(gpu_model_from_provider("A800-80G"), GpuModel::A800x80G);
        assert_eq!(
            gpu_model_from_provider("NVIDIA H20"),
            GpuModel::Other("NVIDIA H20".into())
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_from_provider("running"), PodStatus::Running);
        assert_eq!(status_from_provider("Running"), PodStatus::Running);
        assert_eq!(status_from_provider("error"), PodStatus::Error);
        assert_eq!(status_from_provider("failed"), PodStatus::Error);
        assert_eq!(status_from_provider("shutdown"), PodStatus::Stopped);
        assert_eq!(status_from_provider("destroyed"), PodStatus::Stopped);
        assert_eq!(status_from_provider("deploying"), PodStatus::Creating);
        assert_eq!(status_from_provider(""), PodStatus::Creating);
    }

    #[test]
    fn decode_instance() {
        let instance: Instance = serde_json::from_str(INSTANCE_JSON).unwrap();
        let pod = instance.into_pod(POOL_ID);
        assert_eq!(pod.id, "inst-42");
        assert_eq!(pod.qualified_id(), "xiangongyun-inst-42");
        assert_eq!(pod.gpu_model, GpuModel::Rtx4090D);
        assert_eq!(pod.gpu_count, 2);
        assert_eq!(pod.status, PodStatus::Running);
        assert_eq!(pod.provider_status, "running");
        assert_eq!(pod.ssh_port, Some(30022));
        assert_eq!(pod.memory_size, 68_719_476_736);

        let coords = pod.ssh_coordinates().unwrap();
        assert_eq!(coords.host, "ssh.example.com");
        assert_eq!(coords.user, "root");
        assert_eq!(coords.password, "pw");
    }

    #[test]
    fn decode_numeric_port_and_nulls() {
        let instance: Instance = serde_json::from_str(
            r#"{"id": "x", "ssh_port": 2222, "ssh_domain": null, "status": null, "gpu_used": null}"#,
        )
        .unwrap();
        let pod = instance.into_pod(POOL_ID);
        assert_eq!(pod.ssh_port, Some(2222));
        assert_eq!(pod.ssh_domain, "");
        assert_eq!(pod.status, PodStatus::Creating);
        assert_eq!(pod.gpu_count, 0);
        assert!(pod.ssh_coordinates().is_none());
    }

    #[test]
    fn empty_port_is_unassigned() {
        let instance: Instance =
            serde_json::from_str(r#"{"id": "x", "ssh_port": "", "ssh_domain": "h"}"#).unwrap();
        assert_eq!(instance.into_pod(POOL_ID).ssh_port, None);
    }

    #[test]
    fn envelope_rejects_non_200_code() {
        let envelope: Envelope<Deployed> =
            serde_json::from_str(r#"{"code": 4001, "msg": "insufficient balance", "data": null}"#)
                .unwrap();
        let err = envelope.into_data("deploy pod").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("4001"));
        assert!(msg.contains("insufficient balance"));
    }

    #[test]
    fn envelope_list() {
        let text = format!(r#"{{"code": 200, "data": {{"list": [{INSTANCE_JSON}]}}}}"#);
        let envelope: Envelope<InstanceList> = serde_json::from_str(&text).unwrap();
        let list = envelope.check("list pods").unwrap().unwrap_or_default().list;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "inst-42");
    }

    #[test]
    fn deploy_payload_shape() {
        let payload = DeployRequest {
            gpu_model: "NVIDIA GeForce RTX 4090",
            gpu_count: 1,
            data_center_id: 1,
            image: "img",
            image_type: "public",
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "gpu_model": "NVIDIA GeForce RTX 4090",
                "gpu_count": 1,
                "data_center_id": 1,
                "image": "img",
                "image_type": "public"
            })
        );
    }

    #[tokio::test]
    async fn unsupported_model_fails_before_any_request() {
        let config = ProviderConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            ..ProviderConfig::default()
        };
        let pool = XiangongyunPool::new("token", &config).unwrap();
        let err = pool
            .create_pod(&PodOptions::new(GpuModel::A100x80G, 1))
            .await
            .unwrap_err();
        match err {
            Error::UnsupportedResource { model, pool } => {
                assert_eq!(model, "A100-80G");
                assert_eq!(pool, POOL_ID);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn debug_hides_token() {
        let pool = XiangongyunPool::new("very-secret", &ProviderConfig::default()).unwrap();
        let out = format!("{pool:?}");
        assert!(!out.contains("very-secret"));
        assert!(out.contains("api.xiangongyun.com"));
    }
}
