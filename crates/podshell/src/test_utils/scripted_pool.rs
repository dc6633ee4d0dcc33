//! A pool that replays scripted statuses.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::PodBuilder;
use crate::error::{Error, ProviderError, Result};
use crate::pool::{Pod, PodOptions, PodStatus, Pool};

#[derive(Debug, Default)]
struct Calls {
    create: u32,
    get: u32,
    destroy: u32,
    destroyed: Vec<String>,
}

/// A [`Pool`] whose `get_pod` answers follow a script.
///
/// Each `get_pod` consumes the next scripted status; the last one repeats.
/// Every call is counted.
#[derive(Debug)]
pub struct ScriptedPool {
    template: Pod,
    statuses: Mutex<VecDeque<PodStatus>>,
    create_error: Option<String>,
    destroy_error: Option<String>,
    create_delay: Option<Duration>,
    destroy_delay: Option<Duration>,
    calls: Mutex<Calls>,
}

impl Default for ScriptedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPool {
    /// A pool whose pods are immediately running.
    #[must_use]
    pub fn new() -> Self {
        Self {
            template: PodBuilder::running("pod-1").build(),
            statuses: Mutex::new(VecDeque::from([PodStatus::Running])),
            create_error: None,
            destroy_error: None,
            create_delay: None,
            destroy_delay: None,
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Script the statuses returned by successive `get_pod` calls.
    #[must_use]
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = PodStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            ..self
        }
    }

    /// Use `pod` as the template for every returned pod.
    #[must_use]
    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.template = pod;
        self
    }

    /// Make `create_pod` fail with an API error.
    #[must_use]
    pub fn fail_create(mut self, msg: impl Into<String>) -> Self {
        self.create_error = Some(msg.into());
        self
    }

    /// Make `destroy_pod` fail with an API error.
    #[must_use]
    pub fn fail_destroy(mut self, msg: impl Into<String>) -> Self {
        self.destroy_error = Some(msg.into());
        self
    }

    /// Delay `create_pod` after it is counted.
    #[must_use]
    pub const fn create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Delay `destroy_pod` to widen race windows.
    #[must_use]
    pub const fn destroy_delay(mut self, delay: Duration) -> Self {
        self.destroy_delay = Some(delay);
        self
    }

    /// Number of `create_pod` calls.
    #[must_use]
    pub fn create_calls(&self) -> u32 {
        self.lock_calls().create
    }

    /// Number of `get_pod` calls.
    #[must_use]
    pub fn get_calls(&self) -> u32 {
        self.lock_calls().get
    }

    /// Number of `destroy_pod` calls, successful or not.
    #[must_use]
    pub fn destroy_calls(&self) -> u32 {
        self.lock_calls().destroy
    }

    /// Ids passed to successful `destroy_pod` calls.
    #[must_use]
    pub fn destroyed(&self) -> Vec<String> {
        self.lock_calls().destroyed.clone()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_status(&self) -> PodStatus {
        let mut statuses = self
            .statuses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(self.template.status)
        } else {
            statuses.front().copied().unwrap_or(self.template.status)
        }
    }

    fn pod(&self, id: &str, status: PodStatus) -> Pod {
        Pod {
            id: id.to_string(),
            status,
            provider_status: status.as_str().to_string(),
            ..self.template.clone()
        }
    }

    fn api_error(operation: &str, msg: &str) -> Error {
        Error::Provider(ProviderError::Api {
            operation: operation.to_string(),
            code: 500,
            msg: msg.to_string(),
        })
    }
}

#[async_trait]
impl Pool for ScriptedPool {
    fn id(&self) -> &str {
        &self.template.pool_id
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        Ok(vec![self.template.clone()])
    }

    async fn get_pod(&self, id: &str) -> Result<Pod> {
        self.lock_calls().get += 1;
        let status = self.next_status();
        Ok(self.pod(id, status))
    }

    async fn create_pod(&self, options: &PodOptions) -> Result<Pod> {
        self.lock_calls().create += 1;
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.create_error {
            return Err(Self::api_error("deploy", msg));
        }
        Ok(Pod {
            gpu_model: options.gpu_model.clone(),
            gpu_count: options.gpu_count,
            ..self.pod(&self.template.id, PodStatus::Creating)
        })
    }

    async fn destroy_pod(&self, id: &str) -> Result<()> {
        self.lock_calls().destroy += 1;
        if let Some(delay) = self.destroy_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.destroy_error {
            return Err(Self::api_error("shutdown_destroy", msg));
        }
        self.lock_calls().destroyed.push(id.to_string());
        Ok(())
    }
}
