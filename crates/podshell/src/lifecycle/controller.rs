//! The `up` flow: create a pod, wait for it, attach, and always destroy it.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use podshell_term::{ShutdownListener, ShutdownSignal};

use super::guard::Teardown;
use super::state::{LifecycleCallback, LifecycleEvent, LifecycleManager, PodState};
use crate::config::{PollConfig, SshConfig};
use crate::error::{Error, Result};
use crate::pool::{Pod, PodOptions, PodStatus, Pool};
use crate::transport::options::DEFAULT_USER;
use crate::transport::{ConnectionOptions, Connector, RemoteSession};

/// Drives one pod through its lifecycle.
pub struct PodController<P: Pool, C: Connector> {
    pool: Arc<P>,
    connector: C,
    poll: PollConfig,
    ssh: SshConfig,
    agent_socket: Option<PathBuf>,
    lifecycle: LifecycleManager,
}

impl<P: Pool, C: Connector> std::fmt::Debug for PodController<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodController")
            .field("pool", &self.pool.id())
            .field("poll", &self.poll)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl<P: Pool, C: Connector> PodController<P, C> {
    /// Create a controller.
    #[must_use]
    pub fn new(pool: Arc<P>, connector: C, poll: PollConfig, ssh: SshConfig) -> Self {
        Self {
            pool,
            connector,
            poll,
            ssh,
            agent_socket: None,
            lifecycle: LifecycleManager::new(),
        }
    }

    /// Set the local agent socket used for agent forwarding.
    #[must_use]
    pub fn with_agent_socket(mut self, socket: Option<PathBuf>) -> Self {
        self.agent_socket = socket;
        self
    }

    /// Register a lifecycle callback.
    pub fn on_event(&mut self, callback: LifecycleCallback) {
        self.lifecycle.on_event(callback);
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PodState {
        self.lifecycle.state()
    }

    /// Every state entered so far.
    #[must_use]
    pub fn history(&self) -> &[PodState] {
        self.lifecycle.history()
    }

    /// The pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    /// Ask the pool for a new pod.
    pub async fn provision(&mut self, options: &PodOptions) -> Result<Pod> {
        tracing::info!(
            pool = %self.pool.id(),
            gpu_model = %options.gpu_model,
            gpu_count = options.gpu_count,
            "Creating pod"
        );
        match self.pool.create_pod(options).await {
            Ok(pod) => {
                self.lifecycle.emit(&LifecycleEvent::Created {
                    pod_id: pod.id.clone(),
                });
                self.lifecycle.transition(PodState::Provisioning);
                tracing::info!(pod_id = %pod.id, "Pod created");
                Ok(pod)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Poll until the pod is running and has SSH coordinates.
    ///
    /// # Errors
    ///
    /// [`Error::PodFailed`] if the pool reports an error status,
    /// [`Error::ReadyTimeout`] once `poll.max_attempts` polls have passed,
    /// or the pool's error if a poll fails.
    pub async fn wait_ready(&mut self, pod_id: &str) -> Result<Pod> {
        let interval = self.poll.interval();
        let max_attempts = self.poll.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let pod = match self.pool.get_pod(pod_id).await {
                Ok(pod) => pod,
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            };
            self.lifecycle.emit(&LifecycleEvent::Polled {
                pod_id: pod_id.to_string(),
                attempt,
                status: pod.status,
            });

            match pod.status {
                PodStatus::Running if pod.ssh_coordinates().is_some() => {
                    tracing::info!(pod_id = %pod_id, attempt, "Pod is running");
                    self.lifecycle.transition(PodState::Ready);
                    return Ok(pod);
                }
                PodStatus::Running => {
                    tracing::debug!(pod_id = %pod_id, attempt, "Pod is running without an SSH endpoint yet");
                }
                PodStatus::Error => {
                    let err = Error::PodFailed {
                        pod_id: pod_id.to_string(),
                    };
                    self.fail(&err);
                    return Err(err);
                }
                status => {
                    tracing::info!(
                        pod_id = %pod_id,
                        status = %status,
                        provider_status = %pod.provider_status,
                        attempt,
                        "Waiting for pod"
                    );
                }
            }

            if max_attempts.is_some_and(|max| attempt >= max) {
                let err = Error::ReadyTimeout {
                    pod_id: pod_id.to_string(),
                    attempts: attempt,
                };
                self.fail(&err);
                return Err(err);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Connection options for `pod`: its coordinates plus the configured SSH
    /// defaults. A configured user overrides the pod's.
    pub fn connection_options(&self, pod: &Pod) -> Result<ConnectionOptions> {
        let coords = pod
            .ssh_coordinates()
            .ok_or_else(|| Error::config(format!("pod {} has no SSH endpoint yet", pod.id)))?;

        let user = self
            .ssh
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| Some(coords.user.clone()).filter(|u| !u.is_empty()))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let mut options = ConnectionOptions::new(coords.host)
            .port(coords.port)
            .user(user)
            .password(coords.password)
            .agent_forwarding(self.ssh.agent_forwarding)
            .auth(true)
            .connect_timeout(self.ssh.connect_timeout())
            .agent_socket(self.agent_socket.clone());
        if let Some(key) = &self.ssh.private_key {
            options = options.private_key(key, self.ssh.passphrase.clone());
        }
        Ok(options)
    }

    /// Open an interactive session on a ready pod. The session is closed
    /// whatever the outcome.
    pub async fn attach(&mut self, pod: &Pod) -> Result<()> {
        if !pod.is_running() {
            return Err(Error::config(format!(
                "pod {} is {}, not running",
                pod.id, pod.status
            )));
        }
        let options = self.connection_options(pod)?;
        tracing::info!(pod_id = %pod.id, host = %options.server, port = options.port, user = %options.user, "Attaching to pod");

        let mut session = self.connector.connect(&options).await?;
        self.lifecycle.transition(PodState::Attached);

        let result = session.attach().await;
        if let Err(e) = session.close().await {
            tracing::debug!(pod_id = %pod.id, error = %e, "Session close failed");
        }
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    /// Run the whole flow with process signals as the cancellation source.
    pub async fn run(&mut self, options: &PodOptions) -> Result<Pod> {
        let mut listener = ShutdownListener::register()
            .map_err(|e| Error::config(format!("failed to install signal handlers: {e}")))?;
        self.run_until(options, async move {
            match listener.recv().await {
                Some(signal) => signal,
                None => std::future::pending().await,
            }
        })
        .await
    }

    /// Provision, wait, attach, then destroy.
    ///
    /// The pod is destroyed exactly once whether the flow finishes, fails or
    /// is cut short by `shutdown`. A destroy failure takes precedence over the
    /// flow's own result because it may leave the pod billed.
    ///
    /// A signal that arrives while the pool is still creating the pod does not
    /// abandon the request: creation runs to completion so the returned id can
    /// be destroyed.
    pub async fn run_until<S>(&mut self, options: &PodOptions, shutdown: S) -> Result<Pod>
    where
        S: Future<Output = ShutdownSignal> + Send,
    {
        tokio::pin!(shutdown);

        let (created, signalled) = {
            let provision = self.provision(options);
            tokio::pin!(provision);
            tokio::select! {
                result = &mut provision => (result, None),
                signal = &mut shutdown => {
                    tracing::warn!(signal = %signal, "Interrupted while creating pod, waiting for its id");
                    (provision.await, Some(signal))
                }
            }
        };
        if let Some(signal) = signalled {
            self.interrupted(signal);
        }
        let pod = created.map_err(|e| match signalled {
            Some(signal) => {
                tracing::debug!(error = %e, "Pod creation failed after interrupt");
                Error::Interrupted { signal }
            }
            None => e,
        })?;

        let teardown = Teardown::new(Arc::clone(&self.pool), pod.id.clone());
        let outcome = match signalled {
            Some(signal) => Err(Error::Interrupted { signal }),
            None => tokio::select! {
                result = self.ready_and_attach(&pod.id) => result,
                signal = &mut shutdown => {
                    self.interrupted(signal);
                    Err(Error::Interrupted { signal })
                }
            },
        };

        if let Err(e) = &outcome {
            tracing::debug!(pod_id = %pod.id, error = %e, "Flow ended with an error, tearing down");
        }
        self.lifecycle.transition(PodState::Destroying);
        teardown.destroy().await?;
        self.lifecycle.transition(PodState::Destroyed);

        outcome.map(|()| pod)
    }

    async fn ready_and_attach(&mut self, pod_id: &str) -> Result<()> {
        let ready = self.wait_ready(pod_id).await?;
        self.attach(&ready).await
    }

    fn interrupted(&mut self, signal: ShutdownSignal) {
        tracing::warn!(signal = %signal, "Interrupted, cleaning up");
        self.lifecycle.emit(&LifecycleEvent::Interrupted(signal));
    }

    fn fail(&mut self, err: &Error) {
        self.lifecycle.emit(&LifecycleEvent::Error(err.to_string()));
        if self.lifecycle.state().can_transition_to(PodState::Failed) {
            self.lifecycle.transition(PodState::Failed);
        }
    }
}
