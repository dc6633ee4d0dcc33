//! SSH session over russh.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future;
use russh::client::{self, Msg};
use russh::keys::{HashAlg, PublicKey};
use russh::{Channel, Disconnect};

use super::addr::{Endpoint, ForwardSpec};
use super::auth::Authenticator;
use super::channel::SessionChannel;
use super::exit::{self, ExitOutcome};
use super::forward::{
    self, ChannelAcceptor, ForwardRegistry, SharedHandle, SshDialer, TcpAcceptor, TcpDialer,
};
use super::relay::ReportSender;
use super::{ConnectionOptions, Connector, RemoteSession, agent};
use crate::error::{Error, RelayError, Result, TransportError};

// ============================================================================
// Connection handler
// ============================================================================

/// Connection-level callbacks: host key check and server-initiated channels.
pub struct ClientHandler {
    host: String,
    forwards: ForwardRegistry,
    agent_socket: Option<PathBuf>,
}

impl ClientHandler {
    fn new(host: String, forwards: ForwardRegistry, agent_socket: Option<PathBuf>) -> Self {
        Self {
            host,
            forwards,
            agent_socket,
        }
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        // The handler lives exactly as long as the connection.
        self.forwards.close();
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    /// Pods get fresh host keys on every boot, so there is nothing to pin
    /// against. The key is logged and accepted.
    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        tracing::debug!(
            host = %self.host,
            key_type = %server_public_key.algorithm().as_str(),
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting server host key"
        );
        Ok(true)
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> std::result::Result<(), Self::Error> {
        let originator = format!("{originator_address}:{originator_port}");
        tracing::debug!(
            address = %connected_address,
            port = connected_port,
            originator = %originator,
            "Server opened forwarded-tcpip channel"
        );
        if let Err(channel) = self.forwards.route(connected_port, channel, originator) {
            tracing::warn!(port = connected_port, "No forwarder for remote port, closing channel");
            let _ = channel.close().await;
        }
        Ok(())
    }

    async fn server_channel_open_agent_forward(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut client::Session,
    ) -> std::result::Result<(), Self::Error> {
        match &self.agent_socket {
            Some(socket) => {
                tracing::debug!(socket = %socket.display(), "Server opened agent channel");
                tokio::spawn(agent::relay_channel(channel, socket.clone()));
            }
            None => {
                tracing::debug!("Agent channel requested without forwarding, closing");
                let _ = channel.close().await;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// One authenticated SSH connection.
///
/// Hosts at most one foreground shell ([`attach`](Self::attach)) and any
/// number of forwarders. [`close`](Self::close) disconnects; dropping an
/// unclosed session disconnects in the background.
pub struct SshSession {
    handle: SharedHandle,
    forwards: ForwardRegistry,
    host: String,
    port: u16,
    user: String,
    agent_forwarding: bool,
    closed: bool,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("agent_forwarding", &self.agent_forwarding)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Connect, handshake and authenticate.
    ///
    /// # Errors
    ///
    /// Credential problems surface as [`Error::Auth`]; network and protocol
    /// problems as [`TransportError::Connection`], [`TransportError::Timeout`]
    /// or [`TransportError::Authentication`].
    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        let credentials = Authenticator::resolve(options).await?;

        let forwards = ForwardRegistry::new();
        let handler = ClientHandler::new(
            options.server.clone(),
            forwards.clone(),
            credentials.agent_socket.clone(),
        );
        let config = Arc::new(client::Config::default());

        tracing::info!(host = %options.server, port = options.port, "Connecting to SSH server");
        let mut handle = tokio::time::timeout(
            options.connect_timeout,
            client::connect(config, (options.server.as_str(), options.port), handler),
        )
        .await
        .map_err(|_| TransportError::timeout(&options.server, options.port, options.connect_timeout))?
        .map_err(|e| TransportError::connection(&options.server, options.port, e.to_string()))?;

        Authenticator::authenticate(&mut handle, &credentials).await?;

        tracing::info!(
            host = %options.server,
            user = %credentials.user,
            "SSH connection established"
        );

        Ok(Self {
            handle: Arc::new(tokio::sync::Mutex::new(handle)),
            forwards,
            host: options.server.clone(),
            port: options.port,
            user: credentials.user,
            agent_forwarding: credentials.agent_socket.is_some(),
            closed: false,
        })
    }

    /// Server host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Check if agent forwarding is active.
    #[must_use]
    pub const fn agent_forwarding(&self) -> bool {
        self.agent_forwarding
    }

    /// Open a session channel, requesting agent forwarding when enabled.
    pub async fn open_channel(&self) -> Result<SessionChannel> {
        let channel = self
            .handle
            .lock()
            .await
            .channel_open_session()
            .await
            .map_err(|e| TransportError::channel(format!("failed to open session channel: {e}")))?;
        let channel = SessionChannel::new(channel);
        if self.agent_forwarding {
            channel.request_agent_forwarding().await?;
        }
        Ok(channel)
    }

    /// Run an interactive login shell on the local terminal until it exits.
    ///
    /// The local terminal is put in raw mode for the duration and restored on
    /// every path.
    pub async fn attach(&self) -> Result<ExitOutcome> {
        let mut channel = self.open_channel().await?;

        let (guard, size) = podshell_term::enter_raw_mode();
        let (resizes, resize_handle) = match podshell_term::resize_events() {
            Ok((rx, handle)) => (rx, Some(handle)),
            Err(e) => {
                tracing::debug!(error = %e, "Window resize events unavailable");
                (tokio::sync::mpsc::unbounded_channel().1, None)
            }
        };

        let result = async {
            channel.request_pty(size).await?;
            channel.request_shell().await?;
            tracing::debug!(host = %self.host, %size, "Interactive shell started");
            channel.run_interactive(resizes).await
        }
        .await;

        drop(resize_handle);
        guard.restore();
        channel.close().await;

        let report = result?;
        Ok(exit::interpret(&report)?)
    }

    /// Run `command` without a PTY and return its combined output, then
    /// close the connection.
    ///
    /// # Errors
    ///
    /// A non-zero exit status yields [`TransportError::CommandFailed`] carrying
    /// the output.
    pub async fn exec_captured(mut self, command: &str) -> Result<Vec<u8>> {
        let result = self.run_captured(command).await;
        self.disconnect().await;
        self.closed = true;
        result
    }

    async fn run_captured(&self, command: &str) -> Result<Vec<u8>> {
        let mut channel = self.open_channel().await?;
        tracing::debug!(host = %self.host, command = %command, "Executing remote command");
        channel.exec(command).await?;
        let (output, report) = channel.collect_output().await;
        channel.close().await;

        match report.status {
            Some(0) | None => Ok(output),
            Some(status) => Err(TransportError::CommandFailed { status, output }.into()),
        }
    }

    /// A forwarder bound to this connection that can outlive the borrow.
    #[must_use]
    pub fn forwarder(&self) -> Forwarder {
        Forwarder {
            handle: Arc::clone(&self.handle),
            forwards: self.forwards.clone(),
        }
    }

    /// See [`Forwarder::local`].
    pub async fn forward_local(&self, bind: &Endpoint, target: &Endpoint, reports: ReportSender) -> Result<()> {
        self.forwarder().local(bind, target, reports).await
    }

    /// See [`Forwarder::remote`].
    pub async fn forward_remote(&self, bind: &Endpoint, target: &Endpoint, reports: ReportSender) -> Result<()> {
        self.forwarder().remote(bind, target, reports).await
    }

    /// Disconnect. Idempotent.
    pub async fn close(mut self) -> Result<()> {
        self.disconnect().await;
        self.closed = true;
        Ok(())
    }

    async fn disconnect(&self) {
        if self.closed {
            return;
        }
        let handle = self.handle.lock().await;
        if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
            tracing::debug!(host = %self.host, error = %e, "Disconnect failed");
        } else {
            tracing::debug!(host = %self.host, "Disconnected");
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let handle = Arc::clone(&self.handle);
        let host = self.host.clone();
        runtime.spawn(async move {
            let handle = handle.lock().await;
            let _ = handle.disconnect(Disconnect::ByApplication, "", "en").await;
            tracing::debug!(host = %host, "Disconnected dropped session");
        });
    }
}

// ============================================================================
// Forwarder
// ============================================================================

/// Port forwarding over an established connection.
///
/// Cheap to clone; every clone shares the connection.
#[derive(Clone)]
pub struct Forwarder {
    handle: SharedHandle,
    forwards: ForwardRegistry,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder").finish_non_exhaustive()
    }
}

impl Forwarder {
    /// Listen on local `bind` and tunnel each connection to `target` as seen
    /// from the server. Runs until the listener fails.
    pub async fn local(&self, bind: &Endpoint, target: &Endpoint, reports: ReportSender) -> Result<()> {
        let acceptor = TcpAcceptor::bind(bind)
            .await
            .map_err(|e| Error::Relay(RelayError::Accept(e)))?;
        tracing::info!(bind = %bind, target = %target, "Local forward listening");
        forward::serve(
            acceptor,
            SshDialer::new(Arc::clone(&self.handle), target.clone()),
            reports,
        )
        .await
    }

    /// Ask the server to listen on `bind` and relay each connection to local
    /// `target`. Runs until the connection closes.
    pub async fn remote(&self, bind: &Endpoint, target: &Endpoint, reports: ReportSender) -> Result<()> {
        let requested = u32::from(bind.port);
        let mut channels = self.forwards.register(requested);

        let assigned = self
            .handle
            .lock()
            .await
            .tcpip_forward(bind.host.as_str(), requested)
            .await
            .map_err(|e| {
                self.forwards.unregister(requested);
                TransportError::session(format!("tcpip-forward for {bind} rejected: {e}"))
            })?;

        let mut bind = bind.clone();
        if requested == 0 && assigned != 0 {
            self.forwards.unregister(requested);
            channels = self.forwards.register(assigned);
            bind.port = u16::try_from(assigned).unwrap_or(bind.port);
        }
        tracing::info!(bind = %bind, target = %target, "Remote forward listening");

        let port = u32::from(bind.port);
        let result = forward::serve(
            ChannelAcceptor::new(bind, channels),
            TcpDialer::new(target.clone()),
            reports,
        )
        .await;
        self.forwards.unregister(port);
        result
    }

    /// Run every local and remote forward concurrently.
    ///
    /// Returns when all of them have finished, or with the first forward
    /// that fails to start or whose listener dies; the rest are dropped.
    pub async fn run_all(&self, local: &[ForwardSpec], remote: &[ForwardSpec], reports: ReportSender) -> Result<()> {
        let local = local
            .iter()
            .map(|spec| self.local(&spec.bind, &spec.target, reports.clone()).boxed());
        let remote = remote
            .iter()
            .map(|spec| self.remote(&spec.bind, &spec.target, reports.clone()).boxed());
        future::try_join_all(local.chain(remote)).await.map(drop)
    }
}

// ============================================================================
// Trait seam
// ============================================================================

/// Opens [`SshSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, options: &ConnectionOptions) -> Result<SshSession> {
        SshSession::connect(options).await
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn attach(&mut self) -> Result<()> {
        SshSession::attach(self).await.map(drop)
    }

    async fn close(self) -> Result<()> {
        SshSession::close(self).await
    }
}
