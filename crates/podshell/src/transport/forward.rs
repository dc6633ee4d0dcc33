//! Port forwarding.
//!
//! Local and remote forwarding share one loop, [`serve`]: accept a
//! connection, dial its counterpart, relay the pair. The direction of the
//! tunnel is decided entirely by which [`Acceptor`] and [`Dialer`] are
//! plugged in.
//!
//! | mode   | acceptor                                   | dialer        |
//! |--------|--------------------------------------------|---------------|
//! | local  | [`TcpAcceptor`] on a local port             | [`SshDialer`] |
//! | remote | [`ChannelAcceptor`] fed by `forwarded-tcpip` | [`TcpDialer`] |

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{Channel, ChannelStream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::addr::Endpoint;
use super::relay::{self, ReportSender};
use super::session::ClientHandler;
use crate::error::{Error, RelayError, Result};

/// Source of inbound connections.
#[async_trait]
pub trait Acceptor: Send {
    /// Connection type.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Wait for the next connection and a description of its peer.
    /// `Ok(None)` means the source is exhausted.
    async fn accept(&mut self) -> std::io::Result<Option<(Self::Stream, String)>>;

    /// Where connections are accepted, for logs.
    fn describe(&self) -> String;
}

/// Opens the counterpart of an accepted connection.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Connection type.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Connect to the target.
    async fn dial(&self) -> std::result::Result<Self::Stream, RelayError>;

    /// The target, for logs and errors.
    fn target(&self) -> String;
}

/// Accept connections and relay each one to a freshly dialed target.
///
/// Runs until the acceptor fails or is exhausted. Dial and copy failures of
/// a single pair are logged and sent on `reports`; they never stop the loop.
pub async fn serve<A, D>(mut acceptor: A, dialer: D, reports: ReportSender) -> Result<()>
where
    A: Acceptor,
    D: Dialer,
{
    let dialer = Arc::new(dialer);
    tracing::info!(listen = %acceptor.describe(), target = %dialer.target(), "Forwarding started");

    loop {
        let (inbound, peer) = match acceptor.accept().await {
            Ok(Some(accepted)) => accepted,
            Ok(None) => {
                tracing::info!(listen = %acceptor.describe(), "Forwarding source closed");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(listen = %acceptor.describe(), error = %e, "Accept failed, stopping forwarder");
                return Err(Error::Relay(RelayError::Accept(e)));
            }
        };
        tracing::debug!(peer = %peer, target = %dialer.target(), "Accepted connection");

        let dialer = Arc::clone(&dialer);
        let reports = reports.clone();
        tokio::spawn(async move {
            match dialer.dial().await {
                Ok(outbound) => {
                    relay::spawn_pair(inbound, outbound, peer, reports);
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Dial failed, dropping connection");
                    let _ = reports.send(e);
                }
            }
        });
    }
}

// ============================================================================
// Acceptors
// ============================================================================

/// Accepts TCP connections on a local listener.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind `endpoint`.
    pub async fn bind(endpoint: &Endpoint) -> std::io::Result<Self> {
        let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port)).await?;
        Ok(Self { listener })
    }

    /// Wrap an existing listener.
    #[must_use]
    pub const fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    /// The bound address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    type Stream = TcpStream;

    async fn accept(&mut self) -> std::io::Result<Option<(TcpStream, String)>> {
        let (stream, peer) = self.listener.accept().await?;
        Ok(Some((stream, peer.to_string())))
    }

    fn describe(&self) -> String {
        self.listener
            .local_addr()
            .map_or_else(|_| "tcp listener".to_string(), |addr| addr.to_string())
    }
}

/// A `forwarded-tcpip` channel and its originator.
pub type ForwardedChannel = (Channel<Msg>, String);

/// Accepts `forwarded-tcpip` channels routed to one remote bind port.
#[derive(Debug)]
pub struct ChannelAcceptor {
    bind: Endpoint,
    channels: mpsc::UnboundedReceiver<ForwardedChannel>,
}

impl ChannelAcceptor {
    /// Accept channels from `channels` for the remote `bind` endpoint.
    #[must_use]
    pub const fn new(bind: Endpoint, channels: mpsc::UnboundedReceiver<ForwardedChannel>) -> Self {
        Self { bind, channels }
    }
}

#[async_trait]
impl Acceptor for ChannelAcceptor {
    type Stream = ChannelStream<Msg>;

    async fn accept(&mut self) -> std::io::Result<Option<(ChannelStream<Msg>, String)>> {
        Ok(self
            .channels
            .recv()
            .await
            .map(|(channel, originator)| (channel.into_stream(), originator)))
    }

    fn describe(&self) -> String {
        format!("remote {}", self.bind)
    }
}

// ============================================================================
// Dialers
// ============================================================================

/// Dials a TCP target.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    target: Endpoint,
}

impl TcpDialer {
    /// Dial `target` for every accepted connection.
    #[must_use]
    pub const fn new(target: Endpoint) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self) -> std::result::Result<TcpStream, RelayError> {
        TcpStream::connect((self.target.host.as_str(), self.target.port))
            .await
            .map_err(|e| RelayError::dial(self.target.to_string(), e.to_string()))
    }

    fn target(&self) -> String {
        self.target.to_string()
    }
}

/// Opens `direct-tcpip` channels to a target through the SSH connection.
pub struct SshDialer {
    handle: SharedHandle,
    target: Endpoint,
}

impl SshDialer {
    /// Dial `target` from the server side of `handle`.
    #[must_use]
    pub const fn new(handle: SharedHandle, target: Endpoint) -> Self {
        Self { handle, target }
    }
}

impl std::fmt::Debug for SshDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshDialer")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Dialer for SshDialer {
    type Stream = ChannelStream<Msg>;

    async fn dial(&self) -> std::result::Result<ChannelStream<Msg>, RelayError> {
        let channel = self
            .handle
            .lock()
            .await
            .channel_open_direct_tcpip(
                self.target.host.as_str(),
                self.target.port.into(),
                "127.0.0.1",
                0,
            )
            .await
            .map_err(|e| RelayError::dial(self.target.to_string(), e.to_string()))?;
        Ok(channel.into_stream())
    }

    fn target(&self) -> String {
        format!("remote {}", self.target)
    }
}

// ============================================================================
// Remote forward routing
// ============================================================================

/// A client handle shared by the session and its forwarders.
pub type SharedHandle = Arc<tokio::sync::Mutex<client::Handle<ClientHandler>>>;

/// Routes `forwarded-tcpip` channels from the connection handler to the
/// [`ChannelAcceptor`] registered for their bind port.
///
/// Closing the registry drops every route, which ends the acceptors. A closed
/// registry hands out receivers that are already finished.
#[derive(Debug, Clone, Default)]
pub struct ForwardRegistry {
    routes: Arc<Mutex<Routes>>,
}

#[derive(Debug, Default)]
struct Routes {
    ports: HashMap<u32, mpsc::UnboundedSender<ForwardedChannel>>,
    closed: bool,
}

impl ForwardRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start routing channels for `port`. Replaces an earlier route.
    pub fn register(&self, port: u32) -> mpsc::UnboundedReceiver<ForwardedChannel> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut routes) = self.routes.lock() {
            if !routes.closed {
                routes.ports.insert(port, tx);
            }
        }
        rx
    }

    /// Stop routing channels for `port`.
    pub fn unregister(&self, port: u32) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.ports.remove(&port);
        }
    }

    /// Drop every route and refuse new ones. Called when the connection ends.
    pub fn close(&self) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.closed = true;
            let ports = std::mem::take(&mut routes.ports);
            if !ports.is_empty() {
                tracing::debug!(routes = ports.len(), "Connection closed, ending remote forwards");
            }
        }
    }

    /// Check if `port` has a route.
    #[must_use]
    pub fn contains(&self, port: u32) -> bool {
        self.routes
            .lock()
            .map(|routes| routes.ports.contains_key(&port))
            .unwrap_or(false)
    }

    /// Hand `channel` to the acceptor for `port`. Gives the channel back when
    /// nobody is listening.
    pub fn route(
        &self,
        port: u32,
        channel: Channel<Msg>,
        originator: String,
    ) -> std::result::Result<(), Channel<Msg>> {
        let sender = self
            .routes
            .lock()
            .ok()
            .and_then(|routes| routes.ports.get(&port).cloned());
        match sender {
            Some(sender) => sender
                .send((channel, originator))
                .map_err(|mpsc::error::SendError((channel, _))| channel),
            None => Err(channel),
        }
    }
}
