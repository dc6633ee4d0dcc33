//! A connector that records what it was asked to do.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result, TransportError};
use crate::transport::{ConnectionOptions, Connector, RemoteSession};

#[derive(Debug, Default)]
struct Record {
    connects: Vec<ConnectionOptions>,
    attaches: u32,
    closes: u32,
}

/// A [`Connector`] that never touches the network.
///
/// Clones share their records, so a test can keep one and hand the other
/// to a controller.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    record: Arc<Mutex<Record>>,
    connect_error: Option<String>,
    attach_exit: Option<u32>,
    attach_delay: Option<Duration>,
}

impl MockConnector {
    /// A connector whose sessions attach and exit cleanly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail with a connection error.
    #[must_use]
    pub fn fail_connect(mut self, reason: impl Into<String>) -> Self {
        self.connect_error = Some(reason.into());
        self
    }

    /// Make `attach` end with remote exit `status`.
    #[must_use]
    pub const fn exit_status(mut self, status: u32) -> Self {
        self.attach_exit = Some(status);
        self
    }

    /// Make `attach` take `delay`, standing in for an interactive session.
    #[must_use]
    pub const fn attach_delay(mut self, delay: Duration) -> Self {
        self.attach_delay = Some(delay);
        self
    }

    /// Options passed to every `connect` call.
    #[must_use]
    pub fn connects(&self) -> Vec<ConnectionOptions> {
        self.lock().connects.clone()
    }

    /// Number of `attach` calls.
    #[must_use]
    pub fn attaches(&self) -> u32 {
        self.lock().attaches
    }

    /// Number of `close` calls.
    #[must_use]
    pub fn closes(&self) -> u32 {
        self.lock().closes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, options: &ConnectionOptions) -> Result<MockSession> {
        self.lock().connects.push(options.clone());
        if let Some(reason) = &self.connect_error {
            return Err(TransportError::connection(&options.server, options.port, reason.as_str()).into());
        }
        Ok(MockSession {
            connector: self.clone(),
        })
    }
}

/// Session produced by [`MockConnector`].
#[derive(Debug)]
pub struct MockSession {
    connector: MockConnector,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn attach(&mut self) -> Result<()> {
        self.connector.lock().attaches += 1;
        if let Some(delay) = self.connector.attach_delay {
            tokio::time::sleep(delay).await;
        }
        match self.connector.attach_exit {
            None | Some(0) => Ok(()),
            Some(status) => Err(Error::Transport(TransportError::RemoteExit { status })),
        }
    }

    async fn close(self) -> Result<()> {
        self.connector.lock().closes += 1;
        Ok(())
    }
}
