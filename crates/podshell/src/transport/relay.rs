//! Byte relay between an accepted connection and its dialed counterpart.
//!
//! Each pair gets two independent tasks, one per direction. When one side
//! reaches EOF its peer's write half is shut down and the other direction
//! keeps running until it drains.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RelayError;

/// Which half of a relayed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the accepted connection to the dialed target.
    Outbound,
    /// From the dialed target back to the accepted connection.
    Inbound,
}

impl Direction {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sender half of the per-listener failure report channel.
pub type ReportSender = mpsc::UnboundedSender<RelayError>;

/// Receiver half of the per-listener failure report channel.
pub type ReportReceiver = mpsc::UnboundedReceiver<RelayError>;

/// Create a report channel for [`serve`](super::forward::serve).
#[must_use]
pub fn report_channel() -> (ReportSender, ReportReceiver) {
    mpsc::unbounded_channel()
}

/// Handles to the two copy tasks of one relayed pair.
///
/// Each task resolves to the number of bytes it copied. Dropping the pair
/// detaches the tasks; it does not cancel them.
#[derive(Debug)]
pub struct RelayPair {
    /// Accepted connection to target.
    pub outbound: JoinHandle<u64>,
    /// Target back to accepted connection.
    pub inbound: JoinHandle<u64>,
}

impl RelayPair {
    /// Wait for both directions and return `(outbound, inbound)` byte
    /// counts. A panicked task counts as zero.
    pub async fn join(self) -> (u64, u64) {
        let outbound = self.outbound.await.unwrap_or(0);
        let inbound = self.inbound.await.unwrap_or(0);
        (outbound, inbound)
    }
}

/// Relay bytes between `accepted` and `dialed` until both directions finish.
///
/// Copy failures are logged and sent on `reports`; a closed report channel
/// is ignored.
pub fn spawn_pair<A, D>(accepted: A, dialed: D, peer: String, reports: ReportSender) -> RelayPair
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    D: AsyncRead + AsyncWrite + Send + 'static,
{
    let (accepted_read, accepted_write) = tokio::io::split(accepted);
    let (dialed_read, dialed_write) = tokio::io::split(dialed);

    let outbound = tokio::spawn(copy_half(
        accepted_read,
        dialed_write,
        Direction::Outbound,
        peer.clone(),
        reports.clone(),
    ));
    let inbound = tokio::spawn(copy_half(
        dialed_read,
        accepted_write,
        Direction::Inbound,
        peer,
        reports,
    ));

    RelayPair { outbound, inbound }
}

async fn copy_half<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    peer: String,
    reports: ReportSender,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => {
            // Propagate EOF so the far side sees the half-close.
            if let Err(e) = writer.shutdown().await {
                tracing::trace!(peer = %peer, %direction, error = %e, "Shutdown after copy failed");
            }
            tracing::debug!(peer = %peer, %direction, bytes, "Relay direction finished");
            bytes
        }
        Err(e) => {
            let _ = writer.shutdown().await;
            tracing::warn!(peer = %peer, %direction, error = %e, "Relay copy failed");
            let _ = reports.send(RelayError::Copy {
                peer,
                direction,
                source: e,
            });
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, duplex};

    use super::*;

    #[test]
    fn direction_names() {
        assert_eq!(Direction::Outbound.to_string(), "outbound");
        assert_eq!(Direction::Inbound.to_string(), "inbound");
    }

    #[tokio::test]
    async fn relays_both_directions() {
        let (client, accepted) = duplex(64);
        let (dialed, server) = duplex(64);
        let (reports, mut rx) = report_channel();

        let pair = spawn_pair(accepted, dialed, "test".into(), reports);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut server_read, mut server_write) = tokio::io::split(server);

        client_write.write_all(b"ping").await.unwrap();
        client_write.shutdown().await.unwrap();
        let mut got = Vec::new();
        server_read.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"ping");

        server_write.write_all(b"pong!").await.unwrap();
        server_write.shutdown().await.unwrap();
        let mut got = Vec::new();
        client_read.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"pong!");

        assert_eq!(pair.join().await, (4, 5));
        assert!(rx.try_recv().is_err());
    }
}
