//! Session channels: PTY setup, the interactive shell loop and one-shot
//! command capture.

use podshell_term::WindowSize;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty, Sig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::exit::ExitReport;
use crate::error::TransportError;

/// `TERM` value requested for interactive shells.
pub const TERM: &str = "xterm-256color";

/// Terminal line speed advertised to the server, in baud.
pub const TERMINAL_SPEED: u32 = 14_400;

/// Extended data type code for stderr.
const EXTENDED_STDERR: u32 = 1;

/// Size of the stdin read buffer.
const STDIN_BUFFER: usize = 8192;

/// Terminal modes sent with the PTY request.
#[must_use]
pub const fn terminal_modes() -> [(Pty, u32); 5] {
    [
        (Pty::ECHO, 1),
        (Pty::ECHOCTL, 1),
        (Pty::IGNCR, 0),
        (Pty::TTY_OP_ISPEED, TERMINAL_SPEED),
        (Pty::TTY_OP_OSPEED, TERMINAL_SPEED),
    ]
}

/// A session channel on an established connection.
pub struct SessionChannel {
    channel: Channel<Msg>,
}

impl std::fmt::Debug for SessionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionChannel")
            .field("id", &self.channel.id())
            .finish()
    }
}

impl SessionChannel {
    pub(crate) const fn new(channel: Channel<Msg>) -> Self {
        Self { channel }
    }

    /// Ask the server to forward agent requests back over this connection.
    pub async fn request_agent_forwarding(&self) -> Result<(), TransportError> {
        self.channel
            .agent_forward(false)
            .await
            .map_err(|e| TransportError::channel(format!("agent forwarding request failed: {e}")))
    }

    /// Request a PTY of `size`.
    pub async fn request_pty(&self, size: WindowSize) -> Result<(), TransportError> {
        self.channel
            .request_pty(
                false,
                TERM,
                size.cols.into(),
                size.rows.into(),
                0,
                0,
                &terminal_modes(),
            )
            .await
            .map_err(|e| TransportError::channel(format!("PTY request failed: {e}")))
    }

    /// Start the login shell.
    pub async fn request_shell(&self) -> Result<(), TransportError> {
        self.channel
            .request_shell(false)
            .await
            .map_err(|e| TransportError::channel(format!("shell request failed: {e}")))
    }

    /// Run `command` without a PTY.
    pub async fn exec(&self, command: &str) -> Result<(), TransportError> {
        self.channel
            .exec(false, command)
            .await
            .map_err(|e| TransportError::channel(format!("exec request failed: {e}")))
    }

    /// Send a `window-change` request.
    pub async fn window_change(&self, size: WindowSize) -> Result<(), TransportError> {
        self.channel
            .window_change(size.cols.into(), size.rows.into(), 0, 0)
            .await
            .map_err(|e| TransportError::channel(format!("window change failed: {e}")))
    }

    /// Close the channel. Failures are logged.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close().await {
            tracing::debug!(error = %e, "Channel close failed");
        }
    }

    /// Relay local stdin to the channel and channel output to local
    /// stdout/stderr until the server closes the channel. Local window
    /// resizes received on `resizes` are forwarded.
    ///
    /// The caller owns terminal mode; this only moves bytes.
    pub async fn run_interactive(
        &mut self,
        mut resizes: tokio::sync::mpsc::UnboundedReceiver<WindowSize>,
    ) -> Result<ExitReport, TransportError> {
        let mut stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut stderr = tokio::io::stderr();
        let mut buf = vec![0u8; STDIN_BUFFER];
        let mut stdin_open = true;
        let mut resizes_open = true;
        let mut report = ExitReport::default();

        loop {
            tokio::select! {
                read = stdin.read(&mut buf), if stdin_open => match read {
                    Ok(0) => {
                        stdin_open = false;
                        self.send_eof().await?;
                    }
                    Ok(n) => self.send_data(&buf[..n]).await?,
                    Err(e) => {
                        tracing::debug!(error = %e, "Local stdin failed, sending EOF");
                        stdin_open = false;
                        self.send_eof().await?;
                    }
                },
                size = resizes.recv(), if resizes_open => match size {
                    Some(size) => {
                        tracing::trace!(%size, "Local terminal resized");
                        if let Err(e) = self.window_change(size).await {
                            tracing::debug!(error = %e, "Failed to propagate window size");
                        }
                    }
                    None => resizes_open = false,
                },
                msg = self.channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.write_all(&data[..]).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        if ext == EXTENDED_STDERR {
                            stderr.write_all(&data[..]).await?;
                            stderr.flush().await?;
                        }
                    }
                    Some(msg) => {
                        if record_exit(&mut report, msg) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        Ok(report)
    }

    /// Collect stdout and stderr in arrival order until the channel closes.
    pub async fn collect_output(&mut self) -> (Vec<u8>, ExitReport) {
        let mut output = Vec::new();
        let mut report = ExitReport::default();
        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
                    output.extend_from_slice(&data[..]);
                }
                other => {
                    if record_exit(&mut report, other) {
                        break;
                    }
                }
            }
        }
        (output, report)
    }

    async fn send_data(&self, data: &[u8]) -> Result<(), TransportError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| TransportError::channel(format!("data send failed: {e}")))
    }

    async fn send_eof(&self) -> Result<(), TransportError> {
        self.channel
            .eof()
            .await
            .map_err(|e| TransportError::channel(format!("EOF send failed: {e}")))
    }
}

/// Fold a non-data message into `report`. Returns true once the channel is
/// closed.
fn record_exit(report: &mut ExitReport, msg: ChannelMsg) -> bool {
    match msg {
        ChannelMsg::ExitStatus { exit_status } => {
            tracing::debug!(exit_status, "Remote exit status");
            report.status = Some(exit_status);
            false
        }
        ChannelMsg::ExitSignal { signal_name, .. } => {
            let name = signal_name_of(&signal_name);
            tracing::debug!(signal = %name, "Remote exit signal");
            report.signal = Some(name);
            false
        }
        ChannelMsg::Eof => {
            tracing::trace!("Remote EOF");
            false
        }
        ChannelMsg::Close => true,
        _ => false,
    }
}

/// Signal name without the `SIG` prefix, e.g. `INT`.
fn signal_name_of(sig: &Sig) -> String {
    match sig {
        Sig::Custom(name) => name.clone(),
        other => format!("{other:?}"),
    }
}
