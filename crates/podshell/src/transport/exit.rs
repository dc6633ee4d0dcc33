//! Interpretation of how a remote shell ended.

use crate::error::TransportError;

/// Status of a shell interrupted with Ctrl-C.
pub const STATUS_INTERRUPTED: u32 = 130;

/// Status of a shell killed with SIGKILL, usually by the OOM killer.
pub const STATUS_KILLED: u32 = 137;

/// What the server reported when the channel closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    /// `exit-status`, if sent.
    pub status: Option<u32>,
    /// `exit-signal` name without the `SIG` prefix, if sent.
    pub signal: Option<String>,
}

impl ExitReport {
    /// A report with an exit status.
    #[must_use]
    pub const fn status(status: u32) -> Self {
        Self {
            status: Some(status),
            signal: None,
        }
    }

    /// A report with an exit signal.
    #[must_use]
    pub fn signal(name: impl Into<String>) -> Self {
        Self {
            status: None,
            signal: Some(name.into()),
        }
    }
}

/// How a session ended, when that counts as a normal end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit status 0.
    Success,
    /// The user interrupted the remote foreground process.
    Interrupted,
    /// The remote process was killed, most likely for lack of memory.
    Killed,
    /// The channel closed without an exit status.
    Unknown,
}

/// Map an [`ExitReport`] to an outcome or an error.
///
/// An exit status takes precedence over an exit signal.
pub fn interpret(report: &ExitReport) -> Result<ExitOutcome, TransportError> {
    let outcome = match (report.status, report.signal.as_deref()) {
        (Some(0), _) => ExitOutcome::Success,
        (Some(STATUS_INTERRUPTED), _) | (None, Some("INT")) => ExitOutcome::Interrupted,
        (Some(STATUS_KILLED), _) | (None, Some("KILL")) => ExitOutcome::Killed,
        (Some(status), _) => return Err(TransportError::RemoteExit { status }),
        (None, Some(signal)) => {
            return Err(TransportError::RemoteSignal {
                signal: signal.to_string(),
            });
        }
        (None, None) => ExitOutcome::Unknown,
    };

    match outcome {
        ExitOutcome::Killed => {
            tracing::warn!("Remote process was killed. Insufficient memory?");
        }
        ExitOutcome::Unknown => {
            tracing::debug!("Channel closed without an exit status");
        }
        ExitOutcome::Success | ExitOutcome::Interrupted => {}
    }
    Ok(outcome)
}
