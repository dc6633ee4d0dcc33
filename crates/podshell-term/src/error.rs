//! Error types for the podshell-term crate.
//!
//! Most terminal failures are absorbed by the callers in this crate (a size
//! query that fails falls back to the default size, a failed restore is
//! logged). [`TermError`] is what those paths log, and what signal
//! registration returns since that one is not recoverable.

use std::io;

/// The error type for terminal and signal operations.
#[derive(Debug, thiserror::Error)]
pub enum TermError {
    /// Failed to read terminal attributes.
    #[error("failed to get terminal attributes: {0}")]
    GetAttributes(#[source] io::Error),

    /// Failed to apply terminal attributes.
    #[error("failed to set terminal attributes: {0}")]
    SetAttributes(#[source] io::Error),

    /// Failed to query the window size.
    #[error("failed to query window size: {0}")]
    WindowSize(#[source] io::Error),

    /// Failed to register a signal handler.
    #[error("failed to register signal handler: {0}")]
    Signal(#[source] io::Error),

    /// Any other I/O error.
    #[error("terminal I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized Result type for terminal operations.
pub type Result<T> = std::result::Result<T, TermError>;

#[cfg(unix)]
impl From<rustix::io::Errno> for TermError {
    fn from(errno: rustix::io::Errno) -> Self {
        Self::Io(io::Error::from_raw_os_error(errno.raw_os_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TermError::WindowSize(io::Error::other("not a tty"));
        assert_eq!(err.to_string(), "failed to query window size: not a tty");
    }

    #[test]
    fn error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "not found");
        let term_err: TermError = io_err.into();
        assert!(matches!(term_err, TermError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn error_from_errno() {
        let err: TermError = rustix::io::Errno::NOTTY.into();
        match err {
            TermError::Io(e) => {
                assert_eq!(e.raw_os_error(), Some(rustix::io::Errno::NOTTY.raw_os_error()));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
