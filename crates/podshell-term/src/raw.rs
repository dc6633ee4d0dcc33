//! Raw-mode switching for the local terminal.
//!
//! An interactive remote shell needs the local terminal in raw mode so that
//! keystrokes (including Ctrl-C) reach the remote side unprocessed. The
//! saved attributes live in a [`RawModeGuard`] which puts them back exactly
//! once, either through [`RawModeGuard::restore`] or on drop.

#[cfg(unix)]
use std::os::fd::{AsFd, OwnedFd};

#[cfg(unix)]
use rustix::termios::{OptionalActions, Termios, isatty, tcgetattr, tcsetattr};

#[cfg(unix)]
use crate::error::{Result, TermError};
use crate::size::WindowSize;

#[cfg(unix)]
struct Saved {
    fd: OwnedFd,
    termios: Termios,
}

/// Restores the terminal attributes captured by [`enter_raw_mode`].
///
/// A guard for a non-terminal input is inert: dropping it does nothing.
pub struct RawModeGuard {
    #[cfg(unix)]
    saved: Option<Saved>,
}

impl RawModeGuard {
    /// A guard that restores nothing.
    #[must_use]
    pub const fn inert() -> Self {
        Self {
            #[cfg(unix)]
            saved: None,
        }
    }

    /// Whether the guard holds attributes that still need restoring.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        #[cfg(unix)]
        {
            self.saved.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Restore the saved attributes now.
    pub fn restore(mut self) {
        self.restore_saved();
    }

    fn restore_saved(&mut self) {
        #[cfg(unix)]
        if let Some(saved) = self.saved.take() {
            match tcsetattr(&saved.fd, OptionalActions::Now, &saved.termios) {
                Ok(()) => tracing::debug!("Restored terminal attributes"),
                Err(e) => tracing::warn!(error = %e, "Failed to restore terminal attributes"),
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore_saved();
    }
}

impl std::fmt::Debug for RawModeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawModeGuard")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Whether `fd` refers to a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_terminal<Fd: AsFd>(fd: Fd) -> bool {
    isatty(fd)
}

/// Put the process's stdin into raw mode and report stdout's size.
///
/// See [`enter_raw_mode_with`].
#[must_use]
pub fn enter_raw_mode() -> (RawModeGuard, WindowSize) {
    #[cfg(unix)]
    {
        enter_raw_mode_with(std::io::stdin(), std::io::stdout())
    }
    #[cfg(not(unix))]
    {
        (RawModeGuard::inert(), WindowSize::DEFAULT)
    }
}

/// Put `input` into raw mode and report the window size of `output`.
///
/// When `input` is not a terminal nothing is changed and the default size
/// (80x40) is returned. A failed size query also falls back to the default;
/// a failed raw switch is logged and yields an inert guard. None of these
/// abort the caller.
#[cfg(unix)]
#[must_use]
pub fn enter_raw_mode_with<I: AsFd, O: AsFd>(input: I, output: O) -> (RawModeGuard, WindowSize) {
    if !isatty(input.as_fd()) {
        tracing::debug!("Input is not a terminal, leaving attributes untouched");
        return (RawModeGuard::inert(), WindowSize::DEFAULT);
    }

    let size = match crate::size::query(output.as_fd()) {
        Ok(size) if !size.is_empty() => size,
        Ok(_) => {
            tracing::debug!("Terminal reported an empty size, using default");
            WindowSize::DEFAULT
        }
        Err(e) => {
            tracing::debug!(error = %e, "Request for terminal size failed");
            WindowSize::DEFAULT
        }
    };

    match make_raw(input.as_fd()) {
        Ok(saved) => {
            tracing::debug!(size = %size, "Entered raw mode");
            (RawModeGuard { saved: Some(saved) }, size)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Request for raw terminal failed");
            (RawModeGuard::inert(), size)
        }
    }
}

#[cfg(unix)]
fn make_raw<Fd: AsFd>(input: Fd) -> Result<Saved> {
    let fd = input.as_fd().try_clone_to_owned()?;
    let termios = tcgetattr(&fd).map_err(|e| TermError::GetAttributes(e.into()))?;

    let mut raw = termios.clone();
    raw.make_raw();
    tcsetattr(&fd, OptionalActions::Now, &raw).map_err(|e| TermError::SetAttributes(e.into()))?;

    Ok(Saved { fd, termios })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_guard_is_not_active() {
        let guard = RawModeGuard::inert();
        assert!(!guard.is_active());
        guard.restore();
    }

    #[test]
    fn debug_output() {
        let guard = RawModeGuard::inert();
        assert_eq!(format!("{guard:?}"), "RawModeGuard { active: false }");
    }

    #[cfg(unix)]
    #[test]
    fn non_terminal_input_skips_raw_mode() {
        let devnull = std::fs::File::open("/dev/null").unwrap();
        assert!(!is_terminal(&devnull));

        let (guard, size) = enter_raw_mode_with(&devnull, &devnull);
        assert!(!guard.is_active());
        assert_eq!(size, WindowSize::new(80, 40));
    }
}
