//! Terminal window size.

#[cfg(unix)]
use std::os::fd::AsFd;

#[cfg(unix)]
use crate::error::{Result, TermError};

/// Terminal window size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSize {
    /// Number of columns.
    pub cols: u16,
    /// Number of rows.
    pub rows: u16,
}

impl WindowSize {
    /// Size used when the local terminal cannot report one: 80 columns by 40 rows.
    pub const DEFAULT: Self = Self { cols: 80, rows: 40 };

    /// Create a new window size.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// A zero dimension means the device has never been sized.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.cols == 0 || self.rows == 0
    }

    /// Replace an empty size with [`WindowSize::DEFAULT`].
    #[must_use]
    pub const fn or_default(self) -> Self {
        if self.is_empty() { Self::DEFAULT } else { self }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Query the window size of the terminal behind `fd`.
#[cfg(unix)]
pub fn query<Fd: AsFd>(fd: Fd) -> Result<WindowSize> {
    let winsize = rustix::termios::tcgetwinsize(fd)
        .map_err(|e| TermError::WindowSize(std::io::Error::from(e)))?;
    Ok(WindowSize::new(winsize.ws_col, winsize.ws_row))
}

/// Query the window size of the process's standard output.
///
/// Returns [`WindowSize::DEFAULT`] when stdout is not a terminal or the
/// query fails.
#[must_use]
pub fn current() -> WindowSize {
    #[cfg(unix)]
    {
        match query(std::io::stdout()) {
            Ok(size) => size.or_default(),
            Err(e) => {
                tracing::debug!(error = %e, "request for terminal size failed");
                WindowSize::DEFAULT
            }
        }
    }
    #[cfg(not(unix))]
    {
        WindowSize::DEFAULT
    }
}
