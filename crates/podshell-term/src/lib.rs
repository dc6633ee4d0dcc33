//! podshell-term: local terminal plumbing for interactive SSH sessions
//!
//! This crate owns the parts of an interactive session that touch the local
//! terminal and the process's signal disposition:
//!
//! - **Raw mode**: [`enter_raw_mode`] switches stdin to raw mode and returns a
//!   [`RawModeGuard`] that restores the saved attributes exactly once.
//! - **Window size**: [`WindowSize`] with a default of 80x40 used whenever the
//!   terminal cannot report one.
//! - **Signals**: [`ShutdownListener`] for SIGINT/SIGTERM/SIGHUP and
//!   [`resize_events`] for SIGWINCH.
//!
//! # Quick Start
//!
//! ```ignore
//! use podshell_term::{enter_raw_mode, resize_events};
//!
//! let (guard, size) = enter_raw_mode();
//! let (mut resizes, _handle) = resize_events()?;
//! // ... run the remote shell with `size`, forwarding `resizes` ...
//! guard.restore();
//! ```

pub mod error;
pub mod raw;
pub mod signals;
pub mod size;

pub use error::{Result, TermError};
pub use raw::{RawModeGuard, enter_raw_mode};
#[cfg(unix)]
pub use raw::{enter_raw_mode_with, is_terminal};
pub use signals::{
    ResizeHandle, ShutdownListener, ShutdownSignal, on_window_change, resize_events,
    shutdown_signal,
};
pub use size::WindowSize;
