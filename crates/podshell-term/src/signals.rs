//! Process signals that drive session teardown and terminal resizes.
//!
//! [`ShutdownListener`] turns SIGINT, SIGTERM and SIGHUP into a single
//! awaitable event so the caller can clean up remote resources before
//! exiting. [`on_window_change`] delivers SIGWINCH to a callback on a
//! dedicated thread.

use std::fmt;

use crate::error::{Result, TermError};

/// A signal asking the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownSignal {
    /// SIGINT (Ctrl-C).
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP (terminal closed).
    Hangup,
}

impl ShutdownSignal {
    /// Conventional signal name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
        }
    }

    /// Raw signal number.
    #[must_use]
    pub const fn number(self) -> i32 {
        match self {
            Self::Interrupt => 2,
            Self::Terminate => 15,
            Self::Hangup => 1,
        }
    }

    /// Map a raw signal number.
    #[must_use]
    pub const fn from_raw(signo: i32) -> Option<Self> {
        match signo {
            2 => Some(Self::Interrupt),
            15 => Some(Self::Terminate),
            1 => Some(Self::Hangup),
            _ => None,
        }
    }

    /// Shell-style exit status for a process stopped by this signal.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        128 + self.number()
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Shutdown
// ============================================================================

/// Listens for shutdown signals.
///
/// Handlers are installed by [`ShutdownListener::register`], so a signal that
/// arrives before [`ShutdownListener::recv`] is first awaited is not lost.
/// While the listener exists the default action (terminating the process)
/// is replaced.
pub struct ShutdownListener {
    #[cfg(unix)]
    signals: signal_hook_tokio::Signals,
    #[cfg(unix)]
    handle: signal_hook_tokio::Handle,
}

impl ShutdownListener {
    /// Install handlers for SIGINT, SIGTERM and SIGHUP.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register() -> Result<Self> {
        #[cfg(unix)]
        {
            use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

            let signals =
                signal_hook_tokio::Signals::new([SIGINT, SIGTERM, SIGHUP]).map_err(TermError::Signal)?;
            let handle = signals.handle();
            tracing::debug!("Registered shutdown signal handlers");
            Ok(Self { signals, handle })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next shutdown signal.
    ///
    /// Returns `None` once the listener has been closed.
    pub async fn recv(&mut self) -> Option<ShutdownSignal> {
        #[cfg(unix)]
        {
            use futures::StreamExt;

            while let Some(signo) = self.signals.next().await {
                if let Some(signal) = ShutdownSignal::from_raw(signo) {
                    tracing::debug!(signal = %signal, "Received shutdown signal");
                    return Some(signal);
                }
            }
            None
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok().map(|()| ShutdownSignal::Interrupt)
        }
    }
}

impl Drop for ShutdownListener {
    fn drop(&mut self) {
        #[cfg(unix)]
        self.handle.close();
    }
}

impl fmt::Debug for ShutdownListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownListener").finish_non_exhaustive()
    }
}

/// Register shutdown handlers and wait for the first signal.
pub async fn shutdown_signal() -> Result<ShutdownSignal> {
    let mut listener = ShutdownListener::register()?;
    listener
        .recv()
        .await
        .ok_or_else(|| TermError::Signal(std::io::Error::other("signal stream closed")))
}

// ============================================================================
// Window changes
// ============================================================================

/// Keeps a window-change handler alive. Dropping it stops the handler thread.
#[derive(Debug)]
pub struct ResizeHandle {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
}

impl ResizeHandle {
    /// Stop delivering window-change events.
    pub fn shutdown(&self) {
        #[cfg(unix)]
        self.handle.close();
    }
}

impl Drop for ResizeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Invoke `callback` each time the terminal window is resized (SIGWINCH).
///
/// The callback runs on a dedicated thread. On platforms without SIGWINCH
/// the callback is never invoked.
pub fn on_window_change<F>(callback: F) -> Result<ResizeHandle>
where
    F: Fn() + Send + 'static,
{
    #[cfg(unix)]
    {
        use signal_hook::consts::signal::SIGWINCH;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGWINCH]).map_err(TermError::Signal)?;
        let handle = signals.handle();

        std::thread::Builder::new()
            .name("podshell-sigwinch".into())
            .spawn(move || {
                for _ in signals.forever() {
                    callback();
                }
            })?;

        Ok(ResizeHandle { handle })
    }
    #[cfg(not(unix))]
    {
        drop(callback);
        Ok(ResizeHandle {})
    }
}

/// Deliver window-change events as an async stream of new sizes.
///
/// Each event carries the size of stdout at the time the signal was handled.
pub fn resize_events() -> Result<(tokio::sync::mpsc::UnboundedReceiver<crate::WindowSize>, ResizeHandle)> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = on_window_change(move || {
        // Receiver gone; the handle will be dropped shortly.
        let _ = tx.send(crate::size::current());
    })?;
    Ok((rx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_numbers_round_trip() {
        for signal in [ShutdownSignal::Interrupt, ShutdownSignal::Terminate, ShutdownSignal::Hangup] {
            assert_eq!(ShutdownSignal::from_raw(signal.number()), Some(signal));
        }
        assert_eq!(ShutdownSignal::from_raw(28), None);
    }

    #[cfg(unix)]
    #[test]
    fn signal_numbers_match_platform() {
        use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

        assert_eq!(ShutdownSignal::Interrupt.number(), SIGINT);
        assert_eq!(ShutdownSignal::Terminate.number(), SIGTERM);
        assert_eq!(ShutdownSignal::Hangup.number(), SIGHUP);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ShutdownSignal::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownSignal::Terminate.exit_code(), 143);
        assert_eq!(ShutdownSignal::Hangup.exit_code(), 129);
    }

    #[test]
    fn display_uses_signal_name() {
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listener_receives_raised_signal() {
        use std::time::Duration;

        let mut listener = ShutdownListener::register().unwrap();
        signal_hook::low_level::raise(signal_hook::consts::signal::SIGHUP).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), listener.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(ShutdownSignal::Hangup));
    }
}
