//! Integration tests for podshell-term.

use podshell_term::{ShutdownSignal, WindowSize};
use proptest::prelude::*;

proptest! {
    #[test]
    fn or_default_never_yields_empty(cols in any::<u16>(), rows in any::<u16>()) {
        let size = WindowSize::new(cols, rows).or_default();
        prop_assert!(!size.is_empty());
        if cols != 0 && rows != 0 {
            prop_assert_eq!(size, WindowSize::new(cols, rows));
        }
    }

    #[test]
    fn unknown_signals_are_not_shutdown(signo in 3i32..64) {
        prop_assume!(signo != 15);
        prop_assert_eq!(ShutdownSignal::from_raw(signo), None);
    }
}

#[cfg(unix)]
#[test]
fn dev_null_is_not_a_terminal() {
    let devnull = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .unwrap();
    let (guard, size) = podshell_term::enter_raw_mode_with(&devnull, &devnull);
    assert!(!guard.is_active());
    assert_eq!(size, WindowSize::DEFAULT);
    drop(guard);
}

#[cfg(unix)]
#[test]
fn resize_handle_can_be_shut_down_twice() {
    let handle = podshell_term::on_window_change(|| {}).unwrap();
    handle.shutdown();
    drop(handle);
}
