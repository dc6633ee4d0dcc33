//! `podshell` binary entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use podshell_cli::{Cli, commands, logging};

/// How long runtime shutdown waits for tasks that are still blocked, such
/// as a stdin reader left over from an interactive shell.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

const BILLING_BANNER: &str = "\
==================================================================
  WARNING: a pod could not be destroyed and may still be billed.
==================================================================";

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.debug, cli.log_format) {
        eprintln!("podshell: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "podshell starting");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("podshell: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(commands::run(&cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            if e.is_billing_risk() {
                eprintln!("{BILLING_BANNER}");
            }
            eprintln!("podshell: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
