//! Tracing subscriber setup.
//!
//! Logs go to stderr so they never interleave with remote output on stdout.
//! `RUST_LOG` wins over `--debug` when it is set.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogFormat;

/// Crates whose events are shown by default.
const CRATES: [&str; 3] = ["podshell", "podshell_term", "podshell_cli"];

/// The filter used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directives(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|krate| format!("{krate}={level}")));
    directives.join(",")
}

/// Install the global subscriber.
pub fn init(debug: bool, format: LogFormat) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(debug)
                    .with_file(debug)
                    .with_line_number(debug),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
}
