//! podshell-cli: the `podshell` command.
//!
//! Argument parsing lives in [`cli`], logging setup in [`logging`], table
//! rendering in [`output`] and the subcommand bodies in [`commands`]. The
//! binary itself only wires these together and turns errors into exit codes.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;

pub use cli::{Cli, Command};
pub use commands::CliError;
