//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use podshell::pool::{GpuModel, PodOptions};
use podshell::transport::ForwardSpec;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Ephemeral GPU pods with an SSH shell and port forwarding.
#[derive(Debug, Parser)]
#[command(name = "podshell", version, about = "Ephemeral GPU pods with an SSH shell and port forwarding")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Config file (default: <config dir>/podshell/config.toml)
    #[arg(long, value_name = "FILE", global = true, env = "PODSHELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all pods
    List {
        /// Refresh every 5 seconds
        #[arg(short, long)]
        watch: bool,
    },

    /// Create a new pod
    Create(GpuArgs),

    /// Attach an interactive shell to a running pod
    Attach {
        /// Pod to attach to
        pod_id: String,

        #[command(flatten)]
        forwards: ForwardArgs,
    },

    /// Run a command on a running pod and print its output
    Exec {
        /// Pod to run on
        pod_id: String,

        /// Command and arguments
        #[arg(last = true, required = true, value_name = "CMD")]
        command: Vec<String>,
    },

    /// Forward ports to or from a running pod until interrupted
    Forward {
        /// Pod to forward through
        pod_id: String,

        #[command(flatten)]
        forwards: ForwardArgs,
    },

    /// Destroy one or more pods
    Destroy {
        /// Pods to destroy
        #[arg(required = true, value_name = "POD_ID")]
        pod_ids: Vec<String>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Create a pod, attach to it, and destroy it when the shell exits
    Up(GpuArgs),
}

/// Resources for a new pod.
#[derive(Debug, Clone, Args)]
pub struct GpuArgs {
    /// GPU model (e.g. RTX4090, RTX4090D)
    #[arg(long, default_value = "RTX4090")]
    pub gpu_model: GpuModel,

    /// Number of GPUs
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub gpu_count: u32,
}

impl GpuArgs {
    /// Pod options for these arguments.
    #[must_use]
    pub fn pod_options(&self) -> PodOptions {
        PodOptions::new(self.gpu_model.clone(), self.gpu_count)
    }
}

/// Port forwards.
#[derive(Debug, Clone, Default, Args)]
pub struct ForwardArgs {
    /// Local forward: [bind_host:]port:host:hostport
    #[arg(short = 'L', long = "local", action = ArgAction::Append, value_name = "SPEC")]
    pub local: Vec<ForwardSpec>,

    /// Remote forward: [bind_host:]port:host:hostport
    #[arg(short = 'R', long = "remote", action = ArgAction::Append, value_name = "SPEC")]
    pub remote: Vec<ForwardSpec>,
}

impl ForwardArgs {
    /// Whether no forward was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}
