//! Subcommand implementations.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use podshell::config::{AppConfig, EnvConfig, Paths};
use podshell::lifecycle::{LifecycleEvent, PodController};
use podshell::pool::{Pod, PodOptions, Pool, XiangongyunPool};
use podshell::transport::relay::ReportReceiver;
use podshell::transport::{ExitOutcome, SshConnector, SshSession, report_channel};
use podshell::{Error, ShutdownSignal, TransportError};
use thiserror::Error;

use crate::cli::{Cli, Command, ForwardArgs};
use crate::output::{self, CLEAR_SCREEN};

/// Refresh interval of `list --watch`.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Errors surfaced by the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// A library operation failed.
    #[error(transparent)]
    Podshell(#[from] Error),

    /// Signal handlers could not be installed.
    #[error("terminal error: {0}")]
    Term(#[from] podshell_term::TermError),

    /// Writing to stdout or reading a confirmation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The arguments parse but make no sense together.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Process exit code.
    ///
    /// A failing remote command passes its own status through.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Podshell(Error::Transport(
                TransportError::RemoteExit { status } | TransportError::CommandFailed { status, .. },
            )) => i32::try_from(*status).unwrap_or(1),
            Self::Podshell(e) => e.exit_code(),
            Self::Term(_) | Self::Io(_) | Self::Usage(_) => 1,
        }
    }

    /// Whether a pod may have been left running.
    #[must_use]
    pub const fn is_billing_risk(&self) -> bool {
        matches!(self, Self::Podshell(e) if e.is_billing_risk())
    }
}

/// Loaded configuration shared by every subcommand.
#[derive(Debug)]
pub struct Context {
    /// Effective configuration.
    pub config: AppConfig,
    /// Environment reader.
    pub env: EnvConfig,
}

impl Context {
    /// Load config from `cli.config` or the platform default location.
    pub fn load(cli: &Cli) -> Result<Self, CliError> {
        let env = EnvConfig::default();
        let paths = Paths::from_platform()?;
        tracing::debug!(config_dir = %paths.config_dir().display(), "Resolved config directory");
        let config = AppConfig::load(&paths, cli.config.as_deref(), &env)?;
        tracing::debug!(?config.poll, api_base = %config.provider.api_base, "Configuration loaded");
        Ok(Self { config, env })
    }

    /// The provider pool, authenticated with the configured token.
    pub fn pool(&self) -> Result<XiangongyunPool, CliError> {
        let token = self.config.provider.token(&self.env)?;
        Ok(XiangongyunPool::new(&token, &self.config.provider)?)
    }

    fn controller<P: Pool>(&self, pool: P) -> PodController<P, SshConnector> {
        PodController::new(
            Arc::new(pool),
            SshConnector,
            self.config.poll.clone(),
            self.config.ssh.clone(),
        )
        .with_agent_socket(self.env.agent_socket())
    }
}

/// Run the parsed command.
pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let ctx = Context::load(cli)?;

    match &cli.command {
        Command::List { watch } => list(&ctx.pool()?, *watch).await,
        Command::Create(gpu) => create(&ctx.pool()?, &gpu.pod_options()).await,
        Command::Attach { pod_id, forwards } => attach(&ctx, pod_id, forwards).await,
        Command::Exec { pod_id, command } => exec(&ctx, pod_id, &command.join(" ")).await,
        Command::Forward { pod_id, forwards } => forward(&ctx, pod_id, forwards).await,
        Command::Destroy { pod_ids, yes } => destroy(&ctx.pool()?, pod_ids, *yes).await,
        Command::Up(gpu) => up(&ctx, &gpu.pod_options()).await,
    }
}

async fn list<P: Pool>(pool: &P, watch: bool) -> Result<(), CliError> {
    loop {
        let pods = pool.list_pods().await?;
        let mut stdout = io::stdout().lock();
        if watch {
            write!(stdout, "{CLEAR_SCREEN}")?;
        }
        output::write_pods(&mut stdout, &pods)?;
        drop(stdout);

        if !watch {
            return Ok(());
        }
        tokio::time::sleep(WATCH_INTERVAL).await;
    }
}

async fn create<P: Pool>(pool: &P, options: &PodOptions) -> Result<(), CliError> {
    let pod = pool.create_pod(options).await?;
    output::write_pods(&mut io::stdout().lock(), &[pod])?;
    Ok(())
}

/// Look up a pod and open an SSH connection to it.
async fn connect(ctx: &Context, pod_id: &str) -> Result<SshSession, CliError> {
    let controller = ctx.controller(ctx.pool()?);
    let pod = controller.pool().get_pod(pod_id).await?;
    if !pod.is_running() {
        return Err(Error::config(format!("pod {pod_id} is {}, not running", pod.provider_status)).into());
    }
    let options = controller.connection_options(&pod)?;
    Ok(SshSession::connect(&options).await?)
}

async fn attach(ctx: &Context, pod_id: &str, forwards: &ForwardArgs) -> Result<(), CliError> {
    let session = connect(ctx, pod_id).await?;

    let background = (!forwards.is_empty()).then(|| {
        let forwarder = session.forwarder();
        let (reports, rx) = report_channel();
        let forwards = forwards.clone();
        tokio::spawn(log_failures(rx));
        tokio::spawn(async move {
            if let Err(e) = forwarder.run_all(&forwards.local, &forwards.remote, reports).await {
                tracing::error!(error = %e, "Port forwarding stopped");
            }
        })
    });

    // Dropping the shell future on a signal restores the local terminal.
    let outcome = until_shutdown(session.attach(), podshell_term::shutdown_signal()).await;
    if let Some(task) = background {
        task.abort();
    }
    session.close().await?;

    match outcome?? {
        ExitOutcome::Interrupted => tracing::info!("Remote process was interrupted"),
        ExitOutcome::Success | ExitOutcome::Killed | ExitOutcome::Unknown => {}
    }
    Ok(())
}

/// Run `work` unless `shutdown` fires first, in which case `work` is dropped
/// and the signal becomes [`Error::Interrupted`].
async fn until_shutdown<W, S>(work: W, shutdown: S) -> Result<W::Output, CliError>
where
    W: Future,
    S: Future<Output = podshell_term::Result<ShutdownSignal>>,
{
    tokio::select! {
        output = work => Ok(output),
        signal = shutdown => {
            let signal = signal?;
            tracing::info!(signal = %signal, "Received shutdown signal, detaching");
            Err(Error::Interrupted { signal }.into())
        }
    }
}

async fn exec(ctx: &Context, pod_id: &str, command: &str) -> Result<(), CliError> {
    let session = connect(ctx, pod_id).await?;
    let output = session.exec_captured(command).await?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.flush()?;
    Ok(())
}

async fn forward(ctx: &Context, pod_id: &str, forwards: &ForwardArgs) -> Result<(), CliError> {
    if forwards.is_empty() {
        return Err(CliError::Usage("forward needs at least one -L or -R spec".to_string()));
    }
    let session = connect(ctx, pod_id).await?;
    let forwarder = session.forwarder();
    let (reports, rx) = report_channel();
    tokio::spawn(log_failures(rx));

    let result = tokio::select! {
        result = forwarder.run_all(&forwards.local, &forwards.remote, reports) => result,
        signal = podshell_term::shutdown_signal() => {
            tracing::info!(signal = %signal?, "Stopping port forwarding");
            Ok(())
        }
    };
    session.close().await?;
    Ok(result?)
}

/// Drain relay failures until every forward has stopped.
async fn log_failures(mut rx: ReportReceiver) {
    let mut count: u64 = 0;
    while let Some(err) = rx.recv().await {
        count += 1;
        tracing::debug!(error = %err, count, "Forwarded connection failed");
    }
}

async fn destroy<P: Pool>(pool: &P, pod_ids: &[String], yes: bool) -> Result<(), CliError> {
    let mut failure = None;

    for pod_id in pod_ids {
        if !yes {
            let prompt = format!("Destroy pod {pod_id}? (y/N): ");
            if !confirm(&prompt, &mut io::stdin().lock(), &mut io::stdout())? {
                println!("Skipping pod {pod_id}");
                continue;
            }
        }

        println!("Destroying pod {pod_id}...");
        match pool.destroy_pod(pod_id).await {
            Ok(()) => println!("Destroyed pod {pod_id}"),
            Err(e) => {
                let err = Error::cleanup(pod_id.as_str(), e);
                eprintln!("{err}");
                failure = Some(err);
            }
        }
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Ask `prompt` and read a yes/no answer. Anything but `y` or `yes` is no.
pub fn confirm<R: BufRead, W: Write>(prompt: &str, input: &mut R, out: &mut W) -> io::Result<bool> {
    write!(out, "{prompt}")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn up(ctx: &Context, options: &PodOptions) -> Result<(), CliError> {
    let mut controller = ctx.controller(ctx.pool()?);
    controller.on_event(Box::new(|event| match event {
        LifecycleEvent::Created { pod_id } => eprintln!("Created pod {pod_id}, waiting for it to start..."),
        LifecycleEvent::Interrupted(signal) => eprintln!("Received {signal}, destroying pod..."),
        _ => {}
    }));

    let pod: Pod = controller.run(options).await?;
    eprintln!("Destroyed pod {}", pod.id);
    Ok(())
}
