//! Process entry: dispatch subcommands and run a session from launch to exit.

use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};

use tide_core::bindings::hotkey_layout;
use tide_core::{
    derive_session_name, LaunchError, LaunchSpec, LifecycleController, MemoryMultiplexer,
    Multiplexer, ShutdownOutcome, StartOutcome, TmuxCommand, WindowPlan,
};

use crate::config::{Command, Config, Settings};
use crate::sessions::{self, SessionsRequest};
use crate::tmux::TmuxClient;

/// Name of the multiplexer executable
const TMUX: &str = "tmux";

/// Time a signalled attach client gets to restore the terminal
const ATTACH_GRACE: Duration = Duration::from_secs(2);

/// Session name used by `tide cleanup` when no session is named
const CLEANUP_PLACEHOLDER: &str = "tide-cleanup";

/// Run the command selected on the command line
pub async fn run(cli: Config, settings: Settings) -> Result<()> {
    match cli.command.clone() {
        None => launch(&cli, &settings).await,
        Some(Command::Keys) => {
            let plan = window_plan(&settings, &cli.start_dir()?)?;
            println!("{}", hotkey_layout(&plan));
            Ok(())
        }
        Some(Command::Plan { json }) => {
            let spec = launch_spec(&cli, &settings)?;
            let plan = window_plan(&settings, &spec.cwd)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
                );
            } else {
                for command in dry_run(spec, plan)? {
                    println!("{}", command);
                }
            }
            Ok(())
        }
        Some(Command::Sessions { action, json, all }) => {
            require_tmux()?;
            let request = SessionsRequest { action, json, all };
            let output = sessions::run(
                &TmuxClient::new(),
                &settings.session_prefix,
                &program_path(),
                &request,
            )?;
            if !output.is_empty() {
                println!("{}", output);
            }
            Ok(())
        }
        Some(Command::Cleanup { session }) => {
            require_tmux()?;
            let cwd = cli.start_dir()?;
            let plan = window_plan(&settings, &cwd)?;
            let report = cleanup(TmuxClient::new(), session, cwd, plan)?;
            println!("{}", report);
            Ok(())
        }
    }
}

/// Fail before touching tmux when it is not installed
fn require_tmux() -> Result<(), LaunchError> {
    which::which(TMUX).map_err(|_| LaunchError::ExternalToolMissing {
        tool: TMUX.to_string(),
    })?;
    Ok(())
}

fn window_plan(settings: &Settings, cwd: &std::path::Path) -> Result<WindowPlan, LaunchError> {
    Ok(settings.window_plan(cwd)?)
}

/// Absolute path of this executable, re-run by popups and menus
fn program_path() -> String {
    std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "tide".to_string())
}

/// Session name, persistence and appearance for this process
fn launch_spec(cli: &Config, settings: &Settings) -> Result<LaunchSpec> {
    let pid = nix::unistd::getpid().as_raw() as u32;

    Ok(LaunchSpec {
        session: derive_session_name(cli.session.as_deref(), pid, &settings.session_prefix),
        persistent: cli.session.is_some(),
        cwd: cli.start_dir()?,
        program: program_path(),
        appearance: settings.appearance(),
    })
}

fn stdin_is_tty() -> bool {
    nix::unistd::isatty(std::io::stdin()).unwrap_or(false)
}

/// SIGTERM, SIGHUP and SIGINT, listened for from before the session exists
struct Signals {
    sigterm: Signal,
    sighup: Signal,
    sigint: Signal,
}

impl Signals {
    fn install() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?,
            sighup: signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?,
            sigint: signal(SignalKind::interrupt()).context("Failed to listen for SIGINT")?,
        })
    }

    /// Next termination signal, by name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sighup.recv() => "SIGHUP",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Create (or reattach) the session and hold it until the operator leaves
async fn launch(cli: &Config, settings: &Settings) -> Result<()> {
    require_tmux()?;
    let spec = launch_spec(cli, settings)?;
    let plan = window_plan(settings, &spec.cwd)?;

    if !cli.no_attach && !stdin_is_tty() {
        anyhow::bail!("stdin is not a terminal; use --no-attach to start the session detached");
    }

    let mut signals = Signals::install()?;
    let controller = Arc::new(LifecycleController::new(TmuxClient::new(), spec, plan)?);
    let Some(outcome) = start_until(Arc::clone(&controller), signals.recv()).await? else {
        return Ok(());
    };
    tracing::info!(session = controller.session_name(), ?outcome, "session ready");

    if cli.no_attach {
        // Hotkeys stay bound; `tide cleanup --session` retracts them
        println!("{}", controller.session_name());
        return Ok(());
    }

    let shutdown = attach_until(Arc::clone(&controller), signals.recv()).await;
    if shutdown == ShutdownOutcome::LeftRunning {
        tracing::info!(session = controller.session_name(), "detached, session kept");
    }
    Ok(())
}

/// Run startup on a blocking task.
///
/// A termination signal meanwhile lets startup finish, then shuts the
/// session down; returns `None` in that case.
async fn start_until<M, F>(
    controller: Arc<LifecycleController<M>>,
    terminated: F,
) -> Result<Option<StartOutcome>>
where
    M: Multiplexer + Send + Sync + 'static,
    F: Future<Output = &'static str>,
{
    let starting = Arc::clone(&controller);
    let mut start = tokio::task::spawn_blocking(move || starting.start());
    tokio::pin!(terminated);

    let mut interrupted = None;
    let started = loop {
        tokio::select! {
            biased;
            sig = &mut terminated, if interrupted.is_none() => {
                tracing::info!(signal = sig, "received during startup");
                interrupted = Some(sig);
            }
            result = &mut start => break result,
        }
    };

    let outcome = match started {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            controller.shutdown();
            return Err(e.into());
        }
        Err(e) => {
            controller.shutdown();
            return Err(anyhow::Error::from(e).context("Startup task failed"));
        }
    };

    if interrupted.is_some() {
        let shutdown = controller.shutdown();
        tracing::info!(session = controller.session_name(), ?shutdown, "stopped before attach");
        return Ok(None);
    }
    Ok(Some(outcome))
}

/// Attach on a blocking task until detach, session end or `terminated`,
/// then run the shutdown protocol
async fn attach_until<M, F>(controller: Arc<LifecycleController<M>>, terminated: F) -> ShutdownOutcome
where
    M: Multiplexer + Send + Sync + 'static,
    F: Future<Output = &'static str>,
{
    let attached = Arc::clone(&controller);
    let mut attach = tokio::task::spawn_blocking(move || attached.attach());

    tokio::select! {
        result = &mut attach => {
            log_attach_end(result);
            controller.shutdown()
        }
        sig = terminated => {
            tracing::info!(signal = sig, "terminating");
            let outcome = controller.shutdown();
            // A session left running keeps its client attached until told otherwise
            controller.detach();
            match tokio::time::timeout(ATTACH_GRACE, attach).await {
                Ok(result) => log_attach_end(result),
                Err(_) => tracing::warn!("attach client still running after {:?}", ATTACH_GRACE),
            }
            outcome
        }
    }
}

fn log_attach_end(result: Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::debug!("attach returned"),
        Ok(Err(e)) => tracing::warn!("attach failed: {:#}", e),
        Err(e) => tracing::warn!(?e, "attach task panicked"),
    }
}

/// Commands a launch would issue, recorded against an in-memory server
fn dry_run(spec: LaunchSpec, plan: WindowPlan) -> Result<Vec<TmuxCommand>> {
    let mux = MemoryMultiplexer::new();
    let controller = LifecycleController::new(mux.clone(), spec, plan)?;
    controller.start()?;
    Ok(mux.commands())
}

/// Recover after a crash: retract every managed key, then kill `session`
/// if one was named
fn cleanup<M: Multiplexer>(
    mux: M,
    session: Option<String>,
    cwd: PathBuf,
    plan: WindowPlan,
) -> Result<String> {
    let named = session.is_some();
    let spec = LaunchSpec {
        session: session.unwrap_or_else(|| CLEANUP_PLACEHOLDER.to_string()),
        persistent: false,
        cwd,
        program: "tide".to_string(),
        appearance: Default::default(),
    };
    let controller = LifecycleController::new(mux, spec, plan)?;

    if !named {
        let failures = controller.clear_managed_keys();
        if failures > 0 {
            tracing::warn!(failures, "some keys could not be unbound");
        }
        return Ok(format!("retracted {} keys", controller.registry().len()));
    }

    let report = match controller.shutdown() {
        ShutdownOutcome::Killed => "killed",
        ShutdownOutcome::AlreadyGone => "not running, keys retracted",
        ShutdownOutcome::LeftRunning | ShutdownOutcome::AlreadyDone => "left running",
    };
    Ok(format!("{}: {}", controller.session_name(), report))
}
