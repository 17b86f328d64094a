use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::{Action, StopOutcome, Supervisor};
use crate::config::RetrySettings;
use crate::domain::{HealthResult, Mode, ResourceHandle, SupervisorError};
use crate::ports::Notifier;

use super::args::Commands;
use super::watch::{self, WatchPolicy};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("no tunnel address on record")]
    NoDescriptor,

    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),

    #[error("cannot encode status: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything a command needs
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub retry: RetrySettings,
    /// Where `watch` takes the invocation lock for each tick
    pub lock_dir: Option<PathBuf>,
}

impl AppState {
    pub(crate) async fn notify(&self, text: &str) {
        if let Some(notifier) = &self.notifier {
            if !notifier.send(text).await {
                warn!("Notification was not delivered");
            }
        }
    }

    pub(crate) async fn announce(&self, event: &str, handle: &ResourceHandle) {
        self.notify(&tunnel_message(event, handle, Local::now())).await;
    }
}

/// Run one command, writing plain values to `out`.
pub async fn handle_command(
    state: &AppState,
    command: Option<Commands>,
    notify: bool,
    out: &mut (dyn Write + Send),
) -> Result<(), CliError> {
    match command {
        None => reconcile_handler(state, notify, out).await,
        Some(Commands::Start { mode }) => {
            let mode = match mode {
                Some(mode) => mode,
                None => state.supervisor.current_mode()?,
            };
            let handle = state.supervisor.start(mode).await?;
            print_handle(out, &handle)?;
            if notify {
                state.announce("started", &handle).await;
            }
            Ok(())
        }
        Some(Commands::Stop) => {
            match state.supervisor.stop().await? {
                StopOutcome::NotRunning => info!("No tunnel was running"),
                StopOutcome::Terminated { pid } => info!("Stopped tunnel process {}", pid),
                StopOutcome::ForceKilled { pid } => info!("Killed tunnel process {}", pid),
                StopOutcome::SignalFailed { pid } => warn!("Could not signal tunnel process {}", pid),
            }
            Ok(())
        }
        Some(Commands::Restart) => {
            let handle = state.supervisor.restart().await?;
            print_handle(out, &handle)?;
            if notify {
                state.announce("restarted", &handle).await;
            }
            Ok(())
        }
        Some(Commands::Status { json }) => status_handler(state, json, out).await,
        Some(Commands::Url) => {
            let descriptor = state.supervisor.load_state()?.descriptor;
            let descriptor = descriptor.ok_or(CliError::NoDescriptor)?;
            writeln!(out, "{}", descriptor)?;
            Ok(())
        }
        Some(Commands::Mode) => {
            writeln!(out, "{}", state.supervisor.current_mode()?)?;
            Ok(())
        }
        Some(Commands::Web) => switch_handler(state, Mode::Web, notify, out).await,
        Some(Commands::Ssh) => switch_handler(state, Mode::Ssh, notify, out).await,
        Some(Commands::Health) => health_handler(state, out).await,
        Some(Commands::Watch { interval }) => {
            let mut policy = WatchPolicy::from(&state.retry);
            if let Some(secs) = interval {
                policy = policy.with_interval_secs(secs);
            }
            watch::run(state, policy, out).await
        }
    }
}

async fn reconcile_handler(state: &AppState, notify: bool, out: &mut (dyn Write + Send)) -> Result<(), CliError> {
    let action = state.supervisor.reconcile().await?;
    match &action {
        Action::Started(_) => info!("Tunnel started"),
        Action::Switched(_) => info!("Tunnel switched mode"),
        Action::Restarted { cause, .. } => info!("Tunnel restarted ({:?})", cause),
        Action::Unchanged(_) => info!("Tunnel is up"),
    }
    print_handle(out, action.handle())?;
    if notify && action.changed() {
        state.announce(action_event(&action), action.handle()).await;
    }
    Ok(())
}

async fn status_handler(state: &AppState, json: bool, out: &mut (dyn Write + Send)) -> Result<(), CliError> {
    let handle = state.supervisor.status().await?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&handle)?)?;
    }
    if !handle.is_running() {
        return Err(SupervisorError::NotRunning.into());
    }
    let descriptor = handle.live_descriptor().ok_or(CliError::NoDescriptor)?;
    if !json {
        writeln!(out, "{}", descriptor)?;
    }
    Ok(())
}

async fn switch_handler(
    state: &AppState,
    mode: Mode,
    notify: bool,
    out: &mut (dyn Write + Send),
) -> Result<(), CliError> {
    let before = state.supervisor.current_mode()?;
    let handle = state.supervisor.switch_mode(mode).await?;
    print_handle(out, &handle)?;
    if notify && before != mode {
        state.announce("switched", &handle).await;
    }
    Ok(())
}

async fn health_handler(state: &AppState, out: &mut (dyn Write + Send)) -> Result<(), CliError> {
    let result = state.supervisor.health_check().await?;
    writeln!(out, "{}", result)?;

    let url = state
        .supervisor
        .load_state()?
        .descriptor
        .map(|d| d.to_string())
        .unwrap_or_default();
    match result {
        HealthResult::Healthy => Ok(()),
        HealthResult::Unhealthy(_) => Err(SupervisorError::HealthMarkerAbsent { url }.into()),
        HealthResult::Unreachable(_) => Err(SupervisorError::HealthUnreachable { url }.into()),
    }
}

fn print_handle(out: &mut (dyn Write + Send), handle: &ResourceHandle) -> io::Result<()> {
    match handle.live_descriptor() {
        Some(descriptor) => writeln!(out, "{}", descriptor),
        None => Ok(()),
    }
}

pub(crate) fn action_event(action: &Action) -> &'static str {
    match action {
        Action::Started(_) => "started",
        Action::Restarted { .. } => "restarted",
        Action::Switched(_) => "switched",
        Action::Unchanged(_) => "up",
    }
}

/// Notification text for a tunnel that came up
pub fn tunnel_message(event: &str, handle: &ResourceHandle, at: DateTime<Local>) -> String {
    let descriptor = handle
        .descriptor
        .as_ref()
        .map(|d| escape_html(d.as_str()))
        .unwrap_or_else(|| "(no address)".to_string());
    format!(
        "<b>Tunnel {}</b> ({})\n<code>{}</code>\n{}",
        event,
        handle.mode,
        descriptor,
        at.format("%d.%m.%Y %H:%M:%S")
    )
}

/// Notification text for a tunnel that could not be brought up
pub fn failure_message(attempts: u32, error: &str, at: DateTime<Local>) -> String {
    format!(
        "<b>Tunnel down</b> after {} attempt(s)\n{}\n{}",
        attempts,
        escape_html(error),
        at.format("%d.%m.%Y %H:%M:%S")
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
