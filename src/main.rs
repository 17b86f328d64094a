mod adapters;
mod application;
mod config;
mod domain;
mod interface;
mod ports;

use std::fs;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adapters::{
    FileStateStore, ProcfsConfig, ProcfsProcessTable, ReqwestHealthProbe, TelegramConfig, TelegramNotifier,
    TokioProcessControl,
};
use application::Supervisor;
use config::{Config, Settings};
use interface::cli::{handle_command, AppState, Cli, Commands, InvocationLock};
use ports::Notifier;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = &cli.config {
        config.config_path = Some(path.clone());
    }
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }

    // Logs go to stderr; stdout carries only values
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tunnelkeeper={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    debug!("Configuration: {:?}", config);
    fs::create_dir_all(&config.state_dir)?;

    let watching = matches!(cli.command, Some(Commands::Watch { .. }));
    let _lock = if watching {
        None
    } else {
        match InvocationLock::acquire(&config.state_dir) {
            Ok(lock) => Some(lock),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(format!(
                    "another tunnelkeeper invocation is using {}",
                    config.state_dir.display()
                )
                .into());
            }
            Err(e) => return Err(e.into()),
        }
    };

    let settings = Settings::load(config.config_path.as_deref())?;
    let supervisor = Supervisor::new(
        settings.supervisor_settings(&config.state_dir)?,
        Arc::new(FileStateStore::new(&config.state_dir)),
        Arc::new(TokioProcessControl::new()),
        Arc::new(ProcfsProcessTable::new(ProcfsConfig::host())),
        Arc::new(ReqwestHealthProbe::new()?),
    );

    let notifier: Option<Arc<dyn Notifier>> = match settings.telegram.clone().filter(TelegramConfig::is_usable) {
        Some(telegram) => {
            info!("Notifications go to {} Telegram chat(s)", telegram.chat_ids.len());
            Some(Arc::new(TelegramNotifier::new(telegram)?))
        }
        None => None,
    };
    if cli.notify && notifier.is_none() {
        warn!("--notify given but no Telegram bot is configured");
    }

    let state = AppState {
        supervisor: Arc::new(supervisor),
        notifier,
        retry: settings.retry.clone(),
        lock_dir: watching.then(|| config.state_dir.clone()),
    };

    let mut stdout = io::stdout();
    handle_command(&state, cli.command, cli.notify, &mut stdout).await?;
    Ok(())
}
