use std::io::Write;
use std::time::Duration;

use chrono::Local;
use tokio::signal;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::{Action, Supervisor};
use crate::config::RetrySettings;
use crate::domain::{Descriptor, SupervisorError};

use super::handlers::{action_event, failure_message, AppState, CliError};
use super::lock::InvocationLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub interval: Duration,
}

impl From<&RetrySettings> for WatchPolicy {
    fn from(retry: &RetrySettings) -> Self {
        Self {
            attempts: retry.attempts.max(1),
            delay: Duration::from_secs(retry.delay_secs),
            interval: Duration::from_secs(retry.watch_interval_secs.max(1)),
        }
    }
}

impl WatchPolicy {
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval = Duration::from_secs(secs.max(1));
        self
    }
}

/// Reconcile, retrying failures `attempts` times with `delay` in between.
pub async fn reconcile_with_retry(
    supervisor: &Supervisor,
    policy: &WatchPolicy,
) -> Result<Action, SupervisorError> {
    let mut attempt = 1;
    loop {
        match supervisor.reconcile().await {
            Ok(action) => return Ok(action),
            Err(e) if attempt < policy.attempts => {
                warn!("Reconcile attempt {}/{} failed: {}", attempt, policy.attempts, e);
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Tracks what subscribers were last told
pub struct Watcher<'a> {
    state: &'a AppState,
    policy: WatchPolicy,
    last_descriptor: Option<Descriptor>,
    failing: bool,
}

impl<'a> Watcher<'a> {
    pub fn new(state: &'a AppState, policy: WatchPolicy) -> Self {
        let last_descriptor = state
            .supervisor
            .load_state()
            .ok()
            .and_then(|s| s.descriptor);
        Self {
            state,
            policy,
            last_descriptor,
            failing: false,
        }
    }

    pub async fn tick(&mut self, out: &mut (dyn Write + Send)) -> Result<(), CliError> {
        let _lock = match &self.state.lock_dir {
            Some(dir) => match InvocationLock::acquire(dir) {
                Ok(lock) => Some(lock),
                Err(e) => {
                    info!("Skipping this tick, another invocation is busy: {}", e);
                    return Ok(());
                }
            },
            None => None,
        };

        match reconcile_with_retry(&self.state.supervisor, &self.policy).await {
            Ok(action) => {
                self.failing = false;
                let descriptor = action.handle().live_descriptor().cloned();
                if descriptor != self.last_descriptor {
                    if let Some(descriptor) = &descriptor {
                        info!("Tunnel address is now {}", descriptor);
                        writeln!(out, "{}", descriptor)?;
                    }
                    self.state.announce(action_event(&action), action.handle()).await;
                    self.last_descriptor = descriptor;
                }
            }
            Err(e) => {
                error!("Tunnel down after {} attempt(s): {}", self.policy.attempts, e);
                // Only the transition into failure is announced
                if !self.failing {
                    let text = failure_message(self.policy.attempts, &e.to_string(), Local::now());
                    self.state.notify(&text).await;
                }
                self.failing = true;
                self.last_descriptor = None;
            }
        }
        Ok(())
    }
}

/// Reconcile every `policy.interval` until Ctrl-C.
pub async fn run(state: &AppState, policy: WatchPolicy, out: &mut (dyn Write + Send)) -> Result<(), CliError> {
    info!(
        "Watching tunnel every {:?} ({} attempt(s), {:?} apart)",
        policy.interval, policy.attempts, policy.delay
    );
    let mut watcher = Watcher::new(state, policy);

    loop {
        watcher.tick(out).await?;
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted; the tunnel keeps running");
                return Ok(());
            }
            _ = sleep(policy.interval) => {}
        }
    }
}
