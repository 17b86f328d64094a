use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::domain::{
    classify, Descriptor, HealthResult, HealthRules, Mode, PersistedState, ReadinessPattern,
    ResourceHandle, SupervisorError,
};
use crate::ports::{HealthProbe, LaunchSpec, ProcessControl, ProcessTable, StateStore, StopSignal, Subprocess};

use super::liveness::{
    FallbackOracle, LiveProcess, LivenessOracle, RecordedPidOracle, SignatureScanOracle, Signatures,
};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How to launch and recognize one mode's tunnel
#[derive(Debug, Clone)]
pub struct ModeProfile {
    pub mode: Mode,
    pub launch: LaunchSpec,
    pub signature: Option<String>,
    /// Key file that must exist before launching
    pub identity_file: Option<PathBuf>,
    pub pattern: ReadinessPattern,
}

impl ModeProfile {
    /// Command-line substring identifying this mode's process
    pub fn signature(&self) -> String {
        self.signature
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.launch.command_line())
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub default_mode: Mode,
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
    pub stop_grace: Duration,
    pub health_timeout: Duration,
    pub health_rules: HealthRules,
    pub profiles: Vec<ModeProfile>,
}

impl SupervisorSettings {
    pub fn profile(&self, mode: Mode) -> Option<&ModeProfile> {
        self.profiles.iter().find(|p| p.mode == mode)
    }

    fn signatures(&self) -> Signatures {
        Signatures::new(self.profiles.iter().map(|p| (p.mode, p.signature())).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Terminated { pid: u32 },
    ForceKilled { pid: u32 },
    /// The signal could not be delivered (e.g. permission denied)
    SignalFailed { pid: u32 },
}

/// Why reconcile replaced a running tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartCause {
    DescriptorMissing,
    Health(HealthResult),
}

/// What a reconcile tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Started(ResourceHandle),
    Restarted { handle: ResourceHandle, cause: RestartCause },
    /// A tunnel of another mode was replaced by the persisted mode's
    Switched(ResourceHandle),
    Unchanged(ResourceHandle),
}

impl Action {
    pub fn handle(&self) -> &ResourceHandle {
        match self {
            Self::Started(handle)
            | Self::Switched(handle)
            | Self::Unchanged(handle)
            | Self::Restarted { handle, .. } => handle,
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }
}

/// Keeps one tunnel alive across independent invocations
pub struct Supervisor {
    settings: SupervisorSettings,
    store: Arc<dyn StateStore>,
    control: Arc<dyn ProcessControl>,
    table: Arc<dyn ProcessTable>,
    probe: Arc<dyn HealthProbe>,
    liveness: Box<dyn LivenessOracle>,
    scanner: SignatureScanOracle,
}

impl Supervisor {
    pub fn new(
        settings: SupervisorSettings,
        store: Arc<dyn StateStore>,
        control: Arc<dyn ProcessControl>,
        table: Arc<dyn ProcessTable>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let signatures = settings.signatures();
        let liveness = Box::new(FallbackOracle::new(
            Box::new(RecordedPidOracle::new(table.clone(), signatures.clone())),
            Box::new(SignatureScanOracle::new(table.clone(), signatures.clone())),
        ));
        let scanner = SignatureScanOracle::new(table.clone(), signatures);

        Self {
            settings,
            store,
            control,
            table,
            probe,
            liveness,
            scanner,
        }
    }

    pub fn load_state(&self) -> Result<PersistedState, SupervisorError> {
        self.store.load().map_err(SupervisorError::port("load tunnel state"))
    }

    fn save_state(&self, state: &PersistedState) -> Result<(), SupervisorError> {
        self.store.save(state).map_err(SupervisorError::port("save tunnel state"))
    }

    /// Persisted mode, or the configured default when unset
    pub fn current_mode(&self) -> Result<Mode, SupervisorError> {
        Ok(self.load_state()?.mode.unwrap_or(self.settings.default_mode))
    }

    fn profile(&self, mode: Mode) -> Result<&ModeProfile, SupervisorError> {
        self.settings
            .profile(mode)
            .ok_or(SupervisorError::NotConfigured(mode))
    }

    async fn locate(&self, state: &PersistedState) -> Result<Option<LiveProcess>, SupervisorError> {
        let found = self
            .liveness
            .locate(state.pid)
            .await
            .map_err(SupervisorError::port("inspect process table"))?;

        if let Some(live) = &found {
            self.report_duplicates(live).await;
        }
        Ok(found)
    }

    async fn report_duplicates(&self, live: &LiveProcess) {
        match self.scanner.matches().await {
            Ok(matches) => {
                for (process, mode) in matches.iter().filter(|(p, _)| p.pid != live.pid) {
                    warn!(
                        "Consistency violation: pid {} ({} tunnel) runs alongside tracked pid {}: '{}'",
                        process.pid, mode, live.pid, process.command
                    );
                }
            }
            Err(e) => debug!("Duplicate scan failed: {}", e),
        }
    }

    /// Launch the tunnel for `mode` and wait for it to publish a descriptor.
    pub async fn start(&self, mode: Mode) -> Result<ResourceHandle, SupervisorError> {
        let profile = self.profile(mode)?;
        let mut state = self.load_state()?;

        if let Some(live) = self.locate(&state).await? {
            if live.mode == mode && state.pid == Some(live.pid) {
                if let Some(descriptor) = state.descriptor.clone() {
                    info!("{} tunnel already running as pid {}", mode, live.pid);
                    return Ok(ResourceHandle::new(mode)
                        .with_process(live.pid, Some(descriptor))
                        .with_check(Utc::now(), None));
                }
            }
            return Err(SupervisorError::AlreadyRunning {
                pid: live.pid,
                mode: live.mode,
            });
        }

        if let Some(path) = &profile.identity_file {
            if !path.exists() {
                return Err(SupervisorError::MissingCredential {
                    mode,
                    path: path.clone(),
                });
            }
        }

        info!("Starting {} tunnel: {}", mode, profile.launch.command_line());
        let mut child = self
            .control
            .spawn(&profile.launch)
            .await
            .map_err(|source| SupervisorError::Spawn {
                program: profile.launch.program.clone(),
                source,
            })?;
        let pid = child.pid();

        match self.await_ready(&profile.pattern, child.as_mut()).await {
            Ok(descriptor) => {
                info!("{} tunnel ready as pid {}: {}", mode, pid, descriptor);
                state.pid = Some(pid);
                state.descriptor = Some(descriptor.clone());
                state.mode = Some(mode);
                if let Err(e) = self.save_state(&state) {
                    // Never leave an unrecorded tunnel behind
                    kill_quietly(child.as_mut()).await;
                    return Err(e);
                }
                Ok(ResourceHandle::new(mode)
                    .with_process(pid, Some(descriptor))
                    .with_check(Utc::now(), None))
            }
            Err(e) => {
                error!("{} tunnel failed to start: {}", mode, e);
                kill_quietly(child.as_mut()).await;
                if state.pid.is_some() || state.descriptor.is_some() {
                    state.clear_process();
                    self.save_state(&state)?;
                }
                Err(e)
            }
        }
    }

    async fn await_ready(
        &self,
        pattern: &ReadinessPattern,
        child: &mut dyn Subprocess,
    ) -> Result<Descriptor, SupervisorError> {
        let deadline = Instant::now() + self.settings.ready_timeout;

        loop {
            let exited = child
                .try_exit()
                .map_err(SupervisorError::port("poll tunnel process"))?;
            let output = child
                .captured_output()
                .await
                .map_err(SupervisorError::port("read tunnel output"))?;

            if let Some(code) = exited {
                warn!("Tunnel process {} exited with {} before becoming ready", child.pid(), code);
                return Err(SupervisorError::exited_early(&output));
            }

            if let Some(descriptor) = pattern.extract(&output) {
                return Ok(descriptor);
            }

            if Instant::now() >= deadline {
                warn!(
                    "Tunnel process {} not ready after {:?}",
                    child.pid(),
                    self.settings.ready_timeout
                );
                return Err(SupervisorError::readiness_timeout(&output));
            }

            sleep(self.settings.poll_interval).await;
        }
    }

    /// Stop whatever tunnel is running. Persisted pid and descriptor are
    /// always cleared; only a state store failure is an error.
    pub async fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let mut state = self.load_state()?;

        let target = match self.locate(&state).await {
            Ok(found) => found.map(|live| live.pid),
            Err(e) => {
                warn!("{}; falling back to recorded pid {:?}", e, state.pid);
                state.pid
            }
        };

        let outcome = match target {
            Some(pid) => self.terminate(pid).await,
            None => {
                debug!("No tunnel process to stop");
                StopOutcome::NotRunning
            }
        };

        state.clear_process();
        self.save_state(&state)?;
        Ok(outcome)
    }

    async fn terminate(&self, pid: u32) -> StopOutcome {
        match self.control.signal(pid, StopSignal::Terminate).await {
            Ok(true) => {}
            Ok(false) => return StopOutcome::NotRunning,
            Err(e) => {
                error!("Failed to send SIGTERM to {}: {}", pid, e);
                return StopOutcome::SignalFailed { pid };
            }
        }

        let deadline = Instant::now() + self.settings.stop_grace;
        while Instant::now() < deadline {
            sleep(STOP_POLL_INTERVAL).await;
            if !self.table.is_alive(pid).await.unwrap_or(true) {
                info!("Tunnel process {} terminated", pid);
                return StopOutcome::Terminated { pid };
            }
        }

        warn!("{}", SupervisorError::StopTimedOutForceKilled { pid });
        match self.control.signal(pid, StopSignal::Kill).await {
            Ok(true) => StopOutcome::ForceKilled { pid },
            Ok(false) => StopOutcome::Terminated { pid },
            Err(e) => {
                error!("Failed to send SIGKILL to {}: {}", pid, e);
                StopOutcome::SignalFailed { pid }
            }
        }
    }

    /// Last known handle. Clears stale records when nothing is alive.
    pub async fn status(&self) -> Result<ResourceHandle, SupervisorError> {
        let mut state = self.load_state()?;
        let mode = state.mode.unwrap_or(self.settings.default_mode);
        let now = Utc::now();

        let Some(live) = self.locate(&state).await? else {
            if state.pid.is_some() || state.descriptor.is_some() {
                info!("Clearing stale tunnel record (pid {:?})", state.pid);
                state.clear_process();
                self.save_state(&state)?;
            }
            return Ok(ResourceHandle::new(mode).with_check(now, None));
        };

        // A descriptor only describes the process that produced it
        if state.pid != Some(live.pid) {
            info!("Adopting tunnel process {} found by {:?}, recorded pid was {:?}", live.pid, live.source, state.pid);
            state.pid = Some(live.pid);
            state.descriptor = None;
            self.save_state(&state)?;
        }
        let descriptor = state.descriptor.clone();

        Ok(ResourceHandle::new(live.mode)
            .with_process(live.pid, descriptor)
            .with_check(now, None))
    }

    /// Probe the published web URL.
    pub async fn health_check(&self) -> Result<HealthResult, SupervisorError> {
        let state = self.load_state()?;
        let mode = state.mode.unwrap_or(self.settings.default_mode);
        if !mode.has_health_check() {
            return Err(SupervisorError::HealthCheckUnsupported(mode));
        }
        let descriptor = state.descriptor.ok_or(SupervisorError::NotRunning)?;
        Ok(self.probe_descriptor(&descriptor).await)
    }

    async fn probe_descriptor(&self, descriptor: &Descriptor) -> HealthResult {
        let outcome = self
            .probe
            .probe(descriptor.as_str(), self.settings.health_timeout)
            .await;
        let result = classify(&outcome, &self.settings.health_rules);
        if result.is_healthy() {
            debug!("{} is healthy", descriptor);
        } else {
            warn!("{} is {}", descriptor, result);
        }
        result
    }

    /// Ensure the persisted mode's tunnel is running and healthy.
    pub async fn reconcile(&self) -> Result<Action, SupervisorError> {
        let state = self.load_state()?;
        let mode = state.mode.unwrap_or(self.settings.default_mode);

        let Some(live) = self.locate(&state).await? else {
            info!("No {} tunnel running, starting one", mode);
            return Ok(Action::Started(self.start(mode).await?));
        };

        if live.mode != mode {
            info!("Running {} tunnel (pid {}) does not match mode {}, switching", live.mode, live.pid, mode);
            self.stop().await?;
            return Ok(Action::Switched(self.start(mode).await?));
        }

        let descriptor = match (&state.descriptor, state.pid == Some(live.pid)) {
            (Some(descriptor), true) => descriptor.clone(),
            _ => {
                warn!("Tunnel process {} has no recorded descriptor, restarting", live.pid);
                return self.restart_with(mode, RestartCause::DescriptorMissing).await;
            }
        };

        let handle = ResourceHandle::new(mode).with_process(live.pid, Some(descriptor.clone()));
        if !mode.has_health_check() {
            return Ok(Action::Unchanged(handle.with_check(Utc::now(), None)));
        }

        let health = self.probe_descriptor(&descriptor).await;
        if !health.is_healthy() {
            return self.restart_with(mode, RestartCause::Health(health)).await;
        }
        Ok(Action::Unchanged(handle.with_check(Utc::now(), Some(true))))
    }

    async fn restart_with(&self, mode: Mode, cause: RestartCause) -> Result<Action, SupervisorError> {
        self.stop().await?;
        let handle = self.start(mode).await?;
        Ok(Action::Restarted { handle, cause })
    }

    /// Stop then start the persisted mode.
    pub async fn restart(&self) -> Result<ResourceHandle, SupervisorError> {
        let mode = self.current_mode()?;
        self.stop().await?;
        self.start(mode).await
    }

    /// Switch to `mode`, persisting it before touching processes so an
    /// interrupted switch resumes toward the new mode.
    pub async fn switch_mode(&self, mode: Mode) -> Result<ResourceHandle, SupervisorError> {
        let mut state = self.load_state()?;
        let current = state.mode.unwrap_or(self.settings.default_mode);
        if current == mode {
            debug!("Already in {} mode", mode);
            return Ok(ResourceHandle::from_state(&state, self.settings.default_mode));
        }

        info!("Switching tunnel mode {} -> {}", current, mode);
        state.mode = Some(mode);
        self.save_state(&state)?;

        self.stop().await?;
        self.start(mode).await
    }
}

async fn kill_quietly(child: &mut dyn Subprocess) {
    if let Err(e) = child.kill().await {
        error!("Failed to kill tunnel process {}: {}", child.pid(), e);
    }
}
