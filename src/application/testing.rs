//! In-process fakes for every port, driven by tokio's (pausable) clock.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{PortResult, ProbeOutcome, ProcessInfo, ProcessState};
use crate::ports::{HealthProbe, LaunchSpec, Notifier, ProcessControl, ProcessTable, StopSignal, Subprocess};

#[derive(Debug, Default)]
pub struct FakeProcessTable {
    processes: Mutex<BTreeMap<u32, ProcessInfo>>,
}

impl FakeProcessTable {
    pub fn insert(&self, process: ProcessInfo) {
        self.processes.lock().unwrap().insert(process.pid, process);
    }

    pub fn remove(&self, pid: u32) -> bool {
        self.processes.lock().unwrap().remove(&pid).is_some()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.processes.lock().unwrap().contains_key(&pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.lock().unwrap().keys().copied().collect()
    }
}

#[async_trait]
impl ProcessTable for FakeProcessTable {
    async fn list_processes(&self) -> PortResult<Vec<ProcessInfo>> {
        Ok(self.processes.lock().unwrap().values().cloned().collect())
    }

    async fn get_process(&self, pid: u32) -> PortResult<Option<ProcessInfo>> {
        Ok(self.processes.lock().unwrap().get(&pid).cloned())
    }
}

/// What the next spawned process will do
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Output lines and when (since spawn) they appear
    pub lines: Vec<(Duration, String)>,
    /// When the process exits on its own
    pub exit_after: Option<Duration>,
}

impl Script {
    pub fn prints_at(secs: u64, line: &str) -> Self {
        Self {
            lines: vec![(Duration::from_secs(secs), format!("{}\n", line))],
            exit_after: None,
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn exits_at(mut self, secs: u64) -> Self {
        self.exit_after = Some(Duration::from_secs(secs));
        self
    }
}

pub struct FakeProcessControl {
    table: Arc<FakeProcessTable>,
    next_pid: Mutex<u32>,
    script: Mutex<Script>,
    queued: Mutex<VecDeque<Script>>,
    spawned: Mutex<Vec<LaunchSpec>>,
    killed: Arc<Mutex<Vec<u32>>>,
    signals: Mutex<Vec<(u32, StopSignal)>>,
    stubborn: Mutex<HashSet<u32>>,
}

impl FakeProcessControl {
    pub fn new(table: Arc<FakeProcessTable>) -> Self {
        Self {
            table,
            next_pid: Mutex::new(1000),
            script: Mutex::new(Script::silent()),
            queued: Mutex::new(VecDeque::new()),
            spawned: Mutex::new(Vec::new()),
            killed: Arc::new(Mutex::new(Vec::new())),
            signals: Mutex::new(Vec::new()),
            stubborn: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// Used by the next spawn only, ahead of the standing script
    pub fn queue_script(&self, script: Script) {
        self.queued.lock().unwrap().push_back(script);
    }

    /// The pid will ignore SIGTERM
    pub fn make_stubborn(&self, pid: u32) {
        self.stubborn.lock().unwrap().insert(pid);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn spawned(&self) -> Vec<LaunchSpec> {
        self.spawned.lock().unwrap().clone()
    }

    /// Pids force-killed through their `Subprocess` handle
    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().unwrap().clone()
    }

    pub fn signals(&self) -> Vec<(u32, StopSignal)> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessControl for FakeProcessControl {
    async fn spawn(&self, spec: &LaunchSpec) -> PortResult<Box<dyn Subprocess>> {
        let pid = {
            let mut next = self.next_pid.lock().unwrap();
            *next += 1;
            *next
        };
        let script = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.script.lock().unwrap().clone());
        self.spawned.lock().unwrap().push(spec.clone());
        self.table
            .insert(ProcessInfo::new(pid, 1, spec.command_line(), ProcessState::Sleeping));

        Ok(Box::new(FakeSubprocess {
            pid,
            started: Instant::now(),
            script,
            table: self.table.clone(),
            killed: self.killed.clone(),
        }))
    }

    async fn signal(&self, pid: u32, signal: StopSignal) -> PortResult<bool> {
        if !self.table.contains(pid) {
            return Ok(false);
        }
        self.signals.lock().unwrap().push((pid, signal));
        let ignores = signal == StopSignal::Terminate && self.stubborn.lock().unwrap().contains(&pid);
        if !ignores {
            self.table.remove(pid);
        }
        Ok(true)
    }
}

pub struct FakeSubprocess {
    pid: u32,
    started: Instant,
    script: Script,
    table: Arc<FakeProcessTable>,
    killed: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl Subprocess for FakeSubprocess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn captured_output(&mut self) -> PortResult<Vec<u8>> {
        let elapsed = self.started.elapsed();
        Ok(self
            .script
            .lines
            .iter()
            .filter(|(at, _)| *at <= elapsed)
            .flat_map(|(_, line)| line.as_bytes().to_vec())
            .collect())
    }

    fn try_exit(&mut self) -> PortResult<Option<i32>> {
        if !self.table.contains(self.pid) {
            return Ok(Some(-1));
        }
        match self.script.exit_after {
            Some(at) if self.started.elapsed() >= at => {
                self.table.remove(self.pid);
                Ok(Some(255))
            }
            _ => Ok(None),
        }
    }

    async fn kill(&mut self) -> PortResult<()> {
        if self.table.remove(self.pid) {
            self.killed.lock().unwrap().push(self.pid);
        }
        Ok(())
    }
}

pub struct FakeHealthProbe {
    outcome: Mutex<ProbeOutcome>,
    urls: Mutex<Vec<String>>,
}

impl FakeHealthProbe {
    pub fn answering(status: u16, body: &str) -> Self {
        Self::with_outcome(ProbeOutcome::Response {
            status,
            body: body.to_string(),
        })
    }

    pub fn with_outcome(outcome: ProbeOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_outcome(&self, outcome: ProbeOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn probed(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for FakeHealthProbe {
    async fn probe(&self, url: &str, _timeout: Duration) -> ProbeOutcome {
        self.urls.lock().unwrap().push(url.to_string());
        self.outcome.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    messages: Mutex<Vec<String>>,
}

impl FakeNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, text: &str) -> bool {
        self.messages.lock().unwrap().push(text.to_string());
        true
    }
}
