//! Deciding whether a tunnel process is alive.
//!
//! The recorded pid is trusted first. If it is stale, the process table is
//! scanned for a command line carrying a mode signature, since the tunnel may
//! have outlived whatever recorded it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Mode, PortResult, ProcessInfo};
use crate::ports::ProcessTable;

/// How a live process was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSource {
    Recorded,
    Scan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveProcess {
    pub pid: u32,
    pub mode: Mode,
    pub source: LivenessSource,
}

#[async_trait]
pub trait LivenessOracle: Send + Sync {
    async fn locate(&self, recorded: Option<u32>) -> PortResult<Option<LiveProcess>>;
}

/// Command-line signatures, one per mode
#[derive(Debug, Clone, Default)]
pub struct Signatures(Vec<(Mode, String)>);

impl Signatures {
    pub fn new(entries: Vec<(Mode, String)>) -> Self {
        Self(entries.into_iter().filter(|(_, sig)| !sig.is_empty()).collect())
    }

    pub fn mode_of(&self, process: &ProcessInfo) -> Option<Mode> {
        self.0
            .iter()
            .find(|(_, signature)| process.matches_signature(signature))
            .map(|(mode, _)| *mode)
    }
}

/// Tier one: the recorded pid, if it is alive and still runs a tunnel
pub struct RecordedPidOracle {
    table: Arc<dyn ProcessTable>,
    signatures: Signatures,
}

impl RecordedPidOracle {
    pub fn new(table: Arc<dyn ProcessTable>, signatures: Signatures) -> Self {
        Self { table, signatures }
    }
}

#[async_trait]
impl LivenessOracle for RecordedPidOracle {
    async fn locate(&self, recorded: Option<u32>) -> PortResult<Option<LiveProcess>> {
        let Some(pid) = recorded else {
            return Ok(None);
        };

        let Some(process) = self.table.get_process(pid).await? else {
            debug!("Recorded pid {} is gone", pid);
            return Ok(None);
        };

        if !process.is_alive() {
            debug!("Recorded pid {} is {:?}", pid, process.state);
            return Ok(None);
        }

        // Pids get reused; a foreign program under our pid is not our tunnel
        match self.signatures.mode_of(&process) {
            Some(mode) => Ok(Some(LiveProcess {
                pid,
                mode,
                source: LivenessSource::Recorded,
            })),
            None => {
                debug!("Recorded pid {} now runs '{}'", pid, process.command);
                Ok(None)
            }
        }
    }
}

/// Tier two: scan the process table for a tunnel command line
pub struct SignatureScanOracle {
    table: Arc<dyn ProcessTable>,
    signatures: Signatures,
}

impl SignatureScanOracle {
    pub fn new(table: Arc<dyn ProcessTable>, signatures: Signatures) -> Self {
        Self { table, signatures }
    }

    /// Every live process carrying a signature, lowest pid first
    pub async fn matches(&self) -> PortResult<Vec<(ProcessInfo, Mode)>> {
        let mut found: Vec<(ProcessInfo, Mode)> = self
            .table
            .list_processes()
            .await?
            .into_iter()
            .filter(|p| p.is_alive())
            .filter_map(|p| self.signatures.mode_of(&p).map(|mode| (p, mode)))
            .collect();
        found.sort_by_key(|(p, _)| p.pid);
        Ok(found)
    }
}

#[async_trait]
impl LivenessOracle for SignatureScanOracle {
    async fn locate(&self, _recorded: Option<u32>) -> PortResult<Option<LiveProcess>> {
        let found = self.matches().await?;
        if found.len() > 1 {
            debug!("Scan found {} tunnel processes, taking the oldest pid", found.len());
        }
        Ok(found.into_iter().next().map(|(process, mode)| LiveProcess {
            pid: process.pid,
            mode,
            source: LivenessSource::Scan,
        }))
    }
}

/// Asks `primary`, then `fallback` when the primary finds nothing
pub struct FallbackOracle {
    primary: Box<dyn LivenessOracle>,
    fallback: Box<dyn LivenessOracle>,
}

impl FallbackOracle {
    pub fn new(primary: Box<dyn LivenessOracle>, fallback: Box<dyn LivenessOracle>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl LivenessOracle for FallbackOracle {
    async fn locate(&self, recorded: Option<u32>) -> PortResult<Option<LiveProcess>> {
        if let Some(found) = self.primary.locate(recorded).await? {
            return Ok(Some(found));
        }
        self.fallback.locate(recorded).await
    }
}
