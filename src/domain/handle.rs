use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Mode;

/// Externally usable address of the tunnel (URL or ssh command line)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor(String);

impl Descriptor {
    /// Returns `None` for blank input; a descriptor is never empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three persisted records. `None` means the record is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub pid: Option<u32>,
    pub descriptor: Option<Descriptor>,
    pub mode: Option<Mode>,
}

impl PersistedState {
    /// Drops the process identity and descriptor together
    pub fn clear_process(&mut self) {
        self.pid = None;
        self.descriptor = None;
    }
}

/// One supervised tunnel instance as seen by callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHandle {
    pub process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<Descriptor>,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_healthy: Option<bool>,
}

impl ResourceHandle {
    pub fn new(mode: Mode) -> Self {
        Self {
            process_id: None,
            descriptor: None,
            mode,
            last_checked_at: None,
            last_healthy: None,
        }
    }

    pub fn from_state(state: &PersistedState, default_mode: Mode) -> Self {
        Self {
            process_id: state.pid,
            descriptor: state.descriptor.clone(),
            mode: state.mode.unwrap_or(default_mode),
            last_checked_at: None,
            last_healthy: None,
        }
    }

    pub fn with_process(mut self, pid: u32, descriptor: Option<Descriptor>) -> Self {
        self.process_id = Some(pid);
        self.descriptor = descriptor;
        self
    }

    pub fn with_check(mut self, checked_at: DateTime<Utc>, healthy: Option<bool>) -> Self {
        self.last_checked_at = Some(checked_at);
        self.last_healthy = healthy;
        self
    }

    pub fn is_running(&self) -> bool {
        self.process_id.is_some()
    }

    /// Descriptor is only meaningful while a process backs it
    pub fn live_descriptor(&self) -> Option<&Descriptor> {
        self.process_id.and(self.descriptor.as_ref())
    }
}
