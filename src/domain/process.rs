use serde::{Deserialize, Serialize};

/// Process state as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Running,
    Sleeping,
    Waiting,
    Zombie,
    Stopped,
    TracingStop,
    Dead,
    Unknown,
}

impl ProcessState {
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => Self::Running,
            'S' => Self::Sleeping,
            'D' => Self::Waiting,
            'Z' => Self::Zombie,
            'T' => Self::Stopped,
            't' => Self::TracingStop,
            'X' | 'x' => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// A zombie still has a table entry but backs no tunnel
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Zombie | Self::Dead)
    }
}

/// One entry of the OS process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub command: String,
    pub state: ProcessState,
}

impl ProcessInfo {
    pub fn new(pid: u32, ppid: u32, command: String, state: ProcessState) -> Self {
        Self {
            pid,
            ppid,
            command,
            state,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn matches_signature(&self, signature: &str) -> bool {
        !signature.is_empty() && self.command.contains(signature)
    }
}
