use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::PortResult;

/// Everything needed to launch one tunnel subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Where stdout and stderr are captured
    pub output_file: PathBuf,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            output_file: output_file.into(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The command line as it will appear in the process table
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Kill,
}

/// A subprocess this invocation launched and is waiting on
#[async_trait]
pub trait Subprocess: Send {
    fn pid(&self) -> u32;

    /// Everything the process has written so far
    async fn captured_output(&mut self) -> PortResult<Vec<u8>>;

    /// Exit code if the process has exited (`-1` when killed by a signal)
    fn try_exit(&mut self) -> PortResult<Option<i32>>;

    /// Force-kill and reap
    async fn kill(&mut self) -> PortResult<()>;
}

/// Port for launching and signalling processes
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn spawn(&self, spec: &LaunchSpec) -> PortResult<Box<dyn Subprocess>>;

    /// Deliver a signal to any pid. `Ok(false)` if no such process exists.
    async fn signal(&self, pid: u32, signal: StopSignal) -> PortResult<bool>;
}
