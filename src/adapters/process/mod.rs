//! Launching tunnel subprocesses and delivering stop signals.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::domain::PortResult;
use crate::ports::{LaunchSpec, ProcessControl, StopSignal, Subprocess};

/// Process control backed by `tokio::process` and raw signals
#[derive(Debug, Clone, Default)]
pub struct TokioProcessControl;

impl TokioProcessControl {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessControl for TokioProcessControl {
    async fn spawn(&self, spec: &LaunchSpec) -> PortResult<Box<dyn Subprocess>> {
        if let Some(parent) = spec.output_file.parent() {
            fs::create_dir_all(parent)?;
        }

        // Truncate so readiness never matches a previous run's output
        let log = fs::File::create(&spec.output_file)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            // Own process group: the tunnel must outlive this invocation and
            // ignore the terminal's Ctrl-C.
            .process_group(0);

        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "spawned process has no pid"))?;

        info!("Launched '{}' as pid {}", spec.command_line(), pid);

        Ok(Box::new(ChildProcess {
            child,
            pid,
            output_file: spec.output_file.clone(),
        }))
    }

    async fn signal(&self, pid: u32, signal: StopSignal) -> PortResult<bool> {
        let nix_pid = Pid::from_raw(pid as i32);
        let nix_signal = match signal {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };

        debug!("Sending {:?} to process {}", nix_signal, pid);
        match kill(nix_pid, nix_signal) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        // Reap if it is our own child (watch mode); ECHILD just means init owns it
        match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => debug!("waitpid({}) -> {:?}", pid, status),
            Err(Errno::ECHILD) => {}
            Err(e) => debug!("waitpid({}) failed: {}", pid, e),
        }

        Ok(true)
    }
}

/// A tunnel process launched by this invocation
pub struct ChildProcess {
    child: Child,
    pid: u32,
    output_file: PathBuf,
}

#[async_trait]
impl Subprocess for ChildProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn captured_output(&mut self) -> PortResult<Vec<u8>> {
        match tokio::fs::read(&self.output_file).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn try_exit(&mut self) -> PortResult<Option<i32>> {
        Ok(self.child.try_wait()?.map(|status| status.code().unwrap_or(-1)))
    }

    async fn kill(&mut self) -> PortResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await?;
        Ok(())
    }
}
