use std::path::PathBuf;

use thiserror::Error;

use super::Mode;

/// Boxed error returned by port implementations
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

pub type PortResult<T> = Result<T, PortError>;

/// Keep diagnostics readable; relays can be chatty.
const OUTPUT_TAIL_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{mode} tunnel needs credential {path:?}, which does not exist")]
    MissingCredential { mode: Mode, path: PathBuf },

    #[error("a {mode} tunnel is already running as pid {pid}; stop it first")]
    AlreadyRunning { pid: u32, mode: Mode },

    #[error("tunnel process exited before becoming ready; output:\n{output}")]
    SubprocessExitedEarly { output: String },

    #[error("tunnel did not become ready in time and was killed; output:\n{output}")]
    ReadinessTimeout { output: String },

    #[error("process {pid} ignored SIGTERM and was killed")]
    StopTimedOutForceKilled { pid: u32 },

    #[error("health probe of {url} got no response")]
    HealthUnreachable { url: String },

    #[error("relay no longer serves {url}")]
    HealthMarkerAbsent { url: String },

    #[error("{0} tunnels have no health check")]
    HealthCheckUnsupported(Mode),

    #[error("no launch profile configured for {0} tunnels")]
    NotConfigured(Mode),

    #[error("no tunnel is running")]
    NotRunning,

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: PortError,
    },

    #[error("{context}: {source}")]
    Port {
        context: &'static str,
        #[source]
        source: PortError,
    },
}

impl SupervisorError {
    pub fn port(context: &'static str) -> impl FnOnce(PortError) -> Self {
        move |source| Self::Port { context, source }
    }

    pub fn exited_early(output: &[u8]) -> Self {
        Self::SubprocessExitedEarly {
            output: output_tail(output),
        }
    }

    pub fn readiness_timeout(output: &[u8]) -> Self {
        Self::ReadinessTimeout {
            output: output_tail(output),
        }
    }
}

fn output_tail(output: &[u8]) -> String {
    let start = output.len().saturating_sub(OUTPUT_TAIL_BYTES);
    String::from_utf8_lossy(&output[start..]).trim_end().to_string()
}
