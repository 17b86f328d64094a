use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::TelegramConfig;
use crate::application::{ModeProfile, SupervisorSettings};
use crate::domain::{HealthRules, Mode, ReadinessPattern, SshPatternConfig, WebPatternConfig};
use crate::ports::LaunchSpec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid config {path:?}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid readiness pattern for {mode}: {source}")]
    Pattern { mode: Mode, source: regex::Error },
}

/// Process-level configuration, from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            config_path: env::var("TUNNELKEEPER_CONFIG")
                .ok()
                .map(PathBuf::from)
                .or_else(default_config_path),
            state_dir: env::var("TUNNELKEEPER_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_dir()),
            log_level: env::var("TUNNELKEEPER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tunnelkeeper").join("config.toml"))
}

fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(env::temp_dir)
        .join("tunnelkeeper")
}

/// Contents of the optional TOML settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_mode: Mode,
    pub timing: TimingSettings,
    pub retry: RetrySettings,
    pub web: WebModeSettings,
    pub ssh: SshModeSettings,
    pub health: HealthRules,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub poll_interval_secs: u64,
    pub ready_timeout_secs: u64,
    pub stop_grace_secs: u64,
    pub health_timeout_secs: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            ready_timeout_secs: 30,
            stop_grace_secs: 2,
            health_timeout_secs: 10,
        }
    }
}

/// Caller-side retry policy used by `watch`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_secs: u64,
    pub watch_interval_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_secs: 10,
            watch_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebModeSettings {
    pub program: String,
    pub args: Vec<String>,
    /// Command-line substring identifying this tunnel; defaults to the full command line
    pub signature: Option<String>,
    pub identity_file: Option<PathBuf>,
    /// Extra environment for the tunnel process
    pub env: BTreeMap<String, String>,
    pub url_suffix: String,
    pub reserved_subdomains: Vec<String>,
}

impl Default for WebModeSettings {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            args: ssh_args(&["-R", "80:localhost:8080", "nokey@localhost.run"]),
            signature: None,
            identity_file: None,
            env: BTreeMap::new(),
            url_suffix: "lhr.life".to_string(),
            reserved_subdomains: vec!["admin".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshModeSettings {
    pub program: String,
    pub args: Vec<String>,
    pub signature: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub host_suffix: String,
    /// Account published in the ssh descriptor
    pub login: String,
}

impl Default for SshModeSettings {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            args: ssh_args(&["-p", "443", "-R", "0:localhost:22", "tcp@a.pinggy.io"]),
            signature: None,
            identity_file: None,
            env: BTreeMap::new(),
            host_suffix: "pinggy.link".to_string(),
            login: env::var("USER").unwrap_or_else(|_| "pi".to_string()),
        }
    }
}

fn ssh_args(tail: &[&str]) -> Vec<String> {
    [
        "-o",
        "StrictHostKeyChecking=no",
        "-o",
        "ServerAliveInterval=30",
        "-o",
        "ExitOnForwardFailure=yes",
    ]
    .iter()
    .chain(tail)
    .map(|s| s.to_string())
    .collect()
}

impl Settings {
    /// Load the settings file; a missing file means built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Self::parse(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn supervisor_settings(&self, state_dir: &Path) -> Result<SupervisorSettings, ConfigError> {
        let web_identity = self.web.identity_file.as_deref().map(expand_home);
        let web = ModeProfile {
            mode: Mode::Web,
            launch: launch_spec(
                &self.web.program,
                &self.web.args,
                web_identity.as_deref(),
                &self.web.env,
                state_dir.join("web.log"),
            ),
            signature: self.web.signature.clone(),
            identity_file: web_identity,
            pattern: ReadinessPattern::web(&WebPatternConfig {
                url_suffix: self.web.url_suffix.clone(),
                reserved_subdomains: self.web.reserved_subdomains.clone(),
            })
            .map_err(|source| ConfigError::Pattern {
                mode: Mode::Web,
                source,
            })?,
        };

        let ssh_identity = self.ssh.identity_file.as_deref().map(expand_home);
        let ssh = ModeProfile {
            mode: Mode::Ssh,
            launch: launch_spec(
                &self.ssh.program,
                &self.ssh.args,
                ssh_identity.as_deref(),
                &self.ssh.env,
                state_dir.join("ssh.log"),
            ),
            signature: self.ssh.signature.clone(),
            identity_file: ssh_identity,
            pattern: ReadinessPattern::ssh(&SshPatternConfig {
                host_suffix: self.ssh.host_suffix.clone(),
                login: self.ssh.login.clone(),
            })
            .map_err(|source| ConfigError::Pattern {
                mode: Mode::Ssh,
                source,
            })?,
        };

        Ok(SupervisorSettings {
            default_mode: self.default_mode,
            poll_interval: Duration::from_secs(self.timing.poll_interval_secs.max(1)),
            ready_timeout: Duration::from_secs(self.timing.ready_timeout_secs),
            stop_grace: Duration::from_secs(self.timing.stop_grace_secs),
            health_timeout: Duration::from_secs(self.timing.health_timeout_secs),
            health_rules: self.health.clone(),
            profiles: vec![web, ssh],
        })
    }
}

/// An identity file reaches ssh as `-i <path>` ahead of the configured args;
/// other programs only get the presence check.
fn launch_spec(
    program: &str,
    args: &[String],
    identity_file: Option<&Path>,
    env: &BTreeMap<String, String>,
    log: PathBuf,
) -> LaunchSpec {
    let mut argv = Vec::with_capacity(args.len() + 2);
    if let Some(path) = identity_file.filter(|_| is_ssh(program)) {
        argv.push("-i".to_string());
        argv.push(path.display().to_string());
    }
    argv.extend(args.iter().cloned());

    env.iter()
        .fold(LaunchSpec::new(program, argv, log), |spec, (key, value)| spec.with_env(key, value))
}

fn is_ssh(program: &str) -> bool {
    Path::new(program).file_name().is_some_and(|name| name == "ssh")
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
