use std::fmt;

use serde::{Deserialize, Serialize};

/// What came back from a single HTTP probe of the published URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Response { status: u16, body: String },
    TimedOut,
    /// Connection refused, DNS failure, TLS error and the like
    Failed(String),
}

/// Classification of a probe outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthResult {
    Healthy,
    /// The relay answered but no longer forwards to us
    Unhealthy(String),
    Unreachable(String),
}

impl HealthResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for HealthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
            Self::Unreachable(reason) => write!(f, "unreachable: {}", reason),
        }
    }
}

/// Rules deciding when a response means the relay dropped the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRules {
    /// Body texts the relay serves for hostnames it no longer forwards
    #[serde(default = "default_markers")]
    pub absent_markers: Vec<String>,
    #[serde(default = "default_teardown_statuses")]
    pub teardown_statuses: Vec<u16>,
}

fn default_markers() -> Vec<String> {
    vec!["no tunnel here".to_string()]
}

fn default_teardown_statuses() -> Vec<u16> {
    vec![502, 503, 504]
}

impl Default for HealthRules {
    fn default() -> Self {
        Self {
            absent_markers: default_markers(),
            teardown_statuses: default_teardown_statuses(),
        }
    }
}

pub fn classify(outcome: &ProbeOutcome, rules: &HealthRules) -> HealthResult {
    match outcome {
        ProbeOutcome::TimedOut => HealthResult::Unreachable("request timed out".to_string()),
        ProbeOutcome::Failed(err) => HealthResult::Unreachable(err.clone()),
        ProbeOutcome::Response { status, body } => {
            let body = body.to_lowercase();
            if let Some(marker) = rules
                .absent_markers
                .iter()
                .find(|m| body.contains(&m.to_lowercase()))
            {
                return HealthResult::Unhealthy(format!("relay says '{}' (HTTP {})", marker, status));
            }
            if rules.teardown_statuses.contains(status) {
                return HealthResult::Unhealthy(format!("relay answered HTTP {}", status));
            }
            HealthResult::Healthy
        }
    }
}
