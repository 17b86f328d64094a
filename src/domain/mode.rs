use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which flavor of tunnel is being supervised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forwards a local web port, published as an https URL
    Web,
    /// Forwards the local ssh port, published as an ssh command line
    Ssh,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Ssh => "ssh",
        }
    }

    /// Only the web tunnel can be probed over HTTP
    pub fn has_health_check(&self) -> bool {
        matches!(self, Self::Web)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::Web
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode '{0}' (expected 'web' or 'ssh')")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" | "web-tunnel" => Ok(Self::Web),
            "ssh" | "ssh-tunnel" => Ok(Self::Ssh),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode_names() {
        assert_eq!("web".parse::<Mode>().unwrap(), Mode::Web);
        assert_eq!("SSH\n".parse::<Mode>().unwrap(), Mode::Ssh);
        assert_eq!("ssh-tunnel".parse::<Mode>().unwrap(), Mode::Ssh);
        assert!("vpn".parse::<Mode>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for mode in [Mode::Web, Mode::Ssh] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_unknown_mode_message() {
        let err = "vpn".parse::<Mode>().unwrap_err();
        assert_eq!(err, UnknownMode("vpn".to_string()));
        assert_eq!(err.to_string(), "unknown mode 'vpn' (expected 'web' or 'ssh')");
    }
}
