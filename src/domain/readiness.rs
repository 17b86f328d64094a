//! Readiness patterns: recognizing, in raw relay output, that a tunnel is up
//! and extracting the descriptor it was given.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Descriptor;

/// Settings for recognizing a published web URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPatternConfig {
    /// Hostname suffix the relay hands out, e.g. `lhr.life`
    pub url_suffix: String,
    /// First labels that belong to the relay itself, never to a tunnel
    #[serde(default = "default_reserved")]
    pub reserved_subdomains: Vec<String>,
}

fn default_reserved() -> Vec<String> {
    vec!["admin".to_string()]
}

/// Settings for recognizing an advertised ssh endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshPatternConfig {
    /// Hostname suffix of the relay's TCP endpoints, e.g. `pinggy.link`
    pub host_suffix: String,
    /// Local account to log in as; replaces whatever login the relay advertises
    pub login: String,
}

#[derive(Debug, Clone)]
pub enum ReadinessPattern {
    Web {
        url: Regex,
        suffix: String,
        reserved: Vec<String>,
    },
    Ssh {
        command: Regex,
        pair: Regex,
        suffix: String,
        login: String,
    },
}

impl ReadinessPattern {
    pub fn web(config: &WebPatternConfig) -> Result<Self, regex::Error> {
        Ok(Self::Web {
            url: Regex::new(r"(?i)https://([a-z0-9-]+(?:\.[a-z0-9-]+)*)")?,
            suffix: normalize_suffix(&config.url_suffix),
            reserved: config
                .reserved_subdomains
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        })
    }

    pub fn ssh(config: &SshPatternConfig) -> Result<Self, regex::Error> {
        Ok(Self::Ssh {
            command: Regex::new(
                r"(?i)\bssh\s+(?:-p\s*(\d{1,5})\s+)?[a-z0-9._+-]+@([a-z0-9-]+(?:\.[a-z0-9-]+)*)(?:\s+-p\s*(\d{1,5}))?",
            )?,
            pair: Regex::new(r"(?i)(?:tcp://)?([a-z0-9-]+(?:\.[a-z0-9-]+)+):(\d{1,5})\b")?,
            suffix: normalize_suffix(&config.host_suffix),
            login: config.login.clone(),
        })
    }

    /// Scans captured output for the first usable descriptor.
    pub fn extract(&self, output: &[u8]) -> Option<Descriptor> {
        let text = String::from_utf8_lossy(output);
        match self {
            Self::Web {
                url,
                suffix,
                reserved,
            } => url
                .captures_iter(&text)
                .filter_map(|caps| caps.get(1))
                .map(|host| host.as_str())
                .find(|host| is_tunnel_host(host, suffix, reserved))
                .and_then(|host| Descriptor::new(format!("https://{}", host))),
            Self::Ssh {
                command,
                pair,
                suffix,
                login,
            } => {
                let from_command = command.captures_iter(&text).find_map(|caps| {
                    let host = caps.get(2)?.as_str();
                    if !host_in_suffix(host, suffix) {
                        return None;
                    }
                    let port = match caps.get(1).or_else(|| caps.get(3)) {
                        Some(p) => Some(valid_port(p.as_str())?),
                        None => None,
                    };
                    Some(ssh_command(login, host, port))
                });

                from_command
                    .or_else(|| {
                        pair.captures_iter(&text).find_map(|caps| {
                            let host = caps.get(1)?.as_str();
                            let port = valid_port(caps.get(2)?.as_str())?;
                            host_in_suffix(host, suffix).then(|| ssh_command(login, host, Some(port)))
                        })
                    })
                    .and_then(Descriptor::new)
            }
        }
    }
}

fn normalize_suffix(suffix: &str) -> String {
    suffix.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn host_in_suffix(host: &str, suffix: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == suffix || host.ends_with(&format!(".{}", suffix))
}

// The bare relay domain and reserved first labels are the relay's own pages.
fn is_tunnel_host(host: &str, suffix: &str, reserved: &[String]) -> bool {
    let lower = host.to_ascii_lowercase();
    if lower == suffix || !host_in_suffix(&lower, suffix) {
        return false;
    }
    let first_label = lower.split('.').next().unwrap_or_default();
    !reserved.iter().any(|r| r == first_label)
}

fn valid_port(digits: &str) -> Option<u16> {
    digits.parse::<u16>().ok().filter(|port| *port != 0)
}

fn ssh_command(login: &str, host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("ssh -p {} {}@{}", port, login, host),
        None => format!("ssh {}@{}", login, host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_pattern() -> ReadinessPattern {
        ReadinessPattern::web(&WebPatternConfig {
            url_suffix: "example-relay.test".to_string(),
            reserved_subdomains: default_reserved(),
        })
        .unwrap()
    }

    fn ssh_pattern() -> ReadinessPattern {
        ReadinessPattern::ssh(&SshPatternConfig {
            host_suffix: "pinggy.link".to_string(),
            login: "pi".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_web_skips_admin_host() {
        let output = b"Connect to https://admin.example-relay.test to manage keys\n\
            abc123.example-relay.test tunneled with tls termination, https://abc123.example-relay.test\n";
        let descriptor = web_pattern().extract(output).unwrap();
        assert_eq!(descriptor.as_str(), "https://abc123.example-relay.test");
    }

    #[test]
    fn test_web_ignores_other_domains_and_bare_relay() {
        let output = b"docs at https://example-relay.test/docs\nsee https://twitter.com/relay\n";
        assert!(web_pattern().extract(output).is_none());
    }

    #[test]
    fn test_web_drops_trailing_path() {
        let output = b"\x1b[32mhttps://Q1w2.example-relay.test/\x1b[0m\n";
        let descriptor = web_pattern().extract(output).unwrap();
        assert_eq!(descriptor.as_str(), "https://Q1w2.example-relay.test");
    }

    #[test]
    fn test_web_not_fooled_by_suffix_lookalike() {
        let output = b"https://abc.example-relay.test.evil.org\n";
        assert!(web_pattern().extract(output).is_none());
    }

    #[test]
    fn test_ssh_pair_substitutes_login() {
        let output = b"You are not authenticated.\n\
            tcp://rnabc-93-1-2-3.a.free.pinggy.link:41234\n";
        let descriptor = ssh_pattern().extract(output).unwrap();
        assert_eq!(
            descriptor.as_str(),
            "ssh -p 41234 pi@rnabc-93-1-2-3.a.free.pinggy.link"
        );
    }

    #[test]
    fn test_ssh_command_form_substitutes_login() {
        let output = b"Connect with: ssh -p 2201 tcp@relay.pinggy.link\n";
        let descriptor = ssh_pattern().extract(output).unwrap();
        assert_eq!(descriptor.as_str(), "ssh -p 2201 pi@relay.pinggy.link");

        let output = b"ssh guest@box.pinggy.link -p 9022\n";
        let descriptor = ssh_pattern().extract(output).unwrap();
        assert_eq!(descriptor.as_str(), "ssh -p 9022 pi@box.pinggy.link");
    }

    #[test]
    fn test_ssh_ignores_foreign_hosts() {
        let output = b"Warning: Permanently added 'a.pinggy.io:443' (ED25519)\n";
        assert!(ssh_pattern().extract(output).is_none());
    }

    #[test]
    fn test_empty_output_has_no_descriptor() {
        assert!(web_pattern().extract(b"").is_none());
        assert!(ssh_pattern().extract(b"").is_none());
    }

    #[test]
    fn test_ssh_skips_out_of_range_port() {
        let output = b"tcp://a.pinggy.link:99999
ssh -p 70000 tcp@b.pinggy.link
";
        assert!(ssh_pattern().extract(output).is_none());

        let output = b"tcp://a.pinggy.link:99999
tcp://b.pinggy.link:65535
";
        let descriptor = ssh_pattern().extract(output).unwrap();
        assert_eq!(descriptor.as_str(), "ssh -p 65535 pi@b.pinggy.link");
    }
}
