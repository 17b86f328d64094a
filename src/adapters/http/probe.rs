use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::ProbeOutcome;
use crate::ports::HealthProbe;

/// Health probe using a plain GET
#[derive(Debug, Clone)]
pub struct ReqwestHealthProbe {
    client: reqwest::Client,
}

impl ReqwestHealthProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tunnelkeeper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for ReqwestHealthProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ProbeOutcome::TimedOut,
            Err(e) => return ProbeOutcome::Failed(e.to_string()),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                debug!("Probe {} -> HTTP {} ({} bytes)", url, status, body.len());
                ProbeOutcome::Response { status, body }
            }
            Err(e) if e.is_timeout() => ProbeOutcome::TimedOut,
            // Status line arrived, so the relay did answer
            Err(_) => ProbeOutcome::Response {
                status,
                body: String::new(),
            },
        }
    }
}
