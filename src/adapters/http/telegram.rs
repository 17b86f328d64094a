use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::ports::Notifier;

/// Telegram bot credentials and subscribers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl TelegramConfig {
    pub fn is_usable(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_ids.is_empty()
    }
}

/// Tries per chat; transient failures back off 1 s, then 2 s
const SEND_ATTEMPTS: u32 = 3;

/// Sends notifications through the Telegram Bot API
pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    async fn send_to(&self, chat_id: i64, text: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(self.endpoint())
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), reqwest::Error> {
        let mut attempt = 1;
        loop {
            match self.send_to(chat_id, text).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SEND_ATTEMPTS && is_transient(&e) => {
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    debug!(
                        "Telegram attempt {}/{} for chat {} failed, retrying in {:?}: {}",
                        attempt,
                        SEND_ATTEMPTS,
                        chat_id,
                        backoff,
                        e.without_url()
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// A 4xx means the request itself is wrong; sending it again won't help.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.status().is_some_and(|status| status.is_server_error())
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        let mut delivered = true;
        for chat_id in &self.config.chat_ids {
            match self.deliver(*chat_id, text).await {
                Ok(()) => debug!("Notified chat {}", chat_id),
                Err(e) => {
                    // The token is part of the URL; keep it out of logs
                    warn!("Telegram delivery to chat {} failed: {}", chat_id, e.without_url());
                    delivered = false;
                }
            }
        }
        delivered
    }
}
