use async_trait::async_trait;

/// Port for pushing a human-readable message somewhere (chat bot, etc.)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns true if the message was delivered
    async fn send(&self, text: &str) -> bool;
}
