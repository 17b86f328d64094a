use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ProbeOutcome;

/// Port for the HTTP reachability check of a published URL
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Fetch the URL, giving up after `timeout`. Never errors: failures are outcomes.
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}
