use async_trait::async_trait;

use crate::domain::{PortResult, ProcessInfo};

/// Port for querying the OS process table
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// List all processes
    async fn list_processes(&self) -> PortResult<Vec<ProcessInfo>>;

    /// Look up a single process; `None` if the pid is not in the table
    async fn get_process(&self, pid: u32) -> PortResult<Option<ProcessInfo>>;

    /// True if the pid exists and is not a zombie
    async fn is_alive(&self, pid: u32) -> PortResult<bool> {
        Ok(self
            .get_process(pid)
            .await?
            .map(|p| p.is_alive())
            .unwrap_or(false))
    }
}
