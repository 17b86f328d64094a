mod parser;
mod process;

use std::path::PathBuf;

pub use process::ProcfsProcessTable;

/// Configuration for procfs paths (useful for container mounts)
#[derive(Debug, Clone)]
pub struct ProcfsConfig {
    pub proc_path: PathBuf,
}

impl ProcfsConfig {
    pub fn host() -> Self {
        Self {
            proc_path: PathBuf::from("/proc"),
        }
    }
}

impl Default for ProcfsConfig {
    fn default() -> Self {
        Self::host()
    }
}
