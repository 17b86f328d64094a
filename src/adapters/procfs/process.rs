use std::fs;
use std::io;

use async_trait::async_trait;

use crate::domain::{PortResult, ProcessInfo, ProcessState};
use crate::ports::ProcessTable;

use super::parser;
use super::ProcfsConfig;

/// Process table implementation using procfs
pub struct ProcfsProcessTable {
    config: ProcfsConfig,
}

impl ProcfsProcessTable {
    pub fn new(config: ProcfsConfig) -> Self {
        Self { config }
    }

    fn list_pids(&self) -> PortResult<Vec<u32>> {
        let mut pids = Vec::new();

        for entry in fs::read_dir(&self.config.proc_path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();

            if let Ok(pid) = name.parse::<u32>() {
                pids.push(pid);
            }
        }

        pids.sort_unstable();
        Ok(pids)
    }

    /// `Ok(None)` when the process vanished between listing and reading
    fn read_process(&self, pid: u32) -> PortResult<Option<ProcessInfo>> {
        let pid_path = self.config.proc_path.join(pid.to_string());

        let stat_content = match fs::read_to_string(pid_path.join("stat")) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stat = parser::parse_proc_stat(&stat_content)?;

        // Kernel threads and zombies have an empty cmdline, fall back to comm
        let cmdline = fs::read(pid_path.join("cmdline")).unwrap_or_default();
        let command = match parser::parse_cmdline(&cmdline) {
            line if line.is_empty() => format!("[{}]", stat.comm),
            line => line,
        };

        Ok(Some(ProcessInfo::new(
            pid,
            stat.ppid,
            command,
            ProcessState::from_char(stat.state),
        )))
    }
}

#[async_trait]
impl ProcessTable for ProcfsProcessTable {
    async fn list_processes(&self) -> PortResult<Vec<ProcessInfo>> {
        let pids = self.list_pids()?;
        let mut processes = Vec::with_capacity(pids.len());

        for pid in pids {
            if let Ok(Some(process)) = self.read_process(pid) {
                processes.push(process);
            }
        }

        Ok(processes)
    }

    async fn get_process(&self, pid: u32) -> PortResult<Option<ProcessInfo>> {
        self.read_process(pid)
    }
}
