use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::warn;

use crate::domain::{Descriptor, Mode, PersistedState, PortResult};
use crate::ports::StateStore;

const PID_FILE: &str = "tunnel.pid";
const DESCRIPTOR_FILE: &str = "tunnel.url";
const MODE_FILE: &str = "tunnel.mode";

/// Plain-text, one-value-per-file state store
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_record(&self, name: &str) -> PortResult<Option<String>> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(content) => {
                let value = content.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, name: &str, value: Option<&str>) -> PortResult<()> {
        let path = self.dir.join(name);
        match value {
            Some(value) => {
                fs::create_dir_all(&self.dir)?;
                // Temp file + rename so readers never see a half-written value
                let tmp = self.dir.join(format!(".{}.{}.tmp", name, std::process::id()));
                fs::write(&tmp, format!("{}\n", value))?;
                fs::rename(&tmp, &path)?;
            }
            None => match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> PortResult<PersistedState> {
        let pid = match self.read_record(PID_FILE)? {
            Some(raw) => match raw.parse::<u32>() {
                Ok(pid) if pid > 0 => Some(pid),
                _ => {
                    warn!("Ignoring unparseable pid record {:?}", raw);
                    None
                }
            },
            None => None,
        };

        let mode = match self.read_record(MODE_FILE)? {
            Some(raw) => match raw.parse::<Mode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    warn!("Ignoring mode record: {}", e);
                    None
                }
            },
            None => None,
        };

        let descriptor = self.read_record(DESCRIPTOR_FILE)?.and_then(Descriptor::new);

        Ok(PersistedState {
            pid,
            descriptor,
            mode,
        })
    }

    fn save(&self, state: &PersistedState) -> PortResult<()> {
        let pid = state.pid.map(|p| p.to_string());
        let descriptor = state.descriptor.as_ref().map(Descriptor::as_str);

        self.write_record(MODE_FILE, state.mode.map(|m| m.as_str()))?;

        // A descriptor is never on disk without the pid that produced it
        if descriptor.is_some() {
            self.write_record(PID_FILE, pid.as_deref())?;
            self.write_record(DESCRIPTOR_FILE, descriptor)?;
        } else {
            self.write_record(DESCRIPTOR_FILE, None)?;
            self.write_record(PID_FILE, pid.as_deref())?;
        }
        Ok(())
    }
}
