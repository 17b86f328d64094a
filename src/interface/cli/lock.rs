use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

const LOCK_FILE: &str = "tunnelkeeper.lock";

/// Exclusive advisory lock held for the lifetime of one invocation
#[derive(Debug)]
pub struct InvocationLock {
    file: File,
}

impl InvocationLock {
    /// Fails fast with `WouldBlock` if another invocation holds the lock.
    pub fn acquire(state_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive()?;
        debug!("Acquired {}", path.display());
        Ok(Self { file })
    }
}

impl Drop for InvocationLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_invocation_is_refused() {
        let dir = TempDir::new().unwrap();
        let lock = InvocationLock::acquire(dir.path()).unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());

        assert!(InvocationLock::acquire(dir.path()).is_err());

        drop(lock);
        assert!(InvocationLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        InvocationLock::acquire(&nested).unwrap();
        assert!(nested.join(LOCK_FILE).exists());
    }
}
