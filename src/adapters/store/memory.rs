use std::sync::RwLock;

use crate::domain::{PersistedState, PortResult};
use crate::ports::StateStore;

/// In-memory state store for tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<PersistedState>,
    saves: RwLock<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: RwLock::new(state),
            saves: RwLock::new(0),
        }
    }

    pub fn snapshot(&self) -> PersistedState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of writes so far
    pub fn save_count(&self) -> usize {
        self.saves.read().map(|n| *n).unwrap_or(0)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> PortResult<PersistedState> {
        let state = self.state.read().map_err(|e| e.to_string())?;
        Ok(state.clone())
    }

    fn save(&self, state: &PersistedState) -> PortResult<()> {
        *self.state.write().map_err(|e| e.to_string())? = state.clone();
        *self.saves.write().map_err(|e| e.to_string())? += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Descriptor, Mode};

    #[test]
    fn test_save_then_load() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load().unwrap(), PersistedState::default());

        let state = PersistedState {
            pid: Some(9),
            descriptor: Descriptor::new("https://a.lhr.life"),
            mode: Some(Mode::Web),
        };
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
        assert_eq!(store.save_count(), 1);
    }
}
