use crate::domain::{PersistedState, PortResult};

/// Port for the persisted tunnel records (pid, descriptor, mode)
pub trait StateStore: Send + Sync {
    /// Read all three records; missing records come back as `None`
    fn load(&self) -> PortResult<PersistedState>;

    /// Write all three records; `None` unsets a record
    fn save(&self, state: &PersistedState) -> PortResult<()>;
}
