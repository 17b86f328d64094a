pub mod liveness;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use supervisor::{Action, ModeProfile, StopOutcome, Supervisor, SupervisorSettings};
