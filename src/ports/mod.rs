pub mod health_probe;
pub mod notifier;
pub mod process_control;
pub mod process_table;
pub mod state_store;

pub use health_probe::HealthProbe;
pub use notifier::Notifier;
pub use process_control::{LaunchSpec, ProcessControl, StopSignal, Subprocess};
pub use process_table::ProcessTable;
pub use state_store::StateStore;
