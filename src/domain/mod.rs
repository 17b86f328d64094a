pub mod error;
pub mod handle;
pub mod health;
pub mod mode;
pub mod process;
pub mod readiness;

pub use error::{PortResult, SupervisorError};
pub use handle::{Descriptor, PersistedState, ResourceHandle};
pub use health::{classify, HealthResult, HealthRules, ProbeOutcome};
pub use mode::Mode;
pub use process::{ProcessInfo, ProcessState};
pub use readiness::{ReadinessPattern, SshPatternConfig, WebPatternConfig};
