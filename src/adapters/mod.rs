pub mod http;
pub mod process;
pub mod procfs;
pub mod store;

pub use http::{ReqwestHealthProbe, TelegramConfig, TelegramNotifier};
pub use process::TokioProcessControl;
pub use procfs::{ProcfsConfig, ProcfsProcessTable};
pub use store::FileStateStore;
#[cfg(test)]
pub use store::MemoryStateStore;
