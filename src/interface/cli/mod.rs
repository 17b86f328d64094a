pub mod args;
pub mod handlers;
pub mod lock;
pub mod watch;

pub use args::{Cli, Commands};
pub use handlers::{handle_command, AppState};
pub use lock::InvocationLock;
