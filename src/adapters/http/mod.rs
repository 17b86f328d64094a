mod probe;
mod telegram;

#[cfg(test)]
pub(crate) mod test_server;

pub use probe::ReqwestHealthProbe;
pub use telegram::{TelegramConfig, TelegramNotifier};
