mod file;
#[cfg(test)]
mod memory;

pub use file::FileStateStore;
#[cfg(test)]
pub use memory::MemoryStateStore;
