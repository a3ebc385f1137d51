pub mod fs_store;
pub mod memory_store;

pub use fs_store::FileSystemStore;
pub use memory_store::MemoryStore;
