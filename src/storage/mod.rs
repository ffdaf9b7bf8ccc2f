pub mod disk;
pub mod page;
mod storage_manager;

pub use storage_manager::StorageManager;
