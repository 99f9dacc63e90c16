// posture-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;
pub mod file_provider;
pub mod memo;
pub mod memory;

pub use duckdb::DuckDbStore;
pub use file_provider::FileDatasetProvider;
pub use memo::MemoizedProvider;
pub use memory::MemoryStore;
