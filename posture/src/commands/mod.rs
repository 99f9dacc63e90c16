// posture/src/commands/mod.rs

pub mod datasets;
pub mod results;
pub mod run;
pub mod validate;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

use posture_core::application::ProviderRegistry;
use posture_core::infrastructure::adapters::{
    DuckDbStore, FileDatasetProvider, MemoizedProvider, MemoryStore,
};
use posture_core::infrastructure::config::ProjectConfig;
use posture_core::ports::{CatalogSink, RuleStore};

/// The configured result store: DuckDB when `database` is set, in-memory otherwise.
pub enum Store {
    Memory(MemoryStore),
    DuckDb(DuckDbStore),
}

impl Store {
    pub fn open(config: &ProjectConfig, project_dir: &Path) -> anyhow::Result<Self> {
        match config.database_path(project_dir) {
            Some(db_path) => {
                let store = DuckDbStore::new(&db_path)
                    .with_context(|| format!("Failed to initialize DuckDB at {}", db_path))?;
                Ok(Self::DuckDb(store))
            }
            None => Ok(Self::Memory(MemoryStore::new())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::DuckDb(_) => "duckdb",
        }
    }

    pub fn rules(&self) -> &dyn RuleStore {
        match self {
            Self::Memory(s) => s,
            Self::DuckDb(s) => s,
        }
    }

    pub fn sink(&self) -> &dyn CatalogSink {
        match self {
            Self::Memory(s) => s,
            Self::DuckDb(s) => s,
        }
    }
}

/// File-backed datasets under the project's dataset path, fetched once per run.
pub fn providers(config: &ProjectConfig, project_dir: &Path) -> ProviderRegistry {
    let files = FileDatasetProvider::new(config.dataset_dir(project_dir));
    let mut registry = ProviderRegistry::new();
    registry.register("files", Arc::new(MemoizedProvider::new(files)));
    registry
}
