// posture/src/commands/datasets.rs

use std::path::PathBuf;

use anyhow::Context;
use posture_core::infrastructure::config::load_project_config;
use posture_core::ports::DatasetProvider;

use super::providers;

pub fn execute(project_dir: PathBuf) -> anyhow::Result<()> {
    let config = load_project_config(&project_dir)
        .with_context(|| format!("Failed to load project configuration from {:?}", project_dir))?;
    let registry = providers(&config, &project_dir);

    let capabilities = registry.capabilities();
    println!(
        "📦 {} datasets under {}",
        capabilities.len(),
        config.dataset_dir(&project_dir).display()
    );
    for dataset in capabilities {
        println!("   ➜ {} (v{})", dataset.dataset, dataset.version);
    }
    Ok(())
}
