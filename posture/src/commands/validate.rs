// posture/src/commands/validate.rs
//
// USE CASE: Check that every rule definition in the catalog would evaluate.

use std::path::PathBuf;

use anyhow::Context;
use posture_core::infrastructure::catalog::CatalogLoader;
use posture_core::infrastructure::config::load_project_config;

pub fn execute(project_dir: PathBuf) -> anyhow::Result<()> {
    let config = load_project_config(&project_dir)
        .with_context(|| format!("Failed to load project configuration from {:?}", project_dir))?;
    let catalog = CatalogLoader::load(&config.catalog_dirs(&project_dir))
        .context("Failed to load rule catalog")?;

    let issues = catalog.definition_issues();
    if issues.is_empty() {
        println!(
            "✅ {} rules in {} rulesets are valid.",
            catalog.rules.len(),
            catalog.rulesets.len()
        );
        return Ok(());
    }

    for issue in &issues {
        eprintln!("❌ {}/{}: {}", issue.ruleset_key, issue.rule_key, issue.message);
    }
    eprintln!("\n{} of {} rules are invalid.", issues.len(), catalog.rules.len());
    std::process::exit(1);
}
