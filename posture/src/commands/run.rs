// posture/src/commands/run.rs
//
// USE CASE: Evaluate every applicable rule for one scope.

use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use posture_core::application::EvaluationRunner;
use posture_core::infrastructure::catalog::CatalogLoader;
use posture_core::infrastructure::config::load_project_config;
use posture_core::infrastructure::fs::write_report;

use super::{Store, providers};
use crate::cli::ScopeArgs;

pub const REPORT_FILE: &str = "run_report.json";

pub async fn execute(project_dir: PathBuf, scope: ScopeArgs) -> anyhow::Result<()> {
    let start = std::time::Instant::now();
    let ctx = scope.context()?;

    // A. Load the Config (Infra)
    println!("⚙️  Loading configuration...");
    let config = load_project_config(&project_dir).with_context(|| {
        format!(
            "Failed to load project configuration from {:?}",
            project_dir
        )
    })?;
    println!("   Project: {} (v{})", config.name, config.version);

    // B. Catalog -> Store
    let catalog = CatalogLoader::load(&config.catalog_dirs(&project_dir))
        .context("Failed to load rule catalog")?;
    let store = Store::open(&config, &project_dir)?;
    let seeded = catalog
        .seed(store.sink())
        .context("Failed to seed the result store")?;
    println!("   Store: {} ({} rules)", store.label(), seeded);

    // C. Providers
    let registry = providers(&config, &project_dir);
    if registry.is_empty() {
        warn!("no dataset provider registered");
    }

    // D. Run (Application Layer), Ctrl-C stops between rules
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    println!("🚀 Evaluating scope {}...", ctx.scope_key());
    let report = EvaluationRunner::new(store.rules(), &registry)
        .run(&ctx, &cancel)
        .await
        .context("Evaluation run aborted")?;
    watcher.abort();

    for (status, count) in &report.counts {
        println!("   {:<16} {}", status, count);
    }

    // E. Report
    let target_dir = config.target_dir(&project_dir);
    let report_path = write_report(&target_dir, REPORT_FILE, &report)
        .with_context(|| format!("Failed to write run report under {:?}", target_dir))?;
    println!("📝 Report written to {}", report_path.display());

    if report.cancelled {
        println!("⚠️  Run cancelled before every rule was evaluated.");
    }

    if report.success {
        println!(
            "\n✨ SUCCESS! {} rules evaluated in {:.2?}",
            report.rules_evaluated,
            start.elapsed()
        );
    } else {
        eprintln!("\n❌ FAILURE. {} failure(s):", report.failures.len());
        for failure in &report.failures {
            eprintln!("   - {}", failure);
        }
        // Exit with error code for CI/CD
        std::process::exit(1);
    }

    Ok(())
}
