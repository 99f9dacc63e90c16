// posture/src/commands/results.rs
//
// USE CASE: Show the current result of every rule for one scope.

use std::path::PathBuf;

use anyhow::Context;
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;

use posture_core::infrastructure::config::load_project_config;

use super::Store;
use crate::cli::ScopeArgs;

const SUMMARY_WIDTH: usize = 60;

pub async fn execute(project_dir: PathBuf, scope: ScopeArgs) -> anyhow::Result<()> {
    let ctx = scope.context()?;
    let config = load_project_config(&project_dir)
        .with_context(|| format!("Failed to load project configuration from {:?}", project_dir))?;

    let store = Store::open(&config, &project_dir)?;
    let Store::DuckDb(db) = &store else {
        anyhow::bail!(
            "❌ No database configured.\n👉 Set `database:` in posture.yaml (or POSTURE_DATABASE) and run 'posture run'."
        );
    };

    let scope_key = ctx.scope_key();
    let results = store
        .rules()
        .list_current_results(&scope_key)
        .await
        .context("Failed to read current results")?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Ruleset", "Rule", "Status", "Error", "Summary", "Affected", "Evaluated",
    ]);
    for r in &results {
        table.add_row(vec![
            r.ruleset_key.clone(),
            r.rule_key.clone(),
            r.status.to_string(),
            r.error_kind.map(|k| k.to_string()).unwrap_or_default(),
            truncate(&r.evidence_summary, SUMMARY_WIDTH),
            r.affected_resource_ids.len().to_string(),
            r.evaluated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("📊 Current results for {}", scope_key);
    println!("{table}");
    println!(
        "   {} current results, {} evaluations in history",
        results.len(),
        db.evaluation_count()?
    );
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
