// posture-core/src/infrastructure/config/project.rs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use validator::Validate;

use crate::infrastructure::error::InfrastructureError;

const CONFIG_CANDIDATES: [&str; 2] = ["posture_project_conf.yaml", "posture.yaml"];

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct ProjectConfig {
    #[validate(length(min = 1, message = "Project name cannot be empty"))]
    pub name: String,
    #[serde(default)]
    pub version: String,

    #[serde(rename = "catalog-paths", default)]
    #[validate(length(min = 1, message = "At least one catalog path is required"))]
    pub catalog_paths: Vec<String>,

    #[serde(rename = "dataset-path", default = "default_dataset_path")]
    pub dataset_path: String,

    #[serde(rename = "target-path", default = "default_target_path")]
    pub target_path: String,

    /// DuckDB file for persistent results. In-memory store when absent.
    #[serde(default)]
    pub database: Option<String>,
}

fn default_dataset_path() -> String {
    "datasets".to_string()
}
fn default_target_path() -> String {
    "target".to_string()
}

impl ProjectConfig {
    pub fn catalog_dirs(&self, project_dir: &Path) -> Vec<PathBuf> {
        self.catalog_paths
            .iter()
            .map(|p| project_dir.join(p))
            .collect()
    }

    pub fn dataset_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.dataset_path)
    }

    pub fn target_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.target_path)
    }

    pub fn database_path(&self, project_dir: &Path) -> Option<String> {
        self.database.as_deref().map(|db| {
            if db == ":memory:" {
                db.to_string()
            } else {
                project_dir.join(db).to_string_lossy().into_owned()
            }
        })
    }
}

// --- LOADER ---

#[instrument(skip(project_dir))]
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    // 1. Découverte du fichier principal
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project manifest");

    // 2. Chargement YAML
    let content = fs::read_to_string(&config_path)?;
    let mut config: ProjectConfig =
        serde_yaml::from_str(&content).map_err(|source| InfrastructureError::Yaml {
            path: config_path.display().to_string(),
            source,
        })?;

    // 3. Override via Variables d'Environnement
    // POSTURE_TARGET_PATH=/tmp/out posture run
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config
        .validate()
        .map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;

    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CONFIG_CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "{} (checked: {})",
        root.display(),
        CONFIG_CANDIDATES.join(", ")
    )))
}

fn apply_env_overrides(config: &mut ProjectConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("POSTURE_TARGET_PATH") {
        info!(old = ?config.target_path, new = ?val, "Overriding target path via ENV");
        config.target_path = val;
    }
    if let Some(val) = lookup("POSTURE_DATASET_PATH") {
        info!(old = ?config.dataset_path, new = ?val, "Overriding dataset path via ENV");
        config.dataset_path = val;
    }
    if let Some(val) = lookup("POSTURE_DATABASE") {
        info!(new = ?val, "Overriding database via ENV");
        config.database = Some(val);
    }
}
