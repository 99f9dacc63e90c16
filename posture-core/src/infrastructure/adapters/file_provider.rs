// posture-core/src/infrastructure/adapters/file_provider.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::domain::dataset::{DatasetError, DatasetErrorKind, DatasetRef, DatasetResult, EvalContext};
use crate::ports::dataset::DatasetProvider;

/// Datasets synced to disk as `<root>/<namespace>/<path>/v<version>.json`.
///
/// A file holds a bare array of rows, `{"rows": [...]}`, or the error shape
/// `{"error": {"kind": ..., "message": ...}}` left by a failed sync.
pub struct FileDatasetProvider {
    root: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Rows(Vec<Value>),
    Wrapped { rows: Vec<Value> },
    Failed { error: DatasetError },
}

impl FileDatasetProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_for(&self, dataset: &DatasetRef) -> Result<(PathBuf, PathBuf), DatasetError> {
        let namespace = dataset.namespace();
        let path = dataset.path();
        let safe = |s: &str| !s.is_empty() && s != "." && s != ".." && !s.contains('\\');

        if !safe(namespace) || path.is_empty() || !path.split('/').all(safe) {
            return Err(DatasetError::new(
                DatasetErrorKind::EngineError,
                format!("unsafe dataset name '{}'", dataset.dataset),
            ));
        }

        let ns_dir = self.root.join(namespace);
        let mut file = ns_dir.clone();
        for segment in path.split('/') {
            file.push(segment);
        }
        file.push(format!("v{}.json", dataset.version));
        Ok((ns_dir, file))
    }
}

/// `<root>/okta/policies/password/v1.json` -> `okta:policies/password@v1`
fn dataset_from_path(root: &Path, file: &Path) -> Option<DatasetRef> {
    let rel = file.strip_prefix(root).ok()?;
    let mut parts: Vec<&str> = rel.iter().map(|p| p.to_str()).collect::<Option<_>>()?;
    let version = parts
        .pop()?
        .strip_prefix('v')?
        .strip_suffix(".json")?
        .parse::<u32>()
        .ok()?;
    if parts.len() < 2 {
        return None;
    }
    let namespace = parts.remove(0);
    Some(DatasetRef::new(
        format!("{}:{}", namespace, parts.join("/")),
        version,
    ))
}

fn io_error(dataset: &DatasetRef, err: std::io::Error) -> DatasetError {
    let kind = match err.kind() {
        IoErrorKind::NotFound => DatasetErrorKind::MissingDataset,
        IoErrorKind::PermissionDenied => DatasetErrorKind::PermissionDenied,
        _ => DatasetErrorKind::EngineError,
    };
    DatasetError::new(kind, format!("{}: {}", dataset, err))
}

#[async_trait]
impl DatasetProvider for FileDatasetProvider {
    fn capabilities(&self) -> Vec<DatasetRef> {
        let mut found: Vec<DatasetRef> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| dataset_from_path(&self.root, e.path()))
            .collect();
        found.sort();
        found
    }

    #[instrument(skip_all, fields(dataset = %dataset))]
    async fn get_dataset(&self, ctx: &EvalContext, dataset: &DatasetRef) -> DatasetResult {
        let (ns_dir, file) = self.file_for(dataset)?;

        if !tokio::fs::try_exists(&ns_dir).await.unwrap_or(false) {
            return Err(DatasetError::new(
                DatasetErrorKind::MissingIntegration,
                format!("no data synced for namespace '{}'", dataset.namespace()),
            ));
        }

        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| io_error(dataset, e))?;
        debug!(path = ?file, bytes = bytes.len(), scope = %ctx.scope_key(), "dataset file read");

        match serde_json::from_slice::<DatasetFile>(&bytes) {
            Ok(DatasetFile::Rows(rows)) | Ok(DatasetFile::Wrapped { rows }) => Ok(Arc::new(rows)),
            Ok(DatasetFile::Failed { error }) => {
                warn!(kind = error.kind.as_str(), "dataset recorded a sync error");
                Err(error)
            }
            Err(e) => Err(DatasetError::new(
                DatasetErrorKind::EngineError,
                format!("{}: unreadable dataset file: {}", dataset, e),
            )),
        }
    }
}
