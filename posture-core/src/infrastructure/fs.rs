// posture-core/src/infrastructure/fs.rs

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::infrastructure::error::InfrastructureError;

/// Serializes `report` as pretty JSON into `target_dir/file_name`.
///
/// The target directory is created if needed. The file is written to a temp file
/// in the same directory and renamed, so readers never see a half-written report.
pub fn write_report<T: Serialize>(
    target_dir: &Path,
    file_name: &str,
    report: &T,
) -> Result<PathBuf, InfrastructureError> {
    fs::create_dir_all(target_dir)?;
    let body = serde_json::to_vec_pretty(report)?;

    let path = target_dir.join(file_name);
    let mut staged = tempfile::NamedTempFile::new_in(target_dir)?;
    staged.write_all(&body)?;
    staged.write_all(b"\n")?;
    staged
        .persist(&path)
        .map_err(|e| InfrastructureError::Io(e.error))?;

    debug!(path = %path.display(), bytes = body.len(), "report written");
    Ok(path)
}
