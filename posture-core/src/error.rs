// posture-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostureError {
    // --- ERREURS DU DOMAINE (Catalogue, Définitions, Paramètres) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- ERREURS D'INFRASTRUCTURE (IO, Parsing, DuckDB) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error("Store Error: {0}")]
    Store(String),

    // --- ERREURS APPLICATIVES ---
    /// Per-rule failures collected over a whole run.
    #[error("Run finished with {} failure(s): {}", .0.len(), .0.join("; "))]
    RunFailed(Vec<String>),
}

impl From<std::io::Error> for PostureError {
    fn from(err: std::io::Error) -> Self {
        PostureError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for PostureError {
    fn from(err: duckdb::Error) -> Self {
        PostureError::Infrastructure(err.into())
    }
}
