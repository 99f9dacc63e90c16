// posture-core/src/ports/dataset.rs

// The engine asks for rows; where they come from (a connector sync, a file, a
// warehouse) is the provider's business.

use crate::domain::dataset::{DatasetRef, DatasetResult, EvalContext};
use async_trait::async_trait;

/// Supplies named, versioned datasets as JSON rows or a typed `DatasetError`.
///
/// Providers may be shared across concurrent runs and own their memoization:
/// a given dataset/version is expected to be computed at most once per instance.
#[async_trait]
pub trait DatasetProvider: Send + Sync {
    /// Dataset/version pairs this provider serves.
    fn capabilities(&self) -> Vec<DatasetRef>;

    async fn get_dataset(&self, ctx: &EvalContext, dataset: &DatasetRef) -> DatasetResult;
}
