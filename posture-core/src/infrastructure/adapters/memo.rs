// posture-core/src/infrastructure/adapters/memo.rs
//
// Compute-once, share-result wrapper around any DatasetProvider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::dataset::{
    DatasetError, DatasetErrorKind, DatasetRef, DatasetResult, EvalContext, ScopeKey,
};
use crate::ports::dataset::DatasetProvider;

type Slot = Arc<OnceCell<DatasetResult>>;

/// Each (scope, dataset, version) is fetched at most once for the lifetime of the
/// wrapper. Concurrent callers for a dataset still in flight wait on the same fetch
/// and observe the same result, failures included.
pub struct MemoizedProvider<P> {
    inner: P,
    slots: Mutex<HashMap<(ScopeKey, DatasetRef), Slot>>,
}

impl<P: DatasetProvider> MemoizedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: (ScopeKey, DatasetRef)) -> Result<Slot, DatasetError> {
        let mut slots = self.slots.lock().map_err(|_| {
            DatasetError::new(DatasetErrorKind::EngineError, "dataset cache mutex poisoned")
        })?;
        Ok(slots.entry(key).or_default().clone())
    }
}

#[async_trait]
impl<P: DatasetProvider> DatasetProvider for MemoizedProvider<P> {
    fn capabilities(&self) -> Vec<DatasetRef> {
        self.inner.capabilities()
    }

    async fn get_dataset(&self, ctx: &EvalContext, dataset: &DatasetRef) -> DatasetResult {
        let slot = self.slot((ctx.scope_key(), dataset.clone()))?;
        slot.get_or_init(|| async {
            debug!(dataset = %dataset, "fetching dataset");
            self.inner.get_dataset(ctx, dataset).await
        })
        .await
        .clone()
    }
}
