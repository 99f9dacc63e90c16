// posture-core/src/application/registry.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::dataset::{DatasetError, DatasetErrorKind, DatasetRef, DatasetResult, EvalContext};
use crate::ports::dataset::DatasetProvider;

struct Registration {
    name: String,
    capabilities: BTreeSet<DatasetRef>,
    provider: Arc<dyn DatasetProvider>,
}

/// Routes dataset requests to the provider that advertises them.
///
/// Capabilities are snapshotted at registration. A namespace nobody serves is
/// `missing_integration`; a served namespace without the dataset/version is
/// `missing_dataset`.
#[derive(Default)]
pub struct ProviderRegistry {
    registrations: Vec<Registration>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn DatasetProvider>) {
        let name = name.into();
        let capabilities: BTreeSet<DatasetRef> = provider.capabilities().into_iter().collect();
        info!(provider = %name, datasets = capabilities.len(), "dataset provider registered");
        self.registrations.push(Registration {
            name,
            capabilities,
            provider,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[async_trait]
impl DatasetProvider for ProviderRegistry {
    fn capabilities(&self) -> Vec<DatasetRef> {
        self.registrations
            .iter()
            .flat_map(|r| r.capabilities.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    async fn get_dataset(&self, ctx: &EvalContext, dataset: &DatasetRef) -> DatasetResult {
        if let Some(reg) = self
            .registrations
            .iter()
            .find(|r| r.capabilities.contains(dataset))
        {
            debug!(provider = %reg.name, dataset = %dataset, "routing dataset request");
            return reg.provider.get_dataset(ctx, dataset).await;
        }

        let namespace = dataset.namespace();
        let served = self
            .registrations
            .iter()
            .any(|r| r.capabilities.iter().any(|c| c.namespace() == namespace));

        if served {
            Err(DatasetError::new(
                DatasetErrorKind::MissingDataset,
                format!("no provider advertises {}", dataset),
            ))
        } else {
            Err(DatasetError::new(
                DatasetErrorKind::MissingIntegration,
                format!("no integration serves namespace '{}'", namespace),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Vec<DatasetRef>);

    #[async_trait]
    impl DatasetProvider for Fixed {
        fn capabilities(&self) -> Vec<DatasetRef> {
            self.0.clone()
        }

        async fn get_dataset(&self, _ctx: &EvalContext, dataset: &DatasetRef) -> DatasetResult {
            Ok(Arc::new(vec![json!({"served": dataset.to_string()})]))
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(
            "okta",
            Arc::new(Fixed(vec![
                DatasetRef::new("okta:users", 1),
                DatasetRef::new("okta:policies/password", 1),
            ])),
        );
        registry.register(
            "normalized",
            Arc::new(Fixed(vec![DatasetRef::new("normalized:identities", 2)])),
        );
        registry
    }

    #[tokio::test]
    async fn test_routes_to_advertising_provider() {
        let rows = registry()
            .get_dataset(&EvalContext::global(), &DatasetRef::new("normalized:identities", 2))
            .await
            .unwrap();
        assert_eq!(rows[0]["served"], "normalized:identities@v2");
    }

    #[tokio::test]
    async fn test_unserved_version_is_missing_dataset() {
        let err = registry()
            .get_dataset(&EvalContext::global(), &DatasetRef::new("okta:users", 3))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DatasetErrorKind::MissingDataset);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_missing_integration() {
        let err = registry()
            .get_dataset(&EvalContext::global(), &DatasetRef::new("google:users", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DatasetErrorKind::MissingIntegration);
    }

    #[test]
    fn test_capabilities_are_sorted_and_unique() {
        let mut registry = registry();
        registry.register("dup", Arc::new(Fixed(vec![DatasetRef::new("okta:users", 1)])));
        let caps: Vec<String> = registry.capabilities().iter().map(ToString::to_string).collect();
        assert_eq!(
            caps,
            vec![
                "normalized:identities@v2",
                "okta:policies/password@v1",
                "okta:users@v1"
            ]
        );
    }
}
