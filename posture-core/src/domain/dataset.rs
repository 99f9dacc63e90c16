// posture-core/src/domain/dataset.rs

use crate::domain::evaluation::{ErrorKind, EvaluationStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    ConnectorInstance,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::ConnectorInstance => "connector_instance",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScopeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "connector_instance" | "connector" => Ok(Self::ConnectorInstance),
            _ => Err(format!("Unknown scope kind: {}", s)),
        }
    }
}

/// What an evaluation run is about: the whole organisation, or one connector instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalContext {
    pub scope_kind: ScopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_instance: Option<String>,
}

impl EvalContext {
    pub fn global() -> Self {
        Self {
            scope_kind: ScopeKind::Global,
            connector_kind: None,
            connector_instance: None,
        }
    }

    pub fn connector(kind: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            scope_kind: ScopeKind::ConnectorInstance,
            connector_kind: Some(kind.into()),
            connector_instance: Some(instance.into()),
        }
    }

    pub fn scope_key(&self) -> ScopeKey {
        match self.scope_kind {
            ScopeKind::Global => ScopeKey {
                scope_kind: ScopeKind::Global,
                source_kind: String::new(),
                source_name: String::new(),
            },
            ScopeKind::ConnectorInstance => ScopeKey {
                scope_kind: ScopeKind::ConnectorInstance,
                source_kind: self.connector_kind.clone().unwrap_or_default(),
                source_name: self.connector_instance.clone().unwrap_or_default(),
            },
        }
    }
}

/// Storage key shared by overrides, attestations and current results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    pub scope_kind: ScopeKind,
    #[serde(default)]
    pub source_kind: String,
    #[serde(default)]
    pub source_name: String,
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope_kind {
            ScopeKind::Global => write!(f, "global"),
            ScopeKind::ConnectorInstance => {
                write!(f, "{}/{}", self.source_kind, self.source_name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

pub fn default_version() -> u32 {
    1
}

impl DatasetRef {
    pub fn new(dataset: impl Into<String>, version: u32) -> Self {
        Self {
            dataset: dataset.into(),
            version,
        }
    }

    /// `okta:policies/sign-on` -> `okta`
    pub fn namespace(&self) -> &str {
        self.dataset
            .split_once(':')
            .map(|(ns, _)| ns)
            .unwrap_or(self.dataset.as_str())
    }

    /// `okta:policies/sign-on` -> `policies/sign-on`
    pub fn path(&self) -> &str {
        self.dataset
            .split_once(':')
            .map(|(_, path)| path)
            .unwrap_or("")
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.dataset, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetErrorKind {
    MissingIntegration,
    MissingDataset,
    PermissionDenied,
    SyncFailed,
    EngineError,
    #[serde(other)]
    Unrecognized,
}

impl DatasetErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingIntegration => "missing_integration",
            Self::MissingDataset => "missing_dataset",
            Self::PermissionDenied => "permission_denied",
            Self::SyncFailed => "sync_failed",
            Self::EngineError => "engine_error",
            Self::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct DatasetError {
    pub kind: DatasetErrorKind,
    #[serde(default)]
    pub message: String,
}

impl DatasetError {
    pub fn new(kind: DatasetErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Rows are shared between requesters of a memoized dataset.
pub type DatasetRows = Arc<Vec<Value>>;
pub type DatasetResult = Result<DatasetRows, DatasetError>;

/// Checks that every row decodes as a JSON object.
pub fn decode_rows(rows: &[Value]) -> Result<(), String> {
    match rows.iter().position(|row| !row.is_object()) {
        Some(idx) => Err(format!("row {} is not a JSON object", idx)),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetPolicy {
    Unknown,
    Error,
}

/// Per-check overrides of the default dataset error mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DatasetPolicies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_missing_dataset: Option<DatasetPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_permission_denied: Option<DatasetPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_sync_error: Option<DatasetPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub status: EvaluationStatus,
    pub error_kind: Option<ErrorKind>,
}

impl DatasetPolicies {
    pub fn resolve(&self, kind: DatasetErrorKind) -> PolicyOutcome {
        let apply = |policy: Option<DatasetPolicy>, default: DatasetPolicy, err: ErrorKind| {
            match policy.unwrap_or(default) {
                DatasetPolicy::Unknown => PolicyOutcome {
                    status: EvaluationStatus::Unknown,
                    error_kind: None,
                },
                DatasetPolicy::Error => PolicyOutcome {
                    status: EvaluationStatus::Error,
                    error_kind: Some(err),
                },
            }
        };

        match kind {
            DatasetErrorKind::MissingIntegration => PolicyOutcome {
                status: EvaluationStatus::Unknown,
                error_kind: None,
            },
            DatasetErrorKind::MissingDataset => apply(
                self.on_missing_dataset,
                DatasetPolicy::Unknown,
                ErrorKind::MissingDataset,
            ),
            DatasetErrorKind::PermissionDenied => apply(
                self.on_permission_denied,
                DatasetPolicy::Unknown,
                ErrorKind::PermissionDenied,
            ),
            DatasetErrorKind::SyncFailed => apply(
                self.on_sync_error,
                DatasetPolicy::Error,
                ErrorKind::SyncFailed,
            ),
            DatasetErrorKind::EngineError | DatasetErrorKind::Unrecognized => PolicyOutcome {
                status: EvaluationStatus::Error,
                error_kind: Some(ErrorKind::EngineError),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sync_failed_defaults_to_error() {
        let outcome = DatasetPolicies::default().resolve(DatasetErrorKind::SyncFailed);
        assert_eq!(outcome.status, EvaluationStatus::Error);
        assert_eq!(outcome.error_kind, Some(ErrorKind::SyncFailed));

        let lenient = DatasetPolicies {
            on_sync_error: Some(DatasetPolicy::Unknown),
            ..Default::default()
        };
        assert_eq!(
            lenient.resolve(DatasetErrorKind::SyncFailed).status,
            EvaluationStatus::Unknown
        );
    }

    #[test]
    fn test_missing_integration_ignores_policies() {
        let strict = DatasetPolicies {
            on_missing_dataset: Some(DatasetPolicy::Error),
            on_permission_denied: Some(DatasetPolicy::Error),
            on_sync_error: Some(DatasetPolicy::Error),
        };
        let outcome = strict.resolve(DatasetErrorKind::MissingIntegration);
        assert_eq!(outcome.status, EvaluationStatus::Unknown);
        assert_eq!(outcome.error_kind, None);
    }

    #[test]
    fn test_missing_dataset_and_permission_policies() {
        let defaults = DatasetPolicies::default();
        assert_eq!(
            defaults.resolve(DatasetErrorKind::MissingDataset).status,
            EvaluationStatus::Unknown
        );
        assert_eq!(
            defaults.resolve(DatasetErrorKind::PermissionDenied).status,
            EvaluationStatus::Unknown
        );

        let strict = DatasetPolicies {
            on_permission_denied: Some(DatasetPolicy::Error),
            ..Default::default()
        };
        assert_eq!(
            strict.resolve(DatasetErrorKind::PermissionDenied).error_kind,
            Some(ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn test_unrecognized_kind_is_engine_error() {
        let err: DatasetError =
            serde_json::from_value(json!({"kind": "quota_exceeded", "message": "429"})).unwrap();
        assert_eq!(err.kind, DatasetErrorKind::Unrecognized);
        let outcome = DatasetPolicies::default().resolve(err.kind);
        assert_eq!(outcome.error_kind, Some(ErrorKind::EngineError));
    }

    #[test]
    fn test_scope_key_and_namespace() {
        let ctx = EvalContext::connector("okta", "acme-prod");
        let key = ctx.scope_key();
        assert_eq!(key.source_kind, "okta");
        assert_eq!(key.to_string(), "okta/acme-prod");
        assert_eq!(EvalContext::global().scope_key().to_string(), "global");

        let ds = DatasetRef::new("okta:policies/sign-on", 1);
        assert_eq!(ds.namespace(), "okta");
        assert_eq!(ds.path(), "policies/sign-on");
    }

    #[test]
    fn test_decode_rows_rejects_non_objects() {
        assert!(decode_rows(&[json!({"id": 1})]).is_ok());
        assert_eq!(
            decode_rows(&[json!({"id": 1}), json!("oops")]).unwrap_err(),
            "row 1 is not a JSON object"
        );
    }
}
