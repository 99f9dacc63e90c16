// posture-core/src/domain/evaluation.rs

use crate::domain::dataset::ScopeKey;
use crate::domain::evidence::Evidence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Verdict of one rule for one scope.
///
/// Attestations carry free-form statuses (e.g. `exception`), kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EvaluationStatus {
    Pass,
    Fail,
    Unknown,
    Error,
    NotApplicable,
    Other(String),
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Unknown => "unknown",
            Self::Error => "error",
            Self::NotApplicable => "not_applicable",
            Self::Other(label) => label.as_str(),
        }
    }

    /// Parses a stored or attested label. Blank labels read as `unknown`.
    ///
    /// Only surrounding whitespace is dropped; any other label is kept as written.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "" | "unknown" => Self::Unknown,
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "error" => Self::Error,
            "not_applicable" => Self::NotApplicable,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for EvaluationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EvaluationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_label(&s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParams,
    EngineError,
    JoinUnmatched,
    MissingDataset,
    PermissionDenied,
    SyncFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::EngineError => "engine_error",
            Self::JoinUnmatched => "join_unmatched",
            Self::MissingDataset => "missing_dataset",
            Self::PermissionDenied => "permission_denied",
            Self::SyncFailed => "sync_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_params" => Ok(Self::InvalidParams),
            "engine_error" => Ok(Self::EngineError),
            "join_unmatched" => Ok(Self::JoinUnmatched),
            "missing_dataset" => Ok(Self::MissingDataset),
            "permission_denied" => Ok(Self::PermissionDenied),
            "sync_failed" => Ok(Self::SyncFailed),
            _ => Err(format!("Unknown error kind: {}", s)),
        }
    }
}

/// Engine output for one rule. `error_kind` is only set when `status` is `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: EvaluationStatus,
    pub error_kind: Option<ErrorKind>,
    pub evidence_summary: String,
    pub evidence: Evidence,
    pub affected_resource_ids: Vec<String>,
}

impl Evaluation {
    pub fn evidence_json(&self) -> String {
        self.evidence.to_json_string()
    }
}

/// An evaluation as handed to persistence: history row and current-result row share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub ruleset_key: String,
    pub rule_key: String,
    pub scope: ScopeKey,
    pub evaluated_at: DateTime<Utc>,
    pub status: EvaluationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub evidence_summary: String,
    pub evidence_json: String,
    #[serde(default)]
    pub affected_resource_ids: Vec<String>,
}

impl EvaluationRecord {
    pub fn new(
        ruleset_key: &str,
        rule_key: &str,
        scope: &ScopeKey,
        evaluated_at: DateTime<Utc>,
        evaluation: &Evaluation,
    ) -> Self {
        Self {
            ruleset_key: ruleset_key.to_string(),
            rule_key: rule_key.to_string(),
            scope: scope.clone(),
            evaluated_at,
            status: evaluation.status.clone(),
            error_kind: evaluation.error_kind,
            evidence_summary: evaluation.evidence_summary.clone(),
            evidence_json: evaluation.evidence_json(),
            affected_resource_ids: evaluation.affected_resource_ids.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        assert_eq!(EvaluationStatus::from_label(" pass\n"), EvaluationStatus::Pass);
        assert_eq!(EvaluationStatus::from_label("  "), EvaluationStatus::Unknown);
        assert_eq!(
            EvaluationStatus::from_label("exception"),
            EvaluationStatus::Other("exception".into())
        );
        assert_eq!(EvaluationStatus::from_label(" Exception ").as_str(), "Exception");
        assert_eq!(EvaluationStatus::from_label("PASS").as_str(), "PASS");
        assert_eq!(EvaluationStatus::NotApplicable.to_string(), "not_applicable");
    }

    #[test]
    fn test_status_serde_is_a_plain_string() {
        let json = serde_json::to_string(&EvaluationStatus::Other("exception".into())).unwrap();
        assert_eq!(json, r#""exception""#);
        let back: EvaluationStatus = serde_json::from_str(r#""not_applicable""#).unwrap();
        assert_eq!(back, EvaluationStatus::NotApplicable);
    }

    #[test]
    fn test_error_kind_round_trip_through_str() {
        use std::str::FromStr;
        for kind in [
            ErrorKind::InvalidParams,
            ErrorKind::EngineError,
            ErrorKind::JoinUnmatched,
            ErrorKind::SyncFailed,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }
}
