// posture-core/src/domain/rule.rs

use crate::domain::dataset::{DatasetPolicies, DatasetRef, ScopeKey, ScopeKind, default_version};
use crate::domain::error::DomainError;
use crate::domain::params::{ParamSchema, Params};
use crate::domain::predicate::{Operator, Predicate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RulesetStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub scope_kind: ScopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_kind: Option<String>,
    #[serde(default)]
    pub status: RulesetStatus,
}

impl Ruleset {
    /// Whether the ruleset is active and targets the given scope.
    pub fn applies_to(&self, scope: &ScopeKey) -> bool {
        if self.status != RulesetStatus::Active || self.scope_kind != scope.scope_kind {
            return false;
        }
        match self.scope_kind {
            ScopeKind::Global => true,
            ScopeKind::ConnectorInstance => self
                .connector_kind
                .as_deref()
                .is_some_and(|kind| kind == scope.source_kind),
        }
    }
}

/// A stored rule. `definition` stays raw so that a malformed document is reported
/// as an evaluation error for this rule instead of failing the listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub ruleset_key: String,
    pub key: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub definition: Value,
}

fn default_true() -> bool {
    true
}

impl Rule {
    pub fn parse_definition(&self) -> Result<RuleDefinition, DomainError> {
        RuleDefinition::from_value(&self.definition).map_err(|e| DomainError::InvalidDefinition {
            rule: format!("{}/{}", self.ruleset_key, self.key),
            reason: e.to_string(),
        })
    }

    /// Best-effort check type for evidence when the definition does not parse.
    pub fn declared_check_type(&self) -> String {
        self.definition
            .pointer("/check/type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parameters: ParameterSpec,
    pub check: CheckDefinition,
    #[serde(default)]
    pub evidence: EvidenceConfig,
}

impl RuleDefinition {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParameterSpec {
    #[serde(default)]
    pub defaults: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<BTreeMap<String, ParamSchema>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EvidenceConfig {
    #[serde(default)]
    pub affected_resources: AffectedResources,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedResources {
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
}

fn default_id_field() -> String {
    "/id".to_string()
}

impl Default for AffectedResources {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            display_field: None,
        }
    }
}

/// The four supported check shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CheckDefinition {
    #[serde(rename = "field_compare")]
    FieldCompare(FieldCompareCheck),
    #[serde(rename = "count_compare")]
    CountCompare(CountCompareCheck),
    #[serde(rename = "join_count_compare")]
    JoinCountCompare(JoinCountCheck),
    #[serde(rename = "manual.attestation")]
    ManualAttestation(ManualAttestationCheck),
}

impl CheckDefinition {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FieldCompare(_) => "field_compare",
            Self::CountCompare(_) => "count_compare",
            Self::JoinCountCompare(_) => "join_count_compare",
            Self::ManualAttestation(_) => "manual.attestation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCompareCheck {
    pub dataset: String,
    #[serde(default = "default_version", alias = "dataset_version")]
    pub version: u32,
    #[serde(rename = "where", default)]
    pub where_: Vec<Predicate>,
    #[serde(rename = "assert")]
    pub assert_: Predicate,
    #[serde(default)]
    pub expect: Expectation,
    #[serde(flatten)]
    pub policies: DatasetPolicies,
}

impl FieldCompareCheck {
    pub fn dataset_ref(&self) -> DatasetRef {
        DatasetRef::new(self.dataset.clone(), self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    All,
    Any,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnEmpty {
    Pass,
    Fail,
    #[default]
    Unknown,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Expectation {
    #[serde(rename = "match", default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub min_selected: u64,
    #[serde(default)]
    pub on_empty: OnEmpty,
}

/// `count op target` where the target is a literal or a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub op: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_param: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountCompareCheck {
    pub dataset: String,
    #[serde(default = "default_version", alias = "dataset_version")]
    pub version: u32,
    #[serde(rename = "where", default)]
    pub where_: Vec<Predicate>,
    pub compare: Comparison,
    #[serde(flatten)]
    pub policies: DatasetPolicies,
}

impl CountCompareCheck {
    pub fn dataset_ref(&self) -> DatasetRef {
        DatasetRef::new(self.dataset.clone(), self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSide {
    pub dataset: String,
    #[serde(default = "default_version", alias = "dataset_version")]
    pub version: u32,
    pub key_path: String,
}

impl JoinSide {
    pub fn dataset_ref(&self) -> DatasetRef {
        DatasetRef::new(self.dataset.clone(), self.version)
    }
}

/// A join clause targets exactly one side of a pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_path: Option<String>,
    pub op: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_param: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    #[default]
    Ignore,
    Count,
    Error,
}

impl UnmatchedPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Count => "count",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinCountCheck {
    pub left: JoinSide,
    pub right: JoinSide,
    #[serde(rename = "where", default)]
    pub where_: Vec<JoinPredicate>,
    #[serde(default)]
    pub on_unmatched_left: UnmatchedPolicy,
    pub compare: Comparison,
    #[serde(flatten)]
    pub policies: DatasetPolicies,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ManualAttestationCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetOverride {
    pub ruleset_key: String,
    #[serde(flatten)]
    pub scope: ScopeKey,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOverride {
    pub ruleset_key: String,
    pub rule_key: String,
    #[serde(flatten)]
    pub scope: ScopeKey,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAttestation {
    pub ruleset_key: String,
    pub rule_key: String,
    #[serde(flatten)]
    pub scope: ScopeKey,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RuleAttestation {
    /// Active when it never expires or expires strictly after `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expiry| expiry > now)
    }
}
