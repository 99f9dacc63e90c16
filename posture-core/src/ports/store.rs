// posture-core/src/ports/store.rs

use crate::domain::dataset::ScopeKey;
use crate::domain::evaluation::EvaluationRecord;
use crate::domain::rule::{Rule, RuleAttestation, RuleOverride, Ruleset, RulesetOverride};
use crate::error::PostureError;
use async_trait::async_trait;

/// Persistence for rule authoring data and evaluation output.
///
/// Listing order is whatever the store returns; the runner iterates in that order.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_rulesets(&self) -> Result<Vec<Ruleset>, PostureError>;

    async fn list_active_rules(&self, ruleset_key: &str) -> Result<Vec<Rule>, PostureError>;

    async fn get_ruleset_override(
        &self,
        ruleset_key: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RulesetOverride>, PostureError>;

    async fn get_rule_override(
        &self,
        ruleset_key: &str,
        rule_key: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RuleOverride>, PostureError>;

    async fn get_rule_attestation(
        &self,
        ruleset_key: &str,
        rule_key: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RuleAttestation>, PostureError>;

    /// Appends to the evaluation history.
    async fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<(), PostureError>;

    /// Replaces the current result for `(ruleset, rule, scope)`.
    async fn upsert_current_result(&self, record: &EvaluationRecord) -> Result<(), PostureError>;

    async fn list_current_results(
        &self,
        scope: &ScopeKey,
    ) -> Result<Vec<EvaluationRecord>, PostureError>;
}

/// Write side used to seed a store from a rule catalog. Writes are upserts.
pub trait CatalogSink {
    /// Drops rulesets, rules, overrides and attestations. Evaluation output is kept.
    fn clear_catalog(&self) -> Result<(), PostureError>;

    fn put_ruleset(&self, ruleset: Ruleset) -> Result<(), PostureError>;

    fn put_rule(&self, rule: Rule) -> Result<(), PostureError>;

    fn put_ruleset_override(&self, o: RulesetOverride) -> Result<(), PostureError>;

    fn put_rule_override(&self, o: RuleOverride) -> Result<(), PostureError>;

    fn put_attestation(&self, a: RuleAttestation) -> Result<(), PostureError>;
}
