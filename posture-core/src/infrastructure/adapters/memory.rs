// posture-core/src/infrastructure/adapters/memory.rs

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::dataset::ScopeKey;
use crate::domain::evaluation::EvaluationRecord;
use crate::domain::rule::{Rule, RuleAttestation, RuleOverride, Ruleset, RulesetOverride};
use crate::error::PostureError;
use crate::ports::store::{CatalogSink, RuleStore};

type RuleKey = (String, String);

#[derive(Default)]
struct State {
    rulesets: BTreeMap<String, Ruleset>,
    rules: BTreeMap<RuleKey, Rule>,
    ruleset_overrides: BTreeMap<(String, ScopeKey), RulesetOverride>,
    rule_overrides: BTreeMap<(RuleKey, ScopeKey), RuleOverride>,
    attestations: BTreeMap<(RuleKey, ScopeKey), RuleAttestation>,
    history: Vec<EvaluationRecord>,
    current: BTreeMap<(RuleKey, ScopeKey), EvaluationRecord>,
}

/// In-process `RuleStore`. Listings are ordered by key.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, PostureError> {
        self.state
            .lock()
            .map_err(|_| PostureError::Store("MemoryStore mutex poisoned".into()))
    }

    fn check_writable(&self) -> Result<(), PostureError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(PostureError::Store("writes disabled".into()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Every evaluation ever inserted, oldest first.
    pub fn history(&self) -> Result<Vec<EvaluationRecord>, PostureError> {
        Ok(self.lock()?.history.clone())
    }
}

impl CatalogSink for MemoryStore {
    fn clear_catalog(&self) -> Result<(), PostureError> {
        let mut state = self.lock()?;
        state.rulesets.clear();
        state.rules.clear();
        state.ruleset_overrides.clear();
        state.rule_overrides.clear();
        state.attestations.clear();
        Ok(())
    }

    fn put_ruleset(&self, ruleset: Ruleset) -> Result<(), PostureError> {
        self.lock()?.rulesets.insert(ruleset.key.clone(), ruleset);
        Ok(())
    }

    fn put_rule(&self, rule: Rule) -> Result<(), PostureError> {
        let key = (rule.ruleset_key.clone(), rule.key.clone());
        self.lock()?.rules.insert(key, rule);
        Ok(())
    }

    fn put_ruleset_override(&self, o: RulesetOverride) -> Result<(), PostureError> {
        let key = (o.ruleset_key.clone(), o.scope.clone());
        self.lock()?.ruleset_overrides.insert(key, o);
        Ok(())
    }

    fn put_rule_override(&self, o: RuleOverride) -> Result<(), PostureError> {
        let key = ((o.ruleset_key.clone(), o.rule_key.clone()), o.scope.clone());
        self.lock()?.rule_overrides.insert(key, o);
        Ok(())
    }

    fn put_attestation(&self, a: RuleAttestation) -> Result<(), PostureError> {
        let key = ((a.ruleset_key.clone(), a.rule_key.clone()), a.scope.clone());
        self.lock()?.attestations.insert(key, a);
        Ok(())
    }
}

fn rule_key(ruleset_key: &str, rule_key: &str) -> RuleKey {
    (ruleset_key.to_string(), rule_key.to_string())
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn list_rulesets(&self) -> Result<Vec<Ruleset>, PostureError> {
        Ok(self.lock()?.rulesets.values().cloned().collect())
    }

    async fn list_active_rules(&self, ruleset_key: &str) -> Result<Vec<Rule>, PostureError> {
        Ok(self
            .lock()?
            .rules
            .values()
            .filter(|r| r.ruleset_key == ruleset_key && r.active)
            .cloned()
            .collect())
    }

    async fn get_ruleset_override(
        &self,
        ruleset_key: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RulesetOverride>, PostureError> {
        Ok(self
            .lock()?
            .ruleset_overrides
            .get(&(ruleset_key.to_string(), scope.clone()))
            .cloned())
    }

    async fn get_rule_override(
        &self,
        ruleset_key: &str,
        rule: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RuleOverride>, PostureError> {
        Ok(self
            .lock()?
            .rule_overrides
            .get(&(rule_key(ruleset_key, rule), scope.clone()))
            .cloned())
    }

    async fn get_rule_attestation(
        &self,
        ruleset_key: &str,
        rule: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RuleAttestation>, PostureError> {
        Ok(self
            .lock()?
            .attestations
            .get(&(rule_key(ruleset_key, rule), scope.clone()))
            .cloned())
    }

    async fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<(), PostureError> {
        self.check_writable()?;
        self.lock()?.history.push(record.clone());
        Ok(())
    }

    async fn upsert_current_result(&self, record: &EvaluationRecord) -> Result<(), PostureError> {
        self.check_writable()?;
        let key = (
            rule_key(&record.ruleset_key, &record.rule_key),
            record.scope.clone(),
        );
        self.lock()?.current.insert(key, record.clone());
        Ok(())
    }

    async fn list_current_results(
        &self,
        scope: &ScopeKey,
    ) -> Result<Vec<EvaluationRecord>, PostureError> {
        Ok(self
            .lock()?
            .current
            .values()
            .filter(|r| &r.scope == scope)
            .cloned()
            .collect())
    }
}
