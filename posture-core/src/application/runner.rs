// posture-core/src/application/runner.rs

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::application::evaluator::evaluate_rule;
use crate::application::resolver::{Resolution, resolve_rule, ruleset_enabled};
use crate::domain::checks::{CheckContext, Verdict, conclude, reason};
use crate::domain::dataset::{EvalContext, ScopeKey};
use crate::domain::evaluation::{ErrorKind, Evaluation, EvaluationRecord, EvaluationStatus};
use crate::domain::evidence::CheckEvidence;
use crate::domain::params::Params;
use crate::domain::rule::{AffectedResources, Rule};
use crate::error::PostureError;
use crate::ports::dataset::DatasetProvider;
use crate::ports::store::RuleStore;

/// Outcome of one evaluation run for one scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub scope: ScopeKey,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rulesets_evaluated: usize,
    pub rulesets_skipped: usize,
    pub rules_evaluated: usize,
    /// Evaluations per status label.
    pub counts: BTreeMap<String, usize>,
    pub failures: Vec<String>,
    pub cancelled: bool,
}

impl RunReport {
    fn new(scope: ScopeKey, started_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            scope,
            started_at,
            finished_at: started_at,
            rulesets_evaluated: 0,
            rulesets_skipped: 0,
            rules_evaluated: 0,
            counts: BTreeMap::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    fn fail(&mut self, message: String) {
        error!(%message, "run failure");
        self.failures.push(message);
    }

    pub fn count(&self, status: &EvaluationStatus) -> usize {
        self.counts.get(status.as_str()).copied().unwrap_or(0)
    }

    /// Surfaces the aggregated failures as one error.
    pub fn into_result(self) -> Result<RunReport, PostureError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(PostureError::RunFailed(self.failures))
        }
    }
}

/// Iterates active rulesets and rules for one evaluation context.
///
/// Continue-on-error: a failing lookup or write is recorded and the run moves on.
/// Every active rule of an applicable, enabled ruleset produces exactly one record.
pub struct EvaluationRunner<'a> {
    store: &'a dyn RuleStore,
    provider: &'a dyn DatasetProvider,
}

impl<'a> EvaluationRunner<'a> {
    pub fn new(store: &'a dyn RuleStore, provider: &'a dyn DatasetProvider) -> Self {
        Self { store, provider }
    }

    #[instrument(skip_all, fields(scope = %ctx.scope_key()))]
    pub async fn run(
        &self,
        ctx: &EvalContext,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PostureError> {
        let scope = ctx.scope_key();
        let mut report = RunReport::new(scope.clone(), Utc::now());
        let mut seen: HashSet<(String, String)> = HashSet::new();

        let rulesets = self.store.list_rulesets().await?;
        info!(count = rulesets.len(), "starting evaluation run");

        'rulesets: for ruleset in rulesets.iter().filter(|rs| rs.applies_to(&scope)) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            // Sans override lisible, chaque règle du ruleset sort en engine_error.
            let lookup_failure = match ruleset_enabled(self.store, &ruleset.key, &scope).await {
                Ok(true) => None,
                Ok(false) => {
                    debug!(ruleset = %ruleset.key, "ruleset disabled by override");
                    report.rulesets_skipped += 1;
                    continue;
                }
                Err(e) => {
                    let message = format!("ruleset {}: override lookup failed: {}", ruleset.key, e);
                    report.fail(message.clone());
                    Some(message)
                }
            };

            let rules = match self.store.list_active_rules(&ruleset.key).await {
                Ok(rules) => rules,
                Err(e) => {
                    report.fail(format!("ruleset {}: listing rules failed: {}", ruleset.key, e));
                    continue;
                }
            };
            report.rulesets_evaluated += 1;

            for rule in rules.iter().filter(|r| r.active) {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'rulesets;
                }
                if !seen.insert((rule.ruleset_key.clone(), rule.key.clone())) {
                    warn!(ruleset = %rule.ruleset_key, rule = %rule.key, "rule listed twice, skipping");
                    continue;
                }

                let evaluation = match &lookup_failure {
                    Some(message) => internal_error(rule, message.clone()),
                    None => self.evaluate(ctx, rule, &scope, &mut report).await,
                };
                self.persist(rule, &scope, &evaluation, &mut report).await;
            }
        }

        report.finished_at = Utc::now();
        report.success = report.failures.is_empty();
        info!(
            rules = report.rules_evaluated,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "evaluation run finished"
        );
        Ok(report)
    }

    async fn evaluate(
        &self,
        ctx: &EvalContext,
        rule: &Rule,
        scope: &ScopeKey,
        report: &mut RunReport,
    ) -> Evaluation {
        match resolve_rule(self.store, rule, scope, Utc::now()).await {
            Ok(Resolution::Decided(evaluation)) => evaluation,
            Ok(Resolution::Evaluate(override_)) => {
                evaluate_rule(self.provider, ctx, rule, override_.as_ref()).await
            }
            Err(e) => {
                let message = format!("rule {}/{}: resolution failed: {}", rule.ruleset_key, rule.key, e);
                report.fail(message.clone());
                internal_error(rule, message)
            }
        }
    }

    async fn persist(
        &self,
        rule: &Rule,
        scope: &ScopeKey,
        evaluation: &Evaluation,
        report: &mut RunReport,
    ) {
        report.rules_evaluated += 1;
        *report
            .counts
            .entry(evaluation.status.as_str().to_string())
            .or_insert(0) += 1;

        let record = EvaluationRecord::new(&rule.ruleset_key, &rule.key, scope, Utc::now(), evaluation);

        if let Err(e) = self.store.insert_evaluation(&record).await {
            report.fail(format!(
                "rule {}/{}: insert evaluation failed: {}",
                rule.ruleset_key, rule.key, e
            ));
        }
        if let Err(e) = self.store.upsert_current_result(&record).await {
            report.fail(format!(
                "rule {}/{}: upsert current result failed: {}",
                rule.ruleset_key, rule.key, e
            ));
        }
    }
}

fn internal_error(rule: &Rule, message: String) -> Evaluation {
    let params = Params::new();
    let resources = AffectedResources::default();
    let ctx = CheckContext {
        ruleset_key: &rule.ruleset_key,
        rule_key: &rule.key,
        params: &params,
        resources: &resources,
    };
    let evidence = ctx.evidence(
        CheckEvidence {
            check_type: rule.declared_check_type(),
            ..Default::default()
        },
        EvaluationStatus::Error,
    );
    conclude(
        evidence,
        Verdict::error(ErrorKind::EngineError, reason::INTERNAL_ERROR, message),
        Vec::new(),
    )
}
