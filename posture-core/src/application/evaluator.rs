// posture-core/src/application/evaluator.rs

use tracing::{debug, instrument, warn};

use crate::domain::checks::{
    self, CheckContext, Verdict, conclude, count_compare, field_compare, join_count, manual,
    reason,
};
use crate::domain::dataset::{DatasetRef, DatasetResult, EvalContext};
use crate::domain::evaluation::{ErrorKind, Evaluation, EvaluationStatus};
use crate::domain::evidence::{CheckEvidence, JoinSideEvidence};
use crate::domain::params::{Params, deep_merge, override_params, validate_params};
use crate::domain::rule::{AffectedResources, CheckDefinition, JoinSide, Rule, RuleOverride};
use crate::ports::dataset::DatasetProvider;

/// Runs one rule's check: definition parse, parameter resolution, dataset fetch,
/// check evaluation. Always returns an evaluation; failures become `error` verdicts.
#[instrument(skip_all, fields(ruleset = %rule.ruleset_key, rule = %rule.key, scope = %ctx.scope_key()))]
pub async fn evaluate_rule(
    provider: &dyn DatasetProvider,
    ctx: &EvalContext,
    rule: &Rule,
    override_: Option<&RuleOverride>,
) -> Evaluation {
    let definition = match rule.parse_definition() {
        Ok(def) => def,
        Err(err) => {
            warn!(error = %err, "rule definition rejected");
            let params = Params::new();
            let resources = AffectedResources::default();
            let check_ctx = context(rule, &params, &resources);
            let evidence = check_ctx.evidence(
                CheckEvidence {
                    check_type: rule.declared_check_type(),
                    ..Default::default()
                },
                EvaluationStatus::Error,
            );
            return checks::definition_failure(evidence, err.to_string());
        }
    };

    let resources = &definition.evidence.affected_resources;
    let describe = describe_check(&definition.check);

    let overlay = match override_params(override_.and_then(|o| o.params.as_ref())) {
        Ok(overlay) => overlay,
        Err(message) => {
            let defaults = definition.parameters.defaults.clone();
            return invalid_params(rule, &defaults, resources, describe, message);
        }
    };
    let params = deep_merge(&definition.parameters.defaults, &overlay);

    if let Some(schema) = &definition.parameters.schema
        && let Err(violations) = validate_params(&params, schema)
    {
        let message = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return invalid_params(rule, &params, resources, describe, message);
    }

    let check_ctx = context(rule, &params, resources);
    let evaluation = match &definition.check {
        CheckDefinition::FieldCompare(check) => {
            let rows = fetch(provider, ctx, &check.dataset_ref()).await;
            field_compare::evaluate(&check_ctx, check, rows)
        }
        CheckDefinition::CountCompare(check) => {
            let rows = fetch(provider, ctx, &check.dataset_ref()).await;
            count_compare::evaluate(&check_ctx, check, rows)
        }
        CheckDefinition::JoinCountCompare(check) => {
            let left = fetch(provider, ctx, &check.left.dataset_ref()).await;
            let right = fetch(provider, ctx, &check.right.dataset_ref()).await;
            join_count::evaluate(&check_ctx, check, left, right)
        }
        CheckDefinition::ManualAttestation(check) => manual::evaluate(&check_ctx, check),
    };

    debug!(status = %evaluation.status, "rule evaluated");
    evaluation
}

#[instrument(skip_all, fields(dataset = %dataset))]
async fn fetch(provider: &dyn DatasetProvider, ctx: &EvalContext, dataset: &DatasetRef) -> DatasetResult {
    provider.get_dataset(ctx, dataset).await
}

fn context<'a>(rule: &'a Rule, params: &'a Params, resources: &'a AffectedResources) -> CheckContext<'a> {
    CheckContext {
        ruleset_key: &rule.ruleset_key,
        rule_key: &rule.key,
        params,
        resources,
    }
}

fn invalid_params(
    rule: &Rule,
    params: &Params,
    resources: &AffectedResources,
    check: CheckEvidence,
    message: String,
) -> Evaluation {
    warn!(rule = %rule.key, %message, "invalid parameters");
    let evidence = context(rule, params, resources).evidence(check, EvaluationStatus::Error);
    conclude(
        evidence,
        Verdict::error(ErrorKind::InvalidParams, reason::INVALID_PARAMS, message),
        Vec::new(),
    )
}

fn side(side: &JoinSide) -> JoinSideEvidence {
    JoinSideEvidence {
        dataset: side.dataset.clone(),
        dataset_version: side.version,
        key_path: side.key_path.clone(),
    }
}

fn describe_check(check: &CheckDefinition) -> CheckEvidence {
    let mut evidence = CheckEvidence {
        check_type: check.type_name().to_string(),
        ..Default::default()
    };
    match check {
        CheckDefinition::FieldCompare(c) => {
            evidence.dataset = Some(c.dataset.clone());
            evidence.dataset_version = Some(c.version);
        }
        CheckDefinition::CountCompare(c) => {
            evidence.dataset = Some(c.dataset.clone());
            evidence.dataset_version = Some(c.version);
        }
        CheckDefinition::JoinCountCompare(c) => {
            evidence.left = Some(side(&c.left));
            evidence.right = Some(side(&c.right));
        }
        CheckDefinition::ManualAttestation(_) => {}
    }
    evidence
}
