// posture-core/src/domain/checks/count_compare.rs

use super::{CheckContext, Verdict, conclude, definition_failure, predicate_failure, reason, take_rows};
use crate::domain::dataset::DatasetResult;
use crate::domain::evaluation::{ErrorKind, Evaluation, EvaluationStatus};
use crate::domain::evidence::{CheckEvidence, Evidence, SelectionEvidence};
use crate::domain::predicate::{PredicateError, eval_op, resolve_operand};
use crate::domain::rule::{Comparison, CountCompareCheck};
use serde_json::{Value, json};

pub fn evaluate(ctx: &CheckContext<'_>, check: &CountCompareCheck, result: DatasetResult) -> Evaluation {
    let evidence = ctx.evidence(
        CheckEvidence {
            check_type: "count_compare".into(),
            dataset: Some(check.dataset.clone()),
            dataset_version: Some(check.version),
            ..Default::default()
        },
        EvaluationStatus::Unknown,
    );

    let rows = match take_rows(result, &check.policies, &evidence, &check.dataset) {
        Ok(rows) => rows,
        Err(evaluation) => return evaluation,
    };

    let mut count = 0u64;
    for row in rows.iter() {
        let mut selected = true;
        for predicate in &check.where_ {
            match predicate.evaluate(row, ctx.params) {
                Ok(true) => {}
                Ok(false) => {
                    selected = false;
                    break;
                }
                Err(err) => return predicate_failure(evidence, err),
            }
        }
        if selected {
            count += 1;
        }
    }

    let mut evidence = evidence;
    evidence.selection = Some(SelectionEvidence {
        selected: count,
        total: Some(rows.len() as u64),
        passed: None,
    });

    compare_count(evidence, &check.compare, ctx, count, "matching rows")
}

/// Applies `count op target` and concludes. Shared with the join check.
pub(crate) fn compare_count(
    mut evidence: Evidence,
    compare: &Comparison,
    ctx: &CheckContext<'_>,
    count: u64,
    noun: &str,
) -> Evaluation {
    evidence.result.count_value = Some(count);

    if !compare.op.is_comparison() {
        return definition_failure(
            evidence,
            format!("compare.op '{}' is not a count comparison", compare.op),
        );
    }

    let target = match resolve_target(compare, ctx) {
        Ok(target) => target,
        Err(TargetError::Predicate(err)) => return predicate_failure(evidence, err),
        Err(TargetError::Definition(message)) => return definition_failure(evidence, message),
        Err(TargetError::Params(message)) => {
            return conclude(
                evidence,
                Verdict::error(ErrorKind::InvalidParams, reason::INVALID_PARAMS, message),
                Vec::new(),
            );
        }
    };

    evidence.result.target_value = Some(target.clone());
    let ok = eval_op(&json!(count), compare.op, &Value::Number(target.clone()));
    let summary = format!(
        "{} {} = {}, expected {} {}",
        noun,
        if ok { "ok" } else { "mismatch" },
        count,
        compare.op,
        target
    );

    conclude(evidence, Verdict::outcome(ok, summary), Vec::new())
}

enum TargetError {
    Predicate(PredicateError),
    Definition(String),
    Params(String),
}

fn resolve_target(compare: &Comparison, ctx: &CheckContext<'_>) -> Result<serde_json::Number, TargetError> {
    if compare.value.is_none() && compare.value_param.is_none() {
        return Err(TargetError::Definition(
            "compare requires 'value' or 'value_param'".into(),
        ));
    }

    let operand = resolve_operand(
        compare.value.as_ref(),
        compare.value_param.as_deref(),
        ctx.params,
        "compare",
    )
    .map_err(TargetError::Predicate)?;

    match operand {
        Value::Number(n) => Ok(n.clone()),
        other => match &compare.value_param {
            Some(name) => Err(TargetError::Params(format!(
                "parameter '{}' must be a number, got {}",
                name, other
            ))),
            None => Err(TargetError::Definition(format!(
                "compare value must be a number, got {}",
                other
            ))),
        },
    }
}
