// posture-core/src/domain/checks/field_compare.rs

use super::{CheckContext, Verdict, conclude, predicate_failure, reason, take_rows};
use crate::domain::dataset::DatasetResult;
use crate::domain::evaluation::{ErrorKind, Evaluation, EvaluationStatus};
use crate::domain::evidence::{
    CheckEvidence, SelectionEvidence, Violation, affected_ids, sort_and_truncate,
};
use crate::domain::pointer::{self, PointerError};
use crate::domain::predicate::Predicate;
use crate::domain::rule::{FieldCompareCheck, MatchMode, OnEmpty};
use serde_json::Value;

pub fn evaluate(ctx: &CheckContext<'_>, check: &FieldCompareCheck, result: DatasetResult) -> Evaluation {
    let evidence = ctx.evidence(
        CheckEvidence {
            check_type: "field_compare".into(),
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

    let mut selected = Vec::new();
    for row in rows.iter() {
        match all_hold(&check.where_, row, ctx) {
            Ok(true) => selected.push(row),
            Ok(false) => {}
            Err(err) => return predicate_failure(evidence, err),
        }
    }

    let total = rows.len() as u64;
    let selected_count = selected.len() as u64;
    let mut evidence = evidence;
    evidence.result.selected_count = Some(selected_count);

    if selected_count == 0 || selected_count < check.expect.min_selected {
        evidence.selection = Some(SelectionEvidence {
            selected: selected_count,
            total: Some(total),
            passed: None,
        });
        let (code, summary) = if selected_count == 0 {
            (
                reason::NO_ROWS_SELECTED,
                format!("No rows selected out of {}", total),
            )
        } else {
            (
                reason::BELOW_MIN_SELECTED,
                format!(
                    "{} rows selected, fewer than the required {}",
                    selected_count, check.expect.min_selected
                ),
            )
        };
        let verdict = match check.expect.on_empty {
            OnEmpty::Pass => Verdict::status(EvaluationStatus::Pass, code, summary),
            OnEmpty::Fail => Verdict::status(EvaluationStatus::Fail, code, summary),
            OnEmpty::Unknown => Verdict::status(EvaluationStatus::Unknown, code, summary),
            OnEmpty::Error => Verdict::error(ErrorKind::EngineError, code, summary),
        };
        return conclude(evidence, verdict, Vec::new());
    }

    let mut passed = 0u64;
    let mut satisfied = Vec::with_capacity(selected.len());
    for row in &selected {
        match check.assert_.evaluate(row, ctx.params) {
            Ok(ok) => {
                if ok {
                    passed += 1;
                }
                satisfied.push(ok);
            }
            Err(err) => return predicate_failure(evidence, err),
        }
    }

    let ok = match check.expect.match_mode {
        MatchMode::All => passed == selected_count,
        MatchMode::Any => passed > 0,
        MatchMode::None => passed == 0,
    };

    // `none` flags the rows that matched; `all`/`any` flag the rows that did not.
    // A passing `any` reports nothing.
    let mut violations = Vec::new();
    if !(check.expect.match_mode == MatchMode::Any && ok) {
        let flag_satisfied = check.expect.match_mode == MatchMode::None;
        for (row, hit) in selected.iter().zip(&satisfied) {
            if *hit == flag_satisfied {
                match violation_for(row, ctx) {
                    Ok(v) => violations.push(v),
                    Err(err) => return predicate_failure(evidence, err.into()),
                }
            }
        }
    }

    let violation_count = violations.len();
    let truncated = sort_and_truncate(&mut violations);
    let affected = affected_ids(&violations);

    evidence.result.passed_count = Some(passed);
    evidence.selection = Some(SelectionEvidence {
        selected: selected_count,
        total: Some(total),
        passed: Some(passed),
    });
    evidence.violations = Some(violations);
    evidence.violations_truncated = Some(truncated);

    let summary = if ok {
        format!(
            "{} of {} selected rows satisfy {} {}",
            passed,
            selected_count,
            check.assert_.path,
            check.assert_.op
        )
    } else {
        format!(
            "{} violation(s) among {} selected rows on {} {}",
            violation_count,
            selected_count,
            check.assert_.path,
            check.assert_.op
        )
    };

    conclude(evidence, Verdict::outcome(ok, summary), affected)
}

fn all_hold(
    predicates: &[Predicate],
    row: &Value,
    ctx: &CheckContext<'_>,
) -> Result<bool, crate::domain::predicate::PredicateError> {
    for predicate in predicates {
        if !predicate.evaluate(row, ctx.params)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn violation_for(row: &Value, ctx: &CheckContext<'_>) -> Result<Violation, PointerError> {
    let resource_id = pointer::resolve(row, &ctx.resources.id_field)?
        .map(pointer::stringify)
        .unwrap_or_default();
    let display = match &ctx.resources.display_field {
        Some(field) => pointer::resolve(row, field)?.map(pointer::stringify),
        None => None,
    };
    Ok(Violation {
        resource_id,
        display,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{params, rows, users};
    use super::*;
    use crate::domain::dataset::{DatasetError, DatasetErrorKind, DatasetPolicies, DatasetPolicy};
    use crate::domain::params::Params;
    use crate::domain::predicate::Operator;
    use crate::domain::rule::{AffectedResources, Expectation};
    use serde_json::json;

    fn check(assert_: Predicate, expect: Expectation) -> FieldCompareCheck {
        FieldCompareCheck {
            dataset: "okta:users".into(),
            version: 1,
            where_: vec![Predicate {
                path: "/status".into(),
                op: Operator::Eq,
                value: Some(json!("ACTIVE")),
                value_param: None,
            }],
            assert_,
            expect,
            policies: DatasetPolicies::default(),
        }
    }

    fn mfa_enabled() -> Predicate {
        Predicate {
            path: "/mfa".into(),
            op: Operator::Eq,
            value: Some(json!(true)),
            value_param: None,
        }
    }

    fn run(check: &FieldCompareCheck, p: &Params, result: DatasetResult) -> Evaluation {
        let resources = AffectedResources {
            id_field: "/id".into(),
            display_field: Some("/name".into()),
        };
        let ctx = CheckContext {
            ruleset_key: "okta-baseline",
            rule_key: "mfa-required",
            params: p,
            resources: &resources,
        };
        evaluate(&ctx, check, result)
    }

    #[test]
    fn test_all_with_single_failure_reports_that_row() {
        let ev = run(&check(mfa_enabled(), Expectation::default()), &Params::new(), users());
        assert_eq!(ev.status, EvaluationStatus::Fail);
        assert_eq!(ev.affected_resource_ids, vec!["u2".to_string()]);
        let violations = ev.evidence.violations.unwrap();
        assert_eq!(violations[0].display.as_deref(), Some("Bob"));
        assert_eq!(ev.evidence.result.selected_count, Some(2));
        assert_eq!(ev.evidence.result.passed_count, Some(1));
        assert_eq!(ev.evidence.selection.unwrap().total, Some(3));
    }

    #[test]
    fn test_all_with_no_violations_passes() {
        let data = rows(json!([
            {"id": "u1", "status": "ACTIVE", "mfa": true},
            {"id": "u2", "status": "SUSPENDED", "mfa": false}
        ]));
        let ev = run(&check(mfa_enabled(), Expectation::default()), &Params::new(), data);
        assert_eq!(ev.status, EvaluationStatus::Pass);
        assert!(ev.affected_resource_ids.is_empty());
        assert_eq!(ev.evidence.violations_truncated, Some(false));
    }

    #[test]
    fn test_any_and_none_modes() {
        let any = Expectation {
            match_mode: MatchMode::Any,
            ..Default::default()
        };
        let ev = run(&check(mfa_enabled(), any), &Params::new(), users());
        assert_eq!(ev.status, EvaluationStatus::Pass);
        assert!(ev.affected_resource_ids.is_empty());

        let none = Expectation {
            match_mode: MatchMode::None,
            ..Default::default()
        };
        let ev = run(&check(mfa_enabled(), none), &Params::new(), users());
        assert_eq!(ev.status, EvaluationStatus::Fail);
        assert_eq!(ev.affected_resource_ids, vec!["u1".to_string()]);
    }

    #[test]
    fn test_empty_selection_defaults_to_unknown() {
        let data = rows(json!([{"id": "u3", "status": "SUSPENDED"}]));
        let ev = run(&check(mfa_enabled(), Expectation::default()), &Params::new(), data);
        assert_eq!(ev.status, EvaluationStatus::Unknown);
        assert_eq!(ev.error_kind, None);
        assert_eq!(
            ev.evidence.result.reason_code.as_deref(),
            Some(reason::NO_ROWS_SELECTED)
        );
    }

    #[test]
    fn test_empty_selection_with_on_empty_error() {
        let expect = Expectation {
            on_empty: OnEmpty::Error,
            ..Default::default()
        };
        let ev = run(&check(mfa_enabled(), expect), &Params::new(), rows(json!([])));
        assert_eq!(ev.status, EvaluationStatus::Error);
        assert_eq!(ev.error_kind, Some(ErrorKind::EngineError));
    }

    #[test]
    fn test_min_selected_short_circuits() {
        let expect = Expectation {
            min_selected: 5,
            on_empty: OnEmpty::Fail,
            ..Default::default()
        };
        let ev = run(&check(mfa_enabled(), expect), &Params::new(), users());
        assert_eq!(ev.status, EvaluationStatus::Fail);
        assert_eq!(
            ev.evidence.result.reason_code.as_deref(),
            Some(reason::BELOW_MIN_SELECTED)
        );
        assert!(ev.evidence.violations.is_none());
    }

    #[test]
    fn test_value_param_in_assert() {
        let data = rows(json!([
            {"id": "p1", "status": "ACTIVE", "min_length": 14},
            {"id": "p2", "status": "ACTIVE", "min_length": 8}
        ]));
        let assert_ = Predicate {
            path: "/min_length".into(),
            op: Operator::Gte,
            value: None,
            value_param: Some("min_length".into()),
        };
        let ev = run(
            &check(assert_.clone(), Expectation::default()),
            &params(json!({"min_length": 12})),
            data.clone(),
        );
        assert_eq!(ev.affected_resource_ids, vec!["p2".to_string()]);

        let ev = run(&check(assert_, Expectation::default()), &Params::new(), data);
        assert_eq!(ev.status, EvaluationStatus::Error);
        assert_eq!(ev.error_kind, Some(ErrorKind::InvalidParams));
    }

    #[test]
    fn test_violations_truncated_at_hundred() {
        let items: Vec<_> = (0..120)
            .map(|i| json!({"id": format!("u{:03}", 119 - i), "status": "ACTIVE", "mfa": false}))
            .collect();
        let ev = run(
            &check(mfa_enabled(), Expectation::default()),
            &Params::new(),
            rows(Value::Array(items)),
        );
        assert_eq!(ev.status, EvaluationStatus::Fail);
        assert_eq!(ev.evidence.violations_truncated, Some(true));
        assert_eq!(ev.affected_resource_ids.len(), 100);
        assert_eq!(ev.affected_resource_ids[0], "u000");
        assert_eq!(ev.affected_resource_ids[99], "u099");
    }

    #[test]
    fn test_rows_without_id_are_not_affected_resources() {
        let data = rows(json!([{"status": "ACTIVE", "mfa": false, "name": "nameless"}]));
        let ev = run(&check(mfa_enabled(), Expectation::default()), &Params::new(), data);
        assert_eq!(ev.status, EvaluationStatus::Fail);
        assert!(ev.affected_resource_ids.is_empty());
        assert_eq!(ev.evidence.violations.unwrap().len(), 1);
    }

    #[test]
    fn test_sync_failure_policy() {
        let failed: DatasetResult = Err(DatasetError::new(DatasetErrorKind::SyncFailed, "timeout"));
        let mut c = check(mfa_enabled(), Expectation::default());
        let ev = run(&c, &Params::new(), failed.clone());
        assert_eq!(ev.status, EvaluationStatus::Error);
        assert_eq!(ev.error_kind, Some(ErrorKind::SyncFailed));

        c.policies.on_sync_error = Some(DatasetPolicy::Unknown);
        let ev = run(&c, &Params::new(), failed);
        assert_eq!(ev.status, EvaluationStatus::Unknown);
        assert_eq!(ev.error_kind, None);
    }

    #[test]
    fn test_row_decode_failure_is_engine_error() {
        let data = rows(json!([{"id": "u1", "status": "ACTIVE"}, 42]));
        let ev = run(&check(mfa_enabled(), Expectation::default()), &Params::new(), data);
        assert_eq!(ev.status, EvaluationStatus::Error);
        assert_eq!(ev.error_kind, Some(ErrorKind::EngineError));
        assert_eq!(
            ev.evidence.result.reason_code.as_deref(),
            Some(reason::ROW_DECODE_FAILED)
        );
    }
}
