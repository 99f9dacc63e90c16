// posture-core/src/domain/checks/join_count.rs

use super::count_compare::compare_count;
use super::{
    CheckContext, Verdict, conclude, definition_failure, predicate_failure, reason, take_rows,
};
use crate::domain::dataset::DatasetResult;
use crate::domain::evaluation::{ErrorKind, Evaluation, EvaluationStatus};
use crate::domain::evidence::{CheckEvidence, JoinEvidence, JoinSideEvidence, SelectionEvidence};
use crate::domain::pointer;
use crate::domain::predicate::{PredicateError, evaluate_clause};
use crate::domain::rule::{JoinCountCheck, JoinPredicate, JoinSide, UnmatchedPolicy};
use serde_json::Value;
use std::collections::HashMap;

type Pairing<'a> = (&'a Value, Option<&'a Value>);

fn side_evidence(side: &JoinSide) -> JoinSideEvidence {
    JoinSideEvidence {
        dataset: side.dataset.clone(),
        dataset_version: side.version,
        key_path: side.key_path.clone(),
    }
}

/// Left rows are paired with every right row sharing the stringified key. Keys that
/// do not resolve, or resolve to null, never match.
pub fn evaluate(
    ctx: &CheckContext<'_>,
    check: &JoinCountCheck,
    left: DatasetResult,
    right: DatasetResult,
) -> Evaluation {
    let mut evidence = ctx.evidence(
        CheckEvidence {
            check_type: "join_count_compare".into(),
            left: Some(side_evidence(&check.left)),
            right: Some(side_evidence(&check.right)),
            ..Default::default()
        },
        EvaluationStatus::Unknown,
    );

    if let Some(clause) = check
        .where_
        .iter()
        .find(|c| c.left_path.is_some() == c.right_path.is_some())
    {
        return definition_failure(
            evidence,
            format!(
                "join clause '{}' must set exactly one of left_path or right_path",
                clause.op
            ),
        );
    }

    let left_rows = match take_rows(left, &check.policies, &evidence, &check.left.dataset) {
        Ok(rows) => rows,
        Err(evaluation) => return evaluation,
    };
    let right_rows = match take_rows(right, &check.policies, &evidence, &check.right.dataset) {
        Ok(rows) => rows,
        Err(evaluation) => return evaluation,
    };

    let mut index: HashMap<String, Vec<&Value>> = HashMap::new();
    for row in right_rows.iter() {
        match join_key(row, &check.right.key_path) {
            Ok(Some(key)) => index.entry(key).or_default().push(row),
            Ok(None) => {}
            Err(err) => return predicate_failure(evidence, err),
        }
    }

    let mut pairings: Vec<Pairing<'_>> = Vec::new();
    let mut unmatched = 0u64;
    for row in left_rows.iter() {
        let key = match join_key(row, &check.left.key_path) {
            Ok(key) => key,
            Err(err) => return predicate_failure(evidence, err),
        };
        match key.as_ref().and_then(|k| index.get(k)) {
            Some(matches) => pairings.extend(matches.iter().map(|r| (row, Some(*r)))),
            None => {
                unmatched += 1;
                if check.on_unmatched_left == UnmatchedPolicy::Count {
                    pairings.push((row, None));
                }
            }
        }
    }

    evidence.join = Some(JoinEvidence {
        on_unmatched_left: check.on_unmatched_left.as_str().to_string(),
        unmatched_left: unmatched,
    });

    if check.on_unmatched_left == UnmatchedPolicy::Error && unmatched > 0 {
        let message = format!(
            "{} row(s) of {} have no match in {}",
            unmatched, check.left.dataset, check.right.dataset
        );
        return conclude(
            evidence,
            Verdict::error(ErrorKind::JoinUnmatched, reason::JOIN_UNMATCHED, message),
            Vec::new(),
        );
    }

    let mut count = 0u64;
    for pairing in &pairings {
        match pairing_holds(pairing, &check.where_, ctx) {
            Ok(true) => count += 1,
            Ok(false) => {}
            Err(err) => return predicate_failure(evidence, err),
        }
    }

    evidence.selection = Some(SelectionEvidence {
        selected: count,
        total: Some(pairings.len() as u64),
        passed: None,
    });

    compare_count(evidence, &check.compare, ctx, count, "matching pairs")
}

fn join_key(row: &Value, key_path: &str) -> Result<Option<String>, PredicateError> {
    Ok(pointer::resolve(row, key_path)?
        .filter(|v| !v.is_null())
        .map(pointer::stringify))
}

fn pairing_holds(
    (left, right): &Pairing<'_>,
    clauses: &[JoinPredicate],
    ctx: &CheckContext<'_>,
) -> Result<bool, PredicateError> {
    for clause in clauses {
        let (row, path) = match (&clause.left_path, &clause.right_path) {
            (Some(path), None) => (Some(*left), path),
            (None, Some(path)) => (*right, path),
            _ => return Ok(false),
        };
        let holds = evaluate_clause(
            row,
            path,
            clause.op,
            clause.value.as_ref(),
            clause.value_param.as_deref(),
            ctx.params,
        )?;
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::rows;
    use super::*;
    use crate::domain::dataset::{DatasetError, DatasetErrorKind, DatasetPolicies};
    use crate::domain::params::Params;
    use crate::domain::predicate::Operator;
    use crate::domain::rule::{AffectedResources, Comparison};
    use serde_json::json;

    fn identities() -> DatasetResult {
        rows(json!([
            {"email": "ada@acme.io", "employed": true},
            {"email": "bob@acme.io", "employed": false},
            {"email": "cy@acme.io", "employed": false},
            {"name": "no email"}
        ]))
    }

    fn accounts() -> DatasetResult {
        rows(json!([
            {"profile": {"email": "ada@acme.io"}, "status": "ACTIVE"},
            {"profile": {"email": "bob@acme.io"}, "status": "ACTIVE"},
            {"profile": {"email": "bob@acme.io"}, "status": "SUSPENDED"}
        ]))
    }

    fn check(on_unmatched_left: UnmatchedPolicy, where_: Vec<JoinPredicate>) -> JoinCountCheck {
        JoinCountCheck {
            left: JoinSide {
                dataset: "normalized:identities".into(),
                version: 1,
                key_path: "/email".into(),
            },
            right: JoinSide {
                dataset: "okta:users".into(),
                version: 1,
                key_path: "/profile/email".into(),
            },
            where_,
            on_unmatched_left,
            compare: Comparison {
                op: Operator::Eq,
                value: Some(json!(0)),
                value_param: None,
            },
            policies: DatasetPolicies::default(),
        }
    }

    fn left_clause(path: &str, op: Operator, value: Value) -> JoinPredicate {
        JoinPredicate {
            left_path: Some(path.into()),
            right_path: None,
            op,
            value: Some(value),
            value_param: None,
        }
    }

    fn right_clause(path: &str, op: Operator, value: Value) -> JoinPredicate {
        JoinPredicate {
            left_path: None,
            right_path: Some(path.into()),
            op,
            value: Some(value),
            value_param: None,
        }
    }

    fn run(check: &JoinCountCheck, left: DatasetResult, right: DatasetResult) -> Evaluation {
        let params = Params::new();
        let resources = AffectedResources::default();
        let ctx = CheckContext {
            ruleset_key: "identity",
            rule_key: "no-leaver-accounts",
            params: &params,
            resources: &resources,
        };
        evaluate(&ctx, check, left, right)
    }

    #[test]
    fn test_active_accounts_of_leavers() {
        let c = check(
            UnmatchedPolicy::Ignore,
            vec![
                left_clause("/employed", Operator::Eq, json!(false)),
                right_clause("/status", Operator::Eq, json!("ACTIVE")),
            ],
        );
        let ev = run(&c, identities(), accounts());
        assert_eq!(ev.status, EvaluationStatus::Fail);
        assert_eq!(ev.evidence.result.count_value, Some(1));
        let join = ev.evidence.join.unwrap();
        assert_eq!(join.unmatched_left, 2);
        assert_eq!(join.on_unmatched_left, "ignore");
        // ada pairs once, bob twice; unmatched rows are not pairings under `ignore`.
        assert_eq!(ev.evidence.selection.unwrap().total, Some(3));
    }

    #[test]
    fn test_unmatched_left_counted_with_nil_right() {
        let c = check(
            UnmatchedPolicy::Count,
            vec![right_clause("/status", Operator::Absent, Value::Null)],
        );
        let ev = run(&c, identities(), accounts());
        // right-side clauses are false on a nil right row, even `absent`.
        assert_eq!(ev.evidence.result.count_value, Some(0));
        assert_eq!(ev.evidence.selection.unwrap().total, Some(5));

        let c = check(
            UnmatchedPolicy::Count,
            vec![left_clause("/employed", Operator::Eq, json!(false))],
        );
        let ev = run(&c, identities(), accounts());
        // bob twice plus the unmatched cy
        assert_eq!(ev.evidence.result.count_value, Some(3));
    }

    #[test]
    fn test_unmatched_left_error_policy() {
        let ev = run(&check(UnmatchedPolicy::Error, vec![]), identities(), accounts());
        assert_eq!(ev.status, EvaluationStatus::Error);
        assert_eq!(ev.error_kind, Some(ErrorKind::JoinUnmatched));
        assert_eq!(ev.evidence.join.unwrap().unmatched_left, 2);
    }

    #[test]
    fn test_clause_must_target_one_side() {
        let both = JoinPredicate {
            left_path: Some("/a".into()),
            right_path: Some("/b".into()),
            op: Operator::Exists,
            value: None,
            value_param: None,
        };
        let ev = run(&check(UnmatchedPolicy::Ignore, vec![both]), identities(), accounts());
        assert_eq!(ev.error_kind, Some(ErrorKind::EngineError));
    }

    #[test]
    fn test_numeric_keys_join_on_string_form() {
        let left = rows(json!([{"uid": 7}, {"uid": 8}]));
        let right = rows(json!([{"owner": "7"}, {"owner": 8}]));
        let mut c = check(UnmatchedPolicy::Count, vec![]);
        c.left.key_path = "/uid".into();
        c.right.key_path = "/owner".into();
        let ev = run(&c, left, right);
        assert_eq!(ev.evidence.join.unwrap().unmatched_left, 0);
        assert_eq!(ev.evidence.result.count_value, Some(2));
    }

    #[test]
    fn test_right_side_failure_uses_policies() {
        let ev = run(
            &check(UnmatchedPolicy::Ignore, vec![]),
            identities(),
            Err(DatasetError::new(DatasetErrorKind::PermissionDenied, "403")),
        );
        assert_eq!(ev.status, EvaluationStatus::Unknown);
        assert!(ev.evidence.join.is_none());
    }
}
