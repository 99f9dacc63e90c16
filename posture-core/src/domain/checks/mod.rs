// posture-core/src/domain/checks/mod.rs
//
// Check evaluators are pure: rows (or the dataset error that replaced them) and
// parameters in, one Evaluation out.

pub mod count_compare;
pub mod field_compare;
pub mod join_count;
pub mod manual;

use crate::domain::dataset::{DatasetPolicies, DatasetResult, DatasetRows, decode_rows};
use crate::domain::evaluation::{ErrorKind, Evaluation, EvaluationStatus};
use crate::domain::evidence::{CheckEvidence, Evidence};
use crate::domain::params::Params;
use crate::domain::predicate::PredicateError;
use crate::domain::rule::AffectedResources;

pub mod reason {
    pub const NO_ROWS_SELECTED: &str = "no_rows_selected";
    pub const BELOW_MIN_SELECTED: &str = "below_min_selected";
    pub const DATASET_UNAVAILABLE: &str = "dataset_unavailable";
    pub const ROW_DECODE_FAILED: &str = "row_decode_failed";
    pub const PARAM_REFERENCE_MISSING: &str = "param_reference_missing";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const INVALID_DEFINITION: &str = "invalid_definition";
    pub const JOIN_UNMATCHED: &str = "join_unmatched";
    pub const MANUAL_ATTESTATION_REQUIRED: &str = "manual_attestation_required";
    pub const OVERRIDE_DISABLED: &str = "override_disabled";
    pub const ATTESTED: &str = "attested";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Identifies the rule being evaluated and carries its effective parameters.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub ruleset_key: &'a str,
    pub rule_key: &'a str,
    pub params: &'a Params,
    pub resources: &'a AffectedResources,
}

impl CheckContext<'_> {
    pub fn evidence(&self, check: CheckEvidence, status: EvaluationStatus) -> Evidence {
        Evidence::new(
            self.ruleset_key,
            self.rule_key,
            check,
            self.params.clone(),
            status,
        )
    }
}

/// Final status of a check plus what the envelope should say about it.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub status: EvaluationStatus,
    pub error_kind: Option<ErrorKind>,
    pub reason_code: Option<&'static str>,
    pub summary: String,
    pub error: Option<String>,
}

impl Verdict {
    pub fn outcome(passed: bool, summary: String) -> Self {
        Self {
            status: if passed {
                EvaluationStatus::Pass
            } else {
                EvaluationStatus::Fail
            },
            error_kind: None,
            reason_code: None,
            summary,
            error: None,
        }
    }

    pub fn status(status: EvaluationStatus, reason_code: &'static str, summary: String) -> Self {
        Self {
            status,
            error_kind: None,
            reason_code: Some(reason_code),
            summary,
            error: None,
        }
    }

    pub fn error(kind: ErrorKind, reason_code: &'static str, message: String) -> Self {
        Self {
            status: EvaluationStatus::Error,
            error_kind: Some(kind),
            reason_code: Some(reason_code),
            summary: message.clone(),
            error: Some(message),
        }
    }
}

/// Stamps the verdict onto the envelope and builds the Evaluation.
pub fn conclude(mut evidence: Evidence, verdict: Verdict, affected: Vec<String>) -> Evaluation {
    evidence.result.status = verdict.status.clone();
    evidence.result.error_kind = verdict.error_kind;
    evidence.result.reason_code = verdict.reason_code.map(str::to_string);
    evidence.error = verdict.error;

    Evaluation {
        status: verdict.status,
        error_kind: verdict.error_kind,
        evidence_summary: verdict.summary,
        evidence,
        affected_resource_ids: affected,
    }
}

/// A predicate failure aborts the check: missing parameters are `invalid_params`,
/// anything else is a malformed rule.
pub fn predicate_failure(evidence: Evidence, err: PredicateError) -> Evaluation {
    let verdict = match &err {
        PredicateError::MissingParam(_) => Verdict::error(
            ErrorKind::InvalidParams,
            reason::PARAM_REFERENCE_MISSING,
            err.to_string(),
        ),
        PredicateError::Pointer(_) | PredicateError::AmbiguousOperand(_) => Verdict::error(
            ErrorKind::EngineError,
            reason::INVALID_DEFINITION,
            err.to_string(),
        ),
    };
    conclude(evidence, verdict, Vec::new())
}

pub fn definition_failure(evidence: Evidence, message: String) -> Evaluation {
    conclude(
        evidence,
        Verdict::error(ErrorKind::EngineError, reason::INVALID_DEFINITION, message),
        Vec::new(),
    )
}

/// Unwraps fetched rows, or converts the fetch/decode failure into the evaluation the
/// check's dataset policies call for.
pub fn take_rows(
    result: DatasetResult,
    policies: &DatasetPolicies,
    evidence: &Evidence,
    label: &str,
) -> Result<DatasetRows, Evaluation> {
    let rows = match result {
        Ok(rows) => rows,
        Err(err) => {
            let outcome = policies.resolve(err.kind);
            tracing::warn!(
                dataset = label,
                kind = err.kind.as_str(),
                status = %outcome.status,
                "dataset unavailable"
            );
            let message = format!("dataset {} unavailable: {}", label, err);
            let verdict = Verdict {
                status: outcome.status,
                error_kind: outcome.error_kind,
                reason_code: Some(reason::DATASET_UNAVAILABLE),
                summary: message.clone(),
                error: Some(message),
            };
            return Err(conclude(evidence.clone(), verdict, Vec::new()));
        }
    };

    if let Err(reason) = decode_rows(&rows) {
        return Err(conclude(
            evidence.clone(),
            Verdict::error(
                ErrorKind::EngineError,
                reason::ROW_DECODE_FAILED,
                format!("dataset {}: {}", label, reason),
            ),
            Vec::new(),
        ));
    }

    Ok(rows)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Arc;

    pub fn params(v: Value) -> Params {
        match v {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    pub fn rows(v: Value) -> DatasetResult {
        match v {
            Value::Array(items) => Ok(Arc::new(items)),
            other => Ok(Arc::new(vec![other])),
        }
    }

    pub fn users() -> DatasetResult {
        rows(json!([
            {"id": "u1", "name": "Ada", "status": "ACTIVE", "mfa": true},
            {"id": "u2", "name": "Bob", "status": "ACTIVE", "mfa": false},
            {"id": "u3", "name": "Cy", "status": "SUSPENDED", "mfa": false}
        ]))
    }
}
