// posture-core/src/domain/checks/manual.rs

use super::{CheckContext, Verdict, conclude, reason};
use crate::domain::evaluation::{Evaluation, EvaluationStatus};
use crate::domain::evidence::CheckEvidence;
use crate::domain::rule::ManualAttestationCheck;

/// Without an active attestation a manual rule can only be `unknown`.
pub fn evaluate(ctx: &CheckContext<'_>, check: &ManualAttestationCheck) -> Evaluation {
    let evidence = ctx.evidence(
        CheckEvidence {
            check_type: "manual.attestation".into(),
            ..Default::default()
        },
        EvaluationStatus::Unknown,
    );
    let summary = match &check.instructions {
        Some(instructions) => format!("Manual attestation required: {}", instructions),
        None => "Manual attestation required".to_string(),
    };
    conclude(
        evidence,
        Verdict::status(
            EvaluationStatus::Unknown,
            reason::MANUAL_ATTESTATION_REQUIRED,
            summary,
        ),
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::Params;
    use crate::domain::rule::AffectedResources;

    #[test]
    fn test_manual_rule_is_unknown() {
        let params = Params::new();
        let resources = AffectedResources::default();
        let ctx = CheckContext {
            ruleset_key: "soc2",
            rule_key: "background-checks",
            params: &params,
            resources: &resources,
        };
        let ev = evaluate(
            &ctx,
            &ManualAttestationCheck {
                instructions: Some("Upload the HR export".into()),
            },
        );
        assert_eq!(ev.status, EvaluationStatus::Unknown);
        assert_eq!(ev.error_kind, None);
        assert!(ev.evidence_summary.contains("Upload the HR export"));
        assert_eq!(
            ev.evidence.result.reason_code.as_deref(),
            Some(reason::MANUAL_ATTESTATION_REQUIRED)
        );
    }
}
