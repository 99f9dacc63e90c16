// posture-core/src/application/resolver.rs
//
// Overrides first, then attestations, then the check itself.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::checks::{CheckContext, Verdict, conclude, reason};
use crate::domain::dataset::ScopeKey;
use crate::domain::evaluation::{Evaluation, EvaluationStatus};
use crate::domain::evidence::{AttestationEvidence, CheckEvidence, OverrideEvidence};
use crate::domain::params::{Params, deep_merge, override_params};
use crate::domain::rule::{AffectedResources, Rule, RuleAttestation, RuleOverride};
use crate::error::PostureError;
use crate::ports::store::RuleStore;

/// What to do with one rule for one scope.
#[derive(Debug)]
pub enum Resolution {
    /// Disabled by override or superseded by an active attestation.
    Decided(Evaluation),
    /// Run the check, with the override (if any) supplying parameters.
    Evaluate(Option<RuleOverride>),
}

/// `false` when a ruleset override disables the ruleset for this scope.
pub async fn ruleset_enabled(
    store: &dyn RuleStore,
    ruleset_key: &str,
    scope: &ScopeKey,
) -> Result<bool, PostureError> {
    Ok(store
        .get_ruleset_override(ruleset_key, scope)
        .await?
        .is_none_or(|o| o.enabled))
}

pub async fn resolve_rule(
    store: &dyn RuleStore,
    rule: &Rule,
    scope: &ScopeKey,
    now: DateTime<Utc>,
) -> Result<Resolution, PostureError> {
    let override_ = store
        .get_rule_override(&rule.ruleset_key, &rule.key, scope)
        .await?;

    if let Some(o) = override_.as_ref().filter(|o| !o.enabled) {
        debug!(rule = %rule.key, scope = %scope, "rule disabled by override");
        return Ok(Resolution::Decided(not_applicable(rule, o)));
    }

    let attestation = store
        .get_rule_attestation(&rule.ruleset_key, &rule.key, scope)
        .await?;

    if let Some(att) = attestation.filter(|a| a.is_active(now)) {
        debug!(rule = %rule.key, scope = %scope, status = %att.status, "rule attested");
        return Ok(Resolution::Decided(attested(rule, override_.as_ref(), &att)));
    }

    Ok(Resolution::Evaluate(override_))
}

/// Parameters for evidence on a short-circuited rule. Never fails: a definition or
/// override that does not parse contributes nothing here.
fn best_effort_params(rule: &Rule, override_: Option<&RuleOverride>) -> Params {
    let defaults = rule
        .parse_definition()
        .map(|def| def.parameters.defaults)
        .unwrap_or_default();
    let overlay = override_params(override_.and_then(|o| o.params.as_ref())).unwrap_or_default();
    deep_merge(&defaults, &overlay)
}

fn short_circuit_context<'a>(
    rule: &'a Rule,
    params: &'a Params,
    resources: &'a AffectedResources,
) -> CheckContext<'a> {
    CheckContext {
        ruleset_key: &rule.ruleset_key,
        rule_key: &rule.key,
        params,
        resources,
    }
}

pub fn not_applicable(rule: &Rule, override_: &RuleOverride) -> Evaluation {
    let params = best_effort_params(rule, Some(override_));
    let resources = AffectedResources::default();
    let ctx = short_circuit_context(rule, &params, &resources);

    let mut evidence = ctx.evidence(
        CheckEvidence {
            check_type: rule.declared_check_type(),
            ..Default::default()
        },
        EvaluationStatus::NotApplicable,
    );
    evidence.override_ = Some(OverrideEvidence { enabled: false });

    conclude(
        evidence,
        Verdict::status(
            EvaluationStatus::NotApplicable,
            reason::OVERRIDE_DISABLED,
            "Rule disabled by override for this scope".to_string(),
        ),
        Vec::new(),
    )
}

pub fn attested(
    rule: &Rule,
    override_: Option<&RuleOverride>,
    attestation: &RuleAttestation,
) -> Evaluation {
    let params = best_effort_params(rule, override_);
    let resources = AffectedResources::default();
    let ctx = short_circuit_context(rule, &params, &resources);
    let status = EvaluationStatus::from_label(&attestation.status);

    let mut evidence = ctx.evidence(
        CheckEvidence {
            check_type: rule.declared_check_type(),
            ..Default::default()
        },
        status.clone(),
    );
    evidence.attestation = Some(AttestationEvidence {
        status: status.as_str().to_string(),
        notes: attestation.notes.clone(),
        expires_at: attestation
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    });
    if override_.is_some() {
        evidence.override_ = Some(OverrideEvidence { enabled: true });
    }

    let summary = if attestation.notes.is_empty() {
        format!("Attested as {}", status)
    } else {
        format!("Attested as {}: {}", status, attestation.notes)
    };

    conclude(
        evidence,
        Verdict::status(status, reason::ATTESTED, summary),
        Vec::new(),
    )
}
