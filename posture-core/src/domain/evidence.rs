// posture-core/src/domain/evidence.rs
//
// The evidence envelope persisted as `evidence_json`. Field names and nesting are a
// contract with downstream audit consumers: additive changes only.

use crate::domain::evaluation::{ErrorKind, EvaluationStatus};
use crate::domain::params::Params;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// Emitted whenever the envelope itself cannot be marshaled.
pub const FALLBACK_EVIDENCE: &str =
    r#"{"schema_version":1,"result":{"status":"error","error_kind":"engine_error"}}"#;

/// Violations kept per evaluation; the rest are counted through `violations_truncated`.
pub const MAX_VIOLATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub schema_version: u32,
    pub rule: RuleEvidence,
    pub check: CheckEvidence,
    pub params: Params,
    pub result: ResultEvidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Violation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations_truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationEvidence>,
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_: Option<OverrideEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvidence {
    pub ruleset_key: String,
    pub rule_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CheckEvidence {
    #[serde(rename = "type")]
    pub check_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<JoinSideEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<JoinSideEvidence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSideEvidence {
    pub dataset: String,
    pub dataset_version: u32,
    pub key_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEvidence {
    pub status: EvaluationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_value: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<serde_json::Number>,
}

impl ResultEvidence {
    pub fn new(status: EvaluationStatus) -> Self {
        Self {
            status,
            error_kind: None,
            reason_code: None,
            selected_count: None,
            passed_count: None,
            count_value: None,
            target_value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEvidence {
    pub selected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<u64>,
}

/// Ordering is `(resource_id, display)`, the order violations are reported in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Violation {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEvidence {
    pub on_unmatched_left: String,
    pub unmatched_left: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationEvidence {
    pub status: String,
    pub notes: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEvidence {
    pub enabled: bool,
}

impl Evidence {
    pub fn new(
        ruleset_key: &str,
        rule_key: &str,
        check: CheckEvidence,
        params: Params,
        status: EvaluationStatus,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            rule: RuleEvidence {
                ruleset_key: ruleset_key.to_string(),
                rule_key: rule_key.to_string(),
            },
            check,
            params,
            result: ResultEvidence::new(status),
            selection: None,
            violations: None,
            violations_truncated: None,
            join: None,
            attestation: None,
            override_: None,
            error: None,
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "evidence envelope could not be marshaled");
            FALLBACK_EVIDENCE.to_string()
        })
    }
}

/// Sorts violations and keeps the first `MAX_VIOLATIONS`. Returns whether any were dropped.
pub fn sort_and_truncate(violations: &mut Vec<Violation>) -> bool {
    violations.sort();
    let truncated = violations.len() > MAX_VIOLATIONS;
    violations.truncate(MAX_VIOLATIONS);
    truncated
}

/// Ids of the retained violations, skipping empty ids.
pub fn affected_ids(violations: &[Violation]) -> Vec<String> {
    violations
        .iter()
        .filter(|v| !v.resource_id.is_empty())
        .map(|v| v.resource_id.clone())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn sample() -> Evidence {
        let mut params = Params::new();
        params.insert("min_length".into(), json!(12));
        let mut ev = Evidence::new(
            "okta-baseline",
            "password-min-length",
            CheckEvidence {
                check_type: "field_compare".into(),
                dataset: Some("okta:policies/password".into()),
                dataset_version: Some(1),
                ..Default::default()
            },
            params,
            EvaluationStatus::Fail,
        );
        ev.result.selected_count = Some(2);
        ev.result.passed_count = Some(1);
        ev.selection = Some(SelectionEvidence {
            selected: 2,
            total: Some(3),
            passed: Some(1),
        });
        ev.violations = Some(vec![Violation {
            resource_id: "pol-2".into(),
            display: Some("Contractors".into()),
        }]);
        ev.violations_truncated = Some(false);
        ev
    }

    fn join_sample() -> Evidence {
        let side = |dataset: &str, key_path: &str| JoinSideEvidence {
            dataset: dataset.into(),
            dataset_version: 2,
            key_path: key_path.into(),
        };
        let mut params = Params::new();
        params.insert("max_ratio".into(), json!(0.25));
        let mut ev = Evidence::new(
            "github-baseline",
            "members-have-idp-account",
            CheckEvidence {
                check_type: "join_count_compare".into(),
                left: Some(side("github:members", "/login")),
                right: Some(side("okta:users", "/profile/githubLogin")),
                ..Default::default()
            },
            params,
            EvaluationStatus::Other("Exception".into()),
        );
        ev.result.error_kind = Some(ErrorKind::JoinUnmatched);
        ev.result.reason_code = Some("join_unmatched".into());
        ev.result.count_value = Some(3);
        ev.result.target_value = serde_json::Number::from_f64(0.25);
        ev.join = Some(JoinEvidence {
            on_unmatched_left: "error".into(),
            unmatched_left: 3,
        });
        ev.attestation = Some(AttestationEvidence {
            status: "Exception".into(),
            notes: "contractors pending SSO".into(),
            expires_at: "2026-12-31T00:00:00+00:00".into(),
        });
        ev.override_ = Some(OverrideEvidence { enabled: true });
        ev.error = Some("3 left rows have no match".into());
        ev
    }

    #[test]
    fn test_envelope_round_trip_is_structurally_identical() {
        for ev in [sample(), join_sample()] {
            let json = ev.to_json_string();
            let back: Evidence = serde_json::from_str(&json).unwrap();
            assert_eq!(back, ev);

            let reparsed: Value = serde_json::from_str(&back.to_json_string()).unwrap();
            let original: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(reparsed, original);
        }
    }

    #[test]
    fn test_join_sections_survive_round_trip() {
        let value: Value = serde_json::from_str(&join_sample().to_json_string()).unwrap();
        assert_eq!(value["result"]["target_value"], json!(0.25));
        assert_eq!(value["result"]["status"], "Exception");
        assert_eq!(value["check"]["right"]["key_path"], "/profile/githubLogin");
        assert_eq!(value["join"]["unmatched_left"], 3);
        assert_eq!(value["override"], json!({"enabled": true}));
        assert_eq!(value["attestation"]["notes"], "contractors pending SSO");
        assert!(value["error"].is_string());
    }

    #[test]
    fn test_envelope_shape() {
        let value: Value = serde_json::from_str(&sample().to_json_string()).unwrap();
        insta::assert_snapshot!(serde_json::to_string_pretty(&value).unwrap(), @r#"
        {
          "check": {
            "dataset": "okta:policies/password",
            "dataset_version": 1,
            "type": "field_compare"
          },
          "params": {
            "min_length": 12
          },
          "result": {
            "passed_count": 1,
            "selected_count": 2,
            "status": "fail"
          },
          "rule": {
            "rule_key": "password-min-length",
            "ruleset_key": "okta-baseline"
          },
          "schema_version": 1,
          "selection": {
            "passed": 1,
            "selected": 2,
            "total": 3
          },
          "violations": [
            {
              "display": "Contractors",
              "resource_id": "pol-2"
            }
          ],
          "violations_truncated": false
        }
        "#);
    }

    #[test]
    fn test_optional_sections_are_omitted() {
        let ev = Evidence::new(
            "rs",
            "r",
            CheckEvidence {
                check_type: "manual.attestation".into(),
                ..Default::default()
            },
            Params::new(),
            EvaluationStatus::Unknown,
        );
        let value: Value = serde_json::from_str(&ev.to_json_string()).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("violations"));
        assert!(!obj.contains_key("override"));
        assert_eq!(value["result"], json!({"status": "unknown"}));
    }

    #[test]
    fn test_fallback_is_valid_json() {
        let value: Value = serde_json::from_str(FALLBACK_EVIDENCE).unwrap();
        assert_eq!(value["result"]["error_kind"], "engine_error");
    }

    #[test]
    fn test_truncation_keeps_first_hundred_sorted() {
        let mut violations: Vec<Violation> = (0..150)
            .rev()
            .map(|i| Violation {
                resource_id: format!("user-{:03}", i),
                display: None,
            })
            .collect();
        assert!(sort_and_truncate(&mut violations));
        assert_eq!(violations.len(), MAX_VIOLATIONS);
        assert_eq!(violations[0].resource_id, "user-000");
        assert_eq!(violations[99].resource_id, "user-099");
    }

    #[test]
    fn test_affected_ids_skip_empty() {
        let violations = vec![
            Violation {
                resource_id: String::new(),
                display: Some("ghost".into()),
            },
            Violation {
                resource_id: "u1".into(),
                display: None,
            },
        ];
        assert_eq!(affected_ids(&violations), vec!["u1".to_string()]);
    }
}
