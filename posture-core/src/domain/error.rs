// posture-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Rule definition '{rule}' is invalid: {reason}")]
    #[diagnostic(
        code(posture::domain::definition),
        help("Check the rule's `check.type` and the fields required by that check shape.")
    )]
    InvalidDefinition { rule: String, reason: String },

    #[error("Invalid key '{0}'")]
    #[diagnostic(
        code(posture::domain::key),
        help("Keys are lowercase letters, digits, '.', '_' and '-', starting with a letter or digit.")
    )]
    InvalidKey(String),

    #[error("Duplicate {kind} '{key}' in catalog")]
    #[diagnostic(code(posture::domain::duplicate))]
    Duplicate { kind: &'static str, key: String },

    #[error("Rule '{rule}' references unknown ruleset '{ruleset}'")]
    #[diagnostic(code(posture::domain::orphan_rule))]
    UnknownRuleset { rule: String, ruleset: String },
}
