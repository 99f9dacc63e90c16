pub mod checks;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod evidence;
pub mod params;
pub mod pointer;
pub mod predicate;
pub mod rule;

// Re-exports pratiques pour simplifier les imports ailleurs
pub use dataset::{DatasetError, DatasetErrorKind, DatasetRef, DatasetResult, EvalContext, ScopeKey, ScopeKind};
pub use error::DomainError;
pub use evaluation::{ErrorKind, Evaluation, EvaluationRecord, EvaluationStatus};
pub use rule::{Rule, RuleAttestation, RuleOverride, Ruleset, RulesetOverride};
