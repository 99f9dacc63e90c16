// posture-core/src/application/mod.rs

pub mod evaluator;
pub mod registry;
pub mod resolver;
pub mod runner;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Cela permet au CLI de faire :
// `use posture_core::application::{EvaluationRunner, ProviderRegistry};`

pub use evaluator::evaluate_rule;
pub use registry::ProviderRegistry;
pub use runner::{EvaluationRunner, RunReport};
