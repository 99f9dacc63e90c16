// posture-core/src/lib.rs

#![allow(missing_docs)]
// Memory safety
#![deny(unsafe_code)]
// Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// Performance
#![warn(clippy::perf)]

// --- MODULES HEXAGONAUX ---

// 1. Ports (Interfaces / Traits)
// DatasetProvider, RuleStore
pub mod ports;

// 2. Domain (Cœur du métier)
// Pointer, prédicats, paramètres, les quatre checks, l'enveloppe d'évidence.
// Ne dépend de RIEN d'autre (ni infra, ni app).
pub mod domain;

// 3. Infrastructure (Adapters)
// Providers fichiers, store DuckDB / mémoire, catalogue YAML, config projet.
pub mod infrastructure;

// 4. Application (Use Cases)
// Résolution override/attestation, évaluation d'une règle, boucle de run.
pub mod application;

// --- GESTION DES ERREURS GLOBALE ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::PostureError;
