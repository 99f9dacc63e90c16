// posture-core/src/infrastructure/catalog.rs

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::domain::dataset::ScopeKind;
use crate::domain::error::DomainError;
use crate::domain::params::validate_params;
use crate::domain::rule::{Rule, RuleAttestation, RuleOverride, Ruleset, RulesetOverride, RulesetStatus};
use crate::error::PostureError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::store::CatalogSink;

fn re_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9._-]*$").unwrap_or_else(|_| {
            // Hardcoded pattern; the fallback never matches anything.
            Regex::new("$^").unwrap_or_else(|_| unreachable!())
        })
    })
}

// --- FORMAT YAML ---

#[derive(Debug, Deserialize, Default)]
struct CatalogFile {
    #[serde(default)]
    rulesets: Vec<RulesetEntry>,
    #[serde(default)]
    ruleset_overrides: Vec<RulesetOverride>,
    #[serde(default)]
    rule_overrides: Vec<RuleOverride>,
    #[serde(default)]
    attestations: Vec<RuleAttestation>,
}

#[derive(Debug, Deserialize)]
struct RulesetEntry {
    key: String,
    #[serde(default)]
    name: String,
    scope_kind: ScopeKind,
    #[serde(default)]
    connector_kind: Option<String>,
    #[serde(default)]
    status: RulesetStatus,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    key: String,
    #[serde(default = "default_active")]
    active: bool,
    definition: Value,
}

fn default_active() -> bool {
    true
}

/// Everything a catalog directory declares, validated for keys and references.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    pub rulesets: Vec<Ruleset>,
    pub rules: Vec<Rule>,
    pub ruleset_overrides: Vec<RulesetOverride>,
    pub rule_overrides: Vec<RuleOverride>,
    pub attestations: Vec<RuleAttestation>,
}

/// A rule whose definition would not evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionIssue {
    pub ruleset_key: String,
    pub rule_key: String,
    pub message: String,
}

impl Catalog {
    /// Replaces the catalog held by a store. Returns the number of rules written.
    ///
    /// Entries removed from the YAML since the last seed are gone afterwards.
    pub fn seed(&self, sink: &dyn CatalogSink) -> Result<usize, PostureError> {
        sink.clear_catalog()?;
        for ruleset in &self.rulesets {
            sink.put_ruleset(ruleset.clone())?;
        }
        for rule in &self.rules {
            sink.put_rule(rule.clone())?;
        }
        for o in &self.ruleset_overrides {
            sink.put_ruleset_override(o.clone())?;
        }
        for o in &self.rule_overrides {
            sink.put_rule_override(o.clone())?;
        }
        for a in &self.attestations {
            sink.put_attestation(a.clone())?;
        }
        info!(
            rulesets = self.rulesets.len(),
            rules = self.rules.len(),
            "catalog seeded"
        );
        Ok(self.rules.len())
    }

    /// Parses every definition and checks its defaults against its parameter schema.
    pub fn definition_issues(&self) -> Vec<DefinitionIssue> {
        let mut issues = Vec::new();
        for rule in &self.rules {
            let issue = |message: String| DefinitionIssue {
                ruleset_key: rule.ruleset_key.clone(),
                rule_key: rule.key.clone(),
                message,
            };
            match rule.parse_definition() {
                Err(e) => issues.push(issue(e.to_string())),
                Ok(def) => {
                    if let Some(schema) = &def.parameters.schema
                        && let Err(violations) = validate_params(&def.parameters.defaults, schema)
                    {
                        let joined: Vec<String> =
                            violations.iter().map(ToString::to_string).collect();
                        issues.push(issue(format!("default parameters: {}", joined.join("; "))));
                    }
                }
            }
        }
        issues
    }
}

pub struct CatalogLoader;

impl CatalogLoader {
    /// Loads every `*.yaml` / `*.yml` file under the given directories, in path order.
    /// A directory that does not exist is skipped with a warning.
    #[instrument(skip_all, fields(dirs = dirs.len()))]
    pub fn load(dirs: &[PathBuf]) -> Result<Catalog, PostureError> {
        let mut catalog = Catalog::default();

        for dir in dirs {
            if !dir.exists() {
                warn!(path = ?dir, "catalog path not found, skipping");
                continue;
            }
            for path in Self::catalog_files(dir) {
                debug!(path = ?path, "loading catalog file");
                Self::merge(&mut catalog, Self::read_file(&path)?);
            }
        }

        Self::check(&catalog)?;
        info!(
            rulesets = catalog.rulesets.len(),
            rules = catalog.rules.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    fn catalog_files(dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.is_file()
                    && p
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect()
    }

    fn read_file(path: &Path) -> Result<CatalogFile, InfrastructureError> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(CatalogFile::default());
        }
        serde_yaml::from_str(&content).map_err(|source| InfrastructureError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }

    fn merge(catalog: &mut Catalog, file: CatalogFile) {
        for entry in file.rulesets {
            for rule in entry.rules {
                catalog.rules.push(Rule {
                    ruleset_key: entry.key.clone(),
                    key: rule.key,
                    active: rule.active,
                    definition: rule.definition,
                });
            }
            catalog.rulesets.push(Ruleset {
                key: entry.key,
                name: entry.name,
                scope_kind: entry.scope_kind,
                connector_kind: entry.connector_kind,
                status: entry.status,
            });
        }
        catalog.ruleset_overrides.extend(file.ruleset_overrides);
        catalog.rule_overrides.extend(file.rule_overrides);
        catalog.attestations.extend(file.attestations);
    }

    fn check(catalog: &Catalog) -> Result<(), DomainError> {
        let mut rulesets = HashSet::new();
        for rs in &catalog.rulesets {
            check_key(&rs.key)?;
            if !rulesets.insert(rs.key.as_str()) {
                return Err(DomainError::Duplicate {
                    kind: "ruleset",
                    key: rs.key.clone(),
                });
            }
        }

        let mut rules = HashSet::new();
        for rule in &catalog.rules {
            check_key(&rule.key)?;
            if !rules.insert((rule.ruleset_key.as_str(), rule.key.as_str())) {
                return Err(DomainError::Duplicate {
                    kind: "rule",
                    key: format!("{}/{}", rule.ruleset_key, rule.key),
                });
            }
        }

        let known = |ruleset_key: &str, rule: &str| {
            if rulesets.contains(ruleset_key) {
                Ok(())
            } else {
                Err(DomainError::UnknownRuleset {
                    rule: rule.to_string(),
                    ruleset: ruleset_key.to_string(),
                })
            }
        };
        for o in &catalog.ruleset_overrides {
            known(&o.ruleset_key, "*")?;
        }
        for o in &catalog.rule_overrides {
            known(&o.ruleset_key, &o.rule_key)?;
        }
        for a in &catalog.attestations {
            known(&a.ruleset_key, &a.rule_key)?;
        }
        Ok(())
    }
}

fn check_key(key: &str) -> Result<(), DomainError> {
    if re_key().is_match(key) {
        Ok(())
    } else {
        Err(DomainError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dataset::EvalContext;
    use crate::infrastructure::adapters::memory::MemoryStore;
    use crate::ports::store::RuleStore;
    use anyhow::Result;
    use tempfile::tempdir;

    const BASELINE: &str = r#"
rulesets:
  - key: okta-baseline
    name: Okta baseline
    scope_kind: connector_instance
    connector_kind: okta
    rules:
      - key: mfa-required
        definition:
          parameters:
            defaults: { min_factors: 2 }
            schema:
              min_factors: { type: integer, minimum: 1 }
          check:
            type: field_compare
            dataset: okta:users
            assert: { path: /mfa/factor_count, op: gte, value_param: min_factors }
      - key: broken
        definition:
          check: { type: not_a_check }
rule_overrides:
  - ruleset_key: okta-baseline
    rule_key: mfa-required
    scope_kind: connector_instance
    source_kind: okta
    source_name: prod
    params: { min_factors: 3 }
"#;

    #[tokio::test]
    async fn test_load_and_seed() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("okta"))?;
        fs::write(dir.path().join("okta/baseline.yaml"), BASELINE)?;
        fs::write(dir.path().join("README.md"), "ignored")?;

        let catalog = CatalogLoader::load(&[dir.path().to_path_buf()])?;
        assert_eq!(catalog.rulesets.len(), 1);
        assert_eq!(catalog.rules.len(), 2);
        assert_eq!(catalog.rules[0].ruleset_key, "okta-baseline");

        let store = MemoryStore::new();
        assert_eq!(catalog.seed(&store)?, 2);
        let scope = EvalContext::connector("okta", "prod").scope_key();
        let o = store
            .get_rule_override("okta-baseline", "mfa-required", &scope)
            .await?
            .unwrap();
        assert!(o.enabled);
        assert_eq!(o.params.unwrap()["min_factors"], 3);
        Ok(())
    }

    #[test]
    fn test_definition_issues_flags_broken_rules() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("baseline.yml"), BASELINE)?;
        let catalog = CatalogLoader::load(&[dir.path().to_path_buf()])?;

        let issues = catalog.definition_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_key, "broken");
        Ok(())
    }

    #[test]
    fn test_duplicate_rule_rejected() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.yaml"), BASELINE)?;
        fs::write(dir.path().join("b.yaml"), BASELINE)?;
        let err = CatalogLoader::load(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(
            err,
            PostureError::Domain(DomainError::Duplicate { kind: "ruleset", .. })
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_key_and_orphans() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("bad.yaml"),
            "rulesets:\n  - key: Bad Key\n    scope_kind: global\n",
        )?;
        let err = CatalogLoader::load(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, PostureError::Domain(DomainError::InvalidKey(_))));

        fs::write(
            dir.path().join("bad.yaml"),
            "attestations:\n  - ruleset_key: ghost\n    rule_key: r\n    scope_kind: global\n    status: pass\n",
        )?;
        let err = CatalogLoader::load(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(
            err,
            PostureError::Domain(DomainError::UnknownRuleset { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_yaml_error_names_the_file() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.yaml"), "rulesets: [unclosed\n")?;
        let err = CatalogLoader::load(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
        Ok(())
    }

    #[test]
    fn test_missing_directory_is_skipped() -> Result<()> {
        let dir = tempdir()?;
        let catalog = CatalogLoader::load(&[dir.path().join("nope")])?;
        assert!(catalog.rules.is_empty());
        Ok(())
    }
}
