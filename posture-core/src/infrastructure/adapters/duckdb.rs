// posture-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Config, Connection, params};
use serde_json::Value;
use std::sync::{Arc, Mutex};

// Imports Hexagonaux
use crate::domain::dataset::{ScopeKey, ScopeKind};
use crate::domain::evaluation::{ErrorKind, EvaluationRecord, EvaluationStatus};
use crate::domain::rule::{Rule, RuleAttestation, RuleOverride, Ruleset, RulesetOverride, RulesetStatus};
use crate::error::PostureError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::store::{CatalogSink, RuleStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS rulesets (
    ruleset_key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    scope_kind TEXT NOT NULL,
    connector_kind TEXT,
    status TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS rules (
    ruleset_key TEXT NOT NULL,
    rule_key TEXT NOT NULL,
    active BOOLEAN NOT NULL,
    definition TEXT NOT NULL,
    PRIMARY KEY (ruleset_key, rule_key)
);
CREATE TABLE IF NOT EXISTS ruleset_overrides (
    ruleset_key TEXT NOT NULL,
    scope_kind TEXT NOT NULL,
    source_kind TEXT NOT NULL,
    source_name TEXT NOT NULL,
    enabled BOOLEAN NOT NULL,
    PRIMARY KEY (ruleset_key, scope_kind, source_kind, source_name)
);
CREATE TABLE IF NOT EXISTS rule_overrides (
    ruleset_key TEXT NOT NULL,
    rule_key TEXT NOT NULL,
    scope_kind TEXT NOT NULL,
    source_kind TEXT NOT NULL,
    source_name TEXT NOT NULL,
    enabled BOOLEAN NOT NULL,
    params TEXT,
    PRIMARY KEY (ruleset_key, rule_key, scope_kind, source_kind, source_name)
);
CREATE TABLE IF NOT EXISTS rule_attestations (
    ruleset_key TEXT NOT NULL,
    rule_key TEXT NOT NULL,
    scope_kind TEXT NOT NULL,
    source_kind TEXT NOT NULL,
    source_name TEXT NOT NULL,
    status TEXT NOT NULL,
    notes TEXT NOT NULL,
    expires_at TEXT,
    PRIMARY KEY (ruleset_key, rule_key, scope_kind, source_kind, source_name)
);
CREATE TABLE IF NOT EXISTS evaluations (
    ruleset_key TEXT NOT NULL,
    rule_key TEXT NOT NULL,
    scope_kind TEXT NOT NULL,
    source_kind TEXT NOT NULL,
    source_name TEXT NOT NULL,
    evaluated_at TEXT NOT NULL,
    status TEXT NOT NULL,
    error_kind TEXT,
    evidence_summary TEXT NOT NULL,
    evidence_json TEXT NOT NULL,
    affected_resource_ids TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS current_results (
    ruleset_key TEXT NOT NULL,
    rule_key TEXT NOT NULL,
    scope_kind TEXT NOT NULL,
    source_kind TEXT NOT NULL,
    source_name TEXT NOT NULL,
    evaluated_at TEXT NOT NULL,
    status TEXT NOT NULL,
    error_kind TEXT,
    evidence_summary TEXT NOT NULL,
    evidence_json TEXT NOT NULL,
    affected_resource_ids TEXT NOT NULL,
    PRIMARY KEY (ruleset_key, rule_key, scope_kind, source_kind, source_name)
);
"#;

const CLEAR_CATALOG: &str = r#"
DELETE FROM rulesets;
DELETE FROM rules;
DELETE FROM ruleset_overrides;
DELETE FROM rule_overrides;
DELETE FROM rule_attestations;
"#;

/// Result store backed by a DuckDB file (or `:memory:`).
///
/// Scopes are stored as three columns; a global scope has empty source columns.
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    pub fn new(db_path: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(db_path, config)?
        };
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, duckdb::Error>,
    ) -> Result<T, PostureError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| InfrastructureError::Database(DatabaseError::LockPoisoned))?;
        Ok(f(&conn)?)
    }

    /// Number of rows in the evaluation history.
    pub fn evaluation_count(&self) -> Result<usize, PostureError> {
        let count: i64 = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn write_record(&self, table: &str, verb: &str, record: &EvaluationRecord) -> Result<(), PostureError> {
        let ids = serde_json::to_string(&record.affected_resource_ids)
            .map_err(InfrastructureError::Json)?;
        let sql = format!(
            "{verb} INTO {table} VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                params![
                    record.ruleset_key,
                    record.rule_key,
                    record.scope.scope_kind.as_str(),
                    record.scope.source_kind,
                    record.scope.source_name,
                    record.evaluated_at.to_rfc3339(),
                    record.status.as_str(),
                    record.error_kind.map(|k| k.as_str()),
                    record.evidence_summary,
                    record.evidence_json,
                    ids,
                ],
            )
            .map(|_| ())
        })
    }
}

// --- CONVERSIONS ---

fn scope_kind(raw: &str) -> Result<ScopeKind, PostureError> {
    raw.parse().map_err(PostureError::Store)
}

fn scope(kind: &str, source_kind: String, source_name: String) -> Result<ScopeKey, PostureError> {
    Ok(ScopeKey {
        scope_kind: scope_kind(kind)?,
        source_kind,
        source_name,
    })
}

fn timestamp(raw: &str) -> Result<DateTime<Utc>, PostureError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PostureError::Store(format!("bad timestamp '{}': {}", raw, e)))
}

/// A definition that is not valid JSON is kept as a string so the rule fails at evaluation.
fn definition(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

type RecordRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
);

fn record_from_row(row: RecordRow) -> Result<EvaluationRecord, PostureError> {
    let (ruleset_key, rule_key, kind, source_kind, source_name, at, status, error_kind, summary, evidence, ids) =
        row;
    let error_kind = error_kind
        .map(|k| k.parse::<ErrorKind>())
        .transpose()
        .map_err(PostureError::Store)?;
    Ok(EvaluationRecord {
        ruleset_key,
        rule_key,
        scope: scope(&kind, source_kind, source_name)?,
        evaluated_at: timestamp(&at)?,
        status: EvaluationStatus::from_label(&status),
        error_kind,
        evidence_summary: summary,
        evidence_json: evidence,
        affected_resource_ids: serde_json::from_str(&ids).map_err(InfrastructureError::Json)?,
    })
}

impl CatalogSink for DuckDbStore {
    fn clear_catalog(&self) -> Result<(), PostureError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| InfrastructureError::Database(DatabaseError::LockPoisoned))?;
        let tx = conn.transaction()?;
        tx.execute_batch(CLEAR_CATALOG)?;
        tx.commit()?;
        Ok(())
    }

    fn put_ruleset(&self, ruleset: Ruleset) -> Result<(), PostureError> {
        let status = match ruleset.status {
            RulesetStatus::Active => "active",
            RulesetStatus::Inactive => "inactive",
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO rulesets VALUES (?, ?, ?, ?, ?)",
                params![
                    ruleset.key,
                    ruleset.name,
                    ruleset.scope_kind.as_str(),
                    ruleset.connector_kind,
                    status
                ],
            )
            .map(|_| ())
        })
    }

    fn put_rule(&self, rule: Rule) -> Result<(), PostureError> {
        let definition = rule.definition.to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO rules VALUES (?, ?, ?, ?)",
                params![rule.ruleset_key, rule.key, rule.active, definition],
            )
            .map(|_| ())
        })
    }

    fn put_ruleset_override(&self, o: RulesetOverride) -> Result<(), PostureError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO ruleset_overrides VALUES (?, ?, ?, ?, ?)",
                params![
                    o.ruleset_key,
                    o.scope.scope_kind.as_str(),
                    o.scope.source_kind,
                    o.scope.source_name,
                    o.enabled
                ],
            )
            .map(|_| ())
        })
    }

    fn put_rule_override(&self, o: RuleOverride) -> Result<(), PostureError> {
        let params_json = o.params.as_ref().map(Value::to_string);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO rule_overrides VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    o.ruleset_key,
                    o.rule_key,
                    o.scope.scope_kind.as_str(),
                    o.scope.source_kind,
                    o.scope.source_name,
                    o.enabled,
                    params_json
                ],
            )
            .map(|_| ())
        })
    }

    fn put_attestation(&self, a: RuleAttestation) -> Result<(), PostureError> {
        let expires_at = a.expires_at.map(|t| t.to_rfc3339());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO rule_attestations VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    a.ruleset_key,
                    a.rule_key,
                    a.scope.scope_kind.as_str(),
                    a.scope.source_kind,
                    a.scope.source_name,
                    a.status,
                    a.notes,
                    expires_at
                ],
            )
            .map(|_| ())
        })
    }
}

#[async_trait]
impl RuleStore for DuckDbStore {
    async fn list_rulesets(&self) -> Result<Vec<Ruleset>, PostureError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ruleset_key, name, scope_kind, connector_kind, status \
                 FROM rulesets ORDER BY ruleset_key",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;

        rows.into_iter()
            .map(|(key, name, kind, connector_kind, status)| {
                Ok(Ruleset {
                    key,
                    name,
                    scope_kind: scope_kind(&kind)?,
                    connector_kind,
                    status: if status == "active" {
                        RulesetStatus::Active
                    } else {
                        RulesetStatus::Inactive
                    },
                })
            })
            .collect()
    }

    async fn list_active_rules(&self, ruleset_key: &str) -> Result<Vec<Rule>, PostureError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT rule_key, definition FROM rules \
                 WHERE ruleset_key = ? AND active ORDER BY rule_key",
            )?;
            let rows = stmt.query_map(params![ruleset_key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;

        Ok(rows
            .into_iter()
            .map(|(key, raw)| Rule {
                ruleset_key: ruleset_key.to_string(),
                key,
                active: true,
                definition: definition(raw),
            })
            .collect())
    }

    async fn get_ruleset_override(
        &self,
        ruleset_key: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RulesetOverride>, PostureError> {
        let enabled = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT enabled FROM ruleset_overrides \
                 WHERE ruleset_key = ? AND scope_kind = ? AND source_kind = ? AND source_name = ?",
            )?;
            let mut rows = stmt.query_map(
                params![
                    ruleset_key,
                    scope.scope_kind.as_str(),
                    scope.source_kind,
                    scope.source_name
                ],
                |row| row.get::<_, bool>(0),
            )?;
            rows.next().transpose()
        })?;

        Ok(enabled.map(|enabled| RulesetOverride {
            ruleset_key: ruleset_key.to_string(),
            scope: scope.clone(),
            enabled,
        }))
    }

    async fn get_rule_override(
        &self,
        ruleset_key: &str,
        rule_key: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RuleOverride>, PostureError> {
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT enabled, params FROM rule_overrides \
                 WHERE ruleset_key = ? AND rule_key = ? \
                 AND scope_kind = ? AND source_kind = ? AND source_name = ?",
            )?;
            let mut rows = stmt.query_map(
                params![
                    ruleset_key,
                    rule_key,
                    scope.scope_kind.as_str(),
                    scope.source_kind,
                    scope.source_name
                ],
                |row| Ok((row.get::<_, bool>(0)?, row.get::<_, Option<String>>(1)?)),
            )?;
            rows.next().transpose()
        })?;

        Ok(row.map(|(enabled, params)| RuleOverride {
            ruleset_key: ruleset_key.to_string(),
            rule_key: rule_key.to_string(),
            scope: scope.clone(),
            enabled,
            params: params.map(definition),
        }))
    }

    async fn get_rule_attestation(
        &self,
        ruleset_key: &str,
        rule_key: &str,
        scope: &ScopeKey,
    ) -> Result<Option<RuleAttestation>, PostureError> {
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, notes, expires_at FROM rule_attestations \
                 WHERE ruleset_key = ? AND rule_key = ? \
                 AND scope_kind = ? AND source_kind = ? AND source_name = ?",
            )?;
            let mut rows = stmt.query_map(
                params![
                    ruleset_key,
                    rule_key,
                    scope.scope_kind.as_str(),
                    scope.source_kind,
                    scope.source_name
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )?;
            rows.next().transpose()
        })?;

        row.map(|(status, notes, expires_at)| {
            Ok(RuleAttestation {
                ruleset_key: ruleset_key.to_string(),
                rule_key: rule_key.to_string(),
                scope: scope.clone(),
                status,
                notes,
                expires_at: expires_at.as_deref().map(timestamp).transpose()?,
            })
        })
        .transpose()
    }

    async fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<(), PostureError> {
        self.write_record("evaluations", "INSERT", record)
    }

    async fn upsert_current_result(&self, record: &EvaluationRecord) -> Result<(), PostureError> {
        self.write_record("current_results", "INSERT OR REPLACE", record)
    }

    async fn list_current_results(
        &self,
        scope: &ScopeKey,
    ) -> Result<Vec<EvaluationRecord>, PostureError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM current_results \
                 WHERE scope_kind = ? AND source_kind = ? AND source_name = ? \
                 ORDER BY ruleset_key, rule_key",
            )?;
            let rows = stmt.query_map(
                params![scope.scope_kind.as_str(), scope.source_kind, scope.source_name],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                    ))
                },
            )?;
            rows.collect::<Result<Vec<RecordRow>, _>>()
        })?;

        rows.into_iter().map(record_from_row).collect()
    }
}
