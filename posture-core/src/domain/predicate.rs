// posture-core/src/domain/predicate.rs

use crate::domain::params::Params;
use crate::domain::pointer::{self, PointerError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
    Exists,
    Absent,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::Contains => "contains",
            Self::Exists => "exists",
            Self::Absent => "absent",
        }
    }

    /// Operators usable in a count comparison (`compare.op`).
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Lt | Self::Lte | Self::Gt | Self::Gte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredicateError {
    #[error("parameter '{0}' is referenced but not defined")]
    MissingParam(String),

    #[error(transparent)]
    Pointer(#[from] PointerError),

    #[error("predicate on '{0}' declares both 'value' and 'value_param'")]
    AmbiguousOperand(String),
}

/// A single `path op value` test against one dataset row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub path: String,
    pub op: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_param: Option<String>,
}

impl Predicate {
    pub fn evaluate(&self, row: &Value, params: &Params) -> Result<bool, PredicateError> {
        evaluate_clause(
            Some(row),
            &self.path,
            self.op,
            self.value.as_ref(),
            self.value_param.as_deref(),
            params,
        )
    }
}

/// Evaluates a clause against an optional row. A missing row (the nil side of an
/// unmatched join pairing) is always false.
pub fn evaluate_clause(
    row: Option<&Value>,
    path: &str,
    op: Operator,
    value: Option<&Value>,
    value_param: Option<&str>,
    params: &Params,
) -> Result<bool, PredicateError> {
    let Some(row) = row else {
        return Ok(false);
    };
    let resolved = pointer::resolve(row, path)?;

    match op {
        Operator::Exists => return Ok(resolved.is_some()),
        Operator::Absent => return Ok(resolved.is_none()),
        _ => {}
    }

    // Resolved before the path check so that a dangling parameter reference
    // surfaces on every row, never as a silent false.
    let expected = resolve_operand(value, value_param, params, path)?;

    Ok(match resolved {
        Some(actual) => eval_op(actual, op, expected),
        None => false,
    })
}

/// Returns the comparison operand: the literal `value`, the named parameter, or null.
pub fn resolve_operand<'a>(
    value: Option<&'a Value>,
    value_param: Option<&str>,
    params: &'a Params,
    context: &str,
) -> Result<&'a Value, PredicateError> {
    match (value, value_param) {
        (Some(_), Some(_)) => Err(PredicateError::AmbiguousOperand(context.to_string())),
        (Some(v), None) => Ok(v),
        (None, Some(name)) => params
            .get(name)
            .ok_or_else(|| PredicateError::MissingParam(name.to_string())),
        (None, None) => Ok(&NULL),
    }
}

pub fn eval_op(actual: &Value, op: Operator, expected: &Value) -> bool {
    match op {
        Operator::Eq => values_equal(actual, expected),
        Operator::Neq => !values_equal(actual, expected),
        Operator::Lt => compare(actual, expected) == Some(Ordering::Less),
        Operator::Lte => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::In => match expected {
            Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
        Operator::Contains => match (actual, expected) {
            (Value::Array(items), _) => items.iter().any(|item| values_equal(item, expected)),
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
        Operator::Exists => true,
        Operator::Absent => false,
    }
}

/// Structural equality where numbers compare as floating point at every depth.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering is defined for number/number and string/string pairs only.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
