// posture-core/src/domain/params.rs

use crate::domain::predicate::values_equal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Effective parameter set of a rule (defaults merged with an override).
pub type Params = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Boolean,
    Integer,
    Number,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            Self::Number => value.is_number(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Declared constraints for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParamSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<ParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamViolation {
    pub param: String,
    pub message: String,
}

impl fmt::Display for ParamViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.param, self.message)
    }
}

/// Recursive merge: objects merge key by key, everything else (lists included)
/// is replaced by the overlay.
pub fn deep_merge(base: &Params, overlay: &Params) -> Params {
    let mut merged = base.clone();
    for (key, value) in overlay {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) =
            (merged.get_mut(key), value)
        {
            *existing = deep_merge(existing, incoming);
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Interprets the `params` document stored on a rule override.
pub fn override_params(raw: Option<&Value>) -> Result<Params, String> {
    match raw {
        None | Some(Value::Null) => Ok(Params::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(format!(
            "override params must be a JSON object, got {}",
            json_type_name(other)
        )),
    }
}

/// Validates parameters present in both the merged set and the schema.
/// All violations are collected before returning.
pub fn validate_params(
    params: &Params,
    schema: &BTreeMap<String, ParamSchema>,
) -> Result<(), Vec<ParamViolation>> {
    let mut violations = Vec::new();

    for (name, spec) in schema {
        let Some(value) = params.get(name) else {
            continue;
        };
        let mut fail = |message: String| {
            violations.push(ParamViolation {
                param: name.clone(),
                message,
            })
        };

        if let Some(expected) = spec.param_type
            && !expected.matches(value)
        {
            fail(format!(
                "expected {}, got {}",
                expected.as_str(),
                json_type_name(value)
            ));
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = spec.minimum
                && n < min
            {
                fail(format!("{} is below minimum {}", n, min));
            }
            if let Some(max) = spec.maximum
                && n > max
            {
                fail(format!("{} is above maximum {}", n, max));
            }
        }

        if let Some(allowed) = &spec.allowed
            && !allowed.iter().any(|candidate| values_equal(candidate, value))
        {
            fail(format!("{} is not one of the allowed values", value));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
