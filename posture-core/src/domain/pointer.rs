// posture-core/src/domain/pointer.rs

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointerError {
    #[error("JSON pointer '{0}' must be empty or start with '/'")]
    MissingLeadingSlash(String),
    #[error("JSON pointer '{pointer}' has an invalid escape sequence in token '{token}'")]
    InvalidEscape { pointer: String, token: String },
}

/// Splits a pointer into unescaped reference tokens.
/// The whole pointer is parsed before any traversal, so a malformed escape is
/// reported even when an earlier token would not resolve.
pub fn parse(pointer: &str) -> Result<Vec<String>, PointerError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PointerError::MissingLeadingSlash(pointer.to_string()));
    };

    rest.split('/')
        .map(|raw| {
            unescape(raw).ok_or_else(|| PointerError::InvalidEscape {
                pointer: pointer.to_string(),
                token: raw.to_string(),
            })
        })
        .collect()
}

fn unescape(raw: &str) -> Option<String> {
    if !raw.contains('~') {
        return Some(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

/// Resolves `pointer` against `document`.
///
/// `Ok(None)` means the path is absent (a normal outcome for `exists`/`absent`),
/// `Err` is reserved for malformed pointers.
pub fn resolve<'a>(document: &'a Value, pointer: &str) -> Result<Option<&'a Value>, PointerError> {
    let tokens = parse(pointer)?;
    let mut current = document;

    for token in &tokens {
        let next = match current {
            Value::Object(map) => map.get(token.as_str()),
            Value::Array(items) => array_index(token).and_then(|idx| items.get(idx)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

// "-" (append marker), signs and leading zeros never address an element.
fn array_index(token: &str) -> Option<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

/// Renders a resolved value as the string form used for resource ids and join keys.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "id": "u1",
            "profile": { "login": "ada@example.com", "a/b": 1, "m~n": 2 },
            "groups": ["admins", "eng"],
            "factors": [{ "type": "totp" }]
        })
    }

    #[test]
    fn test_empty_pointer_is_whole_document() {
        let d = doc();
        assert_eq!(resolve(&d, "").unwrap(), Some(&d));
    }

    #[test]
    fn test_nested_fields_and_indices() {
        let d = doc();
        assert_eq!(resolve(&d, "/profile/login").unwrap(), Some(&json!("ada@example.com")));
        assert_eq!(resolve(&d, "/groups/1").unwrap(), Some(&json!("eng")));
        assert_eq!(resolve(&d, "/factors/0/type").unwrap(), Some(&json!("totp")));
    }

    #[test]
    fn test_escaped_tokens() {
        let d = doc();
        assert_eq!(resolve(&d, "/profile/a~1b").unwrap(), Some(&json!(1)));
        assert_eq!(resolve(&d, "/profile/m~0n").unwrap(), Some(&json!(2)));
    }

    #[test]
    fn test_absent_paths_are_not_errors() {
        let d = doc();
        assert_eq!(resolve(&d, "/missing").unwrap(), None);
        assert_eq!(resolve(&d, "/id/deeper").unwrap(), None);
        assert_eq!(resolve(&d, "/groups/7").unwrap(), None);
        assert_eq!(resolve(&d, "/groups/-").unwrap(), None);
        assert_eq!(resolve(&d, "/groups/name").unwrap(), None);
        assert_eq!(resolve(&d, "/groups/01").unwrap(), None);
        assert_eq!(resolve(&d, "/groups/-1").unwrap(), None);
    }

    #[test]
    fn test_malformed_pointers_are_errors() {
        let d = doc();
        assert!(matches!(
            resolve(&d, "id"),
            Err(PointerError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            resolve(&d, "/profile/bad~2"),
            Err(PointerError::InvalidEscape { .. })
        ));
        // reported even though the first token is absent
        assert!(resolve(&d, "/nope/trailing~").is_err());
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("x")), "x");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&Value::Null), "");
        assert_eq!(stringify(&json!(["a"])), r#"["a"]"#);
    }
}
