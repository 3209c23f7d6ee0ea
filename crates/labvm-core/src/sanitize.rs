//! Allow-list validation for configuration strings.
//!
//! Several drivers splice configuration values into command lines that are
//! handed to a shell (locally or over ssh). Every free-form field that can
//! reach such a command passes through [`sanitize`] at construction time.

use crate::error::{Result, VmError};
use serde_yaml::Value;

/// Punctuation accepted in addition to word characters and whitespace.
const ALLOWED_PUNCTUATION: &[char] = &[
    '!', '*', '[', ']', '{', '}', '/', '\\', '.', '-', '"', '(', ')',
];

/// Check whether a single character is on the allow-list.
pub fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '_'
        || c.is_ascii_whitespace()
        || c == '\u{0b}'
        || ALLOWED_PUNCTUATION.contains(&c)
}

/// Validate a string against the allow-list.
///
/// Every character of every line is checked.
///
/// # Errors
/// Returns [`VmError::InvalidCharacter`] naming `field` if any character is
/// not allowed.
pub fn check(field: &str, value: &str) -> Result<()> {
    if let Some(bad) = value.chars().find(|c| !is_allowed(*c)) {
        tracing::warn!(field, character = %bad.escape_default(), "Rejected configuration value");
        return Err(VmError::InvalidCharacter {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Sanitize a configuration value.
///
/// - absent or null: `Some("")`
/// - string: checked against the allow-list and returned unchanged
/// - number or boolean: rendered to text (cannot carry metacharacters)
/// - sequence, mapping or tagged value: `None`, structured fields bypass
///   sanitization
///
/// # Errors
/// Returns [`VmError::InvalidCharacter`] if a string value contains a
/// disallowed character.
pub fn sanitize(field: &str, value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(Some(String::new())),
        Some(Value::String(s)) => {
            check(field, s)?;
            Ok(Some(s.clone()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => {
            tracing::debug!(field, "Structured value bypasses sanitization");
            Ok(None)
        }
    }
}

/// Sanitize a field, treating empty and structured values alike as unset.
pub fn sanitize_opt(field: &str, value: Option<&Value>) -> Result<Option<String>> {
    Ok(sanitize(field, value)?.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_absent_is_empty() {
        assert_eq!(sanitize("location", None).unwrap(), Some(String::new()));
        assert_eq!(
            sanitize("location", Some(&Value::Null)).unwrap(),
            Some(String::new())
        );
    }

    #[test]
    fn test_structured_is_none() {
        let seq = Value::Sequence(vec![s("a")]);
        assert_eq!(sanitize("type", Some(&seq)).unwrap(), None);

        let map = Value::Mapping(serde_yaml::Mapping::new());
        assert_eq!(sanitize("type", Some(&map)).unwrap(), None);
    }

    #[test]
    fn test_scalars_rendered() {
        assert_eq!(
            sanitize("port", Some(&Value::from(22))).unwrap(),
            Some("22".to_string())
        );
        assert_eq!(
            sanitize("tools", Some(&Value::Bool(true))).unwrap(),
            Some("true".to_string())
        );
    }

    #[test]
    fn test_allow_list_accepted_unchanged() {
        let value = r#"\\nas\vms\lab (copy) [1] {x} !*./-"quoted" tab	_end"#;
        assert_eq!(
            sanitize("location", Some(&s(value))).unwrap(),
            Some(value.to_string())
        );
    }

    #[test]
    fn test_metacharacters_rejected() {
        for bad in [";", "|", "&", "`", "$", "<", ">", "'", "#", "%", "~", "?", ":", "=", "@", ","] {
            let value = format!("vm{bad}1");
            let err = sanitize("id", Some(&s(&value))).unwrap_err();
            match err {
                VmError::InvalidCharacter { field, value: v } => {
                    assert_eq!(field, "id");
                    assert_eq!(v, value);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_every_line_checked() {
        let value = s("fine\nrm -rf /; echo");
        assert!(sanitize("location", Some(&value)).is_err());
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert!(check("location", "caf\u{e9}").is_err());
    }

    #[test]
    fn test_sanitize_opt_drops_empty() {
        assert_eq!(sanitize_opt("user", None).unwrap(), None);
        assert_eq!(sanitize_opt("user", Some(&s(""))).unwrap(), None);
        assert_eq!(
            sanitize_opt("user", Some(&s("root"))).unwrap(),
            Some("root".to_string())
        );
    }
}
