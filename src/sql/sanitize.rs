//! SQL Identifier Validation
//!
//! Values always travel as bound parameters. Identifiers cannot, so every table,
//! column and condition key is checked here before it is spliced into SQL text.

use std::sync::OnceLock;

use regex::Regex;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

fn key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("static regex")
    })
}

/// Validate a table or column name
///
/// Rules:
/// - Must start with a letter or underscore
/// - Can only contain ASCII letters, digits and underscores
///
/// # Example
/// ```
/// use relstore::sql::validate_identifier;
///
/// assert!(validate_identifier("wallet").is_ok());
/// assert!(validate_identifier("appID").is_ok());
/// assert!(validate_identifier("wallet; DROP TABLE x").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }
    if !identifier_re().is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a letter or underscore and contain only letters, digits, and underscores.",
            name
        ));
    }
    Ok(())
}

/// Validate a condition key: a column, optionally qualified by a table alias (`a.id`).
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("Condition key cannot be empty".to_string());
    }
    if !key_re().is_match(key) {
        return Err(format!(
            "Condition key '{}' is invalid. Expected `column` or `alias.column`.",
            key
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_valid() {
        assert!(validate_identifier("wallet").is_ok());
        assert!(validate_identifier("app_id").is_ok());
        assert!(validate_identifier("appID").is_ok());
        assert!(validate_identifier("_hidden").is_ok());
        assert!(validate_identifier("t1").is_ok());
    }

    #[test]
    fn test_validate_identifier_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_identifier_invalid() {
        assert!(validate_identifier("1wallet").is_err());
        assert!(validate_identifier("my-table").is_err());
        assert!(validate_identifier("my table").is_err());
        assert!(validate_identifier("a.b").is_err());
        assert!(validate_identifier("x`; DROP").is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("id").is_ok());
        assert!(validate_key("a.id").is_ok());
        assert!(validate_key("a.b.c").is_err());
        assert!(validate_key("count(id)").is_err());
        assert!(validate_key(".id").is_err());
        assert!(validate_key("").is_err());
    }
}
