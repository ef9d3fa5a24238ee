//! SQL hardening for the statements the engines generate.
//!
//! Every table and column name inside generated SQL is quoted by
//! [`SqlSecurity::escape_identifier`]. Names written in configuration must
//! also pass [`SqlSecurity::validate_identifier`]. String literals go through
//! [`SqlSecurity::escape_literal`] and user patterns through
//! [`SqlSecurity::validate_regex_pattern`]. There is no path from
//! configuration to free-form SQL.

use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Name of the hidden row identifier column appended to registered tables.
pub const ROW_ID_COLUMN: &str = "__row_id";

const MAX_IDENTIFIER_LEN: usize = 128;
const MAX_PATTERN_LEN: usize = 1000;

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Quotes a SQL identifier (table name or column name).
    ///
    /// The result is wrapped in double quotes, so case is preserved and names
    /// taken from a dataset schema such as `first name` or `user-id` are
    /// usable. Inner double quotes are doubled. Names written in
    /// configuration are additionally held to [`Self::validate_identifier`].
    ///
    /// # Examples
    /// ```rust
    /// use term_pipeline::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("user_id").unwrap(), "\"user_id\"");
    /// assert_eq!(SqlSecurity::escape_identifier("first name").unwrap(), "\"first name\"");
    /// assert_eq!(
    ///     SqlSecurity::escape_identifier("id\"; DROP TABLE users--").unwrap(),
    ///     "\"id\"\"; DROP TABLE users--\""
    /// );
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        if identifier.trim().is_empty() {
            return Err(PipelineError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(PipelineError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LEN} characters)"
            )));
        }

        if identifier.chars().any(|c| c.is_control()) {
            return Err(PipelineError::SecurityError(format!(
                "SQL identifier cannot contain control characters: {identifier:?}"
            )));
        }

        if identifier == ROW_ID_COLUMN {
            return Err(PipelineError::SecurityError(format!(
                "'{ROW_ID_COLUMN}' is reserved for row identifiers"
            )));
        }

        let escaped = identifier.replace('"', "\"\"");
        Ok(format!("\"{escaped}\""))
    }

    /// Validates a configured SQL identifier without escaping it.
    ///
    /// Configuration names must be plain identifiers: a letter or underscore
    /// followed by letters, digits and underscores.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(PipelineError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(PipelineError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LEN} characters)"
            )));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$")
                .expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(PipelineError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers and underscores"
            )));
        }

        if identifier == ROW_ID_COLUMN {
            return Err(PipelineError::SecurityError(format!(
                "'{ROW_ID_COLUMN}' is reserved for row identifiers"
            )));
        }

        Ok(())
    }

    /// Escapes a value for use inside a single-quoted SQL string literal.
    ///
    /// Returns the full literal including the surrounding quotes.
    pub fn escape_literal(value: &str) -> Result<String> {
        if value.contains('\0') {
            return Err(PipelineError::SecurityError(
                "SQL literal cannot contain null bytes".to_string(),
            ));
        }
        Ok(format!("'{}'", value.replace('\'', "''")))
    }

    /// Validates a regex pattern and returns it escaped for a SQL literal.
    ///
    /// The returned value does not include the surrounding quotes.
    pub fn validate_regex_pattern(pattern: &str) -> Result<String> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(PipelineError::SecurityError(format!(
                "Regex pattern too long (max {MAX_PATTERN_LEN} characters)"
            )));
        }

        if pattern.contains('\0') {
            return Err(PipelineError::SecurityError(
                "Regex pattern cannot contain null bytes".to_string(),
            ));
        }

        if let Err(e) = Regex::new(pattern) {
            return Err(PipelineError::SecurityError(format!(
                "Invalid regex pattern: {e}"
            )));
        }

        Self::check_redos_patterns(pattern)?;

        Ok(pattern.replace('\'', "''"))
    }

    /// Rejects the obvious catastrophic-backtracking shapes.
    fn check_redos_patterns(pattern: &str) -> Result<()> {
        const NESTED_QUANTIFIERS: &[&str] = &["(.*)*", "(.*)+", "(.+)*", "(.+)+"];

        for dangerous in NESTED_QUANTIFIERS {
            if pattern.contains(dangerous) {
                return Err(PipelineError::SecurityError(
                    "Regex pattern might cause ReDoS attack".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sql_identifiers() {
        assert!(SqlSecurity::validate_identifier("user_id").is_ok());
        assert!(SqlSecurity::validate_identifier("table1").is_ok());
        assert!(SqlSecurity::validate_identifier("_private_col").is_ok());
        assert!(SqlSecurity::validate_identifier("created_at").is_ok());
        assert!(SqlSecurity::validate_identifier("UserActions").is_ok());
    }

    #[test]
    fn test_invalid_sql_identifiers() {
        assert!(SqlSecurity::validate_identifier("").is_err());
        assert!(SqlSecurity::validate_identifier("   ").is_err());
        assert!(SqlSecurity::validate_identifier(&"a".repeat(200)).is_err());
        assert!(SqlSecurity::validate_identifier("id; DROP TABLE").is_err());
        assert!(SqlSecurity::validate_identifier("col--comment").is_err());
        assert!(SqlSecurity::validate_identifier("col name").is_err());
        assert!(SqlSecurity::validate_identifier("123col").is_err());
        assert!(SqlSecurity::validate_identifier("schema.table").is_err());
        assert!(SqlSecurity::validate_identifier(ROW_ID_COLUMN).is_err());
    }

    #[test]
    fn test_identifier_escaping_preserves_case() {
        assert_eq!(
            SqlSecurity::escape_identifier("UserActions").unwrap(),
            "\"UserActions\""
        );
        assert_eq!(
            SqlSecurity::escape_identifier("col\"with\"quotes").unwrap(),
            "\"col\"\"with\"\"quotes\""
        );
    }

    #[test]
    fn test_schema_names_are_quoted_not_rejected() {
        assert_eq!(
            SqlSecurity::escape_identifier("first name").unwrap(),
            "\"first name\""
        );
        assert_eq!(SqlSecurity::escape_identifier("user-id").unwrap(), "\"user-id\"");
        assert_eq!(SqlSecurity::escape_identifier("2024 total").unwrap(), "\"2024 total\"");

        assert!(SqlSecurity::escape_identifier("").is_err());
        assert!(SqlSecurity::escape_identifier("  ").is_err());
        assert!(SqlSecurity::escape_identifier("line\nbreak").is_err());
        assert!(SqlSecurity::escape_identifier(ROW_ID_COLUMN).is_err());
        assert!(SqlSecurity::escape_identifier(&"a".repeat(200)).is_err());
    }

    #[test]
    fn test_literal_escaping() {
        assert_eq!(SqlSecurity::escape_literal("active").unwrap(), "'active'");
        assert_eq!(SqlSecurity::escape_literal("o'brien").unwrap(), "'o''brien'");
        assert_eq!(
            SqlSecurity::escape_literal("x' OR '1'='1").unwrap(),
            "'x'' OR ''1''=''1'"
        );
        assert!(SqlSecurity::escape_literal("nul\0byte").is_err());
    }

    #[test]
    fn test_regex_pattern_validation() {
        assert!(SqlSecurity::validate_regex_pattern(r"^[A-Z]\d+$").is_ok());
        assert!(SqlSecurity::validate_regex_pattern(r"[^@]+@[^@]+\.[a-z]+").is_ok());
        assert!(SqlSecurity::validate_regex_pattern(r"[unclosed").is_err());
        assert!(SqlSecurity::validate_regex_pattern(&"a".repeat(2000)).is_err());
        assert!(SqlSecurity::validate_regex_pattern("(.*)*x").is_err());

        let result = SqlSecurity::validate_regex_pattern("it's a pattern").unwrap();
        assert_eq!(result, "it''s a pattern");
    }
}
