//! Rule types: constraint predicates, foreign keys and composite keys.
//!
//! Rules are plain data. The predicate language is closed: a rule is one of
//! the [`Predicate`] variants parameterised by bounds, a pattern or a value
//! set, never an expression string.

use crate::config::ValidationConfig;
use crate::error::{PipelineError, Result};
use crate::security::SqlSecurity;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a pattern must match a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    /// The whole value must match
    #[default]
    Full,
    /// The value must start with a match
    Match,
    /// A match may occur anywhere
    Contains,
}

/// A scalar in an `in_set` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

/// Closed set of row predicates.
///
/// Nulls only ever violate [`Predicate::NotNull`]; every other predicate
/// ignores null cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Numeric bounds; either side may be open
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default = "default_inclusive")]
        inclusive: bool,
    },
    /// Regular expression over the value rendered as text
    Pattern {
        pattern: String,
        #[serde(default)]
        mode: PatternMode,
    },
    /// Membership in an enumerated set
    InSet { values: Vec<Literal> },
    /// The value must be present
    NotNull,
    /// Character length bounds for text values
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
}

fn default_inclusive() -> bool {
    true
}

impl Predicate {
    /// Inclusive numeric range.
    pub fn between(min: f64, max: f64) -> Self {
        Predicate::Range {
            min: Some(min),
            max: Some(max),
            inclusive: true,
        }
    }

    /// Exclusive numeric range.
    pub fn strictly_between(min: f64, max: f64) -> Self {
        Predicate::Range {
            min: Some(min),
            max: Some(max),
            inclusive: false,
        }
    }

    /// Full-match pattern.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Predicate::Pattern {
            pattern: pattern.into(),
            mode: PatternMode::Full,
        }
    }

    /// Set membership.
    pub fn in_set<I, L>(values: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        Predicate::InSet {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Predicate::Range { .. } => "range",
            Predicate::Pattern { .. } => "pattern",
            Predicate::InSet { .. } => "in_set",
            Predicate::NotNull => "not_null",
            Predicate::Length { .. } => "length",
        }
    }

    /// Checks the parameters independently of any data.
    pub fn check(&self, rule: &str) -> Result<()> {
        let setup = |message: &str| Err(PipelineError::validation_setup(rule, message));
        match self {
            Predicate::Range { min, max, .. } => {
                if min.is_none() && max.is_none() {
                    return setup("range needs at least one of min or max");
                }
                if min.iter().chain(max.iter()).any(|v| !v.is_finite()) {
                    return setup("range bounds must be finite numbers");
                }
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return setup("range min is greater than max");
                    }
                }
            }
            Predicate::Pattern { pattern, .. } => {
                SqlSecurity::validate_regex_pattern(pattern)
                    .map_err(|e| PipelineError::validation_setup(rule, e.to_string()))?;
            }
            Predicate::InSet { values } => {
                if values.is_empty() {
                    return setup("in_set needs at least one value");
                }
                let non_finite = values
                    .iter()
                    .any(|v| matches!(v, Literal::Float(x) if !x.is_finite()));
                if non_finite {
                    return setup("in_set values must be finite numbers");
                }
            }
            Predicate::NotNull => {}
            Predicate::Length { min, max } => {
                if min.is_none() && max.is_none() {
                    return setup("length needs at least one of min or max");
                }
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return setup("length min is greater than max");
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Range {
                min,
                max,
                inclusive,
            } => {
                let (open, close) = if *inclusive { ('[', ']') } else { ('(', ')') };
                let lo = min.map_or("-inf".to_string(), |v| v.to_string());
                let hi = max.map_or("+inf".to_string(), |v| v.to_string());
                write!(f, "range {open}{lo}, {hi}{close}")
            }
            Predicate::Pattern { pattern, mode } => {
                let mode = match mode {
                    PatternMode::Full => "full",
                    PatternMode::Match => "match",
                    PatternMode::Contains => "contains",
                };
                write!(f, "pattern({mode}) /{pattern}/")
            }
            Predicate::InSet { values } => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "in {{{}}}", rendered.join(", "))
            }
            Predicate::NotNull => write!(f, "not null"),
            Predicate::Length { min, max } => {
                let lo = min.map_or("0".to_string(), |v| v.to_string());
                let hi = max.map_or("inf".to_string(), |v| v.to_string());
                write!(f, "length [{lo}, {hi}]")
            }
        }
    }
}

/// One predicate rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub column: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(flatten)]
    pub predicate: Predicate,
}

/// A predicate bound to a table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRule {
    pub table: String,
    pub column: String,
    pub predicate: Predicate,
    pub severity: Severity,
}

impl ConstraintRule {
    pub fn new(table: impl Into<String>, column: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            predicate,
            severity: Severity::default(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Human-readable rule name used in reports and errors.
    pub fn describe(&self) -> String {
        format!("{}.{} {}", self.table, self.column, self.predicate)
    }

    fn check(&self) -> Result<()> {
        let name = self.describe();
        check_identifier(&self.table, &name)?;
        check_identifier(&self.column, &name)?;
        self.predicate.check(&name)
    }
}

/// Directional reference from a child column to a parent key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRule {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
    pub severity: Severity,
}

impl ForeignKeyRule {
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            child_column: child_column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            severity: Severity::default(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Parses `"parent_table.parent_column"`; a bare table name means its `id`.
    pub fn parse(
        child_table: &str,
        child_column: &str,
        reference: &str,
    ) -> Result<Self> {
        let (parent_table, parent_column) = match reference.split_once('.') {
            Some((table, column)) => (table.trim(), column.trim()),
            None => (reference.trim(), "id"),
        };
        let rule = Self::new(child_table, child_column, parent_table, parent_column);
        rule.check()?;
        Ok(rule)
    }

    pub fn describe(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.child_table, self.child_column, self.parent_table, self.parent_column
        )
    }

    fn check(&self) -> Result<()> {
        let name = self.describe();
        for identifier in [
            &self.child_table,
            &self.child_column,
            &self.parent_table,
            &self.parent_column,
        ] {
            check_identifier(identifier, &name)?;
        }
        Ok(())
    }
}

/// Ordered columns whose combined value must be unique among null-free rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeKeyRule {
    pub table: String,
    pub columns: Vec<String>,
    pub severity: Severity,
}

impl CompositeKeyRule {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            severity: Severity::default(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn describe(&self) -> String {
        format!("{} unique ({})", self.table, self.columns.join(", "))
    }

    fn check(&self) -> Result<()> {
        let name = self.describe();
        check_identifier(&self.table, &name)?;
        if self.columns.is_empty() {
            return Err(PipelineError::validation_setup(
                name,
                "composite key needs at least one column",
            ));
        }
        let mut seen = BTreeSet::new();
        for column in &self.columns {
            check_identifier(column, &name)?;
            if !seen.insert(column) {
                return Err(PipelineError::validation_setup(
                    name,
                    format!("column '{column}' repeated in key"),
                ));
            }
        }
        Ok(())
    }
}

fn check_identifier(identifier: &str, rule: &str) -> Result<()> {
    SqlSecurity::validate_identifier(identifier)
        .map_err(|e| PipelineError::validation_setup(rule, e.to_string()))
}

/// Every rule of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub constraints: Vec<ConstraintRule>,
    pub foreign_keys: Vec<ForeignKeyRule>,
    pub composite_keys: Vec<CompositeKeyRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and checks the rules declared in configuration.
    pub fn from_config(config: &ValidationConfig) -> Result<Self> {
        let mut rules = Self::new();

        for (table, specs) in &config.constraints {
            for spec in specs {
                rules = rules.with_constraint(
                    ConstraintRule::new(table, &spec.column, spec.predicate.clone())
                        .with_severity(spec.severity),
                )?;
            }
        }

        for (child, columns) in &config.foreign_keys {
            for (column, reference) in columns {
                let rule = ForeignKeyRule::parse(child, column, reference)?
                    .with_severity(config.key_severity);
                rules.foreign_keys.push(rule);
            }
        }

        for (table, keys) in &config.composite_keys {
            for key in keys {
                rules = rules.with_composite_key(
                    CompositeKeyRule::new(table, key.iter().cloned())
                        .with_severity(config.key_severity),
                )?;
            }
        }

        Ok(rules)
    }

    pub fn with_constraint(mut self, rule: ConstraintRule) -> Result<Self> {
        rule.check()?;
        self.constraints.push(rule);
        Ok(self)
    }

    pub fn with_foreign_key(mut self, rule: ForeignKeyRule) -> Result<Self> {
        rule.check()?;
        self.foreign_keys.push(rule);
        Ok(self)
    }

    pub fn with_composite_key(mut self, rule: CompositeKeyRule) -> Result<Self> {
        rule.check()?;
        self.composite_keys.push(rule);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.foreign_keys.is_empty() && self.composite_keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len() + self.foreign_keys.len() + self.composite_keys.len()
    }

    /// Every table a rule reads, parents included.
    pub fn referenced_tables(&self) -> BTreeSet<String> {
        let mut tables = self.checked_tables();
        tables.extend(self.foreign_keys.iter().map(|r| r.parent_table.clone()));
        tables
    }

    /// Tables that findings are reported under.
    pub fn checked_tables(&self) -> BTreeSet<String> {
        self.constraints
            .iter()
            .map(|r| r.table.clone())
            .chain(self.foreign_keys.iter().map(|r| r.child_table.clone()))
            .chain(self.composite_keys.iter().map(|r| r.table.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_spec_yaml_shapes() {
        let yaml = r#"
- { column: age, kind: range, min: 0, max: 100, inclusive: false, severity: error }
- { column: email, kind: pattern, pattern: "^\\S+@\\S+$", mode: contains }
- { column: status, kind: in_set, values: [active, 3, true, 1.5] }
- { column: id, kind: not_null }
- { column: name, kind: length, max: 64 }
"#;
        let specs: Vec<ConstraintSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(specs[0].predicate, Predicate::strictly_between(0.0, 100.0));
        assert_eq!(specs[0].severity, Severity::Error);
        assert!(matches!(
            specs[1].predicate,
            Predicate::Pattern {
                mode: PatternMode::Contains,
                ..
            }
        ));
        assert_eq!(
            specs[2].predicate,
            Predicate::InSet {
                values: vec![
                    Literal::Text("active".into()),
                    Literal::Integer(3),
                    Literal::Bool(true),
                    Literal::Float(1.5),
                ]
            }
        );
        assert_eq!(specs[3].predicate, Predicate::NotNull);
        assert_eq!(specs[3].severity, Severity::Warning);
        assert_eq!(
            specs[4].predicate,
            Predicate::Length {
                min: None,
                max: Some(64)
            }
        );
    }

    #[test]
    fn test_predicate_checks() {
        assert!(Predicate::between(0.0, 1.0).check("r").is_ok());
        assert!(Predicate::between(2.0, 1.0).check("r").is_err());
        assert!(Predicate::Range {
            min: None,
            max: None,
            inclusive: true
        }
        .check("r")
        .is_err());
        assert!(Predicate::pattern("[broken").check("r").is_err());
        assert!(Predicate::InSet { values: vec![] }.check("r").is_err());
        assert!(Predicate::Length {
            min: Some(5),
            max: Some(1)
        }
        .check("r")
        .is_err());
    }

    #[test]
    fn test_foreign_key_reference_parsing() -> Result<()> {
        let explicit = ForeignKeyRule::parse("orders", "user_id", "users.user_id")?;
        assert_eq!(explicit.parent_table, "users");
        assert_eq!(explicit.parent_column, "user_id");

        let bare = ForeignKeyRule::parse("orders", "user_id", "users")?;
        assert_eq!(bare.parent_column, "id");

        assert!(ForeignKeyRule::parse("orders", "user_id", "users.").is_err());
        Ok(())
    }

    #[test]
    fn test_rule_set_from_config() -> Result<()> {
        let mut config = ValidationConfig::default();
        config.key_severity = Severity::Error;
        config
            .foreign_keys
            .entry("orders".into())
            .or_default()
            .insert("user_id".into(), "users.id".into());
        config
            .composite_keys
            .insert("user_actions".into(), vec![vec!["user_id".into(), "timestamp".into()]]);
        config.constraints.insert(
            "users".into(),
            vec![ConstraintSpec {
                column: "age".into(),
                severity: Severity::Info,
                predicate: Predicate::between(0.0, 120.0),
            }],
        );

        let rules = RuleSet::from_config(&config)?;
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.foreign_keys[0].severity, Severity::Error);
        assert_eq!(rules.constraints[0].severity, Severity::Info);
        assert_eq!(
            rules.referenced_tables().into_iter().collect::<Vec<_>>(),
            vec!["orders", "user_actions", "users"]
        );
        Ok(())
    }

    #[test]
    fn test_composite_key_checks() {
        assert!(RuleSet::new()
            .with_composite_key(CompositeKeyRule::new("t", Vec::<String>::new()))
            .is_err());
        assert!(RuleSet::new()
            .with_composite_key(CompositeKeyRule::new("t", ["a", "a"]))
            .is_err());
    }

    #[test]
    fn test_descriptions() {
        let rule = ConstraintRule::new("users", "age", Predicate::strictly_between(0.0, 100.0));
        assert_eq!(rule.describe(), "users.age range (0, 100)");
        let fk = ForeignKeyRule::new("orders", "user_id", "users", "id");
        assert_eq!(fk.describe(), "orders.user_id -> users.id");
    }
}
