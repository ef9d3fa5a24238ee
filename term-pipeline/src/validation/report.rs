//! Validation report types.

use super::rules::{CompositeKeyRule, ConstraintRule, ForeignKeyRule};
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows violating one predicate rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintFinding {
    pub rule: ConstraintRule,
    /// 0-based positions of the offending rows, ascending
    pub row_ids: Vec<u64>,
    pub violations: usize,
}

/// A child row whose reference has no parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanRow {
    pub row_id: u64,
    /// Offending value, sanitized for display
    pub value: String,
}

/// Orphaned rows for one foreign-key rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyFinding {
    pub rule: ForeignKeyRule,
    pub orphans: Vec<OrphanRow>,
    pub violations: usize,
}

/// Rows sharing one key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Key values, sanitized for display, in key column order
    pub key: Vec<String>,
    pub row_ids: Vec<u64>,
}

/// Duplicate key groups for one composite-key rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeKeyFinding {
    pub rule: CompositeKeyRule,
    /// Groups in order of their first row
    pub duplicates: Vec<DuplicateGroup>,
    /// Rows belonging to any duplicate group
    pub violations: usize,
}

/// Findings for one table, phase by phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableValidation {
    pub table: String,
    pub rows_checked: usize,
    pub constraints: Vec<ConstraintFinding>,
    pub foreign_keys: Vec<ForeignKeyFinding>,
    pub composite_keys: Vec<CompositeKeyFinding>,
}

impl TableValidation {
    pub(crate) fn new(table: impl Into<String>, rows_checked: usize) -> Self {
        Self {
            table: table.into(),
            rows_checked,
            constraints: Vec::new(),
            foreign_keys: Vec::new(),
            composite_keys: Vec::new(),
        }
    }

    pub fn total_violations(&self) -> usize {
        self.constraints.iter().map(|f| f.violations).sum::<usize>()
            + self.foreign_keys.iter().map(|f| f.violations).sum::<usize>()
            + self.composite_keys.iter().map(|f| f.violations).sum::<usize>()
    }

    /// `(severity, violations)` of every rule evaluated on this table.
    pub fn rule_outcomes(&self) -> impl Iterator<Item = (Severity, usize)> + '_ {
        self.constraints
            .iter()
            .map(|f| (f.rule.severity, f.violations))
            .chain(
                self.foreign_keys
                    .iter()
                    .map(|f| (f.rule.severity, f.violations)),
            )
            .chain(
                self.composite_keys
                    .iter()
                    .map(|f| (f.rule.severity, f.violations)),
            )
    }
}

/// Result of one validation pass. Built once and never updated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub pipeline_id: String,
    pub run_id: String,
    /// Tables with at least one rule, ordered by name
    pub tables: Vec<TableValidation>,
}

impl ValidationReport {
    /// Looks up the findings of one table.
    pub fn table(&self, name: &str) -> Option<&TableValidation> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn total_violations(&self) -> usize {
        self.tables.iter().map(TableValidation::total_violations).sum()
    }

    /// True when no rule found anything.
    pub fn is_clean(&self) -> bool {
        self.total_violations() == 0
    }

    /// Highest severity among rules with at least one violation.
    pub fn max_violated_severity(&self) -> Option<Severity> {
        self.tables
            .iter()
            .flat_map(TableValidation::rule_outcomes)
            .filter(|(_, violations)| *violations > 0)
            .map(|(severity, _)| severity)
            .max()
    }

    pub fn violation_counts_by_table(&self) -> BTreeMap<String, usize> {
        self.tables
            .iter()
            .map(|t| (t.table.clone(), t.total_violations()))
            .collect()
    }

    /// Number of rules evaluated.
    pub fn rules_evaluated(&self) -> usize {
        self.tables.iter().map(|t| t.rule_outcomes().count()).sum()
    }
}
