//! Validation engine.
//!
//! [`ValidationEngine::validate`] checks constraint predicates, foreign keys
//! and composite keys against the registry and returns a
//! [`ValidationReport`]. It never mutates data and never fails because of a
//! violation: findings are data. Only structural problems (a rule naming a
//! missing table or column, or a malformed predicate) are returned as errors.
//!
//! For every table the phases run in a fixed order (constraints, then
//! foreign keys, then composite keys) and tables are reported by name, so
//! two passes over the same data produce identical reports.
//!
//! ```rust,no_run
//! use term_pipeline::dataset::DatasetRegistry;
//! use term_pipeline::orchestrator::RunContext;
//! use term_pipeline::validation::{ForeignKeyRule, RuleSet, ValidationEngine};
//!
//! # async fn example(registry: DatasetRegistry) -> term_pipeline::error::Result<()> {
//! let rules = RuleSet::new().with_foreign_key(ForeignKeyRule::new("orders", "user_id", "users", "id"))?;
//! let engine = ValidationEngine::new(RunContext::new("shop", false));
//! let report = engine.validate_rules(&registry, &rules).await?;
//! println!("{} orphaned orders", report.total_violations());
//! # Ok(())
//! # }
//! ```

mod composite_key;
mod foreign_key;
mod predicate;
mod report;
mod rules;

pub use report::{
    CompositeKeyFinding, ConstraintFinding, DuplicateGroup, ForeignKeyFinding, OrphanRow,
    TableValidation, ValidationReport,
};
pub use rules::{
    CompositeKeyRule, ConstraintRule, ConstraintSpec, ForeignKeyRule, Literal, PatternMode,
    Predicate, RuleSet,
};

pub(crate) use predicate::TypeFamily;

use crate::context::PipelineContext;
use crate::dataset::{Dataset, DatasetRegistry};
use crate::error::{PipelineError, Result};
use crate::log_rule;
use crate::orchestrator::RunContext;
use crate::security::{SqlSecurity, ROW_ID_COLUMN};
use arrow::datatypes::DataType;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Evaluates rules against a registry.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    run: RunContext,
}

impl ValidationEngine {
    pub fn new(run: RunContext) -> Self {
        Self { run }
    }

    /// Validates every rule of a rule set.
    pub async fn validate_rules(
        &self,
        registry: &DatasetRegistry,
        rules: &RuleSet,
    ) -> Result<ValidationReport> {
        self.validate(
            registry,
            &rules.constraints,
            &rules.foreign_keys,
            &rules.composite_keys,
        )
        .await
    }

    /// Runs one validation pass.
    ///
    /// Every rule is resolved against the registry before any query runs; a
    /// missing table or column fails the whole pass.
    #[instrument(skip_all, fields(
        pipeline_id = %self.run.pipeline_id(),
        constraints = constraints.len(),
        foreign_keys = foreign_keys.len(),
        composite_keys = composite_keys.len()
    ))]
    pub async fn validate(
        &self,
        registry: &DatasetRegistry,
        constraints: &[ConstraintRule],
        foreign_keys: &[ForeignKeyRule],
        composite_keys: &[CompositeKeyRule],
    ) -> Result<ValidationReport> {
        let mut checked = BTreeSet::new();
        let mut read = BTreeSet::new();

        for rule in constraints {
            let name = rule.describe();
            resolve_column(registry, &rule.table, &rule.column, &name)?;
            checked.insert(rule.table.as_str());
        }
        for rule in foreign_keys {
            let name = rule.describe();
            resolve_column(registry, &rule.child_table, &rule.child_column, &name)?;
            resolve_column(registry, &rule.parent_table, &rule.parent_column, &name)?;
            checked.insert(rule.child_table.as_str());
            read.insert(rule.parent_table.as_str());
        }
        for rule in composite_keys {
            let name = rule.describe();
            for column in &rule.columns {
                resolve_column(registry, &rule.table, column, &name)?;
            }
            checked.insert(rule.table.as_str());
        }

        let mut ctx = PipelineContext::new();
        for table in checked.iter().chain(read.iter()) {
            if !ctx.has_table(table) {
                ctx.register(registry.require(table, table)?)?;
            }
        }

        let ctx = &ctx;
        let tables = try_join_all(checked.iter().map(|table| async move {
            let dataset = registry.require(table, table)?;
            let mut findings = TableValidation::new(*table, dataset.num_rows());

            for rule in constraints.iter().filter(|r| r.table == *table) {
                findings
                    .constraints
                    .push(self.check_constraint(ctx, dataset, rule).await?);
            }
            for rule in foreign_keys.iter().filter(|r| r.child_table == *table) {
                findings
                    .foreign_keys
                    .push(foreign_key::find_orphans(ctx, &self.run, registry, rule).await?);
            }
            for rule in composite_keys.iter().filter(|r| r.table == *table) {
                findings
                    .composite_keys
                    .push(composite_key::find_duplicates(ctx, &self.run, dataset, rule).await?);
            }
            Ok::<_, PipelineError>(findings)
        }))
        .await?;

        let report = ValidationReport {
            pipeline_id: self.run.pipeline_id().to_string(),
            run_id: self.run.run_id().to_string(),
            tables,
        };
        info!(
            tables = report.tables.len(),
            violations = report.total_violations(),
            "Validation pass complete"
        );
        Ok(report)
    }

    async fn check_constraint(
        &self,
        ctx: &PipelineContext,
        dataset: &Dataset,
        rule: &ConstraintRule,
    ) -> Result<ConstraintFinding> {
        let name = rule.describe();
        let data_type = column_type(dataset, &rule.column, &name)?;
        let condition =
            predicate::violation_condition(&name, &rule.column, &data_type, &rule.predicate)?;
        let table = SqlSecurity::escape_identifier(dataset.name())?;
        let sql = format!(
            "SELECT \"{ROW_ID_COLUMN}\" FROM {table} WHERE {condition} ORDER BY \"{ROW_ID_COLUMN}\""
        );
        log_rule!(self.run.log(), rule = %name, sql = %sql, "Evaluating constraint");

        let row_ids = ctx
            .row_ids(&sql)
            .await
            .map_err(|e| PipelineError::validation_setup(&name, e.to_string()))?;
        Ok(ConstraintFinding {
            violations: row_ids.len(),
            rule: rule.clone(),
            row_ids,
        })
    }
}

fn resolve_column(registry: &DatasetRegistry, table: &str, column: &str, rule: &str) -> Result<()> {
    let dataset = registry.require(table, rule)?;
    if dataset.has_column(column) {
        Ok(())
    } else {
        Err(PipelineError::rule_resolution(
            rule,
            format!("column '{column}' does not exist in table '{table}'"),
        ))
    }
}

fn column_type(dataset: &Dataset, column: &str, rule: &str) -> Result<DataType> {
    dataset
        .schema()
        .column_with_name(column)
        .map(|(_, field)| field.data_type().clone())
        .ok_or_else(|| {
            PipelineError::rule_resolution(
                rule,
                format!("column '{column}' does not exist in table '{}'", dataset.name()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn users() -> Dataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("age", DataType::Int64, true),
            Field::new("email", DataType::Utf8, true),
            Field::new("status", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(Int64Array::from(vec![Some(25), Some(-5), Some(150), None])),
                Arc::new(StringArray::from(vec![
                    Some("a@x.io"),
                    Some("not-an-email"),
                    None,
                    Some("d@x.io"),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("active"),
                    Some("banned"),
                    Some("active"),
                    None,
                ])),
            ],
        )
        .unwrap();
        Dataset::new("users", batch)
    }

    fn registry() -> DatasetRegistry {
        let mut registry = DatasetRegistry::new();
        registry.insert(users());
        registry
    }

    fn engine() -> ValidationEngine {
        ValidationEngine::new(RunContext::new("validation_test", false))
    }

    #[tokio::test]
    async fn test_constraints_collect_offending_rows_in_declaration_order() -> Result<()> {
        let rules = RuleSet::new()
            .with_constraint(ConstraintRule::new(
                "users",
                "age",
                Predicate::strictly_between(0.0, 100.0),
            ))?
            .with_constraint(ConstraintRule::new(
                "users",
                "email",
                Predicate::pattern(r"[^@]+@[^@]+\.[a-z]+"),
            ))?
            .with_constraint(ConstraintRule::new(
                "users",
                "status",
                Predicate::in_set(["active", "pending"]),
            ))?
            .with_constraint(
                ConstraintRule::new("users", "status", Predicate::NotNull)
                    .with_severity(Severity::Error),
            )?;

        let report = engine().validate_rules(&registry(), &rules).await?;
        let users = report.table("users").unwrap();
        let rows: Vec<Vec<u64>> = users.constraints.iter().map(|f| f.row_ids.clone()).collect();

        // nulls only count against not_null
        assert_eq!(rows, vec![vec![1, 2], vec![1], vec![1], vec![3]]);
        assert_eq!(report.total_violations(), 5);
        assert_eq!(report.max_violated_severity(), Some(Severity::Error));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_rules_produce_empty_report() -> Result<()> {
        let report = engine().validate_rules(&registry(), &RuleSet::new()).await?;
        assert!(report.tables.is_empty());
        assert!(report.is_clean());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_table_is_rule_resolution_error() {
        let rules = RuleSet::new()
            .with_constraint(ConstraintRule::new("accounts", "id", Predicate::NotNull))
            .unwrap();
        let err = engine().validate_rules(&registry(), &rules).await.unwrap_err();
        assert!(matches!(err, PipelineError::RuleResolution { .. }));
    }

    #[tokio::test]
    async fn test_missing_column_is_rule_resolution_error() {
        let rules = RuleSet::new()
            .with_constraint(ConstraintRule::new("users", "country", Predicate::NotNull))
            .unwrap();
        let err = engine().validate_rules(&registry(), &rules).await.unwrap_err();
        assert!(err.to_string().contains("country"));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_setup_error() {
        let rules = RuleSet::new()
            .with_constraint(ConstraintRule::new(
                "users",
                "email",
                Predicate::between(0.0, 1.0),
            ))
            .unwrap();
        let err = engine().validate_rules(&registry(), &rules).await.unwrap_err();
        assert!(matches!(err, PipelineError::ValidationSetup { .. }));
    }

    #[tokio::test]
    async fn test_validation_does_not_mutate_registry() -> Result<()> {
        let registry = registry();
        let before = registry.get("users").unwrap().clone();
        let rules = RuleSet::new()
            .with_composite_key(CompositeKeyRule::new("users", ["status"]))?;
        engine().validate_rules(&registry, &rules).await?;
        let after = registry.get("users").unwrap();
        assert!(Arc::ptr_eq(&before, after));
        assert_eq!(after.num_rows(), 4);
        Ok(())
    }
}
