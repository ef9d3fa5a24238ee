//! Orphan detection for foreign-key rules.

use super::predicate::TypeFamily;
use super::report::{ForeignKeyFinding, OrphanRow};
use super::rules::ForeignKeyRule;
use crate::context::{row_id_column, value_to_string, PipelineContext};
use crate::dataset::DatasetRegistry;
use crate::error::{PipelineError, Result};
use crate::log_rule;
use crate::orchestrator::RunContext;
use crate::security::{SqlSecurity, ROW_ID_COLUMN};

/// Finds child rows whose non-null reference has no parent.
///
/// Null parent keys never satisfy a reference and null child values are
/// never orphans.
pub(super) async fn find_orphans(
    ctx: &PipelineContext,
    run: &RunContext,
    registry: &DatasetRegistry,
    rule: &ForeignKeyRule,
) -> Result<ForeignKeyFinding> {
    let name = rule.describe();
    check_key_types(registry, rule, &name)?;

    let sql = orphan_query(rule).map_err(|e| PipelineError::validation_setup(&name, e.to_string()))?;
    log_rule!(run.log(), rule = %name, sql = %sql, "Evaluating foreign key");

    let batches = ctx
        .sql(&sql)
        .await
        .map_err(|e| PipelineError::validation_setup(&name, e.to_string()))?;

    let mut orphans = Vec::new();
    for batch in &batches {
        let ids = row_id_column(batch, 0)?;
        let values = batch.column(1);
        for row in 0..batch.num_rows() {
            let value = value_to_string(values.as_ref(), row)?.unwrap_or_default();
            orphans.push(OrphanRow {
                row_id: ids.value(row),
                value: run.sanitize(&value),
            });
        }
    }

    Ok(ForeignKeyFinding {
        violations: orphans.len(),
        rule: rule.clone(),
        orphans,
    })
}

fn check_key_types(registry: &DatasetRegistry, rule: &ForeignKeyRule, name: &str) -> Result<()> {
    let field_type = |table: &str, column: &str| -> Result<_> {
        let dataset = registry.require(table, name)?;
        let schema = dataset.schema();
        let (_, field) = schema.column_with_name(column).ok_or_else(|| {
            PipelineError::rule_resolution(
                name,
                format!("column '{column}' does not exist in table '{table}'"),
            )
        })?;
        Ok(field.data_type().clone())
    };
    let child = field_type(&rule.child_table, &rule.child_column)?;
    let parent = field_type(&rule.parent_table, &rule.parent_column)?;

    let compatible = match (TypeFamily::of(&child), TypeFamily::of(&parent)) {
        (TypeFamily::Other, TypeFamily::Other) => child == parent,
        (a, b) => a == b,
    };
    if compatible {
        Ok(())
    } else {
        Err(PipelineError::validation_setup(
            name,
            format!("child key is {child} but parent key is {parent}"),
        ))
    }
}

fn orphan_query(rule: &ForeignKeyRule) -> Result<String> {
    let child_table = SqlSecurity::escape_identifier(&rule.child_table)?;
    let child_column = SqlSecurity::escape_identifier(&rule.child_column)?;
    let parent_table = SqlSecurity::escape_identifier(&rule.parent_table)?;
    let parent_column = SqlSecurity::escape_identifier(&rule.parent_column)?;

    Ok(format!(
        "SELECT child.\"{ROW_ID_COLUMN}\", child.{child_column} \
         FROM {child_table} AS child \
         LEFT JOIN (SELECT DISTINCT {parent_column} AS parent_key FROM {parent_table} \
         WHERE {parent_column} IS NOT NULL) AS parent \
         ON child.{child_column} = parent.parent_key \
         WHERE child.{child_column} IS NOT NULL AND parent.parent_key IS NULL \
         ORDER BY child.\"{ROW_ID_COLUMN}\""
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn int_table(name: &str, column: &str, values: Vec<Option<i64>>) -> Dataset {
        let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Int64, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap();
        Dataset::new(name, batch)
    }

    fn setup(registry: &DatasetRegistry) -> PipelineContext {
        PipelineContext::from_registry(registry).unwrap()
    }

    #[tokio::test]
    async fn test_only_unmatched_non_null_children_are_orphans() -> Result<()> {
        let mut registry = DatasetRegistry::new();
        registry.insert(int_table("users", "id", vec![Some(1), Some(2), Some(3)]));
        registry.insert(int_table(
            "orders",
            "user_id",
            vec![Some(1), Some(2), Some(4), None],
        ));
        let ctx = setup(&registry);
        let run = RunContext::new("fk_test", false);
        let rule = ForeignKeyRule::new("orders", "user_id", "users", "id");

        let finding = find_orphans(&ctx, &run, &registry, &rule).await?;
        assert_eq!(finding.violations, 1);
        assert_eq!(
            finding.orphans,
            vec![OrphanRow {
                row_id: 2,
                value: "4".to_string()
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_null_parent_keys_never_match() -> Result<()> {
        let mut registry = DatasetRegistry::new();
        registry.insert(int_table("users", "id", vec![None, Some(7)]));
        registry.insert(int_table("orders", "user_id", vec![Some(7), Some(8)]));
        let ctx = setup(&registry);
        let run = RunContext::new("fk_test", false);
        let rule = ForeignKeyRule::new("orders", "user_id", "users", "id");

        let finding = find_orphans(&ctx, &run, &registry, &rule).await?;
        let ids: Vec<u64> = finding.orphans.iter().map(|o| o.row_id).collect();
        assert_eq!(ids, vec![1]);
        Ok(())
    }

    #[tokio::test]
    async fn test_incompatible_key_types_are_setup_errors() {
        let mut registry = DatasetRegistry::new();
        registry.insert(int_table("users", "id", vec![Some(1)]));
        let schema = Arc::new(Schema::new(vec![Field::new("user_id", DataType::Utf8, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["1"]))]).unwrap();
        registry.insert(Dataset::new("orders", batch));
        let ctx = setup(&registry);
        let run = RunContext::new("fk_test", false);
        let rule = ForeignKeyRule::new("orders", "user_id", "users", "id");

        let err = find_orphans(&ctx, &run, &registry, &rule).await.unwrap_err();
        assert!(matches!(err, PipelineError::ValidationSetup { .. }));
    }

    #[test]
    fn test_orphan_query_quotes_identifiers() -> Result<()> {
        let sql = orphan_query(&ForeignKeyRule::new("Orders", "userId", "Users", "id"))?;
        assert!(sql.contains("FROM \"Orders\" AS child"));
        assert!(sql.contains("child.\"userId\" IS NOT NULL"));
        assert!(sql.ends_with("ORDER BY child.\"__row_id\""));
        Ok(())
    }
}
