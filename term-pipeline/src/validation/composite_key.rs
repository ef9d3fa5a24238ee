//! Duplicate detection for composite-key rules.

use super::report::{CompositeKeyFinding, DuplicateGroup};
use super::rules::CompositeKeyRule;
use crate::context::{row_id_column, value_to_string, PipelineContext};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::log_rule;
use crate::orchestrator::RunContext;
use crate::security::{SqlSecurity, ROW_ID_COLUMN};
use datafusion::scalar::ScalarValue;
use std::collections::HashMap;

/// Finds groups of rows sharing the same key tuple.
///
/// Rows with a null in any key column are excluded. Groups are reported in
/// order of their first row, each with ascending row ids.
pub(super) async fn find_duplicates(
    ctx: &PipelineContext,
    run: &RunContext,
    dataset: &Dataset,
    rule: &CompositeKeyRule,
) -> Result<CompositeKeyFinding> {
    let name = rule.describe();
    let sql = duplicate_query(dataset.name(), &rule.columns)
        .map_err(|e| PipelineError::validation_setup(&name, e.to_string()))?;
    log_rule!(run.log(), rule = %name, sql = %sql, "Evaluating composite key");

    let batches = ctx
        .sql(&sql)
        .await
        .map_err(|e| PipelineError::validation_setup(&name, e.to_string()))?;

    let mut index: HashMap<Vec<ScalarValue>, usize> = HashMap::new();
    let mut duplicates: Vec<DuplicateGroup> = Vec::new();
    for batch in &batches {
        let ids = row_id_column(batch, 0)?;
        for row in 0..batch.num_rows() {
            let key = (1..batch.num_columns())
                .map(|col| ScalarValue::try_from_array(batch.column(col), row))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let slot = match index.get(&key) {
                Some(slot) => *slot,
                None => {
                    let display = (1..batch.num_columns())
                        .map(|col| {
                            value_to_string(batch.column(col).as_ref(), row)
                                .map(|v| run.sanitize(&v.unwrap_or_default()))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    duplicates.push(DuplicateGroup {
                        key: display,
                        row_ids: Vec::new(),
                    });
                    index.insert(key, duplicates.len() - 1);
                    duplicates.len() - 1
                }
            };
            duplicates[slot].row_ids.push(ids.value(row));
        }
    }

    Ok(CompositeKeyFinding {
        violations: duplicates.iter().map(|g| g.row_ids.len()).sum(),
        rule: rule.clone(),
        duplicates,
    })
}

fn duplicate_query(table: &str, columns: &[String]) -> Result<String> {
    let table = SqlSecurity::escape_identifier(table)?;
    let cols = columns
        .iter()
        .map(|c| SqlSecurity::escape_identifier(c))
        .collect::<Result<Vec<_>>>()?;

    let select_src = cols
        .iter()
        .map(|c| format!("src.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let key_list = cols.join(", ");
    let not_null = cols
        .iter()
        .map(|c| format!("{c} IS NOT NULL"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let join_on = cols
        .iter()
        .map(|c| format!("src.{c} = dup.{c}"))
        .collect::<Vec<_>>()
        .join(" AND ");

    Ok(format!(
        "SELECT src.\"{ROW_ID_COLUMN}\", {select_src} FROM {table} AS src \
         JOIN (SELECT {key_list} FROM {table} WHERE {not_null} \
         GROUP BY {key_list} HAVING COUNT(*) > 1) AS dup ON {join_on} \
         ORDER BY src.\"{ROW_ID_COLUMN}\""
    ))
}
