//! End-to-end checks of the validation engine against registered tables.

mod common;

use term_pipeline::config::PipelineConfig;
use term_pipeline::dataset::Dataset;
use term_pipeline::error::{PipelineError, Result};
use term_pipeline::orchestrator::RunContext;
use term_pipeline::severity::Severity;
use term_pipeline::validation::{
    CompositeKeyRule, ConstraintRule, DuplicateGroup, ForeignKeyRule, OrphanRow, Predicate,
    RuleSet, ValidationEngine,
};

fn engine() -> ValidationEngine {
    ValidationEngine::new(RunContext::new("validation_it", false))
}

#[tokio::test]
async fn test_foreign_key_flags_only_the_missing_parent() -> Result<()> {
    let registry = common::registry(vec![
        Dataset::new("users", common::users()),
        Dataset::new("orders", common::orders()),
    ]);
    let rules =
        RuleSet::new().with_foreign_key(ForeignKeyRule::new("orders", "user_id", "users", "id"))?;

    let report = engine().validate_rules(&registry, &rules).await?;
    let orders = report.table("orders").expect("orders checked");
    assert_eq!(orders.foreign_keys.len(), 1);
    assert_eq!(
        orders.foreign_keys[0].orphans,
        vec![OrphanRow {
            row_id: 2,
            value: "4".to_string()
        }]
    );
    assert_eq!(report.total_violations(), 1);
    // the parent table is read, not checked
    assert!(report.table("users").is_none());
    Ok(())
}

#[tokio::test]
async fn test_composite_key_ignores_null_components() -> Result<()> {
    let registry = common::registry(vec![Dataset::new("user_actions", common::user_actions())]);
    let rules = RuleSet::new()
        .with_composite_key(CompositeKeyRule::new("user_actions", ["user_id", "timestamp"]))?;

    let report = engine().validate_rules(&registry, &rules).await?;
    let finding = &report.table("user_actions").expect("checked").composite_keys[0];
    assert_eq!(
        finding.duplicates,
        vec![DuplicateGroup {
            key: vec!["1".to_string(), "T1".to_string()],
            row_ids: vec![0, 1],
        }]
    );
    assert_eq!(finding.violations, 2);
    Ok(())
}

#[tokio::test]
async fn test_exclusive_age_range() -> Result<()> {
    let registry = common::registry(vec![Dataset::new("users", common::ages())]);
    let rules = RuleSet::new().with_constraint(
        ConstraintRule::new("users", "age", Predicate::strictly_between(0.0, 100.0))
            .with_severity(Severity::Error),
    )?;

    let report = engine().validate_rules(&registry, &rules).await?;
    let finding = &report.table("users").expect("checked").constraints[0];
    assert_eq!(finding.row_ids, vec![1, 2]);
    assert_eq!(finding.violations, 2);
    assert_eq!(report.max_violated_severity(), Some(Severity::Error));
    Ok(())
}

#[tokio::test]
async fn test_rules_from_configuration() -> Result<()> {
    let config = PipelineConfig::from_yaml_str(
        r#"
validation_cfg:
  foreign_keys:
    orders: { user_id: users.id }
  constraints:
    users:
      - { column: email, kind: pattern, pattern: "^[^@]+@[^@]+$" }
      - { column: country, kind: in_set, values: ["NO", "PE"], severity: info }
      - { column: id, kind: not_null }
"#,
    )?;
    let rules = RuleSet::from_config(&config.validation_cfg)?;
    let registry = common::registry(vec![
        Dataset::new("users", common::users()),
        Dataset::new("orders", common::orders()),
    ]);

    let report = engine().validate_rules(&registry, &rules).await?;
    let users = report.table("users").expect("users checked");
    let counts: Vec<usize> = users.constraints.iter().map(|f| f.violations).collect();
    assert_eq!(counts, vec![1, 0, 0]);
    assert_eq!(users.constraints[0].row_ids, vec![1]);
    assert_eq!(report.violation_counts_by_table()["orders"], 1);
    assert_eq!(report.total_violations(), 2);
    Ok(())
}

#[tokio::test]
async fn test_no_rules_is_an_empty_report() -> Result<()> {
    let registry = common::registry(vec![Dataset::new("users", common::users())]);
    let report = engine().validate_rules(&registry, &RuleSet::new()).await?;
    assert!(report.tables.is_empty());
    assert!(report.is_clean());
    Ok(())
}

#[tokio::test]
async fn test_rule_on_missing_parent_table_is_a_resolution_error() -> Result<()> {
    let registry = common::registry(vec![Dataset::new("orders", common::orders())]);
    let rules =
        RuleSet::new().with_foreign_key(ForeignKeyRule::new("orders", "user_id", "users", "id"))?;

    let err = engine().validate_rules(&registry, &rules).await.unwrap_err();
    assert!(matches!(err, PipelineError::RuleResolution { .. }));
    Ok(())
}

#[tokio::test]
async fn test_repeated_passes_are_identical() -> Result<()> {
    let registry = common::registry(vec![
        Dataset::new("users", common::users()),
        Dataset::new("orders", common::orders()),
        Dataset::new("user_actions", common::user_actions()),
    ]);
    let rules = RuleSet::new()
        .with_foreign_key(ForeignKeyRule::new("orders", "user_id", "users", "id"))?
        .with_composite_key(CompositeKeyRule::new("user_actions", ["user_id", "timestamp"]))?
        .with_constraint(ConstraintRule::new("users", "email", Predicate::pattern("^[^@]+@[^@]+$")))?;

    let engine = engine();
    let first = engine.validate_rules(&registry, &rules).await?;
    let second = engine.validate_rules(&registry, &rules).await?;
    assert_eq!(first, second);
    assert_eq!(
        first.tables.iter().map(|t| t.table.as_str()).collect::<Vec<_>>(),
        vec!["orders", "user_actions", "users"]
    );
    Ok(())
}
