//! Property and scenario tests for the transformation engine.
//!
//! Every built-in operation is idempotent: applying it to its own output
//! changes nothing. Inputs are drawn from small domains so that nulls,
//! duplicates and dirty strings show up often.

mod common;

use arrow::record_batch::RecordBatch;
use proptest::prelude::*;
use term_pipeline::dataset::Dataset;
use term_pipeline::error::Result;
use term_pipeline::orchestrator::{RunContext, Stage};
use term_pipeline::transform::{OperationKind, TransformationEngine, TransformationStep};

fn engine() -> TransformationEngine {
    TransformationEngine::new(RunContext::new("props", false), Stage::PreTransform)
}

fn dataset(rows: &[(Option<i64>, Option<String>)]) -> Dataset {
    let ids = rows.iter().map(|(id, _)| *id).collect();
    let names = rows.iter().map(|(_, name)| name.as_deref()).collect();
    Dataset::new(
        "items",
        common::batch(vec![("id", common::ints(ids)), ("name", common::strings(names))]),
    )
}

fn row_strategy() -> impl Strategy<Value = (Option<i64>, Option<String>)> {
    let name = prop::option::of(prop::sample::select(vec![
        "a".to_string(),
        " a".to_string(),
        "a ".to_string(),
        "b\u{7}".to_string(),
        "\tb\n".to_string(),
        String::new(),
    ]));
    (prop::option::of(0i64..4), name)
}

async fn apply_twice(step: &TransformationStep, input: &Dataset) -> Result<(RecordBatch, RecordBatch)> {
    let engine = engine();
    let steps = std::slice::from_ref(step);
    let (once, _) = engine.apply(input, steps).await?;
    let (twice, logs) = engine.apply(&once, steps).await?;
    assert_eq!(logs[0].rows_removed, 0);
    assert_eq!(logs[0].cells_changed, 0);
    Ok((once.batch().clone(), twice.batch().clone()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_every_operation_is_idempotent(
        rows in prop::collection::vec(row_strategy(), 0..24),
        kind_index in 0usize..4,
        targeted in any::<bool>(),
    ) {
        let kind = OperationKind::ALL[kind_index];
        let step = if targeted {
            TransformationStep::new(kind).on_columns(["name"])
        } else {
            TransformationStep::new(kind)
        };
        let input = dataset(&rows);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let (once, twice) = rt.block_on(apply_twice(&step, &input)).unwrap();
        if !kind.removes_rows() {
            prop_assert_eq!(once.num_rows(), input.num_rows());
        }
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_row_dropping_never_adds_rows(
        rows in prop::collection::vec(row_strategy(), 0..24),
    ) {
        let input = dataset(&rows);
        let steps = [
            TransformationStep::new(OperationKind::DropNulls),
            TransformationStep::new(OperationKind::DropDuplicates),
        ];

        let rt = tokio::runtime::Runtime::new().unwrap();
        let (output, logs) = rt.block_on(engine().apply(&input, &steps)).unwrap();

        prop_assert!(output.num_rows() <= input.num_rows());
        let removed: usize = logs.iter().map(|l| l.rows_removed).sum();
        prop_assert_eq!(removed, input.num_rows() - output.num_rows());
        prop_assert_eq!(input.num_rows(), rows.len());
    }
}

fn ids(dataset: &Dataset) -> Vec<Option<i64>> {
    let column = dataset.batch().column(0);
    let column = column
        .as_any()
        .downcast_ref::<arrow::array::Int64Array>()
        .unwrap();
    column.iter().collect()
}

#[tokio::test]
async fn test_drop_nulls_then_duplicates_scenario() -> Result<()> {
    let input = Dataset::new("items", common::ten_rows());
    let steps = [
        TransformationStep::new(OperationKind::DropNulls).on_columns(["id"]),
        TransformationStep::new(OperationKind::DropDuplicates),
    ];
    let (output, logs) = engine().apply(&input, &steps).await?;

    assert_eq!(output.num_rows(), 6);
    assert_eq!(logs[0].rows_removed, 2);
    assert_eq!(logs[1].rows_removed, 2);
    assert_eq!(
        ids(&output),
        vec![Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)]
    );
    Ok(())
}

#[tokio::test]
async fn test_reversed_order_removes_the_same_rows() -> Result<()> {
    let input = Dataset::new("items", common::ten_rows());
    let forward = [
        TransformationStep::new(OperationKind::DropNulls).on_columns(["id"]),
        TransformationStep::new(OperationKind::DropDuplicates),
    ];
    let reversed = [forward[1].clone(), forward[0].clone()];

    let (a, _) = engine().apply(&input, &forward).await?;
    let (b, logs) = engine().apply(&input, &reversed).await?;

    assert_eq!(a.batch(), b.batch());
    assert_eq!(logs[0].kind, OperationKind::DropDuplicates);
    assert_eq!(logs[0].rows_removed, 2);
    assert_eq!(logs[1].rows_removed, 2);
    Ok(())
}

#[tokio::test]
async fn test_declared_order_is_respected_for_interacting_steps() -> Result<()> {
    // " a" and "a" only collide once whitespace is trimmed.
    let input = Dataset::new(
        "items",
        common::batch(vec![(
            "name",
            common::strings(vec![Some(" a"), Some("a"), Some("b")]),
        )]),
    );
    let trim = TransformationStep::new(OperationKind::TrimWhitespace);
    let dedupe = TransformationStep::new(OperationKind::DropDuplicates);

    let (trim_first, _) = engine()
        .apply(&input, &[trim.clone(), dedupe.clone()])
        .await?;
    let (dedupe_first, _) = engine().apply(&input, &[dedupe, trim]).await?;

    assert_eq!(trim_first.num_rows(), 2);
    assert_eq!(dedupe_first.num_rows(), 3);
    Ok(())
}
