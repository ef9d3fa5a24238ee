//! Shared fixtures for integration tests.
#![allow(dead_code)]

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use term_pipeline::dataset::{Dataset, DatasetRegistry};

pub fn ints(values: Vec<Option<i64>>) -> ArrayRef {
    Arc::new(Int64Array::from(values))
}

pub fn strings(values: Vec<Option<&str>>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

/// Builds a batch with nullable columns.
pub fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    RecordBatch::try_from_iter(columns).unwrap()
}

pub fn registry(datasets: Vec<Dataset>) -> DatasetRegistry {
    let mut registry = DatasetRegistry::new();
    for dataset in datasets {
        registry.insert(dataset);
    }
    registry
}

/// `users` with ids {1, 2, 3}.
pub fn users() -> RecordBatch {
    batch(vec![
        ("id", ints(vec![Some(1), Some(2), Some(3)])),
        (
            "email",
            strings(vec![Some("ada@example.com"), Some("grace"), Some("alan@example.com")]),
        ),
        ("country", strings(vec![Some("NO"), Some("PE"), Some("NO")])),
    ])
}

/// `orders` referencing users {1, 2, 4, null}.
pub fn orders() -> RecordBatch {
    batch(vec![
        ("order_id", ints(vec![Some(10), Some(11), Some(12), Some(13)])),
        ("user_id", ints(vec![Some(1), Some(2), Some(4), None])),
    ])
}

/// `user_actions` with one duplicated `(user_id, timestamp)` pair.
pub fn user_actions() -> RecordBatch {
    batch(vec![
        ("user_id", ints(vec![Some(1), Some(1), Some(1), None])),
        ("timestamp", strings(vec![Some("T1"), Some("T1"), Some("T2"), Some("T1")])),
    ])
}

/// `people` with ages {25, -5, 150, 40}.
pub fn ages() -> RecordBatch {
    batch(vec![("age", ints(vec![Some(25), Some(-5), Some(150), Some(40)]))])
}

/// Ten rows: two with a null `id`, and among the other eight two rows that
/// repeat an earlier row exactly.
pub fn ten_rows() -> RecordBatch {
    batch(vec![
        (
            "id",
            ints(vec![
                Some(1),
                Some(2),
                None,
                Some(3),
                Some(2),
                Some(4),
                None,
                Some(5),
                Some(5),
                Some(6),
            ]),
        ),
        (
            "name",
            strings(vec![
                Some("a"),
                Some("b"),
                Some("x"),
                Some("c"),
                Some("b"),
                Some("d"),
                Some("y"),
                Some("e"),
                Some("e"),
                Some("f"),
            ]),
        ),
    ])
}
