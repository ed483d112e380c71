#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use datafusion::arrow::array::{Int64Array, RecordBatch, StringArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use tablespec_catalog::provider::TableStore;
use tablespec_catalog::statement::{CreateTableStatement, Statement};
use tablespec_catalog_memory::MemoryTableStore;
use tablespec_common::config::{AppConfig, UpsertConfig};
use tablespec_common::spec::parse_schema;
use tablespec_delta::upsert::{MergeDecision, UpsertEngine};

const TARGET: &str = "default.customers";

fn config() -> UpsertConfig {
    AppConfig::from_defaults().unwrap().upsert
}

fn batch(rows: &[(Option<i64>, &str)]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("name", DataType::Utf8, true),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
        ],
    )
    .unwrap()
}

fn rows(batch: &RecordBatch) -> Vec<(i64, String)> {
    let ids = batch
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let names = batch
        .column_by_name("name")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let mut rows = (0..batch.num_rows())
        .map(|i| (ids.value(i), names.value(i).to_string()))
        .collect::<Vec<_>>();
    rows.sort();
    rows
}

fn store() -> MemoryTableStore {
    // another test may have installed the logger already
    let _ = tablespec_telemetry::init_telemetry();
    let store = MemoryTableStore::new();
    store
        .execute(&Statement::CreateTable(CreateTableStatement {
            table: TARGET.to_string(),
            schema: parse_schema("id bigint, name string").unwrap(),
            format: "delta".to_string(),
            options: BTreeMap::new(),
            partitioned_by: vec![],
            location: None,
            comment: None,
            properties: BTreeMap::new(),
        }))
        .unwrap();
    store
}

fn join_cols() -> Vec<String> {
    vec!["id".to_string()]
}

#[test]
fn test_empty_target_is_loaded_in_full() {
    let store = store();
    let engine = UpsertEngine::new(&store, &config());
    let outcome = engine
        .upsert(TARGET, batch(&[(Some(1), "a"), (Some(2), "b")]), &join_cols())
        .unwrap();
    assert_eq!(outcome.decision, MergeDecision::FullOverwrite);
    assert_eq!(outcome.rows_written, 2);
    assert_eq!(
        rows(&store.read(TARGET).unwrap()),
        vec![(1, "a".to_string()), (2, "b".to_string())]
    );
}

#[test]
fn test_upsert_append_then_merge() {
    let store = store();
    let engine = UpsertEngine::new(&store, &config());
    engine
        .upsert(TARGET, batch(&[(Some(1), "a"), (Some(2), "b")]), &join_cols())
        .unwrap();

    let outcome = engine
        .upsert(TARGET, batch(&[(Some(3), "c")]), &join_cols())
        .unwrap();
    assert_eq!(outcome.decision, MergeDecision::Append);
    assert_eq!(outcome.check.overlapping, 0);

    let outcome = engine
        .upsert(
            TARGET,
            batch(&[(Some(2), "b2"), (Some(4), "d")]),
            &join_cols(),
        )
        .unwrap();
    assert_eq!(
        outcome.decision,
        MergeDecision::Merge {
            join_cols: join_cols()
        }
    );
    assert_eq!(outcome.check.overlapping, 1);
    assert_eq!(outcome.check.changed, 1);
    assert_eq!(
        rows(&store.read(TARGET).unwrap()),
        vec![
            (1, "a".to_string()),
            (2, "b2".to_string()),
            (3, "c".to_string()),
            (4, "d".to_string()),
        ]
    );

    // the staging view is gone once the merge has run
    assert!(store.temp_views().unwrap().is_empty());
    let history = store.history().unwrap();
    let merge = history.last().unwrap();
    assert!(merge.starts_with("MERGE INTO default.customers AS target\nUSING global_temp.tablespec_upsert_"));
    assert!(merge.contains("ON (source.id = target.id)"));
}

#[test]
fn test_merge_through_custom_staging_database() {
    let store = store();
    let config = UpsertConfig {
        staging_database: "Staging".to_string(),
        staging_view_prefix: "reload".to_string(),
    };
    let engine = UpsertEngine::new(&store, &config);
    engine
        .upsert(TARGET, batch(&[(Some(1), "a"), (Some(2), "b")]), &join_cols())
        .unwrap();
    let outcome = engine
        .upsert(TARGET, batch(&[(Some(2), "b2")]), &join_cols())
        .unwrap();
    assert_eq!(
        outcome.decision,
        MergeDecision::Merge {
            join_cols: join_cols()
        }
    );
    assert_eq!(
        rows(&store.read(TARGET).unwrap()),
        vec![(1, "a".to_string()), (2, "b2".to_string())]
    );
    assert!(store.temp_views().unwrap().is_empty());
    let history = store.history().unwrap();
    assert!(history
        .last()
        .unwrap()
        .contains("\nUSING staging.reload_"));
}

#[test]
fn test_unchanged_rows_still_merge() {
    let store = store();
    let engine = UpsertEngine::new(&store, &config());
    engine
        .upsert(TARGET, batch(&[(Some(1), "a")]), &join_cols())
        .unwrap();
    let outcome = engine
        .upsert(TARGET, batch(&[(Some(1), "a")]), &join_cols())
        .unwrap();
    assert!(matches!(outcome.decision, MergeDecision::Merge { .. }));
    assert_eq!(outcome.check.changed, 0);
    assert_eq!(rows(&store.read(TARGET).unwrap()), vec![(1, "a".to_string())]);
}

#[test]
fn test_null_keys_are_dropped() {
    let store = store();
    let engine = UpsertEngine::new(&store, &config());
    let outcome = engine
        .upsert(
            TARGET,
            batch(&[(None, "ghost"), (Some(5), "e")]),
            &join_cols(),
        )
        .unwrap();
    assert_eq!(outcome.rows_dropped, 1);
    assert_eq!(outcome.rows_written, 1);
    let data = store.read(TARGET).unwrap();
    assert_eq!(data.column_by_name("id").unwrap().null_count(), 0);
    assert_eq!(rows(&data), vec![(5, "e".to_string())]);
}

#[test]
fn test_invalid_join_columns() {
    let store = store();
    let engine = UpsertEngine::new(&store, &config());
    assert!(engine.upsert(TARGET, batch(&[(Some(1), "a")]), &[]).is_err());
    assert!(engine
        .upsert(
            TARGET,
            batch(&[(Some(1), "a")]),
            &["customer_id".to_string()]
        )
        .is_err());
    assert_eq!(store.read(TARGET).unwrap().num_rows(), 0);
}

#[test]
fn test_ignored_columns_do_not_count_as_changes() {
    let store = store();
    let engine = UpsertEngine::new(&store, &config());
    engine
        .upsert(TARGET, batch(&[(Some(1), "a")]), &join_cols())
        .unwrap();
    let outcome = engine
        .upsert_ignoring(
            TARGET,
            batch(&[(Some(1), "renamed")]),
            &join_cols(),
            &["name".to_string()],
        )
        .unwrap();
    assert_eq!(outcome.check.overlapping, 1);
    assert_eq!(outcome.check.changed, 0);
}
