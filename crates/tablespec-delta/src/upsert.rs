use datafusion::arrow::array::{BooleanArray, RecordBatch};
use datafusion::arrow::compute::{and, filter_record_batch, is_not_null};
use log::{info, warn};
use tablespec_catalog::provider::{TableStore, WriteMode};
use tablespec_catalog::statement::Statement;
use tablespec_common::config::UpsertConfig;

use crate::error::{DeltaError, DeltaResult};
use crate::merge::{check_merge, merge_statement, staging_view_name, MergeCheck, StagedView};

/// The load path chosen for an incoming batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    /// The target is empty and is overwritten with the batch.
    FullOverwrite,
    /// No incoming key exists in the target.
    Append,
    Merge { join_cols: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub decision: MergeDecision,
    /// Rows handed to the store after null keys were dropped.
    pub rows_written: usize,
    /// Rows dropped because a join column was null.
    pub rows_dropped: usize,
    pub check: MergeCheck,
}

/// Removes rows with a null value in any of the join columns.
/// Returns the remaining rows and the number of dropped rows.
pub fn drop_null_keys(batch: &RecordBatch, join_cols: &[String]) -> DeltaResult<(RecordBatch, usize)> {
    let mut mask: Option<BooleanArray> = None;
    for name in join_cols {
        let column = batch
            .column_by_name(name)
            .ok_or_else(|| DeltaError::invalid(format!("join column {name} is not in the batch")))?;
        let valid = is_not_null(column.as_ref())?;
        mask = Some(match mask {
            Some(mask) => and(&mask, &valid)?,
            None => valid,
        });
    }
    let Some(mask) = mask else {
        return Ok((batch.clone(), 0));
    };
    let filtered = filter_record_batch(batch, &mask)?;
    let dropped = batch.num_rows() - filtered.num_rows();
    Ok((filtered, dropped))
}

fn validate_join_cols(batch: &RecordBatch, join_cols: &[String]) -> DeltaResult<()> {
    if join_cols.is_empty() {
        return Err(DeltaError::invalid("upsert needs at least one join column"));
    }
    let schema = batch.schema();
    let missing = join_cols
        .iter()
        .filter(|c| schema.field_with_name(c).is_err())
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(DeltaError::invalid(format!(
            "join columns [{}] are not in the incoming batch",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Loads batches into a target table by full load, append or merge.
pub struct UpsertEngine<'a> {
    store: &'a dyn TableStore,
    config: UpsertConfig,
}

impl<'a> UpsertEngine<'a> {
    pub fn new(store: &'a dyn TableStore, config: &UpsertConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    pub fn upsert(
        &self,
        target: &str,
        incoming: RecordBatch,
        join_cols: &[String],
    ) -> DeltaResult<UpsertOutcome> {
        self.upsert_ignoring(target, incoming, join_cols, &[])
    }

    /// Like [`UpsertEngine::upsert`], but changes in `ignore_cols` alone
    /// do not count as changed rows.
    pub fn upsert_ignoring(
        &self,
        target: &str,
        incoming: RecordBatch,
        join_cols: &[String],
        ignore_cols: &[String],
    ) -> DeltaResult<UpsertOutcome> {
        validate_join_cols(&incoming, join_cols)?;
        let (incoming, rows_dropped) = drop_null_keys(&incoming, join_cols)?;
        if rows_dropped > 0 {
            warn!("discarded {rows_dropped} incoming rows with null join keys before loading {target}");
        }
        let rows_written = incoming.num_rows();

        let existing = self.store.read(target)?;
        if existing.num_rows() == 0 {
            info!("target {target} is empty, loading {rows_written} rows in full");
            self.store.write(target, incoming, WriteMode::Overwrite)?;
            return Ok(UpsertOutcome {
                decision: MergeDecision::FullOverwrite,
                rows_written,
                rows_dropped,
                check: MergeCheck::default(),
            });
        }

        let check = check_merge(&incoming, &existing, join_cols, ignore_cols)?;
        if !check.needs_merge() {
            info!("no incoming keys exist in {target}, appending {rows_written} rows");
            self.store.write(target, incoming, WriteMode::Append)?;
            return Ok(UpsertOutcome {
                decision: MergeDecision::Append,
                rows_written,
                rows_dropped,
                check,
            });
        }

        let columns = incoming
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect::<Vec<_>>();
        let view = StagedView::create(
            self.store,
            &self.config.staging_database,
            &staging_view_name(&self.config.staging_view_prefix, join_cols, &columns),
            incoming,
        )?;
        let merge = merge_statement(target, view.identifier(), join_cols, &columns);
        info!(
            "merging {rows_written} rows into {target}: {} overlapping, {} changed",
            check.overlapping, check.changed
        );
        self.store.execute(&Statement::Merge(merge))?;
        drop(view);
        Ok(UpsertOutcome {
            decision: MergeDecision::Merge {
                join_cols: join_cols.to_vec(),
            },
            rows_written,
            rows_dropped,
            check,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use datafusion::arrow::array::{Int64Array, StringArray};
    use datafusion::arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    #[test]
    fn test_drop_null_keys() {
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("a", DataType::Int64, true),
                Field::new("b", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3), Some(4)])),
                Arc::new(StringArray::from(vec![Some("x"), Some("y"), None, Some("z")])),
            ],
        )
        .unwrap();
        let (kept, dropped) = drop_null_keys(&batch, &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(kept.num_rows(), 2);
        assert_eq!(dropped, 2);
        let (kept, dropped) = drop_null_keys(&batch, &["a".to_string()]).unwrap();
        assert_eq!(kept.num_rows(), 3);
        assert_eq!(dropped, 1);
    }
}
