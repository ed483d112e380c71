use std::collections::HashMap;

use datafusion::arrow::array::{ArrayRef, RecordBatch};
use datafusion::arrow::compute::cast;
use datafusion::arrow::row::{OwnedRow, RowConverter, Rows, SortField};
use log::debug;

use crate::error::{DeltaError, DeltaResult};

/// The outcome of comparing an incoming batch with the target data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeCheck {
    /// Incoming rows whose join key exists in the target.
    pub overlapping: usize,
    /// Overlapping rows that differ from the target in a compared column.
    pub changed: usize,
}

impl MergeCheck {
    pub fn needs_merge(&self) -> bool {
        self.overlapping > 0
    }
}

fn column(batch: &RecordBatch, name: &str) -> DeltaResult<ArrayRef> {
    batch
        .column_by_name(name)
        .cloned()
        .ok_or_else(|| DeltaError::invalid(format!("column {name} is not in the batch")))
}

/// Converts the named columns of both batches into comparable rows,
/// casting incoming columns to the target types.
fn convert(
    names: &[&str],
    incoming: &RecordBatch,
    target: &RecordBatch,
) -> DeltaResult<Option<(Rows, Rows, Vec<ArrayRef>)>> {
    if names.is_empty() {
        return Ok(None);
    }
    let target_columns = names
        .iter()
        .map(|n| column(target, n))
        .collect::<DeltaResult<Vec<_>>>()?;
    let incoming_columns = names
        .iter()
        .zip(target_columns.iter())
        .map(|(n, t)| Ok(cast(&column(incoming, n)?, t.data_type())?))
        .collect::<DeltaResult<Vec<_>>>()?;
    let fields = target_columns
        .iter()
        .map(|c| SortField::new(c.data_type().clone()))
        .collect::<Vec<_>>();
    if !RowConverter::supports_fields(&fields) {
        return Ok(None);
    }
    let converter = RowConverter::new(fields)?;
    let target_rows = converter.convert_columns(&target_columns)?;
    let incoming_rows = converter.convert_columns(&incoming_columns)?;
    Ok(Some((incoming_rows, target_rows, incoming_columns)))
}

/// Compares incoming rows with the target on the join columns.
///
/// Every incoming row whose join key occurs in the target counts as overlapping.
/// For those rows all columns except the join columns and `ignore_cols` are
/// compared to count changed rows. Rows with a null join key never overlap.
pub fn check_merge(
    incoming: &RecordBatch,
    target: &RecordBatch,
    join_cols: &[String],
    ignore_cols: &[String],
) -> DeltaResult<MergeCheck> {
    if target.num_rows() == 0 || incoming.num_rows() == 0 {
        return Ok(MergeCheck::default());
    }
    let join_names = join_cols.iter().map(String::as_str).collect::<Vec<_>>();
    let Some((incoming_keys, target_keys, incoming_key_columns)) =
        convert(&join_names, incoming, target)?
    else {
        return Err(DeltaError::invalid(format!(
            "join columns [{}] cannot be compared",
            join_cols.join(", ")
        )));
    };

    let mut index: HashMap<OwnedRow, usize> = HashMap::new();
    for i in 0..target.num_rows() {
        index.entry(target_keys.row(i).owned()).or_insert(i);
    }

    let compare_names = incoming
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().as_str().to_string())
        .filter(|n| {
            !join_cols.contains(n)
                && !ignore_cols.contains(n)
                && target.column_by_name(n).is_some()
        })
        .collect::<Vec<_>>();
    let compare_refs = compare_names.iter().map(String::as_str).collect::<Vec<_>>();
    let compared = convert(&compare_refs, incoming, target)?;
    if compared.is_none() && !compare_refs.is_empty() {
        debug!("some compared columns cannot be converted to rows, treating overlaps as changed");
    }

    let mut check = MergeCheck::default();
    for j in 0..incoming.num_rows() {
        if incoming_key_columns.iter().any(|c| c.is_null(j)) {
            continue;
        }
        let Some(&i) = index.get(&incoming_keys.row(j).owned()) else {
            continue;
        };
        check.overlapping += 1;
        let changed = match &compared {
            Some((incoming_values, target_values, _)) => {
                incoming_values.row(j) != target_values.row(i)
            }
            None => !compare_refs.is_empty(),
        };
        if changed {
            check.changed += 1;
        }
    }
    Ok(check)
}

/// Returns whether the incoming rows must be merged into the target
/// rather than appended.
pub fn needs_merge(
    incoming: &RecordBatch,
    target: &RecordBatch,
    join_cols: &[String],
    ignore_cols: &[String],
) -> DeltaResult<bool> {
    Ok(check_merge(incoming, target, join_cols, ignore_cols)?.needs_merge())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use datafusion::arrow::array::{Int64Array, StringArray};
    use datafusion::arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    fn batch(ids: Vec<Option<i64>>, names: Vec<&str>, notes: Vec<&str>) -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("id", DataType::Int64, true),
                Field::new("name", DataType::Utf8, true),
                Field::new("note", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
                Arc::new(StringArray::from(notes)),
            ],
        )
        .unwrap()
    }

    fn join() -> Vec<String> {
        vec!["id".to_string()]
    }

    #[test]
    fn test_no_overlap() {
        let target = batch(vec![Some(1), Some(2)], vec!["a", "b"], vec!["", ""]);
        let incoming = batch(vec![Some(3)], vec!["c"], vec![""]);
        assert!(!needs_merge(&incoming, &target, &join(), &[]).unwrap());
    }

    #[test]
    fn test_overlap_with_difference() {
        let target = batch(vec![Some(1), Some(2)], vec!["a", "b"], vec!["", ""]);
        let incoming = batch(vec![Some(2), Some(3)], vec!["B", "c"], vec!["", ""]);
        let check = check_merge(&incoming, &target, &join(), &[]).unwrap();
        assert_eq!(
            check,
            MergeCheck {
                overlapping: 1,
                changed: 1
            }
        );
        assert!(check.needs_merge());
    }

    #[test]
    fn test_ignored_columns() {
        let target = batch(vec![Some(1)], vec!["a"], vec!["old"]);
        let incoming = batch(vec![Some(1)], vec!["a"], vec!["new"]);
        let check = check_merge(&incoming, &target, &join(), &["note".to_string()]).unwrap();
        assert_eq!(check.overlapping, 1);
        assert_eq!(check.changed, 0);
        let check = check_merge(&incoming, &target, &join(), &[]).unwrap();
        assert_eq!(check.changed, 1);
    }

    #[test]
    fn test_null_keys_do_not_overlap() {
        let target = batch(vec![None], vec!["a"], vec![""]);
        let incoming = batch(vec![None], vec!["a"], vec![""]);
        assert!(!needs_merge(&incoming, &target, &join(), &[]).unwrap());
    }

    #[test]
    fn test_empty_target() {
        let target = batch(vec![], vec![], vec![]);
        let incoming = batch(vec![Some(1)], vec!["a"], vec![""]);
        assert!(!needs_merge(&incoming, &target, &join(), &[]).unwrap());
    }

    #[test]
    fn test_missing_join_column() {
        let target = batch(vec![Some(1)], vec!["a"], vec![""]);
        let incoming = batch(vec![Some(1)], vec!["a"], vec![""]);
        assert!(check_merge(&incoming, &target, &["missing".to_string()], &[]).is_err());
    }
}
