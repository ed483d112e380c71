use std::collections::{HashMap, HashSet};

use datafusion::arrow::array::{new_null_array, Array, ArrayRef, RecordBatch};
use datafusion::arrow::compute::{cast, interleave};
use datafusion::arrow::row::{OwnedRow, RowConverter, SortField};
use tablespec_catalog::error::{CatalogError, CatalogResult};
use tablespec_catalog::statement::MergeStatement;

fn column(batch: &RecordBatch, name: &str, side: &str) -> CatalogResult<ArrayRef> {
    batch
        .column_by_name(name)
        .cloned()
        .ok_or_else(|| CatalogError::Store(format!("{side} has no column {name}")))
}

fn join_keys(
    converter: &RowConverter,
    columns: &[ArrayRef],
    num_rows: usize,
) -> CatalogResult<Vec<Option<OwnedRow>>> {
    let rows = converter.convert_columns(columns)?;
    Ok((0..num_rows)
        .map(|i| {
            if columns.iter().any(|c| c.is_null(i)) {
                None
            } else {
                Some(rows.row(i).owned())
            }
        })
        .collect())
}

/// Applies a merge of `source` into `target` and returns the new target data.
///
/// Join keys containing nulls never match. A target row matched by more than
/// one source row is an error.
pub fn merge_batches(
    merge: &MergeStatement,
    target: &RecordBatch,
    source: &RecordBatch,
) -> CatalogResult<RecordBatch> {
    if merge.join_columns.is_empty() {
        return Err(CatalogError::Store(
            "merge requires at least one join column".to_string(),
        ));
    }
    let target_keys = merge
        .join_columns
        .iter()
        .map(|c| column(target, c, "merge target"))
        .collect::<CatalogResult<Vec<_>>>()?;
    let source_keys = merge
        .join_columns
        .iter()
        .zip(target_keys.iter())
        .map(|(c, t)| Ok(cast(&column(source, c, "merge source")?, t.data_type())?))
        .collect::<CatalogResult<Vec<_>>>()?;
    let converter = RowConverter::new(
        target_keys
            .iter()
            .map(|c| SortField::new(c.data_type().clone()))
            .collect(),
    )?;

    let mut target_index: HashMap<OwnedRow, usize> = HashMap::new();
    for (i, key) in join_keys(&converter, &target_keys, target.num_rows())?
        .into_iter()
        .enumerate()
    {
        if let Some(key) = key {
            target_index.entry(key).or_insert(i);
        }
    }

    let mut matched: HashMap<usize, usize> = HashMap::new();
    let mut inserted: Vec<usize> = vec![];
    for (j, key) in join_keys(&converter, &source_keys, source.num_rows())?
        .into_iter()
        .enumerate()
    {
        match key.and_then(|k| target_index.get(&k).copied()) {
            Some(i) => {
                if matched.insert(i, j).is_some() {
                    return Err(CatalogError::Store(format!(
                        "multiple source rows matched target row {i} during merge"
                    )));
                }
            }
            None => inserted.push(j),
        }
    }

    let update_columns: HashSet<&str> = merge.update_columns.iter().map(String::as_str).collect();
    let insert_columns: HashSet<&str> = merge.insert_columns.iter().map(String::as_str).collect();
    let schema = target.schema();
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (index, field) in schema.fields().iter().enumerate() {
        let name = field.name().as_str();
        let target_column = target.column(index);
        let source_column = match source.column_by_name(name) {
            Some(c) => cast(c, field.data_type())?,
            None if update_columns.contains(name) || insert_columns.contains(name) => {
                return Err(CatalogError::Store(format!(
                    "merge source has no column {name}"
                )))
            }
            None => new_null_array(field.data_type(), 0),
        };
        let nulls = new_null_array(field.data_type(), 1);
        let mut indices: Vec<(usize, usize)> = (0..target.num_rows())
            .map(|i| match matched.get(&i) {
                Some(j) if update_columns.contains(name) => (1, *j),
                _ => (0, i),
            })
            .collect();
        indices.extend(inserted.iter().map(|j| {
            if insert_columns.contains(name) {
                (1, *j)
            } else {
                (2, 0)
            }
        }));
        let arrays: [&dyn Array; 3] = [target_column.as_ref(), source_column.as_ref(), nulls.as_ref()];
        columns.push(interleave(&arrays, &indices)?);
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}
