use tablespec_catalog::statement::MergeStatement;

/// Builds the merge of `source` into `target` for a batch with the given columns.
///
/// Every non-join column is updated on a match and every column is inserted
/// otherwise. Column order follows the batch.
pub fn merge_statement(
    target: &str,
    source: &str,
    join_cols: &[String],
    columns: &[String],
) -> MergeStatement {
    MergeStatement {
        target: target.to_string(),
        source: source.to_string(),
        join_columns: join_cols.to_vec(),
        update_columns: columns
            .iter()
            .filter(|c| !join_cols.contains(c))
            .cloned()
            .collect(),
        insert_columns: columns.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_merge_statement_columns() {
        let merge = merge_statement(
            "sales.orders",
            "global_temp.staged",
            &names(&["id"]),
            &names(&["id", "amount", "region"]),
        );
        assert_eq!(merge.update_columns, names(&["amount", "region"]));
        assert_eq!(merge.insert_columns, names(&["id", "amount", "region"]));
        assert!(merge
            .to_string()
            .starts_with("MERGE INTO sales.orders AS target\nUSING global_temp.staged AS source"));
    }

    #[test]
    fn test_all_join_columns() {
        let merge = merge_statement("t", "s", &names(&["a", "b"]), &names(&["a", "b"]));
        assert!(merge.update_columns.is_empty());
        assert!(!merge.to_string().contains("WHEN MATCHED"));
    }
}
