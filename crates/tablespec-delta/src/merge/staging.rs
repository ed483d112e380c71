use datafusion::arrow::array::RecordBatch;
use log::{debug, warn};
use tablespec_catalog::provider::TableStore;
use twox_hash::XxHash64;

use crate::error::DeltaResult;

const STAGING_VIEW_HASH_SEED: u64 = 0;

/// Derives the staging view name from the join columns and the batch columns.
/// The same inputs always give the same name.
pub fn staging_view_name(prefix: &str, join_cols: &[String], columns: &[String]) -> String {
    let mut key = Vec::new();
    for c in join_cols {
        key.extend_from_slice(c.as_bytes());
        key.push(0);
    }
    key.push(1);
    for c in columns {
        key.extend_from_slice(c.as_bytes());
        key.push(0);
    }
    let hash = XxHash64::oneshot(STAGING_VIEW_HASH_SEED, &key);
    format!("{prefix}_{hash:016x}")
}

/// A temporary view that lives as long as this guard.
pub struct StagedView<'a> {
    store: &'a dyn TableStore,
    identifier: String,
}

impl<'a> StagedView<'a> {
    pub fn create(
        store: &'a dyn TableStore,
        database: &str,
        name: &str,
        batch: RecordBatch,
    ) -> DeltaResult<Self> {
        let identifier = store.create_temp_view(database, name, batch)?;
        debug!("staged temporary view {identifier}");
        Ok(Self { store, identifier })
    }

    /// The qualified name to reference the view in statements.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for StagedView<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.drop_temp_view(&self.identifier) {
            warn!("failed to drop temporary view {}: {e}", self.identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_staging_view_name_is_deterministic() {
        let a = staging_view_name("upsert", &names(&["id"]), &names(&["id", "v"]));
        let b = staging_view_name("upsert", &names(&["id"]), &names(&["id", "v"]));
        assert_eq!(a, b);
        assert!(a.starts_with("upsert_"));
        assert_eq!(a.len(), "upsert_".len() + 16);
        let c = staging_view_name("upsert", &names(&["id", "v"]), &names(&["id", "v"]));
        assert_ne!(a, c);
    }
}
