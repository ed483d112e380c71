use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use datafusion::arrow::array::RecordBatch;

use crate::error::{CatalogError, CatalogResult};

/// Named in-memory datasets visible to statements executed by the same store.
#[derive(Debug, Default)]
pub struct TemporaryViewManager {
    views: RwLock<HashMap<String, RecordBatch>>,
}

impl TemporaryViewManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CatalogResult<RwLockReadGuard<'_, HashMap<String, RecordBatch>>> {
        self.views
            .read()
            .map_err(|e| CatalogError::Internal(e.to_string()))
    }

    fn write(&self) -> CatalogResult<RwLockWriteGuard<'_, HashMap<String, RecordBatch>>> {
        self.views
            .write()
            .map_err(|e| CatalogError::Internal(e.to_string()))
    }

    pub fn add_view(&self, name: String, batch: RecordBatch, replace: bool) -> CatalogResult<()> {
        let mut views = self.write()?;
        if views.contains_key(&name) && !replace {
            return Err(CatalogError::AlreadyExists("temporary view", name));
        }
        views.insert(name, batch);
        Ok(())
    }

    pub fn remove_view(&self, name: &str, if_exists: bool) -> CatalogResult<()> {
        let mut views = self.write()?;
        if views.remove(name).is_none() && !if_exists {
            return Err(CatalogError::NotFound("temporary view", name.to_string()));
        }
        Ok(())
    }

    pub fn get_view(&self, name: &str) -> CatalogResult<RecordBatch> {
        let views = self.read()?;
        views
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound("temporary view", name.to_string()))
    }

    pub fn find_view(&self, name: &str) -> CatalogResult<Option<RecordBatch>> {
        Ok(self.read()?.get(name).cloned())
    }

    pub fn list_views(&self) -> CatalogResult<Vec<String>> {
        let mut names = self.read()?.keys().cloned().collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }
}
