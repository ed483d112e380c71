use std::collections::BTreeMap;
use std::fmt;

use datafusion::arrow::array::RecordBatch;
use tablespec_common::spec::Schema;

use crate::error::CatalogResult;
use crate::statement::Statement;

/// One row of the `DESCRIBE TABLE` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeRow {
    pub col_name: String,
    pub data_type: String,
    pub comment: Option<String>,
}

impl DescribeRow {
    pub fn new(col_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            col_name: col_name.into(),
            data_type: data_type.into(),
            comment: None,
        }
    }
}

/// The `DESCRIBE DETAIL` output of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDetail {
    pub format: String,
    pub location: Option<String>,
    pub comment: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub min_reader_version: Option<u32>,
    pub min_writer_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub schema: Schema,
    pub rows: Vec<DescribeRow>,
    pub detail: TableDetail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseDescription {
    pub name: String,
    pub comment: Option<String>,
    pub location: Option<String>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Append => write!(f, "append"),
            WriteMode::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// The table store that holds the live tables.
///
/// Tables are addressed by identifier: a qualified table name,
/// or ``delta.`<location>` `` for tables known only by their location.
/// Every call blocks until the store has completed the request.
pub trait TableStore: Send + Sync {
    fn describe_table(&self, identifier: &str) -> CatalogResult<TableDescription>;

    fn describe_database(&self, name: &str) -> CatalogResult<DatabaseDescription>;

    fn table_exists(&self, identifier: &str) -> CatalogResult<bool>;

    fn execute(&self, statement: &Statement) -> CatalogResult<()>;

    fn read(&self, identifier: &str) -> CatalogResult<RecordBatch>;

    fn write(&self, identifier: &str, batch: RecordBatch, mode: WriteMode) -> CatalogResult<()>;

    /// Registers a temporary view under the database and returns the qualified
    /// identifier that statements use to read it.
    fn create_temp_view(
        &self,
        database: &str,
        name: &str,
        batch: RecordBatch,
    ) -> CatalogResult<String>;

    /// Drops a view by the identifier [`TableStore::create_temp_view`] returned.
    fn drop_temp_view(&self, identifier: &str) -> CatalogResult<()>;

    /// Removes all files under the location.
    fn delete_location(&self, location: &str) -> CatalogResult<()>;
}
