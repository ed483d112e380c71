use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use datafusion::arrow::array::{new_null_array, ArrayRef, RecordBatch};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes as adt;
use log::debug;
use tablespec_catalog::error::{CatalogError, CatalogResult};
use tablespec_catalog::name::TableName;
use tablespec_catalog::provider::{
    DatabaseDescription, DescribeRow, TableDescription, TableDetail, TableStore, WriteMode,
};
use tablespec_catalog::statement::{
    AlterTableAction, CreateDatabaseStatement, CreateTableStatement, Statement,
};
use tablespec_catalog::table_spec::{WellKnownProperty, DELTA_FORMAT};
use tablespec_catalog::temp_view::TemporaryViewManager;
use tablespec_catalog::utils::{anonymous_identifier, parse_anonymous_identifier};
use tablespec_common::spec::{Field, FieldMetadataKey, Schema};

use crate::merge::merge_batches;

const DEFAULT_DATABASE: &str = "default";
const DEFAULT_WAREHOUSE: &str = "dbfs:/user/hive/warehouse";
const DEFAULT_MIN_READER_VERSION: u32 = 1;
const DEFAULT_MIN_WRITER_VERSION: u32 = 2;
const COLUMN_MAPPING_NAME: &str = "name";

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: Schema,
    partitioned_by: Vec<String>,
    comment: Option<String>,
    properties: BTreeMap<String, String>,
    min_reader_version: u32,
    min_writer_version: u32,
    data: RecordBatch,
}

impl MemoryTable {
    fn new(schema: Schema) -> Self {
        let data = RecordBatch::new_empty(Arc::new(schema.to_arrow()));
        Self {
            schema,
            partitioned_by: vec![],
            comment: None,
            properties: BTreeMap::new(),
            min_reader_version: DEFAULT_MIN_READER_VERSION,
            min_writer_version: DEFAULT_MIN_WRITER_VERSION,
            data,
        }
    }

    fn set_property(&mut self, key: &str, value: &str) -> CatalogResult<()> {
        let protocol = match WellKnownProperty::from_key(key) {
            Some(p) if p.is_protocol_version() => p,
            _ => {
                self.properties.insert(key.to_string(), value.to_string());
                return Ok(());
            }
        };
        let version = value.trim().parse::<u32>().map_err(|e| {
            CatalogError::Store(format!("invalid protocol version {key} = {value}: {e}"))
        })?;
        let current = match protocol {
            WellKnownProperty::MinReaderVersion => &mut self.min_reader_version,
            _ => &mut self.min_writer_version,
        };
        if version < *current {
            return Err(CatalogError::Store(format!(
                "cannot downgrade {key} from {current} to {version}"
            )));
        }
        *current = version;
        Ok(())
    }

    fn column_mapping_enabled(&self) -> bool {
        self.properties
            .get(WellKnownProperty::ColumnMappingMode.key())
            .is_some_and(|mode| mode == COLUMN_MAPPING_NAME)
    }

    fn update_field(
        &mut self,
        column: &str,
        f: impl FnOnce(Field) -> Field,
    ) -> CatalogResult<()> {
        let mut fields = self.schema.fields.iter().map(|x| x.as_ref().clone()).collect::<Vec<_>>();
        let field = fields
            .iter_mut()
            .find(|x| x.name == column)
            .ok_or_else(|| CatalogError::NotFound("column", column.to_string()))?;
        *field = f(field.clone());
        self.schema = Schema::new(fields);
        Ok(())
    }

    fn describe(&self) -> Vec<DescribeRow> {
        let mut rows = self
            .schema
            .fields
            .iter()
            .map(|field| DescribeRow {
                col_name: field.name.clone(),
                data_type: field.data_type.to_string(),
                comment: field.comment().map(String::from),
            })
            .collect::<Vec<_>>();
        if !self.partitioned_by.is_empty() {
            rows.push(DescribeRow::new("", ""));
            rows.push(DescribeRow::new("# Partitioning", ""));
            rows.extend(
                self.partitioned_by
                    .iter()
                    .enumerate()
                    .map(|(i, column)| DescribeRow::new(format!("Part {i}"), column.clone())),
            );
        }
        rows
    }
}

fn without_metadata(field: Field, key: &str) -> Field {
    Field {
        metadata: field
            .metadata
            .into_iter()
            .filter(|(k, _)| k != key)
            .collect(),
        ..field
    }
}

/// Lines the columns of a batch up with the table schema, by name.
/// Columns missing from the batch are filled with nulls.
fn align_batch(schema: &Schema, batch: &RecordBatch) -> CatalogResult<RecordBatch> {
    if let Some(extra) = batch
        .schema()
        .fields()
        .iter()
        .find(|f| schema.field(f.name()).is_none())
    {
        return Err(CatalogError::Store(format!(
            "column {} is not in the table schema",
            extra.name()
        )));
    }
    let target = schema.to_arrow();
    let mut fields = Vec::with_capacity(target.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(target.fields().len());
    for field in target.fields() {
        let column = match batch.column_by_name(field.name()) {
            Some(c) if c.data_type().equals_datatype(field.data_type()) => Arc::clone(c),
            Some(c) => cast(c, field.data_type())?,
            None => new_null_array(field.data_type(), batch.num_rows()),
        };
        fields.push(adt::Field::new(
            field.name(),
            column.data_type().clone(),
            field.is_nullable(),
        ));
        columns.push(column);
    }
    Ok(RecordBatch::try_new(
        Arc::new(adt::Schema::new(fields)),
        columns,
    )?)
}

/// An in-memory table store with Delta table semantics.
///
/// Table data lives at a location. Named tables without an explicit location
/// are placed under the warehouse directory, like managed tables.
/// Executed statements are recorded in order.
#[derive(Debug)]
pub struct MemoryTableStore {
    warehouse: String,
    databases: DashMap<String, DatabaseDescription>,
    names: DashMap<String, String>,
    tables: DashMap<String, MemoryTable>,
    temp_views: TemporaryViewManager,
    history: Mutex<Vec<String>>,
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTableStore {
    pub fn new() -> Self {
        let databases = DashMap::new();
        databases.insert(
            DEFAULT_DATABASE.to_string(),
            DatabaseDescription {
                name: DEFAULT_DATABASE.to_string(),
                location: Some(DEFAULT_WAREHOUSE.to_string()),
                ..Default::default()
            },
        );
        Self {
            warehouse: DEFAULT_WAREHOUSE.to_string(),
            databases,
            names: DashMap::new(),
            tables: DashMap::new(),
            temp_views: TemporaryViewManager::new(),
            history: Mutex::new(vec![]),
        }
    }

    /// The text of every statement executed so far.
    pub fn history(&self) -> CatalogResult<Vec<String>> {
        Ok(self
            .history
            .lock()
            .map_err(|e| CatalogError::Internal(e.to_string()))?
            .clone())
    }

    pub fn temp_views(&self) -> CatalogResult<Vec<String>> {
        self.temp_views.list_views()
    }

    fn record(&self, statement: &Statement) -> CatalogResult<()> {
        self.history
            .lock()
            .map_err(|e| CatalogError::Internal(e.to_string()))?
            .push(statement.to_string());
        Ok(())
    }

    fn normalize_name(name: &str) -> CatalogResult<(String, TableName)> {
        let mut parsed = TableName::parse(&name.to_lowercase())?;
        if parsed.database.is_none() {
            parsed.database = Some(DEFAULT_DATABASE.to_string());
        }
        Ok((parsed.to_string(), parsed))
    }

    /// Finds the location that holds the data of a table.
    fn locate(&self, identifier: &str) -> CatalogResult<Option<String>> {
        if let Some(location) = parse_anonymous_identifier(identifier) {
            return Ok(self.tables.contains_key(&location).then_some(location));
        }
        let (name, _) = Self::normalize_name(identifier)?;
        Ok(self.names.get(&name).map(|x| x.value().clone()))
    }

    fn require_location(&self, identifier: &str) -> CatalogResult<String> {
        self.locate(identifier)?
            .ok_or_else(|| CatalogError::NotFound("table", identifier.to_string()))
    }

    fn managed_location(&self, name: &TableName) -> String {
        let database = name.database.as_deref().unwrap_or(DEFAULT_DATABASE);
        format!("{}/{database}.db/{}", self.warehouse, name.table)
    }

    fn create_database(&self, create: &CreateDatabaseStatement) -> CatalogResult<()> {
        let name = create.database.to_lowercase();
        if let Entry::Vacant(entry) = self.databases.entry(name.clone()) {
            let location = create
                .location
                .clone()
                .unwrap_or_else(|| format!("{}/{name}.db", self.warehouse));
            entry.insert(DatabaseDescription {
                name,
                comment: create.comment.clone(),
                location: Some(location),
                properties: create.properties.clone(),
            });
        }
        Ok(())
    }

    fn create_table(&self, create: &CreateTableStatement) -> CatalogResult<()> {
        if create.format != DELTA_FORMAT {
            return Err(CatalogError::NotSupported(format!(
                "table format {}",
                create.format
            )));
        }
        let anonymous = parse_anonymous_identifier(&create.table);
        let (name, location) = match anonymous {
            Some(location) => (None, location),
            None => {
                let (name, parsed) = Self::normalize_name(&create.table)?;
                let database = parsed.database.as_deref().unwrap_or(DEFAULT_DATABASE);
                if !self.databases.contains_key(database) {
                    return Err(CatalogError::NotFound("database", database.to_string()));
                }
                if self.names.contains_key(&name) {
                    return Err(CatalogError::AlreadyExists("table", name));
                }
                let location = create
                    .location
                    .clone()
                    .unwrap_or_else(|| self.managed_location(&parsed));
                (Some(name), location)
            }
        };
        let mut table = MemoryTable::new(create.schema.clone());
        table.partitioned_by = create.partitioned_by.clone();
        table.comment = create.comment.clone();
        for (key, value) in &create.properties {
            table.set_property(key, value)?;
        }
        match self.tables.entry(location.clone()) {
            Entry::Occupied(_) => {
                return Err(CatalogError::AlreadyExists("table at location", location))
            }
            Entry::Vacant(entry) => {
                entry.insert(table);
            }
        }
        if let Some(name) = name {
            self.names.insert(name, location);
        }
        Ok(())
    }

    fn register_table(&self, table: &str, location: &str) -> CatalogResult<()> {
        let (name, _) = Self::normalize_name(table)?;
        if self.names.contains_key(&name) {
            return Ok(());
        }
        if !self.tables.contains_key(location) {
            return Err(CatalogError::NotFound(
                "table at location",
                location.to_string(),
            ));
        }
        self.names.insert(name, location.to_string());
        Ok(())
    }

    fn alter_table(&self, identifier: &str, action: &AlterTableAction) -> CatalogResult<()> {
        let location = self.require_location(identifier)?;
        let mut table = self
            .tables
            .get_mut(&location)
            .ok_or_else(|| CatalogError::NotFound("table", identifier.to_string()))?;
        match action {
            AlterTableAction::AddColumn(field) => {
                if table.schema.field(&field.name).is_some() {
                    return Err(CatalogError::AlreadyExists("column", field.name.clone()));
                }
                let mut fields = table
                    .schema
                    .fields
                    .iter()
                    .map(|x| x.as_ref().clone())
                    .collect::<Vec<_>>();
                fields.push(field.clone());
                table.schema = Schema::new(fields);
                table.data = align_batch(&table.schema, &table.data)?;
            }
            AlterTableAction::DropColumn(column) => {
                if !table.column_mapping_enabled() {
                    return Err(CatalogError::NotSupported(format!(
                        "dropping column {column} requires column mapping by name"
                    )));
                }
                if table.partitioned_by.contains(column) {
                    return Err(CatalogError::NotSupported(format!(
                        "dropping partition column {column}"
                    )));
                }
                let fields = table
                    .schema
                    .fields
                    .iter()
                    .filter(|x| x.name != *column)
                    .map(|x| x.as_ref().clone())
                    .collect::<Vec<_>>();
                if fields.len() == table.schema.len() {
                    return Err(CatalogError::NotFound("column", column.clone()));
                }
                table.schema = Schema::new(fields);
                let data = table.data.clone();
                let projected = data.schema();
                let indices = projected
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.name() != column)
                    .map(|(i, _)| i)
                    .collect::<Vec<_>>();
                table.data = data.project(&indices)?;
            }
            AlterTableAction::AlterColumnComment { column, comment } => {
                table.update_field(column, |field| {
                    if comment.is_empty() {
                        without_metadata(field, FieldMetadataKey::COMMENT)
                    } else {
                        field.with_comment(comment.clone())
                    }
                })?;
            }
            AlterTableAction::AlterColumnSetDefault { column, expression } => {
                table.update_field(column, |field| field.with_default(expression.clone()))?;
            }
            AlterTableAction::AlterColumnDropDefault { column } => {
                table.update_field(column, |field| {
                    without_metadata(field, FieldMetadataKey::CURRENT_DEFAULT)
                })?;
            }
            AlterTableAction::SetProperty { key, value } => table.set_property(key, value)?,
            AlterTableAction::UnsetProperty { key } => {
                table.properties.remove(key);
            }
            AlterTableAction::SetComment(comment) => {
                table.comment = Some(comment.clone()).filter(|c| !c.is_empty());
            }
        }
        Ok(())
    }

    fn drop_table(&self, identifier: &str, if_exists: bool) -> CatalogResult<()> {
        let location = match self.locate(identifier)? {
            Some(location) => location,
            None if if_exists => return Ok(()),
            None => return Err(CatalogError::NotFound("table", identifier.to_string())),
        };
        match parse_anonymous_identifier(identifier) {
            Some(_) => {
                self.tables.remove(&location);
            }
            None => {
                let (name, parsed) = Self::normalize_name(identifier)?;
                self.names.remove(&name);
                if location == self.managed_location(&parsed) {
                    self.tables.remove(&location);
                }
            }
        }
        Ok(())
    }
}

impl TableStore for MemoryTableStore {
    fn describe_table(&self, identifier: &str) -> CatalogResult<TableDescription> {
        let location = self.require_location(identifier)?;
        let table = self
            .tables
            .get(&location)
            .ok_or_else(|| CatalogError::NotFound("table", identifier.to_string()))?;
        Ok(TableDescription {
            schema: table.schema.clone(),
            rows: table.describe(),
            detail: TableDetail {
                format: DELTA_FORMAT.to_string(),
                location: Some(location.clone()),
                comment: table.comment.clone(),
                properties: table.properties.clone(),
                min_reader_version: Some(table.min_reader_version),
                min_writer_version: Some(table.min_writer_version),
            },
        })
    }

    fn describe_database(&self, name: &str) -> CatalogResult<DatabaseDescription> {
        self.databases
            .get(&name.to_lowercase())
            .map(|x| x.value().clone())
            .ok_or_else(|| CatalogError::NotFound("database", name.to_string()))
    }

    fn table_exists(&self, identifier: &str) -> CatalogResult<bool> {
        Ok(self.locate(identifier)?.is_some())
    }

    fn execute(&self, statement: &Statement) -> CatalogResult<()> {
        debug!("executing: {statement}");
        match statement {
            Statement::CreateTable(create) => self.create_table(create)?,
            Statement::CreateDatabase(create) => self.create_database(create)?,
            Statement::RegisterTable { table, location } => self.register_table(table, location)?,
            Statement::AlterTable { table, action } => self.alter_table(table, action)?,
            Statement::Merge(merge) => {
                let source = self.read(&merge.source)?;
                let location = self.require_location(&merge.target)?;
                let mut table = self
                    .tables
                    .get_mut(&location)
                    .ok_or_else(|| CatalogError::NotFound("table", merge.target.clone()))?;
                let source = align_batch(&table.schema, &source)?;
                table.data = merge_batches(merge, &table.data, &source)?;
            }
            Statement::TruncateTable { table } => {
                let location = self.require_location(table)?;
                if let Some(mut table) = self.tables.get_mut(&location) {
                    table.data = RecordBatch::new_empty(table.data.schema());
                }
            }
            Statement::DropTable { table, if_exists } => self.drop_table(table, *if_exists)?,
        }
        self.record(statement)
    }

    fn read(&self, identifier: &str) -> CatalogResult<RecordBatch> {
        if let Some(view) = self.temp_views.find_view(&identifier.to_lowercase())? {
            return Ok(view);
        }
        let location = self.require_location(identifier)?;
        self.tables
            .get(&location)
            .map(|x| x.data.clone())
            .ok_or_else(|| CatalogError::NotFound("table", identifier.to_string()))
    }

    fn write(&self, identifier: &str, batch: RecordBatch, mode: WriteMode) -> CatalogResult<()> {
        debug!("writing {} rows to {identifier} in {mode} mode", batch.num_rows());
        let location = match self.locate(identifier)? {
            Some(location) => location,
            None => match parse_anonymous_identifier(identifier) {
                Some(location) => {
                    let schema = Schema::try_from(batch.schema().as_ref())?;
                    self.tables.insert(location.clone(), MemoryTable::new(schema));
                    location
                }
                None => return Err(CatalogError::NotFound("table", identifier.to_string())),
            },
        };
        let mut table = self
            .tables
            .get_mut(&location)
            .ok_or_else(|| CatalogError::NotFound("table", anonymous_identifier(&location)))?;
        let batch = align_batch(&table.schema, &batch)?;
        table.data = match mode {
            WriteMode::Append => {
                let data = align_batch(&table.schema, &table.data)?;
                datafusion::arrow::compute::concat_batches(&batch.schema(), [&data, &batch])?
            }
            WriteMode::Overwrite => batch,
        };
        Ok(())
    }

    fn create_temp_view(
        &self,
        database: &str,
        name: &str,
        batch: RecordBatch,
    ) -> CatalogResult<String> {
        let identifier = format!("{database}.{name}").to_lowercase();
        self.temp_views.add_view(identifier.clone(), batch, true)?;
        Ok(identifier)
    }

    fn drop_temp_view(&self, identifier: &str) -> CatalogResult<()> {
        self.temp_views.remove_view(&identifier.to_lowercase(), false)
    }

    fn delete_location(&self, location: &str) -> CatalogResult<()> {
        let prefix = location.trim_end_matches('/');
        self.tables
            .retain(|key, _| key != prefix && !key.starts_with(&format!("{prefix}/")));
        self.names
            .retain(|_, target| target != prefix && !target.starts_with(&format!("{prefix}/")));
        Ok(())
    }
}
