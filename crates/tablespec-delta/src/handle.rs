use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use datafusion::arrow::array::RecordBatch;
use log::info;
use tablespec_catalog::name::TableName;
use tablespec_catalog::provider::{Resolver, TableStore, WriteMode};
use tablespec_catalog::statement::{CreateTableStatement, Statement};
use tablespec_catalog::table_spec::{partitioning_from_rows, DELTA_FORMAT};
use tablespec_catalog::utils::anonymous_identifier;
use tablespec_common::config::UpsertConfig;
use tablespec_common::spec::Schema;

use crate::error::{DeltaError, DeltaResult};
use crate::options::{HandlePropertyKey, StreamReadOptions};
use crate::upsert::{UpsertEngine, UpsertOutcome};

/// A handle on a Delta table addressed by name, by location, or both.
///
/// Data is read and written through the location when one is given,
/// and through the name otherwise.
pub struct DeltaHandle {
    store: Arc<dyn TableStore>,
    upsert_config: UpsertConfig,
    id: Option<String>,
    name: Option<String>,
    location: Option<String>,
    read_options: StreamReadOptions,
    partitioning: RwLock<Option<Vec<String>>>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn parse_stream_start(value: &str) -> DeltaResult<DateTime<Utc>> {
    if let Ok(start) = DateTime::parse_from_rfc3339(value) {
        return Ok(start.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map(|start| start.and_utc())
        .map_err(|e| DeltaError::invalid(format!("invalid stream start '{value}': {e}")))
}

impl DeltaHandle {
    pub fn try_new(
        store: Arc<dyn TableStore>,
        upsert_config: &UpsertConfig,
        name: Option<&str>,
        location: Option<&str>,
        format: &str,
    ) -> DeltaResult<Self> {
        let name = non_empty(name);
        let location = non_empty(location);
        match &name {
            Some(name) => {
                TableName::parse(name).map_err(|e| DeltaError::InvalidName(e.to_string()))?;
            }
            None if location.is_none() => {
                return Err(DeltaError::InvalidName(
                    "a table handle needs a name or a location".to_string(),
                ))
            }
            None => {}
        }
        if !format.trim().eq_ignore_ascii_case(DELTA_FORMAT) {
            return Err(DeltaError::InvalidFormat(format!(
                "only {DELTA_FORMAT} is supported, got {format}"
            )));
        }
        Ok(Self {
            store,
            upsert_config: upsert_config.clone(),
            id: None,
            name,
            location,
            read_options: StreamReadOptions::default(),
            partitioning: RwLock::new(None),
        })
    }

    /// Creates a handle from the resolver entry of `id`.
    pub fn from_id(
        store: Arc<dyn TableStore>,
        upsert_config: &UpsertConfig,
        resolver: &dyn Resolver,
        id: &str,
    ) -> DeltaResult<Self> {
        let details = resolver.resolve(id)?;
        let handle = Self::try_new(
            store,
            upsert_config,
            details.name.as_deref(),
            details.path.as_deref(),
            details.format.as_deref().unwrap_or(DELTA_FORMAT),
        )?;
        let properties = &details.properties;
        let ignore_changes = match properties.get(HandlePropertyKey::IGNORE_CHANGES) {
            Some(value) => value.trim().to_lowercase().parse::<bool>().map_err(|e| {
                DeltaError::invalid(format!("invalid {}: {e}", HandlePropertyKey::IGNORE_CHANGES))
            })?,
            None => true,
        };
        let stream_start = non_empty(
            properties
                .get(HandlePropertyKey::STREAM_START)
                .map(String::as_str),
        )
        .map(|v| parse_stream_start(&v))
        .transpose()?;
        let max_bytes_per_trigger = non_empty(
            properties
                .get(HandlePropertyKey::MAX_BYTES_PER_TRIGGER)
                .map(String::as_str),
        )
        .map(|v| {
            v.parse::<u64>().map_err(|e| {
                DeltaError::invalid(format!(
                    "invalid {}: {e}",
                    HandlePropertyKey::MAX_BYTES_PER_TRIGGER
                ))
            })
        })
        .transpose()?;
        Ok(Self {
            id: Some(id.to_string()),
            read_options: StreamReadOptions {
                ignore_changes,
                stream_start,
                max_bytes_per_trigger,
                extra: details.options,
            },
            ..handle
        })
    }

    pub fn with_read_options(mut self, options: StreamReadOptions) -> Self {
        self.read_options = options;
        self
    }

    /// The resolver id this handle was created from.
    pub fn table_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The name used in statements: the table name, or the location identifier.
    pub fn table_name(&self) -> String {
        match (&self.name, &self.location) {
            (Some(name), _) => name.clone(),
            (None, Some(location)) => anonymous_identifier(location),
            (None, None) => String::new(),
        }
    }

    fn data_identifier(&self) -> String {
        match &self.location {
            Some(location) => anonymous_identifier(location),
            None => self.table_name(),
        }
    }

    pub fn read(&self) -> DeltaResult<RecordBatch> {
        Ok(self.store.read(&self.data_identifier())?)
    }

    pub fn overwrite(&self, batch: RecordBatch) -> DeltaResult<()> {
        Ok(self
            .store
            .write(&self.data_identifier(), batch, WriteMode::Overwrite)?)
    }

    pub fn append(&self, batch: RecordBatch) -> DeltaResult<()> {
        Ok(self
            .store
            .write(&self.data_identifier(), batch, WriteMode::Append)?)
    }

    pub fn truncate(&self) -> DeltaResult<()> {
        Ok(self.store.execute(&Statement::TruncateTable {
            table: self.table_name(),
        })?)
    }

    pub fn drop(&self) -> DeltaResult<()> {
        self.store.execute(&Statement::DropTable {
            table: self.table_name(),
            if_exists: true,
        })?;
        self.invalidate_partitioning()
    }

    /// Drops the table and deletes the data at its location.
    pub fn drop_and_delete(&self) -> DeltaResult<()> {
        self.drop()?;
        if let Some(location) = &self.location {
            info!("deleting {location}");
            self.store.delete_location(location)?;
        }
        Ok(())
    }

    /// Registers the table name in the metastore, pointing at the location if one is given.
    pub fn create_hive_table(&self) -> DeltaResult<()> {
        let Some(name) = &self.name else {
            return Err(DeltaError::InvalidName(
                "registering a table requires a name".to_string(),
            ));
        };
        let statement = match &self.location {
            Some(location) => Statement::RegisterTable {
                table: name.clone(),
                location: location.clone(),
            },
            None if self.store.table_exists(name)? => return Ok(()),
            None => Statement::CreateTable(CreateTableStatement {
                table: name.clone(),
                schema: Schema::default(),
                format: DELTA_FORMAT.to_string(),
                options: BTreeMap::new(),
                partitioned_by: vec![],
                location: None,
                comment: None,
                properties: BTreeMap::new(),
            }),
        };
        Ok(self.store.execute(&statement)?)
    }

    pub fn recreate_hive_table(&self) -> DeltaResult<()> {
        self.drop()?;
        self.create_hive_table()
    }

    fn invalidate_partitioning(&self) -> DeltaResult<()> {
        let mut partitioning = self
            .partitioning
            .write()
            .map_err(|e| DeltaError::invalid(format!("partitioning cache poisoned: {e}")))?;
        *partitioning = None;
        Ok(())
    }

    /// The partition columns in partition order. Computed once per handle.
    pub fn get_partitioning(&self) -> DeltaResult<Vec<String>> {
        if let Some(partitioning) = self
            .partitioning
            .read()
            .map_err(|e| DeltaError::invalid(format!("partitioning cache poisoned: {e}")))?
            .as_ref()
        {
            return Ok(partitioning.clone());
        }
        let description = self.store.describe_table(&self.table_name())?;
        let partitioning = partitioning_from_rows(&description.rows)?;
        *self
            .partitioning
            .write()
            .map_err(|e| DeltaError::invalid(format!("partitioning cache poisoned: {e}")))? =
            Some(partitioning.clone());
        Ok(partitioning)
    }

    pub fn upsert(&self, batch: RecordBatch, join_cols: &[String]) -> DeltaResult<UpsertOutcome> {
        UpsertEngine::new(self.store.as_ref(), &self.upsert_config).upsert(
            &self.data_identifier(),
            batch,
            join_cols,
        )
    }

    /// The options to read this table as a stream with.
    pub fn stream_read_options(&self) -> BTreeMap<String, String> {
        self.read_options.to_options()
    }
}
