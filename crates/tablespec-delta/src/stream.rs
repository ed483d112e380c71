use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use datafusion::arrow::array::RecordBatch;
use log::info;
use tablespec_catalog::provider::Resolver;
use uuid::Uuid;

use crate::error::{DeltaResult, StreamConfigurationError};
use crate::handle::DeltaHandle;
use crate::options::{DeltaOptionKey, HandlePropertyKey};

/// A destination for micro-batches other than a table handle.
pub trait BatchSink: Send + Sync {
    fn save(&self, batch: RecordBatch) -> DeltaResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    AvailableNow,
    Once,
    ProcessingTime { seconds: u64 },
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::AvailableNow => write!(f, "availableNow"),
            TriggerType::Once => write!(f, "once"),
            TriggerType::ProcessingTime { seconds } => write!(f, "processingTime={seconds} seconds"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Complete,
    Append,
    Update,
}

impl FromStr for OutputMode {
    type Err = StreamConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "complete" => Ok(OutputMode::Complete),
            "append" => Ok(OutputMode::Append),
            "update" => Ok(OutputMode::Update),
            _ => Err(StreamConfigurationError::UnknownStreamOutputMode(
                s.to_string(),
            )),
        }
    }
}

/// How each micro-batch is written through the table handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    Append,
    Overwrite,
    Upsert { join_cols: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLoaderOptions {
    pub format: Option<String>,
    pub options: BTreeMap<String, String>,
    pub checkpoint_path: Option<String>,
    pub mode: String,
    pub trigger_type: String,
    pub trigger_time_seconds: Option<u64>,
    pub output_mode: String,
    pub query_name: Option<String>,
    pub await_termination: bool,
    pub upsert_join_cols: Vec<String>,
}

impl Default for StreamLoaderOptions {
    fn default() -> Self {
        Self {
            format: None,
            options: BTreeMap::new(),
            checkpoint_path: None,
            mode: "overwrite".to_string(),
            trigger_type: "availablenow".to_string(),
            trigger_time_seconds: None,
            output_mode: "update".to_string(),
            query_name: None,
            await_termination: false,
            upsert_join_cols: vec![],
        }
    }
}

pub enum LoaderTarget {
    Handle(Arc<DeltaHandle>),
    Sink(Arc<dyn BatchSink>),
}

/// A validated micro-batch loader.
///
/// Scheduling the micro-batches is up to the caller, which hands each one to
/// [`StreamLoader::process_batch`] in order.
pub struct StreamLoader {
    target: LoaderTarget,
    format: String,
    options: BTreeMap<String, String>,
    checkpoint_path: String,
    mode: LoadMode,
    trigger: TriggerType,
    output_mode: OutputMode,
    query_name: String,
    await_termination: bool,
}

fn parse_trigger(kind: &str, seconds: Option<u64>) -> Result<TriggerType, StreamConfigurationError> {
    match kind.trim().to_lowercase().as_str() {
        "availablenow" => Ok(TriggerType::AvailableNow),
        "once" => Ok(TriggerType::Once),
        "processingtime" => match seconds {
            Some(seconds) => Ok(TriggerType::ProcessingTime { seconds }),
            None => Err(StreamConfigurationError::NeedTriggerTimeWhenProcessingType),
        },
        _ => Err(StreamConfigurationError::NotAValidStreamTriggerType(
            kind.to_string(),
        )),
    }
}

fn parse_mode(mode: &str, join_cols: Vec<String>) -> Result<LoadMode, StreamConfigurationError> {
    match mode.trim().to_lowercase().as_str() {
        "append" => Ok(LoadMode::Append),
        "overwrite" => Ok(LoadMode::Overwrite),
        "upsert" if join_cols.is_empty() => Err(StreamConfigurationError::UpsertNeedsJoinColumns),
        "upsert" => Ok(LoadMode::Upsert { join_cols }),
        _ => Err(StreamConfigurationError::UnknownStreamWriteMode(
            mode.to_string(),
        )),
    }
}

impl StreamLoader {
    /// Validates the configuration.
    ///
    /// Exactly one of `handle` and `sink` must be given. Format, checkpoint path
    /// and query name that are not set fall back to the resolver entry of the handle.
    pub fn try_new(
        handle: Option<Arc<DeltaHandle>>,
        sink: Option<Arc<dyn BatchSink>>,
        options: StreamLoaderOptions,
        resolver: Option<&dyn Resolver>,
    ) -> DeltaResult<Self> {
        let StreamLoaderOptions {
            mut format,
            options: mut writer_options,
            mut checkpoint_path,
            mode,
            trigger_type,
            trigger_time_seconds,
            output_mode,
            mut query_name,
            await_termination,
            upsert_join_cols,
        } = options;

        let target = match (handle, sink) {
            (None, None) => {
                return Err(StreamConfigurationError::MissingEitherStreamLoaderOrHandle.into())
            }
            (Some(_), Some(_)) => return Err(StreamConfigurationError::AmbiguousLoaderInput.into()),
            (None, Some(sink)) => {
                if format.is_none() || checkpoint_path.is_none() {
                    return Err(StreamConfigurationError::StreamLoaderNeedsFormatAndCheckpoint.into());
                }
                LoaderTarget::Sink(sink)
            }
            (Some(handle), None) => {
                if let (Some(resolver), Some(id)) = (resolver, handle.table_id()) {
                    let details = resolver.resolve(id)?;
                    format = format.or(details.format);
                    if checkpoint_path.is_none() {
                        checkpoint_path = details
                            .properties
                            .get(HandlePropertyKey::CHECKPOINT_PATH)
                            .cloned();
                    }
                    if query_name.is_none() {
                        query_name = details.properties.get(HandlePropertyKey::QUERY_NAME).cloned();
                    }
                }
                LoaderTarget::Handle(handle)
            }
        };

        let checkpoint_path = checkpoint_path
            .filter(|p| !p.trim().is_empty())
            .ok_or(StreamConfigurationError::MissingCheckpoint)?;
        writer_options.insert(
            DeltaOptionKey::CHECKPOINT_LOCATION.to_string(),
            checkpoint_path.clone(),
        );

        let trigger = parse_trigger(&trigger_type, trigger_time_seconds)?;
        let output_mode = output_mode.parse::<OutputMode>()?;
        let mode = parse_mode(&mode, upsert_join_cols)?;

        if !checkpoint_path.contains("/_") {
            info!(
                "consider storing checkpoints next to the table data in a directory such as <table>/_checkpoints, \
                 which VACUUM skips"
            );
        }

        Ok(Self {
            target,
            format: format.unwrap_or_else(|| "delta".to_string()),
            options: writer_options,
            checkpoint_path,
            mode,
            trigger,
            output_mode,
            query_name: query_name.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            await_termination,
        })
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// The writer options, always including the checkpoint location.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn checkpoint_path(&self) -> &str {
        &self.checkpoint_path
    }

    pub fn mode(&self) -> &LoadMode {
        &self.mode
    }

    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    pub fn await_termination(&self) -> bool {
        self.await_termination
    }

    /// Writes one micro-batch.
    pub fn process_batch(&self, batch_id: u64, batch: RecordBatch) -> DeltaResult<()> {
        info!(
            "query {} processing batch {batch_id} with {} rows",
            self.query_name,
            batch.num_rows()
        );
        let handle = match &self.target {
            LoaderTarget::Sink(sink) => return sink.save(batch),
            LoaderTarget::Handle(handle) => handle,
        };
        match &self.mode {
            LoadMode::Append => handle.append(batch),
            LoadMode::Overwrite => handle.overwrite(batch),
            LoadMode::Upsert { join_cols } => {
                let outcome = handle.upsert(batch, join_cols)?;
                info!(
                    "query {} batch {batch_id}: {:?}, {} rows written",
                    self.query_name, outcome.decision, outcome.rows_written
                );
                Ok(())
            }
        }
    }
}
