use datafusion::arrow::error::ArrowError;
use tablespec_catalog::error::CatalogError;
use tablespec_common::error::CommonError;
use thiserror::Error;

pub type DeltaResult<T> = Result<T, DeltaError>;

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("invalid table handle name: {0}")]
    InvalidName(String),
    #[error("invalid table handle format: {0}")]
    InvalidFormat(String),
    #[error(transparent)]
    Stream(#[from] StreamConfigurationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

impl DeltaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DeltaError::Catalog(CatalogError::invalid(message))
    }
}

/// Invalid stream loader configuration, detected before any I/O happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamConfigurationError {
    #[error("a stream loader needs either a table handle or a sink")]
    MissingEitherStreamLoaderOrHandle,
    #[error("a stream loader accepts a table handle or a sink, not both")]
    AmbiguousLoaderInput,
    #[error("a stream loader with a sink needs a format and a checkpoint location")]
    StreamLoaderNeedsFormatAndCheckpoint,
    #[error("not a valid stream trigger type: {0}")]
    NotAValidStreamTriggerType(String),
    #[error("the processingtime trigger needs a trigger time in seconds")]
    NeedTriggerTimeWhenProcessingType,
    #[error("unknown stream output mode: {0}")]
    UnknownStreamOutputMode(String),
    #[error("unknown stream write mode: {0}")]
    UnknownStreamWriteMode(String),
    #[error("the upsert write mode needs join columns")]
    UpsertNeedsJoinColumns,
    #[error("no checkpoint location is configured")]
    MissingCheckpoint,
}
