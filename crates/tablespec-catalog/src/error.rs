use datafusion::arrow::error::ArrowError;
use tablespec_common::error::CommonError;
use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid table specification: {0}")]
    SpecValidation(String),
    #[error("irreconcilable specification for {table}: {}", .reasons.join("; "))]
    Irreconcilable { table: String, reasons: Vec<String> },
    #[error("table specification is not readable: {0}")]
    TableSpecNotReadable(String),
    #[error("no specification registered for id: {0}")]
    SpecNotFound(String),
    #[error("no value for placeholder: {0}")]
    NoSuchValue(String),
    #[error("not found: {0} {1}")]
    NotFound(&'static str, String),
    #[error("already exists: {0} {1}")]
    AlreadyExists(&'static str, String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("store error: {0}")]
    Store(String),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

impl CatalogError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CatalogError::SpecValidation(message.into())
    }

    pub fn irreconcilable(table: impl Into<String>, reasons: Vec<String>) -> Self {
        CatalogError::Irreconcilable {
            table: table.into(),
            reasons,
        }
    }
}
