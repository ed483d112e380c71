use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid data type '{input}': {message}")]
    InvalidDataType { input: String, message: String },
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl CommonError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CommonError::InvalidArgument(message.into())
    }

    pub fn invalid_data_type(input: impl Into<String>, message: impl Into<String>) -> Self {
        CommonError::InvalidDataType {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        CommonError::NotSupported(message.into())
    }
}

impl From<figment::Error> for CommonError {
    fn from(value: figment::Error) -> Self {
        CommonError::Config(Box::new(value))
    }
}
