use thiserror::Error;

use crate::OrmError;

/// Errors the site operations report to their caller. Persistence failures
/// stay in their own variant so they can be told apart from bad input.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid value for {field}: {message}")]
    Value { field: String, message: String },
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("{error} ({field}): {message}")]
    Conflict {
        error: String,
        field: String,
        message: String,
    },
    #[error(transparent)]
    Orm(#[from] OrmError),
}

impl ApiError {
    pub(crate) fn value(field: &str, message: &str) -> Self {
        ApiError::Value {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
