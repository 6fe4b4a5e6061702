use std::time::Duration;

use thiserror::Error;

/// Problems found while registering a model. These are startup errors: the
/// model declaration itself is wrong and no query can run against it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("primary key not found for model {model}")]
    MissingPrimaryKey { model: String },
    #[error("duplicate primary key for field {field} of model {model}")]
    DuplicatePrimaryKey { model: String, field: String },
    #[error("column {column} is mapped by more than one field of model {model}")]
    DuplicateColumn { model: String, column: String },
    #[error("field {field} of model {model} cannot be a primary key ({kind} fields never are)")]
    PrimaryKeyNotAllowed {
        model: String,
        field: String,
        kind: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("model registration failed: {0}")]
    Registration(#[from] RegistrationError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("missing value for field {field}")]
    MissingValue { field: String },
    #[error("database pool not initialized, call connect() first")]
    NotConnected,
    #[error("database pool is closed")]
    PoolClosed,
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl OrmError {
    /// Pool acquisition errors get their own variants; everything else is a
    /// plain database error. `waited` is the configured acquire timeout.
    pub(crate) fn from_acquire(err: sqlx::Error, waited: Duration) -> Self {
        match err {
            sqlx::Error::PoolClosed => OrmError::PoolClosed,
            sqlx::Error::PoolTimedOut => OrmError::Timeout(waited),
            other => OrmError::Database(other),
        }
    }
}

pub type OrmResult<T> = Result<T, OrmError>;
