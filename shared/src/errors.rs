//! Shared error types for the harness vocabulary

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Unknown node role: {value}")]
    UnknownRole { value: String },

    #[error("Unknown formation feature: {value}")]
    UnknownFeature { value: String },

    #[error("Invalid sslmode: {value}")]
    InvalidSslMode { value: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
