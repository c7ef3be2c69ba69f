//! Error types for DAISY

use thiserror::Error;

/// Fatal startup errors. The daemon exits non-zero on any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error(
        "fee ceiling {max_fee} is below the {required} needed for the call plus {inner_transactions} inner transaction(s)"
    )]
    FeeCeilingTooLow {
        max_fee: u64,
        required: u64,
        inner_transactions: u32,
    },

    #[error("config file {path}: {message}")]
    File { path: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("query text is {len} bytes, limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery(reason.into())
    }
}
