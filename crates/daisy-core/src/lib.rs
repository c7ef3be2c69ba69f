//! DAISY core - shared types, fee budgeting, configuration and error handling

pub mod config;
pub mod error;
pub mod fee;
pub mod types;

pub use config::{
    AnswerSettings, FeeSettings, LedgerEndpoint, ProviderConfig, RetrySettings, CONFIG_PATH_ENV,
};
pub use error::{ConfigError, Error, Result};
pub use fee::{FeeBudget, MicroAlgos};
pub use types::*;
