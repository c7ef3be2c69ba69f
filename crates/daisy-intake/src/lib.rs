//! DAISY intake - HTTP front door that posts paid queries to the contract

pub mod auth;
pub mod error;
pub mod server;

pub use auth::{AuthMode, ResolvedAuth};
pub use error::IntakeError;
pub use server::{router, start_intake, IntakeConfig, IntakeState};
