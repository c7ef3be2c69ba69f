//! DAISY ledger - gateway trait, HTTP bridge client and an in-memory contract simulation

pub mod gateway;
pub mod http;
pub mod memory;

pub use gateway::{GatewayError, GatewayResult, LedgerGateway};
pub use http::HttpLedgerGateway;
pub use memory::{LedgerOp, MemoryGateway, MemoryLedger, SIM_MIN_FEE};
