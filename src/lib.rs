//! DAISY provider daemon - wiring between configuration, the ledger bridge,
//! the answer generator and the reconciliation loop.

pub mod daemon;
pub mod telemetry;
