//! Fee budgeting for answer submissions.
//!
//! `submit_response` pays the provider through an inner asset transfer whose
//! own fee is zero, so the outer call must pool enough fee for both
//! transactions. The ceiling is checked once at startup.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Amount in the ledger's fee unit (micro-algos).
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MicroAlgos(pub u64);

impl MicroAlgos {
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MicroAlgos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µA", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeBudget {
    /// Minimum fee the ledger charges per transaction.
    pub min_fee: MicroAlgos,
    /// Inner transactions issued by the contract call (the reward transfer).
    pub inner_transactions: u32,
    /// Ceiling pre-authorized for one submission.
    pub max_fee: MicroAlgos,
}

impl Default for FeeBudget {
    fn default() -> Self {
        Self {
            min_fee: MicroAlgos(1_000),
            inner_transactions: 1,
            max_fee: MicroAlgos(5_000),
        }
    }
}

impl FeeBudget {
    /// Fee needed to cover the outer call and every inner transaction.
    pub fn required(&self) -> MicroAlgos {
        let txns = 1 + u64::from(self.inner_transactions);
        MicroAlgos(self.min_fee.0.saturating_mul(txns))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = self.required();
        if self.max_fee < required {
            return Err(ConfigError::FeeCeilingTooLow {
                max_fee: self.max_fee.0,
                required: required.0,
                inner_transactions: self.inner_transactions,
            });
        }
        Ok(())
    }

    /// The ceiling handed to the gateway with every submission.
    pub fn ceiling(&self) -> MicroAlgos {
        self.max_fee
    }
}
