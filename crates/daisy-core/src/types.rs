//! Core types for DAISY

use crate::error::{Error, Result};
use crate::fee::MicroAlgos;
use serde::{Deserialize, Serialize};

/// Upper bound on query and response text, in bytes. Method arguments share
/// a fixed per-call budget on the ledger.
pub const MAX_TEXT_BYTES: usize = 1024;

/// The ledger's all-zero account, stored as provider until a query is answered.
pub const ZERO_ADDRESS: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Query identifier. Assigned by the contract starting at 1.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl QueryId {
    pub const FIRST: QueryId = QueryId(1);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for QueryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Fungible token identifier. Zero means the contract has no token yet.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl AssetId {
    pub fn is_configured(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger account address.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn zero() -> Self {
        Self(ZERO_ADDRESS.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty() || self.0 == ZERO_ADDRESS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A stored query as returned by the contract's read-only `get_query`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub submitter: Address,
    pub query_text: String,
    #[serde(default)]
    pub provider: Address,
    #[serde(default)]
    pub response_text: String,
    #[serde(default, alias = "answered")]
    pub is_answered: bool,
}

impl Query {
    /// A freshly posted, unanswered query.
    pub fn pending(submitter: impl Into<Address>, query_text: impl Into<String>) -> Self {
        Self {
            submitter: submitter.into(),
            query_text: query_text.into(),
            provider: Address::zero(),
            response_text: String::new(),
            is_answered: false,
        }
    }
}

/// Contract global state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    #[serde(default)]
    pub governor: Address,
    #[serde(default)]
    pub token: AssetId,
    #[serde(default)]
    pub query_fee: u64,
    #[serde(default = "first_query_id")]
    pub next_query_id: QueryId,
}

fn first_query_id() -> QueryId {
    QueryId::FIRST
}

/// Confirmation of an applied transaction group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_id: String,
    pub confirmed_round: u64,
    #[serde(default)]
    pub fee_paid: MicroAlgos,
}

/// Token transfer grouped in front of a `post_query` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePayment {
    pub asset_id: AssetId,
    pub amount: u64,
}

/// Grouped fee-payment + `post_query` submission built by the intake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostQuery {
    pub submitter: Address,
    pub query_text: String,
    pub payment: FeePayment,
}

impl PostQuery {
    /// Build the grouped submission for `config`, paying exactly the current fee.
    pub fn for_contract(
        config: &ContractConfig,
        submitter: impl Into<Address>,
        query_text: impl Into<String>,
    ) -> Result<Self> {
        let query_text = query_text.into();
        validate_query_text(&query_text)?;
        Ok(Self {
            submitter: submitter.into(),
            query_text,
            payment: FeePayment {
                asset_id: config.token,
                amount: config.query_fee,
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub tx_id: String,
    pub confirmed_round: u64,
    pub query_id: QueryId,
}

/// Answer waiting to be written on-ledger for one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionIntent {
    pub query_id: QueryId,
    pub response_text: String,
    /// Set when the generated text had to be cut to fit `MAX_TEXT_BYTES`.
    pub truncated: bool,
}

impl SubmissionIntent {
    pub fn new(query_id: QueryId, response_text: impl Into<String>) -> Self {
        let (response_text, truncated) = truncate_utf8(response_text.into(), MAX_TEXT_BYTES);
        Self {
            query_id,
            response_text,
            truncated,
        }
    }
}

/// Reject empty or oversized query text before it costs the user a fee.
pub fn validate_query_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::invalid_query("query text is empty"));
    }
    if text.len() > MAX_TEXT_BYTES {
        return Err(Error::TextTooLong {
            len: text.len(),
            max: MAX_TEXT_BYTES,
        });
    }
    Ok(())
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(mut s: String, max: usize) -> (String, bool) {
    if s.len() <= max {
        return (s, false);
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    (s, true)
}
