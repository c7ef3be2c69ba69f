//! Ledger gateway trait

use daisy_core::{AssetId, ContractConfig, MicroAlgos, PostQuery, PostReceipt, Query, QueryId, Receipt};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Ledger failures, classified by what the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The contract's guard rejected the answer because another submission won.
    #[error("query {0} already answered")]
    AlreadyAnswered(QueryId),

    /// Timeout, network error or temporary contention. Worth retrying.
    #[error("transient ledger failure: {0}")]
    Transient(String),

    /// Malformed request, authorization failure, insufficient funds.
    #[error("permanent ledger failure: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Read and write access to the DAISY contract.
///
/// Each write is one atomic transaction group: it either fully applies or
/// fully fails.
#[async_trait::async_trait]
pub trait LedgerGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Contract global state: fee, token, `next_query_id`.
    async fn read_config(&self) -> GatewayResult<ContractConfig>;

    /// Read-only `get_query`. `Ok(None)` when no query is stored under `id`.
    async fn read_query(&self, id: QueryId) -> GatewayResult<Option<Query>>;

    /// `submit_response` with a pooled fee of at most `fee_ceiling`, covering
    /// the reward transfer the contract issues.
    async fn submit_answer(
        &self,
        id: QueryId,
        response_text: &str,
        fee_ceiling: MicroAlgos,
    ) -> GatewayResult<Receipt>;

    /// Opt the signing account into `token` so it can receive rewards.
    /// Already being opted in is success.
    async fn opt_in(&self, token: AssetId) -> GatewayResult<()>;

    /// Grouped fee payment + `post_query` call.
    async fn post_query(&self, post: PostQuery) -> GatewayResult<PostReceipt>;
}
