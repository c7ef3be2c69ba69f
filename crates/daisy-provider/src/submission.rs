//! Submission pipeline
//!
//! Writes one answer on-ledger. The guard in the contract makes the write
//! first-wins, so losing a race is reported as success rather than an error.

use crate::retry::{RetryError, RetryPolicy};
use daisy_core::{ConfigError, FeeBudget, Receipt, SubmissionIntent};
use daisy_ledger::{GatewayError, LedgerGateway};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a submission reached a terminal success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Confirmed(Receipt),
    /// Another provider answered first; nothing was paid.
    AlreadyAnswered,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission rejected: {0}")]
    Permanent(GatewayError),

    #[error("submission still failing after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: GatewayError },
}

pub struct SubmissionPipeline {
    gateway: Arc<dyn LedgerGateway>,
    retry: RetryPolicy,
    fees: FeeBudget,
}

impl SubmissionPipeline {
    /// Fails when the fee ceiling cannot cover the call and its inner transfer.
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        retry: RetryPolicy,
        fees: FeeBudget,
    ) -> Result<Self, ConfigError> {
        fees.validate()?;
        Ok(Self {
            gateway,
            retry,
            fees,
        })
    }

    pub async fn submit(&self, intent: &SubmissionIntent) -> Result<Submitted, SubmissionError> {
        let id = intent.query_id;
        let ceiling = self.fees.ceiling();
        if intent.truncated {
            warn!(query_id = %id, "response truncated to fit the argument limit");
        }

        let gateway = &self.gateway;
        let text = intent.response_text.as_str();
        let result = self
            .retry
            .run(GatewayError::is_transient, |attempt| async move {
                debug!(query_id = %id, attempt, max_fee = %ceiling, "submitting answer");
                gateway.submit_answer(id, text, ceiling).await
            })
            .await;

        match result {
            Ok(receipt) => {
                info!(
                    query_id = %id,
                    tx_id = %receipt.tx_id,
                    round = receipt.confirmed_round,
                    fee = %receipt.fee_paid,
                    "answer confirmed"
                );
                Ok(Submitted::Confirmed(receipt))
            }
            Err(RetryError {
                last: GatewayError::AlreadyAnswered(_),
                ..
            }) => {
                info!(query_id = %id, "already answered by another provider");
                Ok(Submitted::AlreadyAnswered)
            }
            Err(RetryError { attempts, last }) if last.is_transient() => {
                Err(SubmissionError::Exhausted { attempts, last })
            }
            Err(RetryError { last, .. }) => Err(SubmissionError::Permanent(last)),
        }
    }
}
