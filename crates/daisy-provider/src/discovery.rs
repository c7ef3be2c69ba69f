//! Work discovery

use daisy_core::{ContractConfig, QueryId};
use daisy_ledger::{GatewayResult, LedgerGateway};

/// Ids strictly between the cursor and `next_query_id`, in increasing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates {
    next: u64,
    end: u64,
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        self.next >= self.end
    }
}

impl Iterator for Candidates {
    type Item = QueryId;

    fn next(&mut self) -> Option<QueryId> {
        if self.next >= self.end {
            return None;
        }
        let id = QueryId(self.next);
        self.next += 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end.saturating_sub(self.next) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Candidates {}

/// `last_processed + 1 ..= next_query_id - 1`. Empty when nothing is pending.
pub fn candidates(next_query_id: QueryId, last_processed: QueryId) -> Candidates {
    Candidates {
        next: last_processed.get().saturating_add(1),
        end: next_query_id.get(),
    }
}

/// Contract state read at the start of a cycle, with the ids it implies.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub config: ContractConfig,
    pub candidates: Candidates,
}

pub async fn discover(
    gateway: &dyn LedgerGateway,
    last_processed: QueryId,
) -> GatewayResult<Discovery> {
    let config = gateway.read_config().await?;
    let candidates = candidates(config.next_query_id, last_processed);
    Ok(Discovery { config, candidates })
}
