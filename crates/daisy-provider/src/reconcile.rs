//! Reconciliation loop
//!
//! Each cycle reads the contract state, walks the ids between the cursor and
//! `next_query_id` in order, and resolves them one at a time. The cursor only
//! moves past an id once that id has a terminal outcome and the new value has
//! been persisted, so it is always a contiguous prefix of resolved ids.

use crate::cursor::{CursorError, CursorStore};
use crate::discovery::{discover, Candidates};
use crate::retry::RetryPolicy;
use crate::submission::{SubmissionPipeline, Submitted};
use daisy_answer::AnswerGenerator;
use daisy_core::{AssetId, ConfigError, FeeBudget, ProviderConfig, QueryId, Receipt, SubmissionIntent};
use daisy_ledger::LedgerGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FetchState,
    Enumerate,
    ResolveItem,
    Sleep,
}

/// Step of item resolution that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    ReadQuery,
    Generate,
    Submit,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadQuery => write!(f, "read"),
            Self::Generate => write!(f, "generate"),
            Self::Submit => write!(f, "submit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Our answer was written and the reward paid.
    Answered {
        id: QueryId,
        receipt: Receipt,
        truncated: bool,
    },
    /// Answered before we read it.
    AlreadyAnswered { id: QueryId },
    /// Answered between our read and our submission.
    LostRace { id: QueryId },
    /// No query stored under the id.
    NotFound { id: QueryId },
    /// Not resolved. The id is retried next cycle.
    Failed {
        id: QueryId,
        stage: FailureStage,
        reason: String,
    },
}

impl ItemOutcome {
    pub fn id(&self) -> QueryId {
        match self {
            Self::Answered { id, .. }
            | Self::AlreadyAnswered { id }
            | Self::LostRace { id }
            | Self::NotFound { id }
            | Self::Failed { id, .. } => *id,
        }
    }

    /// Whether the cursor may move past this id.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Why a cycle stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEnd {
    /// Every candidate resolved, or there were none.
    CaughtUp,
    /// Contract state could not be read.
    FetchFailed(String),
    /// The contract has no reward token yet.
    TokenNotConfigured,
    /// An item failed; the remaining candidates wait for the next cycle.
    Aborted { at: QueryId },
    /// The restored cursor is past every id the contract has assigned.
    CursorAhead { next: QueryId },
    /// The cursor could not be persisted.
    CursorStoreFailed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub start_cursor: QueryId,
    pub end_cursor: QueryId,
    pub items: Vec<ItemOutcome>,
    pub end: CycleEnd,
}

impl CycleReport {
    pub fn answered(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i, ItemOutcome::Answered { .. }))
            .count()
    }
}

/// Static reconciler settings.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub app_id: u64,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub fees: FeeBudget,
}

impl ReconcilerSettings {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            app_id: config.app_id,
            poll_interval: config.poll_interval(),
            retry: RetryPolicy::from(&config.retry),
            fees: config.fee_budget(),
        }
    }
}

enum Step {
    Fetch,
    Enumerate {
        token: AssetId,
        candidates: Candidates,
    },
    Resolve {
        token: AssetId,
        candidates: Candidates,
    },
}

pub struct Reconciler {
    app_id: u64,
    poll_interval: Duration,
    gateway: Arc<dyn LedgerGateway>,
    generator: Arc<dyn AnswerGenerator>,
    store: Arc<dyn CursorStore>,
    pipeline: SubmissionPipeline,
    cursor: QueryId,
    phase: Phase,
    opted_in: Option<AssetId>,
}

impl Reconciler {
    /// A reconciler starting from cursor 0. Fails on an unusable fee budget.
    pub fn new(
        settings: ReconcilerSettings,
        gateway: Arc<dyn LedgerGateway>,
        generator: Arc<dyn AnswerGenerator>,
        store: Arc<dyn CursorStore>,
    ) -> Result<Self, ConfigError> {
        let pipeline = SubmissionPipeline::new(Arc::clone(&gateway), settings.retry, settings.fees)?;
        Ok(Self {
            app_id: settings.app_id,
            poll_interval: settings.poll_interval,
            gateway,
            generator,
            store,
            pipeline,
            cursor: QueryId(0),
            phase: Phase::FetchState,
            opted_in: None,
        })
    }

    /// Load the persisted cursor.
    pub async fn restore(mut self) -> Result<Self, CursorError> {
        self.cursor = self.store.load(self.app_id).await?;
        info!(app_id = self.app_id, cursor = %self.cursor, "cursor restored");
        Ok(self)
    }

    pub fn cursor(&self) -> QueryId {
        self.cursor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// One FETCH_STATE → SLEEP pass, without the sleep.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle(&CancellationToken::new()).await
    }

    /// Poll until `cancel` fires. Returns the final cursor.
    pub async fn run(&mut self, cancel: CancellationToken) -> QueryId {
        info!(
            app_id = self.app_id,
            cursor = %self.cursor,
            poll_secs = self.poll_interval.as_secs_f64(),
            generator = self.generator.name(),
            gateway = self.gateway.name(),
            "reconciler started"
        );

        loop {
            let report = self.cycle(&cancel).await;
            if report.end == CycleEnd::Cancelled {
                break;
            }
            self.phase = Phase::Sleep;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(cursor = %self.cursor, "reconciler stopped");
        self.cursor
    }

    async fn cycle(&mut self, cancel: &CancellationToken) -> CycleReport {
        let start_cursor = self.cursor;
        let mut items = Vec::new();
        let mut step = Step::Fetch;

        let end = loop {
            if cancel.is_cancelled() {
                break CycleEnd::Cancelled;
            }
            step = match step {
                Step::Fetch => {
                    self.phase = Phase::FetchState;
                    match discover(self.gateway.as_ref(), self.cursor).await {
                        Ok(d) if !d.config.token.is_configured() => {
                            warn!(app_id = self.app_id, "token not configured, waiting");
                            break CycleEnd::TokenNotConfigured;
                        }
                        Ok(d) if self.cursor >= d.config.next_query_id => {
                            warn!(
                                cursor = %self.cursor,
                                next_query_id = %d.config.next_query_id,
                                "cursor is ahead of the contract, nothing will be answered until it catches up"
                            );
                            break CycleEnd::CursorAhead {
                                next: d.config.next_query_id,
                            };
                        }
                        Ok(d) => Step::Enumerate {
                            token: d.config.token,
                            candidates: d.candidates,
                        },
                        Err(e) => {
                            warn!(error = %e, cursor = %self.cursor, "failed to read contract state");
                            break CycleEnd::FetchFailed(e.to_string());
                        }
                    }
                }
                Step::Enumerate { token, candidates } => {
                    self.phase = Phase::Enumerate;
                    if candidates.is_empty() {
                        debug!(cursor = %self.cursor, "no pending queries");
                        break CycleEnd::CaughtUp;
                    }
                    debug!(cursor = %self.cursor, pending = candidates.len(), "pending queries");
                    Step::Resolve { token, candidates }
                }
                Step::Resolve {
                    token,
                    mut candidates,
                } => {
                    self.phase = Phase::ResolveItem;
                    let Some(id) = candidates.next() else {
                        break CycleEnd::CaughtUp;
                    };
                    let outcome = self.resolve(id, token).await;
                    let terminal = outcome.is_terminal();
                    items.push(outcome);
                    if !terminal {
                        break CycleEnd::Aborted { at: id };
                    }
                    if let Err(e) = self.advance(id).await {
                        error!(query_id = %id, error = %e, "failed to persist cursor");
                        break CycleEnd::CursorStoreFailed(e.to_string());
                    }
                    Step::Resolve { token, candidates }
                }
            };
        };

        self.phase = Phase::Sleep;
        let report = CycleReport {
            start_cursor,
            end_cursor: self.cursor,
            items,
            end,
        };
        if report.end_cursor != report.start_cursor || !report.items.is_empty() {
            info!(
                from = %report.start_cursor,
                to = %report.end_cursor,
                answered = report.answered(),
                resolved = report.items.iter().filter(|i| i.is_terminal()).count(),
                "cycle complete"
            );
        }
        report
    }

    async fn resolve(&mut self, id: QueryId, token: AssetId) -> ItemOutcome {
        let query = match self.gateway.read_query(id).await {
            Ok(Some(q)) => q,
            Ok(None) => {
                // a lagging node can report a real query as missing; it is
                // skipped for good either way
                warn!(query_id = %id, "query not found, skipping");
                return ItemOutcome::NotFound { id };
            }
            Err(e) => return self.failed(id, FailureStage::ReadQuery, e.to_string()),
        };

        if query.is_answered {
            debug!(query_id = %id, provider = %query.provider, "already answered, skipping");
            return ItemOutcome::AlreadyAnswered { id };
        }

        let text = match self.generator.generate(&query.query_text).await {
            Ok(t) => t,
            Err(e) => return self.failed(id, FailureStage::Generate, e.to_string()),
        };

        self.ensure_opted_in(token).await;

        let intent = SubmissionIntent::new(id, text);
        match self.pipeline.submit(&intent).await {
            Ok(Submitted::Confirmed(receipt)) => ItemOutcome::Answered {
                id,
                receipt,
                truncated: intent.truncated,
            },
            Ok(Submitted::AlreadyAnswered) => ItemOutcome::LostRace { id },
            Err(e) => self.failed(id, FailureStage::Submit, e.to_string()),
        }
    }

    fn failed(&self, id: QueryId, stage: FailureStage, reason: String) -> ItemOutcome {
        warn!(query_id = %id, %stage, error = %reason, cursor = %self.cursor, "query not resolved, retrying next cycle");
        ItemOutcome::Failed { id, stage, reason }
    }

    /// Persist first, then move the in-memory cursor.
    async fn advance(&mut self, id: QueryId) -> Result<(), CursorError> {
        debug_assert_eq!(id, self.cursor.next());
        self.store.store(self.app_id, id).await?;
        self.cursor = id;
        Ok(())
    }

    async fn ensure_opted_in(&mut self, token: AssetId) {
        if self.opted_in == Some(token) {
            return;
        }
        match self.gateway.opt_in(token).await {
            Ok(()) => {
                info!(token = %token, "opted into reward token");
                self.opted_in = Some(token);
            }
            Err(e) => warn!(token = %token, error = %e, "opt-in failed, will retry before the next submission"),
        }
    }
}
