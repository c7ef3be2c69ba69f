//! DAISY provider - discovers unanswered queries, answers them, and keeps a
//! durable cursor of how far it has got.

pub mod cursor;
pub mod discovery;
pub mod reconcile;
pub mod retry;
pub mod submission;

pub use cursor::{CursorError, CursorRecord, CursorStore, FileCursorStore, MemoryCursorStore};
pub use discovery::{candidates, discover, Candidates, Discovery};
pub use reconcile::{
    CycleEnd, CycleReport, FailureStage, ItemOutcome, Phase, Reconciler, ReconcilerSettings,
};
pub use retry::{RetryError, RetryPolicy};
pub use submission::{SubmissionError, SubmissionPipeline, Submitted};
