//! Reconciliation engine and plan executors
//!
//! The planning core is a pure function over two snapshots, the baseline
//! table, and the progress ledger. Around it sit the executors: batched
//! archive transfers, confirmed deletions, and non-destructive conflict
//! artifacts, each checkpointing durably as it commits work. The
//! orchestrator sequences the phases and owns the failure/resume policy.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod confirm;
pub mod conflict;
pub mod delete;
pub mod orchestrator;
pub mod plan;
pub mod transfer;

pub use batch::BatchPlanner;
pub use confirm::{
    ConfirmationProvider, DeletionGroup, DeletionSide, GroupDecision, PreflightDecision,
};
pub use conflict::{ConflictOutcome, ConflictResolver};
pub use delete::DeletionHandler;
pub use orchestrator::{Orchestrator, RunOptions, RunPhase, RunSummary};
pub use plan::{reconcile, Conflict, SyncMode, SyncPlan};
pub use transfer::BatchTransfer;
