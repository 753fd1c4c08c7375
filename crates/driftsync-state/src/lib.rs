//! Persisted run-to-run memory: the baseline table and the progress
//! ledger
//!
//! The baseline table records the metadata both replicas had for each
//! path at the end of the last successful synchronization; change
//! detection compares the current snapshots against it. The progress
//! ledger is a small JSON file rewritten after every committed batch so
//! an interrupted run can resume without repeating work.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod baseline;
pub mod ledger;

pub use baseline::{StateRecord, SyncState};
pub use ledger::ProgressLedger;
