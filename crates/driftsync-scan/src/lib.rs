//! Snapshot capture for both replicas
//!
//! The local scanner walks the tree synchronously; the remote scanner
//! drives a detached enumeration job on the server and polls for its
//! completion marker, so both captures overlap in time. Ignore rules are
//! applied client-side to both listings, with a best-effort prune subset
//! pushed into the remote enumeration command.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod ignore;
pub mod local;
pub mod remote;

pub use ignore::IgnoreSet;
pub use local::scan_local;
pub use remote::{RemoteScanner, ScanJob, SCAN_SENTINEL};
