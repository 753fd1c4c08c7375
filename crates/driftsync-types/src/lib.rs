//! Core type system and error handling for driftsync
//!
//! This crate provides the foundational types shared by the driftsync
//! ecosystem:
//!
//! - **Error handling**: structured error taxonomy with transience
//!   classification that drives the transport retry policy
//! - **Core types**: scan snapshots, file metadata, remote command output
//!
//! # Examples
//!
//! ```rust
//! use driftsync_types::{FileMeta, Snapshot, MTIME_TOLERANCE_SECS};
//!
//! let mut snapshot = Snapshot::new();
//! snapshot.insert("src/main.rs".to_string(), FileMeta::new(1_700_000_000.5, 2048));
//! assert!(MTIME_TOLERANCE_SECS > 0.0);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use types::*;
