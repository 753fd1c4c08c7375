//! Result type alias for driftsync operations

use crate::Error;

/// Result type alias for driftsync operations
pub type Result<T> = std::result::Result<T, Error>;
