//! Error types for resource storage.

use std::collections::TryReserveError;
use thiserror::Error;

/// Errors raised by resource containers.
///
/// Stale or null handles are not errors; lookups return `None` for them.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The backing storage could not grow.
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// Every representable slot index is in use.
    #[error("Container capacity exceeded: {0} slots allocated")]
    CapacityExceeded(usize),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, CoreError>;
