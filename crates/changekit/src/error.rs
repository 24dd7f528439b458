//! Error types for change orchestration.
//!
//! Input and configuration errors abort a batch before any change unit is
//! touched. Lock timeouts are scoped to a single unit; the engine turns them
//! into a FAILED result instead of returning them to the caller.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building or running a batch.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested change name is not registered
    #[error("unknown change '{name}' (available: {})", available.join(", "))]
    UnknownChange {
        /// The name that failed to resolve
        name: String,
        /// Every registered name, in registration order
        available: Vec<String>,
    },

    /// A batch was requested without naming any change
    #[error("no changes selected")]
    EmptySelection,

    /// Two change units were registered under the same name
    #[error("change '{0}' is registered more than once")]
    DuplicateName(String),

    /// Walking the parent links of a change revisited a unit
    #[error("cyclic parent chain detected at '{name}'")]
    CyclicParent {
        /// Name of the first unit seen twice
        name: String,
    },

    /// A change declares the same target in more than one lock
    #[error("change '{change}' declares target '{target}' more than once")]
    DuplicateLock {
        /// Path of the offending change
        change: String,
        /// Name of the duplicated target
        target: String,
    },

    /// A lock could not be acquired within its timeout
    #[error("timed out after {}s waiting for lock on '{target}'", waited.as_secs_f64())]
    LockTimeout {
        /// Name of the contended target
        target: String,
        /// Checksum of the contended target
        checksum: String,
        /// How long the engine waited
        waited: Duration,
    },
}

impl Error {
    /// Whether this error must abort the batch before anything runs.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::LockTimeout { .. })
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;
