//! Error types for the Tidemark engine.

use crate::TenantId;
use thiserror::Error;

/// All possible errors from the Tidemark engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Boundary errors
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown tenant: {0}")]
    TenantNotFound(TenantId),

    // Client cycle errors
    #[error("a sync cycle is already in flight for this device")]
    CycleInFlight,

    #[error("no {expected} is in progress")]
    OutOfPhase { expected: &'static str },

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
