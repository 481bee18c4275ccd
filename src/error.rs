//! Driver error types.
//!
//! All errors surfaced by the CSI service are represented by the [`CsiError`]
//! enum, which derives [`thiserror::Error`] for ergonomic error handling and
//! also implements [`Serialize`]/[`Deserialize`] so errors can travel inside
//! the transport envelope.  The variants mirror the gRPC status codes the
//! kubelet understands.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The caller supplied an invalid or incomplete request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A precondition on host state does not hold (e.g. the agent socket has
    /// not been created yet).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CsiError {
    /// Create a [`CsiError::InvalidArgument`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn invalid_argument<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidArgument(e.to_string())
    }

    /// Create a [`CsiError::FailedPrecondition`] from anything that
    /// implements [`std::fmt::Display`].
    pub fn failed_precondition<E: std::fmt::Display>(e: E) -> Self {
        Self::FailedPrecondition(e.to_string())
    }

    /// Create a [`CsiError::Transport`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::Transport(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}
