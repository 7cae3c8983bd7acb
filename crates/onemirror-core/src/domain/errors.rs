//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and path resolution errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid feed cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Exclusion pattern failed to compile
    #[error("Invalid exclusion pattern: {0}")]
    InvalidPattern(String),

    /// An item's ancestor chain is incomplete in the current pass
    #[error("Cannot resolve path of {id}: ancestor {missing} was not observed in this pass")]
    UnresolvedPath {
        /// The item being resolved
        id: String,
        /// The first ancestor with no observed entry
        missing: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
