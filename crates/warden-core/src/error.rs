//! Operation-table error types.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::handle::OperationToken;

/// Errors surfaced by the operation table.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The token is unknown to the table: never minted, or already removed.
    ///
    /// Returned, never escalated. The caller decides whether this is a client
    /// bug or a race against a prior removal.
    #[error("operation not found: {token}")]
    NotFound {
        /// The token that failed to resolve.
        token: OperationToken,
    },

    /// Growing the table or copying key material failed.
    ///
    /// Fatal for the current request (nothing was registered or returned),
    /// not for the process. Callers under slot pressure may evict and retry.
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
}

impl OperationError {
    /// True if the error names a missing token rather than a resource
    /// failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_the_token() {
        let err = OperationError::NotFound { token: OperationToken::mint(3) };
        assert_eq!(err.to_string(), "operation not found: op#3");
        assert!(err.is_not_found());
    }

    #[test]
    fn allocation_is_not_not_found() {
        let mut v: Vec<u8> = Vec::new();
        let reserve_err = v.try_reserve(usize::MAX).unwrap_err();
        let err = OperationError::from(reserve_err);
        assert!(!err.is_not_found());
    }
}
