//! Idempotency marker store trait.

use crate::error::Result;
use std::time::Duration;

/// Durable set of "already handled" markers with expiry.
pub trait IdempotencyStore: Send + Sync {
    /// Check whether `key` is marked and not expired.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn is_processed(&self, key: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Mark `key` as processed for `ttl`.
    ///
    /// Atomic set-if-absent: of any number of concurrent callers for the
    /// same key, exactly one observes `true`.
    ///
    /// # Returns
    ///
    /// `true` if this call created the marker, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn mark_processed(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}
