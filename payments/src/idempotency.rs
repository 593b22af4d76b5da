//! Redirect idempotency guard.
//!
//! Keys derive from the gateway's transaction id, never from anything the
//! client generates, so two redirects for one transaction collide even
//! across reloads.

use crate::constants::keys;
use crate::error::Result;
use crate::providers::IdempotencyStore;
use crate::state::TransactionId;
use std::sync::Arc;
use std::time::Duration;

/// "Already handled" markers for gateway redirects.
#[derive(Debug)]
pub struct IdempotencyGuard<I> {
    store: Arc<I>,
    ttl: Duration,
}

impl<I> Clone for IdempotencyGuard<I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
        }
    }
}

/// Storage key for a transaction's marker.
///
/// # Examples
///
/// ```
/// # use slotpay_payments::idempotency::redirect_key;
/// # use slotpay_payments::TransactionId;
/// assert_eq!(redirect_key(&TransactionId::new("T1")), "slotpay:redirect:T1");
/// ```
#[must_use]
pub fn redirect_key(transaction_id: &TransactionId) -> String {
    format!("{}{transaction_id}", keys::REDIRECT_PREFIX)
}

impl<I: IdempotencyStore> IdempotencyGuard<I> {
    /// Markers written through this guard live for `ttl`.
    #[must_use]
    pub const fn new(store: Arc<I>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Whether the transaction's redirect was already handled.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn has_been_processed(&self, transaction_id: &TransactionId) -> Result<bool> {
        self.store.is_processed(&redirect_key(transaction_id)).await
    }

    /// Mark the transaction's redirect handled for `ttl`.
    ///
    /// # Returns
    ///
    /// `true` if this call created the marker.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn mark_processed(&self, transaction_id: &TransactionId, ttl: Duration) -> Result<bool> {
        self.store
            .mark_processed(&redirect_key(transaction_id), ttl)
            .await
    }

    /// Atomically claim the transaction for processing.
    ///
    /// Check and mark in one step: exactly one of any number of concurrent
    /// callers gets `true`. Called before any settlement request, so a crash
    /// mid-settlement can never lead to a second settlement attempt.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn try_claim(&self, transaction_id: &TransactionId) -> Result<bool> {
        let claimed = self.mark_processed(transaction_id, self.ttl).await?;
        if claimed {
            metrics::counter!("payments.redirect.claimed").increment(1);
        } else {
            metrics::counter!("payments.redirect.duplicate").increment(1);
            tracing::debug!(transaction_id = %transaction_id, "Redirect already claimed");
        }
        Ok(claimed)
    }
}
