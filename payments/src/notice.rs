//! User-facing notices and cache invalidation signals.
//!
//! Components publish; views subscribe. Publishing never fails: with no
//! subscribers the notice is dropped.

use crate::state::{BookingId, PaymentTransaction, TransactionId};
use tokio::sync::broadcast;

/// Something the UI layer should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Session torn down; send the user to sign in again.
    ReauthenticationRequired,

    /// Dismissible warning; the booking stays in its last known state.
    TransientFailure {
        /// Human-readable summary.
        message: String,
    },

    /// The redirect could not be verified; status is being polled instead.
    RedirectUnverified {
        /// Gateway transaction id.
        transaction_id: TransactionId,
    },

    /// The gateway reported a different amount than the backend settled.
    AmountMismatch {
        /// Gateway transaction id.
        transaction_id: TransactionId,
        /// Amount in the redirect.
        reported: i64,
        /// Amount the backend settled.
        settled: i64,
    },

    /// Status queries keep failing; the payment is still pending.
    PollingStalled {
        /// Gateway transaction id.
        transaction_id: TransactionId,
        /// Consecutive failures observed.
        failures: u32,
    },

    /// Terminal outcome for the result screen.
    PaymentResult {
        /// Settled transaction.
        transaction: PaymentTransaction,
        /// Offer the retry action.
        retry_available: bool,
    },

    /// Cached booking/payment views are stale and must refetch.
    CacheInvalidation {
        /// Affected booking.
        booking_id: BookingId,
        /// Transaction that changed it.
        transaction_id: TransactionId,
    },
}

/// Broadcast channel for [`Notice`]s.
///
/// Cheap to clone; clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct NoticeBus {
    sender: broadcast::Sender<Notice>,
}

impl NoticeBus {
    /// Create a bus buffering up to `capacity` notices per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a notice.
    pub fn publish(&self, notice: Notice) {
        tracing::debug!(?notice, "Publishing notice");
        // No subscribers is not an error.
        let _ = self.sender.send(notice);
    }

    /// Subscribe to notices published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(64)
    }
}
