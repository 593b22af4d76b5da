//! Applying a verified transaction outcome.
//!
//! Shared by the reconciler (fast path) and the poller (authoritative path):
//! persist the transaction, advance the cached booking, tell views to refetch.

use crate::actions::BookingAction;
use crate::environment::BookingEnvironment;
use crate::error::Result;
use crate::lifecycle::LifecycleEvent;
use crate::notice::{Notice, NoticeBus};
use crate::providers::{BookingBackend, CheckoutStore};
use crate::reducers::BookingReducer;
use crate::state::{BookingState, PaymentTransaction, Settlement, TransactionId, TransactionStatus};
use slotpay_runtime::Store;
use std::sync::Arc;
use std::time::Duration;

/// Booking cache store.
pub type BookingStore<B> =
    Store<BookingState, BookingAction, BookingEnvironment<B>, BookingReducer<B>>;

/// Lifecycle event implied by a transaction status. `None` while pending.
#[must_use]
pub fn lifecycle_event_for(transaction: &PaymentTransaction) -> Option<LifecycleEvent> {
    match transaction.status {
        TransactionStatus::Pending => None,
        TransactionStatus::Success => Some(LifecycleEvent::PaymentSettled {
            settlement: Settlement::Gateway,
        }),
        TransactionStatus::Failed | TransactionStatus::Timeout => {
            Some(LifecycleEvent::PaymentFailed {
                reason: transaction.failure_reason.clone(),
                timed_out: transaction.status == TransactionStatus::Timeout,
            })
        },
    }
}

/// Records verified outcomes.
pub struct OutcomeRecorder<C, B>
where
    B: BookingBackend + 'static,
{
    checkout: Arc<C>,
    bookings: BookingStore<B>,
    notices: NoticeBus,
    ttl: Duration,
}

impl<C, B> Clone for OutcomeRecorder<C, B>
where
    B: BookingBackend + 'static,
{
    fn clone(&self) -> Self {
        Self {
            checkout: Arc::clone(&self.checkout),
            bookings: self.bookings.clone(),
            notices: self.notices.clone(),
            ttl: self.ttl,
        }
    }
}

impl<C, B> OutcomeRecorder<C, B>
where
    C: CheckoutStore,
    B: BookingBackend + 'static,
{
    /// Persisted transactions live for `ttl`.
    #[must_use]
    pub const fn new(
        checkout: Arc<C>,
        bookings: BookingStore<B>,
        notices: NoticeBus,
        ttl: Duration,
    ) -> Self {
        Self {
            checkout,
            bookings,
            notices,
            ttl,
        }
    }

    /// The booking cache outcomes are applied to.
    #[must_use]
    pub const fn bookings(&self) -> &BookingStore<B> {
        &self.bookings
    }

    /// The notice bus outcomes are published on.
    #[must_use]
    pub const fn notices(&self) -> &NoticeBus {
        &self.notices
    }

    /// Previously recorded outcome for `transaction_id`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn cached(&self, transaction_id: &TransactionId) -> Result<Option<PaymentTransaction>> {
        self.checkout.load_transaction(transaction_id).await
    }

    /// Apply a backend-verified transaction.
    ///
    /// 1. Persist it under its transaction id (reused by duplicate redirects).
    /// 2. Advance the cached booking's payment axis, unless the same status
    ///    was already recorded for this transaction.
    /// 3. On a terminal status, publish the result and, on success, forget
    ///    the in-flight payment.
    /// 4. Publish a cache invalidation for the booking.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction cannot be persisted or the booking
    /// store is shutting down.
    #[tracing::instrument(skip_all, fields(transaction_id = %transaction.transaction_id, status = ?transaction.status))]
    pub async fn record(&self, transaction: &PaymentTransaction) -> Result<()> {
        let previous = self.checkout.load_transaction(&transaction.transaction_id).await?;
        let already_applied = previous.is_some_and(|p| p.status == transaction.status);
        self.checkout.save_transaction(transaction, self.ttl).await?;

        if already_applied {
            tracing::debug!("Outcome already applied to the booking");
        } else if let Some(event) = lifecycle_event_for(transaction) {
            self.bookings
                .send(BookingAction::Request {
                    booking_id: transaction.booking_id.clone(),
                    event,
                })
                .await?;
        }

        if transaction.status.is_terminal() {
            if transaction.status == TransactionStatus::Success {
                let in_flight = self.checkout.load_in_flight().await?;
                if in_flight.is_some_and(|p| p.transaction_id == transaction.transaction_id) {
                    self.checkout.clear_in_flight().await?;
                }
            }

            metrics::counter!(
                "payments.outcome.recorded",
                "status" => format!("{:?}", transaction.status)
            )
            .increment(1);
            tracing::info!("Payment outcome recorded");

            self.notices.publish(Notice::PaymentResult {
                transaction: transaction.clone(),
                retry_available: transaction.status.is_retryable(),
            });
        }

        self.notices.publish(Notice::CacheInvalidation {
            booking_id: transaction.booking_id.clone(),
            transaction_id: transaction.transaction_id.clone(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BookingId;

    fn transaction(status: TransactionStatus) -> PaymentTransaction {
        PaymentTransaction {
            transaction_id: TransactionId::new("T1"),
            booking_id: BookingId::new("b-1"),
            status,
            amount: 100,
            failure_reason: Some("bank declined".to_string()),
        }
    }

    #[test]
    fn maps_statuses_to_payment_events() {
        assert_eq!(lifecycle_event_for(&transaction(TransactionStatus::Pending)), None);
        assert_eq!(
            lifecycle_event_for(&transaction(TransactionStatus::Success)),
            Some(LifecycleEvent::PaymentSettled {
                settlement: Settlement::Gateway
            })
        );
        assert_eq!(
            lifecycle_event_for(&transaction(TransactionStatus::Timeout)),
            Some(LifecycleEvent::PaymentFailed {
                reason: Some("bank declined".to_string()),
                timed_out: true,
            })
        );
    }
}
