//! Checkout orchestration.
//!
//! Ties the pieces together for the three things a checkout screen does:
//! start a payment, land from the gateway, retry a failed payment.

use crate::actions::BookingAction;
use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use crate::idempotency::IdempotencyGuard;
use crate::lifecycle::{self, LifecycleEvent};
use crate::notice::NoticeBus;
use crate::outcome::{BookingStore, OutcomeRecorder};
use crate::poller::{PaymentStatusPoller, PollOutcome};
use crate::providers::{BookingBackend, CheckoutStore, IdempotencyStore, PaymentBackend};
use crate::reconciler::{PaymentRedirectReconciler, ReconcileOutcome};
use crate::state::{
    BookingId, InFlightPayment, PaymentInit, PaymentMethod, PaymentTransaction, Settlement,
};
use slotpay_core::environment::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened on the landing page.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectResolution {
    /// Fast-path reconciliation result.
    pub reconcile: ReconcileOutcome,
    /// Polling result, when reconciliation was not conclusive.
    pub poll: Option<PollOutcome>,
}

impl RedirectResolution {
    /// Final transaction known to the client, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&PaymentTransaction> {
        if let Some(PollOutcome::Terminal(transaction)) = &self.poll {
            return Some(transaction);
        }
        match &self.reconcile {
            ReconcileOutcome::Settled { transaction, .. } => Some(transaction),
            ReconcileOutcome::AlreadyProcessed { cached, .. } => cached.as_ref(),
            ReconcileOutcome::Ignored | ReconcileOutcome::Deferred { .. } => None,
        }
    }

    /// URL to show after reconciliation (carries the processed marker).
    #[must_use]
    pub fn landing_url(&self) -> Option<&str> {
        match &self.reconcile {
            ReconcileOutcome::Settled { landing_url, .. } => Some(landing_url),
            _ => None,
        }
    }
}

/// Drives a booking's payment from init to a terminal outcome.
///
/// # Type Parameters
///
/// - `I`: Idempotency marker store
/// - `P`: Payment backend
/// - `C`: Checkout state store
/// - `B`: Booking backend (write-through target of the booking cache)
pub struct PaymentCoordinator<I, P, C, B>
where
    B: BookingBackend + 'static,
{
    backend: Arc<P>,
    checkout: Arc<C>,
    recorder: OutcomeRecorder<C, B>,
    reconciler: PaymentRedirectReconciler<I, P, C, B>,
    poller: PaymentStatusPoller<P, C, B>,
    clock: Arc<dyn Clock>,
    state_ttl: Duration,
}

impl<I, P, C, B> PaymentCoordinator<I, P, C, B>
where
    I: IdempotencyStore,
    P: PaymentBackend,
    C: CheckoutStore,
    B: BookingBackend + 'static,
{
    /// Wire the reconciler, poller and outcome recorder from `config`.
    #[must_use]
    pub fn new(
        config: &PaymentConfig,
        idempotency: Arc<I>,
        backend: Arc<P>,
        checkout: Arc<C>,
        bookings: BookingStore<B>,
        notices: NoticeBus,
    ) -> Self {
        let recorder = OutcomeRecorder::new(
            Arc::clone(&checkout),
            bookings,
            notices,
            config.state_ttl,
        );
        let reconciler = PaymentRedirectReconciler::new(
            IdempotencyGuard::new(idempotency, config.idempotency_ttl),
            Arc::clone(&backend),
            recorder.clone(),
        );
        let poller = PaymentStatusPoller::new(
            Arc::clone(&backend),
            recorder.clone(),
            config.poll_interval,
            config.poll_max_failures,
        );

        Self {
            backend,
            checkout,
            recorder,
            reconciler,
            poller,
            clock: Arc::new(SystemClock),
            state_ttl: config.state_ttl,
        }
    }

    /// Use `clock` for in-flight timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The booking cache.
    #[must_use]
    pub const fn bookings(&self) -> &BookingStore<B> {
        self.recorder.bookings()
    }

    /// The redirect reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> &PaymentRedirectReconciler<I, P, C, B> {
        &self.reconciler
    }

    /// The status poller.
    #[must_use]
    pub const fn poller(&self) -> &PaymentStatusPoller<P, C, B> {
        &self.poller
    }

    /// Initialize a payment for `booking_id`.
    ///
    /// Every call creates a new gateway transaction, remembered as the
    /// payment in flight. Cash payments settle the booking immediately.
    ///
    /// # Errors
    ///
    /// Returns error if initialization fails or the in-flight record cannot
    /// be persisted.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn start_payment(&self, booking_id: &BookingId, method: PaymentMethod) -> Result<PaymentInit> {
        let init = self.backend.init_payment(booking_id, method).await?;

        self.checkout
            .save_in_flight(
                &InFlightPayment {
                    transaction_id: init.transaction_id.clone(),
                    booking_id: booking_id.clone(),
                    method,
                    started_at: self.clock.now(),
                },
                self.state_ttl,
            )
            .await?;

        metrics::counter!("payments.checkout.started").increment(1);
        tracing::info!(transaction_id = %init.transaction_id, ?method, "Payment initialized");

        if method == PaymentMethod::Cash {
            self.bookings()
                .send(BookingAction::Request {
                    booking_id: booking_id.clone(),
                    event: LifecycleEvent::PaymentSettled {
                        settlement: Settlement::Cash,
                    },
                })
                .await?;
        }

        Ok(init)
    }

    /// Start a new transaction for the payment in flight.
    ///
    /// Only a payment whose last known outcome is a failure or timeout may be
    /// retried, and only if the lifecycle accepts the retry. Uses the
    /// persisted booking id; the booking is not refetched.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::NothingToRetry`] if no payment is in flight, its
    ///   outcome is unknown or not a failure, or the lifecycle rejects the retry
    /// - errors from [`Self::start_payment`]
    #[tracing::instrument(skip(self))]
    pub async fn retry_payment(&self) -> Result<PaymentInit> {
        let Some(previous) = self.checkout.load_in_flight().await? else {
            return Err(PaymentError::NothingToRetry);
        };

        let last = self.recorder.cached(&previous.transaction_id).await?;
        let Some(outcome) = last.filter(|t| t.status.is_retryable()) else {
            tracing::debug!(
                transaction_id = %previous.transaction_id,
                "No failed outcome recorded; payment may still settle"
            );
            return Err(PaymentError::NothingToRetry);
        };

        let booking_id = previous.booking_id.clone();
        let retryable = self
            .bookings()
            .state(|s| s.booking(&booking_id).is_some_and(lifecycle::can_retry_payment))
            .await;
        if !retryable {
            tracing::debug!(booking_id = %booking_id, "Booking does not accept a retry");
            return Err(PaymentError::NothingToRetry);
        }

        self.bookings()
            .send(BookingAction::Request {
                booking_id: booking_id.clone(),
                event: LifecycleEvent::PaymentRetried,
            })
            .await?;

        let rejected = self
            .bookings()
            .state(|s| {
                matches!(
                    &s.last_rejection,
                    Some(PaymentError::IllegalTransition {
                        event: LifecycleEvent::PaymentRetried,
                        ..
                    })
                )
            })
            .await;
        if rejected {
            tracing::warn!(booking_id = %booking_id, "Retry rejected by lifecycle");
            return Err(PaymentError::NothingToRetry);
        }

        tracing::info!(
            booking_id = %booking_id,
            superseded = %outcome.transaction_id,
            status = ?outcome.status,
            "Retrying payment"
        );
        metrics::counter!("payments.checkout.retried").increment(1);

        self.start_payment(&booking_id, previous.method).await
    }

    /// Whether the retry action should be offered for `booking_id`.
    ///
    /// # Errors
    ///
    /// Returns error if checkout storage fails.
    pub async fn retry_available(&self, booking_id: &BookingId) -> Result<bool> {
        let in_flight = self.checkout.load_in_flight().await?;
        if !in_flight.is_some_and(|p| &p.booking_id == booking_id) {
            return Ok(false);
        }
        Ok(self
            .bookings()
            .state(|s| s.booking(booking_id).is_some_and(lifecycle::can_retry_payment))
            .await)
    }

    /// Stop accepting lifecycle requests and wait for write-throughs that
    /// are already in flight to land in the cache.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Storage`] if write-throughs are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.bookings().shutdown(timeout).await?;
        tracing::info!("Payment coordinator stopped");
        Ok(())
    }

    /// Handle a landing URL: reconcile the redirect, then poll if the
    /// outcome is still open.
    ///
    /// `cancel` ends polling when the landing view goes away.
    ///
    /// # Errors
    ///
    /// Returns error from reconciliation or polling; settlement failures are
    /// not errors.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn handle_redirect(
        &self,
        landing_url: &str,
        cancel: CancellationToken,
    ) -> Result<RedirectResolution> {
        let reconcile = self.reconciler.reconcile(landing_url).await?;

        let poll = match reconcile.needs_polling() {
            Some(transaction_id) => Some(self.poller.poll(transaction_id, cancel).await?),
            None => None,
        };

        Ok(RedirectResolution { reconcile, poll })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{TransactionId, TransactionStatus};

    fn transaction(status: TransactionStatus) -> PaymentTransaction {
        PaymentTransaction {
            transaction_id: TransactionId::new("T1"),
            booking_id: BookingId::new("b-1"),
            status,
            amount: 100,
            failure_reason: None,
        }
    }

    #[test]
    fn polled_outcome_wins_over_reconciliation() {
        let resolution = RedirectResolution {
            reconcile: ReconcileOutcome::Deferred {
                transaction_id: TransactionId::new("T1"),
                reason: PaymentError::Network("reset".to_string()),
            },
            poll: Some(PollOutcome::Terminal(transaction(TransactionStatus::Success))),
        };

        assert_eq!(
            resolution.transaction().map(|t| t.status),
            Some(TransactionStatus::Success)
        );
        assert_eq!(resolution.landing_url(), None);
    }

    #[test]
    fn cached_duplicate_is_reported() {
        let resolution = RedirectResolution {
            reconcile: ReconcileOutcome::AlreadyProcessed {
                transaction_id: TransactionId::new("T1"),
                cached: Some(transaction(TransactionStatus::Timeout)),
            },
            poll: None,
        };

        assert_eq!(
            resolution.transaction().map(|t| t.status),
            Some(TransactionStatus::Timeout)
        );
    }
}
