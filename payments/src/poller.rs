//! Payment status poller.
//!
//! Authoritative fallback for redirect reconciliation. Queries
//! `GET /payments/status/{id}` until the transaction is terminal or the
//! caller cancels. A pending status never ends the loop.
//!
//! Query failures are counted by a [`RetryBudget`]: a success resets the
//! streak, exhausting it publishes [`Notice::PollingStalled`] and returns
//! [`PollOutcome::Unreachable`] while the booking stays pending.

use crate::error::{PaymentError, Result};
use crate::notice::Notice;
use crate::outcome::OutcomeRecorder;
use crate::providers::{BookingBackend, CheckoutStore, PaymentBackend};
use crate::state::{PaymentTransaction, TransactionId};
use slotpay_runtime::{RetryBudget, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The transaction reached a terminal status.
    Terminal(PaymentTransaction),
    /// The caller cancelled.
    Cancelled,
    /// Too many consecutive query failures; the payment is still pending.
    Unreachable {
        /// Consecutive failures observed.
        failures: u32,
        /// Last query error.
        last_error: PaymentError,
    },
}

/// Polls payment status on a fixed cadence.
pub struct PaymentStatusPoller<P, C, B>
where
    B: BookingBackend + 'static,
{
    backend: Arc<P>,
    recorder: OutcomeRecorder<C, B>,
    interval: Duration,
    max_failures: u32,
}

impl<P, C, B> Clone for PaymentStatusPoller<P, C, B>
where
    B: BookingBackend + 'static,
{
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            recorder: self.recorder.clone(),
            interval: self.interval,
            max_failures: self.max_failures,
        }
    }
}

impl<P, C, B> PaymentStatusPoller<P, C, B>
where
    P: PaymentBackend,
    C: CheckoutStore,
    B: BookingBackend + 'static,
{
    /// Poll every `interval`, giving up after `max_failures` consecutive
    /// query failures.
    #[must_use]
    pub const fn new(
        backend: Arc<P>,
        recorder: OutcomeRecorder<C, B>,
        interval: Duration,
        max_failures: u32,
    ) -> Self {
        Self {
            backend,
            recorder,
            interval,
            max_failures,
        }
    }

    fn budget(&self) -> RetryBudget {
        // Failed queries wait the regular interval, not an exponential backoff.
        RetryBudget::new(
            RetryPolicy::builder()
                .max_retries(usize::try_from(self.max_failures.saturating_sub(1)).unwrap_or(usize::MAX))
                .initial_delay(self.interval)
                .max_delay(self.interval)
                .multiplier(1.0)
                .build(),
        )
    }

    /// Poll `transaction_id` until it is terminal or `cancel` fires.
    ///
    /// The first query is issued immediately. A terminal status is recorded
    /// through the [`OutcomeRecorder`] before returning. A response that
    /// arrives after cancellation is discarded.
    ///
    /// # Errors
    ///
    /// - authorization failures (the session is gone; polling cannot continue)
    /// - storage errors while recording the outcome
    #[tracing::instrument(skip(self, cancel))]
    pub async fn poll(
        &self,
        transaction_id: &TransactionId,
        cancel: CancellationToken,
    ) -> Result<PollOutcome> {
        let mut budget = self.budget();

        loop {
            if cancel.is_cancelled() {
                return Ok(cancelled());
            }

            metrics::counter!("payments.poll.queries").increment(1);
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(cancelled()),
                result = self.backend.payment_status(transaction_id) => result,
            };

            let wait = match result {
                Ok(transaction) if transaction.status.is_terminal() => {
                    tracing::info!(status = ?transaction.status, "Payment reached terminal status");
                    metrics::counter!("payments.poll.terminal").increment(1);
                    self.recorder.record(&transaction).await?;
                    return Ok(PollOutcome::Terminal(transaction));
                },
                Ok(_) => {
                    tracing::debug!("Payment still pending");
                    budget.record_success();
                    self.interval
                },
                Err(error) if error.is_auth_failure() => {
                    tracing::warn!(error = %error, "Polling stopped; session ended");
                    return Err(error);
                },
                Err(error) => {
                    metrics::counter!("payments.poll.failures").increment(1);
                    let Some(delay) = budget.record_failure() else {
                        let failures = u32::try_from(budget.consecutive_failures()).unwrap_or(u32::MAX);
                        tracing::warn!(failures, error = %error, "Status polling stalled");
                        metrics::counter!("payments.poll.stalled").increment(1);
                        self.recorder.notices().publish(Notice::PollingStalled {
                            transaction_id: transaction_id.clone(),
                            failures,
                        });
                        return Ok(PollOutcome::Unreachable {
                            failures,
                            last_error: error,
                        });
                    };
                    tracing::debug!(
                        failures = budget.consecutive_failures(),
                        error = %error,
                        "Status query failed; retrying"
                    );
                    delay
                },
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(cancelled()),
                () = tokio::time::sleep(wait) => {},
            }
        }
    }
}

fn cancelled() -> PollOutcome {
    tracing::debug!("Polling cancelled");
    metrics::counter!("payments.poll.cancelled").increment(1);
    PollOutcome::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::BookingEnvironment;
    use crate::mocks::MockBookingBackend;
    use crate::notice::NoticeBus;
    use crate::outcome::BookingStore;
    use crate::reducers::BookingReducer;
    use crate::state::{BookingId, BookingState, TransactionStatus};
    use crate::stores::InMemoryStore;

    type TestPoller = PaymentStatusPoller<MockBookingBackend, InMemoryStore, MockBookingBackend>;

    fn poller(backend: &MockBookingBackend, max_failures: u32) -> TestPoller {
        let backend = Arc::new(backend.clone());
        let bookings: BookingStore<MockBookingBackend> = BookingStore::new(
            BookingState::default(),
            BookingReducer::new(),
            BookingEnvironment::new(Arc::clone(&backend)),
        );
        let recorder = OutcomeRecorder::new(
            Arc::new(InMemoryStore::new()),
            bookings,
            NoticeBus::default(),
            Duration::from_secs(60),
        );
        PaymentStatusPoller::new(backend, recorder, Duration::from_millis(5), max_failures)
    }

    fn transaction(status: TransactionStatus) -> PaymentTransaction {
        PaymentTransaction {
            transaction_id: TransactionId::new("T1"),
            booking_id: BookingId::new("b-1"),
            status,
            amount: 100,
            failure_reason: None,
        }
    }

    #[tokio::test]
    async fn failure_streak_resets_on_success() {
        let backend = MockBookingBackend::new();
        let id = TransactionId::new("T1");
        backend.script_status(&id, Err(PaymentError::Network("reset".into())));
        backend.script_status(&id, Err(PaymentError::Network("reset".into())));
        backend.script_status(&id, Ok(transaction(TransactionStatus::Pending)));
        backend.script_status(&id, Err(PaymentError::Network("reset".into())));
        backend.script_status(&id, Err(PaymentError::Network("reset".into())));
        backend.script_status(&id, Ok(transaction(TransactionStatus::Failed)));

        let outcome = poller(&backend, 3).poll(&id, CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, PollOutcome::Terminal(transaction(TransactionStatus::Failed)));
        assert_eq!(backend.status_calls(), 6);
    }

    #[tokio::test]
    async fn auth_failure_stops_polling() {
        let backend = MockBookingBackend::new();
        let id = TransactionId::new("T1");
        backend.script_status(&id, Err(PaymentError::RefreshRejected { status: 401 }));

        let result = poller(&backend, 3).poll(&id, CancellationToken::new()).await;

        assert_eq!(result, Err(PaymentError::RefreshRejected { status: 401 }));
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test]
    async fn already_cancelled_token_never_queries() {
        let backend = MockBookingBackend::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = poller(&backend, 3)
            .poll(&TransactionId::new("T1"), cancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(backend.status_calls(), 0);
    }
}
