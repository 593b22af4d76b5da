//! Payment redirect reconciler.
//!
//! Turns an untrusted gateway redirect into a backend-verified outcome, at
//! most once per gateway transaction id.
//!
//! ```text
//! landing URL ──► apptransid? ──no──► Ignored
//!                     │yes
//!        processed marker in URL? ──yes──► AlreadyProcessed (cached outcome)
//!                     │no
//!             try_claim(id) ──lost──► AlreadyProcessed
//!                     │won
//!           GET /payments/result ──err──► RedirectUnverified, Deferred (poll)
//!                     │ok
//!       record outcome, mark URL ──► Settled
//! ```
//!
//! The claim is taken before the settlement request. A crash or reload
//! mid-settlement then shows up as `AlreadyProcessed` without a cached
//! outcome, and polling resolves it.

use crate::error::{PaymentError, Result};
use crate::gateway::{self, RedirectParams};
use crate::idempotency::IdempotencyGuard;
use crate::notice::Notice;
use crate::outcome::OutcomeRecorder;
use crate::providers::{BookingBackend, CheckoutStore, IdempotencyStore, PaymentBackend};
use crate::state::{PaymentTransaction, TransactionId, TransactionStatus};
use std::sync::Arc;

/// Result of one reconciliation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No gateway transaction id; nothing to do.
    Ignored,

    /// This redirect was handled before.
    AlreadyProcessed {
        /// Gateway transaction id.
        transaction_id: TransactionId,
        /// Outcome recorded by the earlier run, if it got that far.
        cached: Option<PaymentTransaction>,
    },

    /// The backend verified and settled the redirect.
    Settled {
        /// Verified transaction.
        transaction: PaymentTransaction,
        /// Landing URL carrying the processed marker.
        landing_url: String,
    },

    /// The redirect could not be verified; authoritative status must be polled.
    Deferred {
        /// Gateway transaction id.
        transaction_id: TransactionId,
        /// Why settlement failed.
        reason: PaymentError,
    },
}

impl ReconcileOutcome {
    /// Transaction whose status still has to be polled, if any.
    ///
    /// Deferred redirects, pending settlements, and duplicates without a
    /// terminal cached outcome all need the poller.
    #[must_use]
    pub fn needs_polling(&self) -> Option<&TransactionId> {
        match self {
            Self::Ignored => None,
            Self::AlreadyProcessed {
                transaction_id,
                cached,
            } => match cached {
                Some(transaction) if transaction.status.is_terminal() => None,
                _ => Some(transaction_id),
            },
            Self::Settled { transaction, .. } => (transaction.status == TransactionStatus::Pending)
                .then_some(&transaction.transaction_id),
            Self::Deferred { transaction_id, .. } => Some(transaction_id),
        }
    }
}

/// Reconciles gateway redirects.
pub struct PaymentRedirectReconciler<I, P, C, B>
where
    B: BookingBackend + 'static,
{
    guard: IdempotencyGuard<I>,
    backend: Arc<P>,
    recorder: OutcomeRecorder<C, B>,
}

impl<I, P, C, B> Clone for PaymentRedirectReconciler<I, P, C, B>
where
    B: BookingBackend + 'static,
{
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            backend: Arc::clone(&self.backend),
            recorder: self.recorder.clone(),
        }
    }
}

impl<I, P, C, B> PaymentRedirectReconciler<I, P, C, B>
where
    I: IdempotencyStore,
    P: PaymentBackend,
    C: CheckoutStore,
    B: BookingBackend + 'static,
{
    /// Create a reconciler.
    #[must_use]
    pub const fn new(
        guard: IdempotencyGuard<I>,
        backend: Arc<P>,
        recorder: OutcomeRecorder<C, B>,
    ) -> Self {
        Self {
            guard,
            backend,
            recorder,
        }
    }

    /// Reconcile the redirect carried by `landing_url`.
    ///
    /// Settlement failures (checksum mismatch, network, backend rejection)
    /// are not errors: they publish [`Notice::RedirectUnverified`] and return
    /// [`ReconcileOutcome::Deferred`].
    ///
    /// # Errors
    ///
    /// - [`PaymentError::MalformedRedirect`] if the query cannot be decoded
    /// - storage errors from the idempotency or checkout stores
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, landing_url: &str) -> Result<ReconcileOutcome> {
        let params = RedirectParams::from_url(landing_url)?;

        let Some(transaction_id) = params.transaction_id() else {
            tracing::debug!("Landing URL carries no gateway transaction");
            return Ok(ReconcileOutcome::Ignored);
        };

        if params.is_marked_processed() {
            tracing::debug!(transaction_id = %transaction_id, "Landing URL already processed");
            metrics::counter!("payments.redirect.reloaded").increment(1);
            return self.already_processed(transaction_id).await;
        }

        if !self.guard.try_claim(&transaction_id).await? {
            return self.already_processed(transaction_id).await;
        }

        tracing::info!(
            transaction_id = %transaction_id,
            code = ?params.code(),
            bank = params.bank_code().unwrap_or("-"),
            "Settling gateway redirect"
        );

        match self.backend.settle_redirect(&params).await {
            Ok(transaction) => {
                if let Some(reported) = params.amount().filter(|a| *a != transaction.amount) {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        reported,
                        settled = transaction.amount,
                        "Gateway amount differs from settled amount"
                    );
                    metrics::counter!("payments.redirect.amount_mismatch").increment(1);
                    self.recorder.notices().publish(Notice::AmountMismatch {
                        transaction_id: transaction_id.clone(),
                        reported,
                        settled: transaction.amount,
                    });
                }
                self.recorder.record(&transaction).await?;
                metrics::counter!("payments.redirect.settled").increment(1);
                Ok(ReconcileOutcome::Settled {
                    transaction,
                    landing_url: gateway::mark_processed(landing_url),
                })
            },
            Err(reason) => {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    error = %reason,
                    "Redirect settlement failed; deferring to status polling"
                );
                metrics::counter!("payments.redirect.deferred").increment(1);
                self.recorder.notices().publish(Notice::RedirectUnverified {
                    transaction_id: transaction_id.clone(),
                });
                Ok(ReconcileOutcome::Deferred {
                    transaction_id,
                    reason,
                })
            },
        }
    }

    async fn already_processed(&self, transaction_id: TransactionId) -> Result<ReconcileOutcome> {
        let cached = self.recorder.cached(&transaction_id).await?;
        Ok(ReconcileOutcome::AlreadyProcessed {
            transaction_id,
            cached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::BookingEnvironment;
    use crate::mocks::MockBookingBackend;
    use crate::notice::NoticeBus;
    use crate::outcome::BookingStore;
    use crate::reducers::BookingReducer;
    use crate::state::{BookingId, BookingState};
    use crate::stores::InMemoryStore;
    use std::time::Duration;

    type TestReconciler =
        PaymentRedirectReconciler<InMemoryStore, MockBookingBackend, InMemoryStore, MockBookingBackend>;

    fn reconciler(backend: &MockBookingBackend) -> TestReconciler {
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(backend.clone());
        let bookings: BookingStore<MockBookingBackend> = BookingStore::new(
            BookingState::default(),
            BookingReducer::new(),
            BookingEnvironment::new(Arc::clone(&backend)),
        );
        let recorder = OutcomeRecorder::new(
            Arc::clone(&store),
            bookings,
            NoticeBus::default(),
            Duration::from_secs(60),
        );
        PaymentRedirectReconciler::new(
            IdempotencyGuard::new(store, Duration::from_secs(3600)),
            backend,
            recorder,
        )
    }

    fn pending(id: &str) -> PaymentTransaction {
        PaymentTransaction {
            transaction_id: TransactionId::new(id),
            booking_id: BookingId::new("b-1"),
            status: TransactionStatus::Pending,
            amount: 100,
            failure_reason: None,
        }
    }

    #[tokio::test]
    async fn url_without_transaction_is_ignored() {
        let backend = MockBookingBackend::new();
        let outcome = reconciler(&backend)
            .reconcile("https://shop.test/payment/result?status=1")
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Ignored);
        assert_eq!(outcome.needs_polling(), None);
    }

    #[tokio::test]
    async fn settlement_failure_defers_to_polling() {
        let backend = MockBookingBackend::new();
        backend.insert_transaction(pending("T9"));
        backend.script_settlement(
            &TransactionId::new("T9"),
            Err(PaymentError::ChecksumMismatch {
                transaction_id: "T9".to_string(),
            }),
        );

        let outcome = reconciler(&backend)
            .reconcile("https://shop.test/payment/result?apptransid=T9&status=1&checksum=bad")
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Deferred {
                reason: PaymentError::ChecksumMismatch { .. },
                ..
            }
        ));
        assert_eq!(outcome.needs_polling(), Some(&TransactionId::new("T9")));
    }

    #[tokio::test]
    async fn second_redirect_is_not_settled_again() {
        let backend = MockBookingBackend::new();
        backend.insert_transaction(pending("T1"));
        let reconciler = reconciler(&backend);
        let url = "https://shop.test/payment/result?apptransid=T1&status=1";

        let first = reconciler.reconcile(url).await.unwrap();
        let second = reconciler.reconcile(url).await.unwrap();

        assert!(matches!(first, ReconcileOutcome::Settled { .. }));
        let ReconcileOutcome::AlreadyProcessed { cached, .. } = second else {
            panic!("expected duplicate, got {second:?}");
        };
        assert_eq!(cached.map(|t| t.status), Some(TransactionStatus::Success));
        assert_eq!(backend.settle_calls(&TransactionId::new("T1")), 1);
    }

    #[tokio::test]
    async fn amount_mismatch_is_published_but_still_settles() {
        let backend = MockBookingBackend::new();
        backend.insert_transaction(pending("T5"));
        let reconciler = reconciler(&backend);
        let mut rx = reconciler.recorder.notices().subscribe();

        let outcome = reconciler
            .reconcile("https://shop.test/payment/result?apptransid=T5&status=1&amount=90")
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Settled { .. }));
        assert_eq!(
            rx.try_recv().unwrap(),
            Notice::AmountMismatch {
                transaction_id: TransactionId::new("T5"),
                reported: 90,
                settled: 100,
            }
        );
    }

    #[test]
    fn pending_settlement_still_needs_polling() {
        let outcome = ReconcileOutcome::Settled {
            transaction: pending("T4"),
            landing_url: String::new(),
        };
        assert_eq!(outcome.needs_polling(), Some(&TransactionId::new("T4")));
    }
}
