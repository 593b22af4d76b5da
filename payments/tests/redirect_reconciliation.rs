//! Integration tests for gateway redirect reconciliation.

mod common;

use common::{Harness, drain, redirect, transaction};
use proptest::prelude::*;
use slotpay_payments::gateway::mark_processed;
use slotpay_payments::providers::CheckoutStore;
use slotpay_payments::{
    BookingAction, BookingStatus, Notice, PaymentError, PaymentMethod, PaymentStatus,
    ReconcileOutcome, TransactionId, TransactionStatus,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn successful_redirect_settles_once_and_confirms_booking() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    let init = harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    assert_eq!(init.transaction_id, TransactionId::new("T1"));
    assert!(init.redirect_url.is_some());
    let mut rx = harness.notices.subscribe();

    let resolution = harness
        .coordinator
        .handle_redirect(&redirect("T1", "1"), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(resolution.reconcile, ReconcileOutcome::Settled { .. }));
    assert_eq!(resolution.poll, None);
    assert_eq!(
        resolution.transaction().map(|t| t.status),
        Some(TransactionStatus::Success)
    );
    assert_eq!(harness.backend.settle_calls(&TransactionId::new("T1")), 1);
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Confirmed), Some(PaymentStatus::Paid))
    );
    assert!(resolution.landing_url().unwrap().contains("processed=1"));
    assert_eq!(harness.store.load_in_flight().await.unwrap(), None);

    let notices = drain(&mut rx);
    assert!(notices.iter().any(|n| matches!(
        n,
        Notice::PaymentResult {
            retry_available: false,
            ..
        }
    )));
    assert!(notices.iter().any(|n| matches!(n, Notice::CacheInvalidation { .. })));
}

#[tokio::test]
async fn reloading_processed_url_reuses_cached_outcome() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();

    let first = harness
        .coordinator
        .handle_redirect(&redirect("T1", "1"), CancellationToken::new())
        .await
        .unwrap();
    let marked = first.landing_url().unwrap().to_string();

    let reload = harness
        .coordinator
        .handle_redirect(&marked, CancellationToken::new())
        .await
        .unwrap();

    let ReconcileOutcome::AlreadyProcessed { cached, .. } = &reload.reconcile else {
        panic!("expected a duplicate, got {:?}", reload.reconcile);
    };
    assert_eq!(cached.as_ref().map(|t| t.status), Some(TransactionStatus::Success));
    assert_eq!(reload.poll, None);
    assert_eq!(harness.backend.settle_calls(&TransactionId::new("T1")), 1);
    assert_eq!(harness.backend.status_calls(), 0);
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Confirmed), Some(PaymentStatus::Paid))
    );
}

#[tokio::test]
async fn timeout_offers_retry_with_a_new_transaction() {
    let harness = Harness::new();
    let other = harness.pending_booking("b-0").await;
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&other, PaymentMethod::Gateway)
        .await
        .unwrap();
    let init = harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    assert_eq!(init.transaction_id, TransactionId::new("T2"));
    let mut rx = harness.notices.subscribe();

    let resolution = harness
        .coordinator
        .handle_redirect(&redirect("T2", "-49"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        resolution.transaction().map(|t| t.status),
        Some(TransactionStatus::Timeout)
    );
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Pending), Some(PaymentStatus::Failed))
    );
    assert!(drain(&mut rx).iter().any(|n| matches!(
        n,
        Notice::PaymentResult {
            retry_available: true,
            ..
        }
    )));
    assert!(harness.coordinator.retry_available(&booking_id).await.unwrap());

    let retried = harness.coordinator.retry_payment().await.unwrap();

    assert_eq!(retried.transaction_id, TransactionId::new("T3"));
    let inits = harness.backend.init_calls();
    assert_eq!(inits.len(), 3);
    assert_eq!(inits[2], (booking_id.clone(), PaymentMethod::Gateway));
    assert_eq!(
        harness.store.load_in_flight().await.unwrap().map(|p| p.transaction_id),
        Some(TransactionId::new("T3"))
    );
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Pending), Some(PaymentStatus::Pending))
    );
}

#[tokio::test]
async fn retry_without_payment_in_flight_is_rejected() {
    let harness = Harness::new();

    let err = harness.coordinator.retry_payment().await.unwrap_err();

    assert_eq!(err, PaymentError::NothingToRetry);
    assert!(harness.backend.init_calls().is_empty());
}

#[tokio::test]
async fn settled_payment_cannot_be_retried() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    let in_flight = harness.store.load_in_flight().await.unwrap().unwrap();
    harness
        .coordinator
        .handle_redirect(&redirect("T1", "1"), CancellationToken::new())
        .await
        .unwrap();
    // Restore the in-flight record so only the cached outcome decides.
    harness
        .store
        .save_in_flight(&in_flight, std::time::Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(
        harness.coordinator.retry_payment().await,
        Err(PaymentError::NothingToRetry)
    );
}

#[tokio::test]
async fn retry_before_any_outcome_is_rejected() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();

    let result = harness.coordinator.retry_payment().await;

    assert_eq!(result, Err(PaymentError::NothingToRetry));
    assert_eq!(harness.backend.init_calls().len(), 1);
    assert_eq!(
        harness.store.load_in_flight().await.unwrap().map(|p| p.transaction_id),
        Some(TransactionId::new("T1"))
    );
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Pending), Some(PaymentStatus::Pending))
    );
    assert!(!harness.coordinator.retry_available(&booking_id).await.unwrap());
}

#[tokio::test]
async fn retry_while_gateway_reports_processing_is_rejected() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    let outcome = harness
        .coordinator
        .reconciler()
        .reconcile(&redirect("T1", "0"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Settled { ref transaction, .. } if transaction.status == TransactionStatus::Pending
    ));

    assert_eq!(
        harness.coordinator.retry_payment().await,
        Err(PaymentError::NothingToRetry)
    );
    assert_eq!(harness.backend.init_calls().len(), 1);
}

#[tokio::test]
async fn retry_refused_by_lifecycle_starts_no_transaction() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    harness
        .coordinator
        .handle_redirect(&redirect("T1", "-49"), CancellationToken::new())
        .await
        .unwrap();
    // A refetch shows the booking was cancelled in the meantime.
    let mut cancelled = common::pending_booking("b-1");
    cancelled.status = BookingStatus::Cancelled;
    harness
        .coordinator
        .bookings()
        .send(BookingAction::Loaded { booking: cancelled })
        .await
        .unwrap();

    assert_eq!(
        harness.coordinator.retry_payment().await,
        Err(PaymentError::NothingToRetry)
    );
    assert_eq!(harness.backend.init_calls().len(), 1);
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Cancelled), Some(PaymentStatus::Pending))
    );
}

#[tokio::test]
async fn concurrent_retries_open_one_transaction() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    harness
        .coordinator
        .handle_redirect(&redirect("T1", "-3"), CancellationToken::new())
        .await
        .unwrap();

    let results = futures::future::join_all(
        (0..2).map(|_| harness.coordinator.retry_payment()),
    )
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.contains(&Err(PaymentError::NothingToRetry)));
    assert_eq!(harness.backend.init_calls().len(), 2);
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Pending), Some(PaymentStatus::Pending))
    );
}

#[tokio::test]
async fn cash_booking_paid_online_later_becomes_paid() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Cash)
        .await
        .unwrap();
    let init = harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    assert_eq!(init.transaction_id, TransactionId::new("T2"));

    let resolution = harness
        .coordinator
        .handle_redirect(&redirect("T2", "1"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        resolution.transaction().map(|t| t.status),
        Some(TransactionStatus::Success)
    );
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Confirmed), Some(PaymentStatus::Paid))
    );
    assert_eq!(
        harness.coordinator.bookings().state(|s| s.last_rejection.clone()).await,
        None
    );
}

#[tokio::test]
async fn shutdown_lets_pending_confirmation_land() {
    let harness = Harness::new();
    let mut draft = slotpay_payments::Booking::draft(slotpay_payments::BookingId::new("b-9"));
    draft.line_items.push(common::scheduled_item("d-1", 250_000));
    draft.recompute_total();
    harness.backend.insert_booking(draft.clone());
    let bookings = harness.coordinator.bookings();
    bookings
        .send(BookingAction::Loaded { booking: draft.clone() })
        .await
        .unwrap();
    let _in_flight = bookings
        .send(BookingAction::Request {
            booking_id: draft.id.clone(),
            event: slotpay_payments::LifecycleEvent::Confirm,
        })
        .await
        .unwrap();

    harness
        .coordinator
        .shutdown(std::time::Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(
        harness.statuses(&draft.id).await,
        (Some(BookingStatus::Pending), Some(PaymentStatus::Pending))
    );
    let after = harness
        .coordinator
        .start_payment(&draft.id, PaymentMethod::Cash)
        .await;
    assert!(matches!(after, Err(PaymentError::Storage(_))));
}

#[tokio::test]
async fn cash_payment_confirms_without_redirect() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;

    let init = harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Cash)
        .await
        .unwrap();

    assert_eq!(init.redirect_url, None);
    let booking = harness.cached(&booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Pending);
    assert_eq!(booking.settlement, Some(slotpay_payments::state::Settlement::Cash));
}

#[tokio::test]
async fn landing_without_transaction_does_nothing() {
    let harness = Harness::new();

    let resolution = harness
        .coordinator
        .handle_redirect("https://shop.test/payment/result", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resolution.reconcile, ReconcileOutcome::Ignored);
    assert_eq!(resolution.poll, None);
    assert_eq!(harness.backend.status_calls(), 0);
}

#[tokio::test]
async fn unverified_redirect_falls_back_to_polling() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    let id = TransactionId::new("T1");
    harness.backend.script_settlement(
        &id,
        Err(PaymentError::ChecksumMismatch {
            transaction_id: "T1".to_string(),
        }),
    );
    harness
        .backend
        .script_status(&id, Ok(transaction("T1", "b-1", TransactionStatus::Pending)));
    harness
        .backend
        .script_status(&id, Ok(transaction("T1", "b-1", TransactionStatus::Success)));
    let mut rx = harness.notices.subscribe();

    let resolution = harness
        .coordinator
        .handle_redirect(&redirect("T1", "1"), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(resolution.reconcile, ReconcileOutcome::Deferred { .. }));
    assert_eq!(
        resolution.transaction().map(|t| t.status),
        Some(TransactionStatus::Success)
    );
    assert_eq!(harness.backend.settle_calls(&id), 1);
    assert_eq!(harness.backend.status_calls(), 2);
    assert_eq!(
        harness.statuses(&booking_id).await,
        (Some(BookingStatus::Confirmed), Some(PaymentStatus::Paid))
    );
    assert!(drain(&mut rx)
        .iter()
        .any(|n| *n == Notice::RedirectUnverified { transaction_id: id.clone() }));
}

#[tokio::test]
async fn concurrent_duplicate_redirects_settle_once() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    let url = redirect("T1", "1");

    let outcomes = futures::future::join_all(
        (0..8).map(|_| harness.coordinator.reconciler().reconcile(&url)),
    )
    .await;

    let settled = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(ReconcileOutcome::Settled { .. })))
        .count();
    assert_eq!(settled, 1);
    assert_eq!(harness.backend.settle_calls(&TransactionId::new("T1")), 1);
}

#[tokio::test]
async fn persisted_and_polled_outcomes_agree() {
    let harness = Harness::new();
    let booking_id = harness.pending_booking("b-1").await;
    harness
        .coordinator
        .start_payment(&booking_id, PaymentMethod::Gateway)
        .await
        .unwrap();
    let id = TransactionId::new("T1");

    harness
        .coordinator
        .handle_redirect(&redirect("T1", "-3"), CancellationToken::new())
        .await
        .unwrap();
    let persisted = harness.store.load_transaction(&id).await.unwrap().unwrap();

    let polled = harness
        .coordinator
        .poller()
        .poll(&id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(persisted.status, TransactionStatus::Failed);
    assert_eq!(polled, slotpay_payments::PollOutcome::Terminal(persisted));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any mix of plain and already-marked redirects for one transaction
    /// reaches the backend's settlement endpoint at most once.
    #[test]
    fn repeated_redirects_settle_at_most_once(marked in prop::collection::vec(any::<bool>(), 1..12)) {
        let settle_calls = tokio_test::block_on(async {
            let harness = Harness::new();
            let booking_id = harness.pending_booking("b-1").await;
            harness
                .coordinator
                .start_payment(&booking_id, PaymentMethod::Gateway)
                .await
                .unwrap();

            for is_marked in &marked {
                let url = redirect("T1", "1");
                let url = if *is_marked { mark_processed(&url) } else { url };
                harness.coordinator.reconciler().reconcile(&url).await.unwrap();
            }
            harness.backend.settle_calls(&TransactionId::new("T1"))
        });

        prop_assert!(settle_calls <= 1);
        prop_assert_eq!(settle_calls == 1, marked.contains(&false));
    }
}
