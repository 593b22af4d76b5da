//! Shared fixtures for the payment pipeline integration tests.

#![allow(dead_code)]

use chrono::Utc;
use slotpay_payments::environment::BookingEnvironment;
use slotpay_payments::mocks::MockBookingBackend;
use slotpay_payments::reducers::BookingReducer;
use slotpay_payments::state::{BookingDetail, DetailStatus};
use slotpay_payments::stores::InMemoryStore;
use slotpay_payments::{
    Booking, BookingAction, BookingId, BookingState, BookingStatus, BookingStore, NoticeBus,
    Notice, PaymentConfig, PaymentCoordinator, PaymentStatus, PaymentTransaction, TransactionId,
    TransactionStatus,
};
use std::sync::Arc;
use std::time::Duration;

/// Coordinator over in-memory stores and the mock backend.
pub type TestCoordinator =
    PaymentCoordinator<InMemoryStore, MockBookingBackend, InMemoryStore, MockBookingBackend>;

/// Landing page base used by every redirect.
pub const LANDING: &str = "https://shop.test/payment/result";

/// Everything a checkout test touches.
pub struct Harness {
    pub backend: MockBookingBackend,
    pub store: Arc<InMemoryStore>,
    pub notices: NoticeBus,
    pub coordinator: TestCoordinator,
}

/// Fast polling so tests finish quickly.
pub fn config() -> PaymentConfig {
    PaymentConfig::new("http://api.test")
        .with_poll_interval(Duration::from_millis(5))
        .with_poll_max_failures(3)
}

impl Harness {
    pub fn new() -> Self {
        slotpay_testing::init_tracing();
        let backend = MockBookingBackend::new();
        let store = Arc::new(InMemoryStore::new());
        let notices = NoticeBus::default();
        let shared = Arc::new(backend.clone());

        let bookings: BookingStore<MockBookingBackend> = BookingStore::new(
            BookingState::default(),
            BookingReducer::new(),
            BookingEnvironment::new(Arc::clone(&shared)),
        );
        let coordinator = PaymentCoordinator::new(
            &config(),
            Arc::clone(&store),
            shared,
            Arc::clone(&store),
            bookings,
            notices.clone(),
        );

        Self {
            backend,
            store,
            notices,
            coordinator,
        }
    }

    /// Seed a confirmed-by-customer (pending) booking on both sides.
    pub async fn pending_booking(&self, id: &str) -> BookingId {
        let booking = pending_booking(id);
        self.backend.insert_booking(booking.clone());
        self.coordinator
            .bookings()
            .send(BookingAction::Loaded { booking })
            .await
            .unwrap();
        BookingId::new(id)
    }

    pub async fn cached(&self, id: &BookingId) -> Option<Booking> {
        self.coordinator
            .bookings()
            .state(|s| s.booking(id).cloned())
            .await
    }

    pub async fn statuses(&self, id: &BookingId) -> (Option<BookingStatus>, Option<PaymentStatus>) {
        let booking = self.cached(id).await;
        (
            booking.as_ref().map(|b| b.status),
            booking.as_ref().map(|b| b.payment_status),
        )
    }
}

pub fn scheduled_item(id: &str, final_price: i64) -> BookingDetail {
    BookingDetail {
        id: id.to_string(),
        service_id: "massage-60".to_string(),
        staff_id: Some("staff-1".to_string()),
        start_time: Utc::now(),
        end_time: Utc::now(),
        price: final_price,
        discount: 0,
        final_price,
        status: DetailStatus::Scheduled,
    }
}

pub fn pending_booking(id: &str) -> Booking {
    let mut booking = Booking::draft(BookingId::new(id));
    booking.line_items.push(scheduled_item("d-1", 250_000));
    booking.recompute_total();
    booking.status = BookingStatus::Pending;
    booking
}

pub fn transaction(id: &str, booking_id: &str, status: TransactionStatus) -> PaymentTransaction {
    PaymentTransaction {
        transaction_id: TransactionId::new(id),
        booking_id: BookingId::new(booking_id),
        status,
        amount: 250_000,
        failure_reason: None,
    }
}

pub fn redirect(transaction_id: &str, code: &str) -> String {
    format!("{LANDING}?apptransid={transaction_id}&status={code}&amount=250000&appid=553&bankcode=VTB&checksum=abc123")
}

/// Drain every notice published so far.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}
