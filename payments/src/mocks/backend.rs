//! In-memory booking/payment backend for testing.

use crate::error::{PaymentError, Result};
use crate::gateway::RedirectParams;
use crate::lifecycle::{self, LifecycleEvent};
use crate::providers::{BookingBackend, PaymentBackend};
use crate::state::{
    Booking, BookingId, BookingStatus, PaymentInit, PaymentMethod, PaymentTransaction,
    TransactionId, TransactionStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Backend {
    bookings: HashMap<BookingId, Booking>,
    transactions: HashMap<TransactionId, PaymentTransaction>,
    /// Scripted status answers, consumed before the stored transaction.
    status_script: HashMap<TransactionId, VecDeque<Result<PaymentTransaction>>>,
    /// Settlement answers by transaction; absent means "settle from params".
    settle_script: HashMap<TransactionId, Result<PaymentTransaction>>,
    next_transaction: u32,
    init_calls: Vec<(BookingId, PaymentMethod)>,
    settle_calls: Vec<TransactionId>,
    status_calls: usize,
}

/// Mock backend.
///
/// Keeps authoritative bookings and transactions in memory and applies the
/// same lifecycle rules as the client. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockBookingBackend {
    inner: Arc<Mutex<Backend>>,
}

impl MockBookingBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a booking.
    pub fn insert_booking(&self, booking: Booking) {
        self.lock().bookings.insert(booking.id.clone(), booking);
    }

    /// Authoritative booking.
    #[must_use]
    pub fn booking(&self, id: &BookingId) -> Option<Booking> {
        self.lock().bookings.get(id).cloned()
    }

    /// Seed or overwrite a transaction.
    pub fn insert_transaction(&self, transaction: PaymentTransaction) {
        self.lock()
            .transactions
            .insert(transaction.transaction_id.clone(), transaction);
    }

    /// Queue an answer for the next status query of `transaction_id`.
    pub fn script_status(&self, transaction_id: &TransactionId, answer: Result<PaymentTransaction>) {
        self.lock()
            .status_script
            .entry(transaction_id.clone())
            .or_default()
            .push_back(answer);
    }

    /// Fix the settlement answer for `transaction_id`.
    pub fn script_settlement(&self, transaction_id: &TransactionId, answer: Result<PaymentTransaction>) {
        self.lock()
            .settle_script
            .insert(transaction_id.clone(), answer);
    }

    /// Number of settlement calls for `transaction_id`.
    #[must_use]
    pub fn settle_calls(&self, transaction_id: &TransactionId) -> usize {
        self.lock()
            .settle_calls
            .iter()
            .filter(|id| *id == transaction_id)
            .count()
    }

    /// All payment initializations, in order.
    #[must_use]
    pub fn init_calls(&self) -> Vec<(BookingId, PaymentMethod)> {
        self.lock().init_calls.clone()
    }

    /// Number of status queries.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    fn apply(&self, booking_id: &BookingId, event: &LifecycleEvent) -> Result<Booking> {
        let mut backend = self.lock();
        let current = backend
            .bookings
            .get(booking_id)
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("booking {booking_id} not found"),
            })?;
        let next = lifecycle::transition(current, event)
            .map_err(|e| PaymentError::Api {
                status: 409,
                message: e.to_string(),
            })?
            .booking;
        backend.bookings.insert(booking_id.clone(), next.clone());
        Ok(next)
    }
}

impl BookingBackend for MockBookingBackend {
    async fn confirm_booking(&self, booking_id: &BookingId) -> Result<Booking> {
        self.apply(booking_id, &LifecycleEvent::Confirm)
    }

    async fn update_status(&self, booking_id: &BookingId, status: BookingStatus) -> Result<Booking> {
        let event = match status {
            BookingStatus::Cancelled => LifecycleEvent::Cancel,
            BookingStatus::Completed => LifecycleEvent::ServiceRendered,
            BookingStatus::NoShow => LifecycleEvent::NoShow,
            other => {
                return Err(PaymentError::Api {
                    status: 400,
                    message: format!("cannot set status {}", other.as_wire()),
                });
            },
        };
        self.apply(booking_id, &event)
    }
}

impl PaymentBackend for MockBookingBackend {
    async fn init_payment(&self, booking_id: &BookingId, method: PaymentMethod) -> Result<PaymentInit> {
        let mut backend = self.lock();
        let amount = backend
            .bookings
            .get(booking_id)
            .map(|booking| booking.total_amount)
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("booking {booking_id} not found"),
            })?;

        backend.next_transaction += 1;
        let transaction_id = TransactionId::new(format!("T{}", backend.next_transaction));
        backend.init_calls.push((booking_id.clone(), method));
        backend.transactions.insert(
            transaction_id.clone(),
            PaymentTransaction {
                transaction_id: transaction_id.clone(),
                booking_id: booking_id.clone(),
                status: TransactionStatus::Pending,
                amount,
                failure_reason: None,
            },
        );

        let redirect_url = match method {
            PaymentMethod::Gateway => Some(format!("https://gateway.test/pay/{transaction_id}")),
            PaymentMethod::Cash => None,
        };
        Ok(PaymentInit {
            redirect_url,
            transaction_id,
        })
    }

    async fn payment_status(&self, transaction_id: &TransactionId) -> Result<PaymentTransaction> {
        let mut backend = self.lock();
        backend.status_calls += 1;

        if let Some(answer) = backend
            .status_script
            .get_mut(transaction_id)
            .and_then(VecDeque::pop_front)
        {
            if let Ok(transaction) = &answer {
                backend
                    .transactions
                    .insert(transaction_id.clone(), transaction.clone());
            }
            return answer;
        }

        backend
            .transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("transaction {transaction_id} not found"),
            })
    }

    async fn settle_redirect(&self, params: &RedirectParams) -> Result<PaymentTransaction> {
        let transaction_id = params
            .transaction_id()
            .ok_or_else(|| PaymentError::MalformedRedirect("missing apptransid".to_string()))?;

        let mut backend = self.lock();
        backend.settle_calls.push(transaction_id.clone());

        if let Some(answer) = backend.settle_script.get(&transaction_id).cloned() {
            if let Ok(transaction) = &answer {
                backend
                    .transactions
                    .insert(transaction_id.clone(), transaction.clone());
            }
            return answer;
        }

        let transaction = backend
            .transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("transaction {transaction_id} not found"),
            })?;
        transaction.status = params.code().status();
        Ok(transaction.clone())
    }
}
