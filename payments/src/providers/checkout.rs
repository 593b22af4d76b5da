//! Checkout state store trait.

use crate::error::Result;
use crate::state::{InFlightPayment, PaymentTransaction, TransactionId};
use std::time::Duration;

/// Persisted checkout state: the payment in flight and settled outcomes.
///
/// Lets the landing page and the retry action work after a reload without
/// re-fetching the booking.
pub trait CheckoutStore: Send + Sync {
    /// Remember the payment just initialized, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn save_in_flight(
        &self,
        payment: &InFlightPayment,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// The payment in flight, if any.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn load_in_flight(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<InFlightPayment>>> + Send;

    /// Forget the payment in flight.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn clear_in_flight(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Persist a transaction outcome by id.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn save_transaction(
        &self,
        transaction: &PaymentTransaction,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Cached transaction outcome by id.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn load_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> impl std::future::Future<Output = Result<Option<PaymentTransaction>>> + Send;
}
