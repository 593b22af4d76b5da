//! Backend REST API traits.
//!
//! Implemented by [`crate::api::BookingApiClient`] (through the refresh
//! interceptor) and by [`crate::mocks::MockBookingBackend`].

use crate::error::Result;
use crate::gateway::RedirectParams;
use crate::state::{
    Booking, BookingId, BookingStatus, PaymentInit, PaymentMethod, PaymentTransaction,
    TransactionId,
};

/// Booking write-through endpoints.
pub trait BookingBackend: Send + Sync {
    /// `POST /bookings/{id}/confirm`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it.
    fn confirm_booking(
        &self,
        booking_id: &BookingId,
    ) -> impl std::future::Future<Output = Result<Booking>> + Send;

    /// `PUT /bookings/{id}/status`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it.
    fn update_status(
        &self,
        booking_id: &BookingId,
        status: BookingStatus,
    ) -> impl std::future::Future<Output = Result<Booking>> + Send;
}

/// Payment endpoints.
pub trait PaymentBackend: Send + Sync {
    /// `POST /payments/init`. Every call creates a new transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it.
    fn init_payment(
        &self,
        booking_id: &BookingId,
        method: PaymentMethod,
    ) -> impl std::future::Future<Output = Result<PaymentInit>> + Send;

    /// `GET /payments/status/{transactionId}`. Idempotent read.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it.
    fn payment_status(
        &self,
        transaction_id: &TransactionId,
    ) -> impl std::future::Future<Output = Result<PaymentTransaction>> + Send;

    /// `GET /payments/result?<redirect params>`: checksum verification and
    /// authoritative settlement. Not idempotent from the client's view.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PaymentError::ChecksumMismatch`] if verification
    /// fails, or another error if the request fails.
    fn settle_redirect(
        &self,
        params: &RedirectParams,
    ) -> impl std::future::Future<Output = Result<PaymentTransaction>> + Send;
}
