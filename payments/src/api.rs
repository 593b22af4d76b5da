//! Backend REST client.
//!
//! Every call goes through the [`CredentialRefreshInterceptor`], so an
//! expired credential is renewed transparently.

use crate::constants::paths;
use crate::error::{PaymentError, Result};
use crate::gateway::RedirectParams;
use crate::interceptor::{ApiRequest, CredentialRefreshInterceptor};
use crate::providers::{BookingBackend, PaymentBackend, SessionStore};
use crate::state::{
    Booking, BookingId, BookingStatus, PaymentInit, PaymentMethod, PaymentTransaction,
    TransactionId,
};
use crate::transport::HttpTransport;
use serde_json::json;

/// Typed client for the booking and payment endpoints.
pub struct BookingApiClient<T, S> {
    interceptor: CredentialRefreshInterceptor<T, S>,
}

impl<T, S> Clone for BookingApiClient<T, S> {
    fn clone(&self) -> Self {
        Self {
            interceptor: self.interceptor.clone(),
        }
    }
}

impl<T, S> BookingApiClient<T, S>
where
    T: HttpTransport,
    S: SessionStore,
{
    /// Wrap an interceptor.
    #[must_use]
    pub const fn new(interceptor: CredentialRefreshInterceptor<T, S>) -> Self {
        Self { interceptor }
    }

    /// The underlying interceptor.
    #[must_use]
    pub const fn interceptor(&self) -> &CredentialRefreshInterceptor<T, S> {
        &self.interceptor
    }
}

impl<T, S> BookingBackend for BookingApiClient<T, S>
where
    T: HttpTransport,
    S: SessionStore,
{
    async fn confirm_booking(&self, booking_id: &BookingId) -> Result<Booking> {
        let path = format!("{}{booking_id}/confirm", paths::BOOKINGS);
        self.interceptor
            .execute_json(ApiRequest::post(path, json!({})))
            .await
    }

    async fn update_status(&self, booking_id: &BookingId, status: BookingStatus) -> Result<Booking> {
        let path = format!("{}{booking_id}/status", paths::BOOKINGS);
        self.interceptor
            .execute_json(ApiRequest::put(path, json!({ "status": status.as_wire() })))
            .await
    }
}

impl<T, S> PaymentBackend for BookingApiClient<T, S>
where
    T: HttpTransport,
    S: SessionStore,
{
    async fn init_payment(&self, booking_id: &BookingId, method: PaymentMethod) -> Result<PaymentInit> {
        let body = json!({ "bookingId": booking_id, "method": method });
        self.interceptor
            .execute_json(ApiRequest::post(paths::PAYMENT_INIT, body))
            .await
    }

    async fn payment_status(&self, transaction_id: &TransactionId) -> Result<PaymentTransaction> {
        let path = format!("{}{transaction_id}", paths::PAYMENT_STATUS);
        self.interceptor.execute_json(ApiRequest::get(path)).await
    }

    async fn settle_redirect(&self, params: &RedirectParams) -> Result<PaymentTransaction> {
        let path = format!("{}?{}", paths::PAYMENT_RESULT, params.to_query()?);
        let result = self.interceptor.execute_json(ApiRequest::get(path)).await;

        match result {
            // The backend answers 400/422 when the checksum does not verify.
            Err(PaymentError::Api {
                status: 400 | 422, ..
            }) => Err(PaymentError::ChecksumMismatch {
                transaction_id: params
                    .transaction_id()
                    .map(|id| id.0)
                    .unwrap_or_default(),
            }),
            other => other,
        }
    }
}
