//! Error types for the booking-to-payment pipeline.

use crate::lifecycle::LifecycleEvent;
use crate::state::BookingStatus;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Error taxonomy for the booking-to-payment pipeline.
///
/// Grouped the way callers react to them: authorization failures tear the
/// session down, transient failures are retried only by the poller, gateway
/// failures end the current transaction, lifecycle errors are programming
/// mistakes surfaced to the developer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PaymentError {
    // ═══════════════════════════════════════════════════════════
    // Authorization
    // ═══════════════════════════════════════════════════════════
    /// The backend rejected the access credential and it could not be renewed.
    #[error("Unauthorized")]
    Unauthorized,

    /// The refresh endpoint rejected the refresh credential.
    #[error("Credential refresh rejected with status {status}")]
    RefreshRejected {
        /// HTTP status returned by the refresh endpoint
        status: u16,
    },

    /// The refresh call itself could not complete (network, malformed body).
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),

    // ═══════════════════════════════════════════════════════════
    // Transport / backend
    // ═══════════════════════════════════════════════════════════
    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// A response body did not match the expected shape.
    #[error("Unexpected response body: {0}")]
    InvalidResponse(String),

    // ═══════════════════════════════════════════════════════════
    // Gateway / reconciliation
    // ═══════════════════════════════════════════════════════════
    /// The backend could not verify the redirect checksum.
    #[error("Redirect checksum verification failed for transaction {transaction_id}")]
    ChecksumMismatch {
        /// Gateway transaction id
        transaction_id: String,
    },

    /// The redirect query string could not be parsed.
    #[error("Malformed redirect: {0}")]
    MalformedRedirect(String),

    /// No in-flight payment to retry.
    #[error("No payment to retry")]
    NothingToRetry,

    // ═══════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════
    /// The event is not legal in the booking's current state.
    #[error("Illegal transition: {event:?} from {from:?}")]
    IllegalTransition {
        /// Booking status when the event was requested
        from: BookingStatus,
        /// The rejected event
        event: LifecycleEvent,
    },

    /// The booking is not in the client cache.
    #[error("Booking {0} is not loaded")]
    BookingNotLoaded(String),

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════
    /// Durable storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization of persisted state failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PaymentError {
    /// Returns `true` for failures worth retrying on an idempotent read.
    ///
    /// # Examples
    ///
    /// ```
    /// # use slotpay_payments::PaymentError;
    /// assert!(PaymentError::Network("reset".into()).is_transient());
    /// assert!(!PaymentError::Unauthorized.is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if the session is gone and the user must sign in again.
    ///
    /// # Examples
    ///
    /// ```
    /// # use slotpay_payments::PaymentError;
    /// assert!(PaymentError::RefreshRejected { status: 401 }.is_auth_failure());
    /// assert!(!PaymentError::NothingToRetry.is_auth_failure());
    /// ```
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::RefreshRejected { .. } | Self::RefreshFailed(_)
        )
    }

    /// Returns `true` if this is a developer-facing error that should never
    /// be shown to a customer.
    #[must_use]
    pub const fn is_developer_error(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransition { .. } | Self::BookingNotLoaded(_) | Self::Config(_)
        )
    }

    /// Returns `true` if the error should reach the customer as a notice.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !self.is_developer_error()
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<slotpay_runtime::StoreError> for PaymentError {
    fn from(err: slotpay_runtime::StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redis::RedisError> for PaymentError {
    fn from(err: redis::RedisError) -> Self {
        Self::Storage(err.to_string())
    }
}
