//! # Slotpay Payments
//!
//! Client-side orchestration of the booking-to-payment flow: a draft booking
//! is confirmed, paid through an external gateway, and reconciled against the
//! backend's authoritative payment status, while the session's access
//! credential may expire at any point along the way.
//!
//! ## Components
//!
//! - **Credential refresh**: [`interceptor::CredentialRefreshInterceptor`]
//!   renews an expired access credential once and replays the request
//! - **Booking lifecycle**: [`lifecycle`] transition table, applied to the
//!   client cache by [`reducers::BookingReducer`]
//! - **Idempotency**: [`idempotency::IdempotencyGuard`] atomic per-transaction claims
//! - **Redirect reconciliation**: [`reconciler::PaymentRedirectReconciler`]
//! - **Status polling**: [`poller::PaymentStatusPoller`]
//! - **Checkout**: [`checkout::PaymentCoordinator`] wires them together
//!
//! ## Architecture
//!
//! The booking cache follows the reducer/effect loop:
//!
//! ```text
//! BookingAction → BookingReducer → (BookingState, Effects) → backend write-through → Synced
//! ```
//!
//! Outcomes from the reconciler and the poller flow through
//! [`outcome::OutcomeRecorder`], which persists the transaction, advances the
//! booking, and publishes [`notice::Notice`]s for the UI.
//!
//! ## Example: landing from the gateway
//!
//! ```rust,ignore
//! use slotpay_payments::*;
//!
//! let coordinator = PaymentCoordinator::new(&config, idempotency, api, checkout, bookings, notices);
//!
//! let init = coordinator.start_payment(&booking_id, PaymentMethod::Gateway).await?;
//! // ... the browser visits init.redirect_url and comes back ...
//!
//! let resolution = coordinator.handle_redirect(landing_url, cancel).await?;
//! if let Some(transaction) = resolution.transaction() {
//!     println!("payment {}: {:?}", transaction.transaction_id, transaction.status);
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Public modules
pub mod actions;
pub mod api;
pub mod checkout;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod interceptor;
pub mod lifecycle;
pub mod notice;
pub mod outcome;
pub mod poller;
pub mod providers;
pub mod reconciler;
pub mod reducers;
pub mod session;
pub mod state;
pub mod stores;
pub mod transport;

// Mock implementations for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use actions::BookingAction;
pub use api::BookingApiClient;
pub use checkout::{PaymentCoordinator, RedirectResolution};
pub use config::PaymentConfig;
pub use error::{PaymentError, Result};
pub use interceptor::{ApiRequest, CredentialRefreshInterceptor};
pub use lifecycle::LifecycleEvent;
pub use notice::{Notice, NoticeBus};
pub use outcome::{BookingStore, OutcomeRecorder};
pub use poller::{PaymentStatusPoller, PollOutcome};
pub use reconciler::{PaymentRedirectReconciler, ReconcileOutcome};
pub use session::SessionContext;
pub use state::{
    Booking, BookingId, BookingState, BookingStatus, PaymentMethod, PaymentStatus,
    PaymentTransaction, TransactionId, TransactionStatus,
};
