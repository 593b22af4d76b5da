//! Payment pipeline providers.
//!
//! Traits for everything the pipeline talks to: durable client-side storage
//! and the backend REST API. Components take these as generics so tests can
//! swap in the in-memory store and mock backend.
//!
//! ```text
//! SessionStore ◄── SessionContext ◄── CredentialRefreshInterceptor
//!                                            ▲
//! IdempotencyStore ◄── IdempotencyGuard      │ BookingApiClient
//!        ▲                                   │ (BookingBackend + PaymentBackend)
//!        └──── PaymentRedirectReconciler ────┘
//!                      │
//! CheckoutStore ◄──────┴──── PaymentStatusPoller / PaymentCoordinator
//! ```

pub mod backend;
pub mod checkout;
pub mod idempotency;
pub mod session;

pub use backend::{BookingBackend, PaymentBackend};
pub use checkout::CheckoutStore;
pub use idempotency::IdempotencyStore;
pub use session::SessionStore;
