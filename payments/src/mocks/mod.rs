//! Mock implementations for testing.
//!
//! Deterministic in-memory doubles for the backend and the HTTP wire.

pub mod backend;
pub mod transport;

pub use backend::MockBookingBackend;
pub use transport::MockTransport;
