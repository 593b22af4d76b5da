//! Booking reducer environment.

use crate::providers::BookingBackend;
use std::sync::Arc;

/// Dependencies of the [`crate::reducers::BookingReducer`].
///
/// # Type Parameters
///
/// - `B`: Booking backend (write-through target)
pub struct BookingEnvironment<B> {
    /// Booking write-through endpoints.
    pub backend: Arc<B>,
}

impl<B> Clone for BookingEnvironment<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: BookingBackend> BookingEnvironment<B> {
    /// Create a new environment.
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}
