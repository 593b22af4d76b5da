//! Booking cache actions.
//!
//! Commands come from the UI and the payment pipeline; the `Synced` /
//! `SyncFailed` pair is fed back by write-through effects.

use crate::error::PaymentError;
use crate::lifecycle::LifecycleEvent;
use crate::state::{Booking, BookingId};

/// Actions for the [`crate::reducers::BookingReducer`].
#[derive(Debug, Clone, PartialEq)]
pub enum BookingAction {
    // ═══════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════
    /// Put a booking fetched from the backend into the cache.
    Loaded {
        /// Authoritative booking.
        booking: Booking,
    },

    /// Ask for a lifecycle transition.
    ///
    /// Checked against the transition table first. Booking-axis events the
    /// user initiates are written through to the backend; payment outcomes
    /// and draft line item edits apply to the cache directly.
    Request {
        /// Target booking.
        booking_id: BookingId,
        /// Requested event.
        event: LifecycleEvent,
    },

    /// Drop a booking from the cache.
    Evict {
        /// Booking to drop.
        booking_id: BookingId,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Effect feedback
    // ═══════════════════════════════════════════════════════════════════
    /// The backend accepted a write-through.
    Synced {
        /// Booking as returned by the backend.
        booking: Booking,
    },

    /// A write-through failed; the cache keeps its last known state.
    SyncFailed {
        /// Target booking.
        booking_id: BookingId,
        /// Failure.
        error: PaymentError,
    },
}
