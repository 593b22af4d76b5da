//! Booking cache reducer.
//!
//! Owns the client-side [`BookingState`]. Every transition is checked against
//! the lifecycle table; rejected requests leave the cache untouched and are
//! recorded in `last_rejection`.

use crate::actions::BookingAction;
use crate::environment::BookingEnvironment;
use crate::error::PaymentError;
use crate::lifecycle::{self, LifecycleEvent};
use crate::providers::BookingBackend;
use crate::state::{BookingId, BookingState, BookingStatus};
use slotpay_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};

/// Backend call that carries a user-initiated transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteThrough {
    Confirm,
    Status(BookingStatus),
}

/// Which events go to the backend before touching the cache.
const fn write_through(event: &LifecycleEvent, next: BookingStatus) -> Option<WriteThrough> {
    match event {
        LifecycleEvent::Confirm => Some(WriteThrough::Confirm),
        LifecycleEvent::Cancel | LifecycleEvent::ServiceRendered | LifecycleEvent::NoShow => {
            Some(WriteThrough::Status(next))
        },
        _ => None,
    }
}

/// Reducer for the booking cache.
#[derive(Debug, Clone)]
pub struct BookingReducer<B> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B> BookingReducer<B> {
    /// Create a new booking reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B> Default for BookingReducer<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> Reducer for BookingReducer<B>
where
    B: BookingBackend + 'static,
{
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment<B>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::Loaded { booking } => {
                state.bookings.insert(booking.id.clone(), booking);
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // Request: validate, then write through or apply locally
            // ═══════════════════════════════════════════════════════════════
            BookingAction::Request { booking_id, event } => {
                let Some(booking) = state.bookings.get(&booking_id) else {
                    tracing::warn!(booking_id = %booking_id, "Transition requested for unknown booking");
                    state.last_rejection = Some(PaymentError::BookingNotLoaded(booking_id.0));
                    return smallvec![Effect::None];
                };

                let transition = match lifecycle::transition(booking, &event) {
                    Ok(transition) => transition,
                    Err(error) => {
                        tracing::warn!(
                            booking_id = %booking_id,
                            from = ?booking.status,
                            event = ?event,
                            "Rejected illegal lifecycle transition"
                        );
                        metrics::counter!("payments.lifecycle.rejected").increment(1);
                        state.last_rejection = Some(error);
                        return smallvec![Effect::None];
                    },
                };

                state.last_rejection = None;

                if let Some(call) = write_through(&event, transition.booking.status) {
                    tracing::debug!(booking_id = %booking_id, ?call, "Writing transition through");
                    let backend = env.backend.clone();
                    return smallvec![Effect::future(async move {
                        let result = match call {
                            WriteThrough::Confirm => backend.confirm_booking(&booking_id).await,
                            WriteThrough::Status(status) => {
                                backend.update_status(&booking_id, status).await
                            },
                        };
                        Some(match result {
                            Ok(booking) => BookingAction::Synced { booking },
                            Err(error) => BookingAction::SyncFailed { booking_id, error },
                        })
                    })];
                }

                tracing::debug!(
                    booking_id = %booking_id,
                    from = ?transition.from,
                    to = ?transition.booking.status,
                    payment = ?transition.booking.payment_status,
                    "Applied lifecycle transition"
                );
                if transition.evicts {
                    state.bookings.remove(&booking_id);
                } else {
                    state.bookings.insert(booking_id, transition.booking);
                }
                smallvec![Effect::None]
            },

            BookingAction::Evict { booking_id } => {
                state.bookings.remove(&booking_id);
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // Effect feedback
            // ═══════════════════════════════════════════════════════════════
            BookingAction::Synced { booking } => {
                state.last_sync_error = None;
                state.bookings.insert(booking.id.clone(), booking);
                smallvec![Effect::None]
            },

            BookingAction::SyncFailed { booking_id, error } => {
                tracing::warn!(booking_id = %booking_id, error = %error, "Write-through failed");
                state.last_sync_error = Some(error);
                smallvec![Effect::None]
            },
        }
    }
}
