//! Booking lifecycle rules.
//!
//! Two orthogonal axes: booking status and payment status. Every change to a
//! cached [`Booking`] goes through [`transition`]; pairs not listed below are
//! rejected with [`PaymentError::IllegalTransition`] and leave the booking
//! untouched.
//!
//! ```text
//! Booking axis                          Payment axis
//! draft ──confirm──► pending            pending ──settle(gateway)──► paid
//! pending ──settle──► confirmed         pending ──fail/timeout──► failed
//! pending ──cancel──► cancelled         failed ──retry──► pending
//! confirmed ──rendered──► completed     pending|paid ──refund──► refunded
//! pending|confirmed ──no-show──► no_show
//! confirmed ──settle(gateway)──► confirmed
//! ```
//!
//! A confirmed booking may still be paid online (cash agreed earlier, or
//! confirmed by the business); only its payment status moves.

use crate::error::{PaymentError, Result};
use crate::state::{Booking, BookingDetail, BookingStatus, PaymentStatus, Settlement};
use serde::{Deserialize, Serialize};

/// Something that may move a booking along its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Customer commits the draft.
    Confirm,
    /// Payment settled, online or by agreeing to pay cash.
    PaymentSettled {
        /// Settlement channel.
        settlement: Settlement,
    },
    /// Customer cancels before the appointment.
    Cancel,
    /// Business marks the service as rendered.
    ServiceRendered,
    /// Customer did not show up.
    NoShow,
    /// The current transaction failed or timed out.
    PaymentFailed {
        /// Gateway/bank reason, if any.
        reason: Option<String>,
        /// Whether the gateway reported a timeout.
        timed_out: bool,
    },
    /// Customer retries payment (a new transaction follows).
    PaymentRetried,
    /// Money returned to the customer.
    PaymentRefunded,
    /// Add a service to a draft.
    AddLineItem(BookingDetail),
    /// Remove a service from a draft.
    RemoveLineItem {
        /// Line item id.
        detail_id: String,
    },
}

/// Booking-axis transition table.
///
/// Returns the next booking status for events that move the booking axis,
/// `None` when the pair is not in the table. Payment-axis and line item
/// events are not covered here.
#[must_use]
pub const fn next_status(current: BookingStatus, event: &LifecycleEvent) -> Option<BookingStatus> {
    use BookingStatus::{Cancelled, Completed, Confirmed, Draft, NoShow, Pending};

    match (current, event) {
        (Draft, LifecycleEvent::Confirm) => Some(Pending),
        (Pending, LifecycleEvent::PaymentSettled { .. }) => Some(Confirmed),
        (
            Confirmed,
            LifecycleEvent::PaymentSettled {
                settlement: Settlement::Gateway,
            },
        ) => Some(Confirmed),
        (Pending, LifecycleEvent::Cancel) => Some(Cancelled),
        (Confirmed, LifecycleEvent::ServiceRendered) => Some(Completed),
        (Pending | Confirmed, LifecycleEvent::NoShow) => Some(NoShow),
        _ => None,
    }
}

fn reject(booking: &Booking, event: &LifecycleEvent) -> PaymentError {
    PaymentError::IllegalTransition {
        from: booking.status,
        event: event.clone(),
    }
}

/// Accepted lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Booking status before the event.
    pub from: BookingStatus,
    /// Booking after the event.
    pub booking: Booking,
    /// The last line item was removed; the booking is soft-deleted.
    pub evicts: bool,
}

/// Events offered to [`allowed_events`]; line item edits carry payloads and
/// are checked separately.
const CANDIDATES: [LifecycleEvent; 9] = [
    LifecycleEvent::Confirm,
    LifecycleEvent::PaymentSettled {
        settlement: Settlement::Gateway,
    },
    LifecycleEvent::PaymentSettled {
        settlement: Settlement::Cash,
    },
    LifecycleEvent::Cancel,
    LifecycleEvent::ServiceRendered,
    LifecycleEvent::NoShow,
    LifecycleEvent::PaymentFailed {
        reason: None,
        timed_out: false,
    },
    LifecycleEvent::PaymentRetried,
    LifecycleEvent::PaymentRefunded,
];

/// Apply `event` to `booking`.
///
/// # Errors
///
/// Returns [`PaymentError::IllegalTransition`] if the event is not legal in
/// the booking's current state.
pub fn transition(booking: &Booking, event: &LifecycleEvent) -> Result<Transition> {
    let mut next = booking.clone();
    let mut evicts = false;

    match event {
        LifecycleEvent::Confirm => {
            let has_items = booking
                .line_items
                .iter()
                .any(|item| item.status == crate::state::DetailStatus::Scheduled);
            if !has_items {
                return Err(reject(booking, event));
            }
            next.status = next_status(booking.status, event).ok_or_else(|| reject(booking, event))?;
        },

        LifecycleEvent::PaymentSettled { settlement } => {
            if !matches!(
                booking.payment_status,
                PaymentStatus::Pending | PaymentStatus::Failed
            ) {
                return Err(reject(booking, event));
            }
            next.status = next_status(booking.status, event).ok_or_else(|| reject(booking, event))?;
            next.settlement = Some(*settlement);
            next.payment_status = match settlement {
                Settlement::Gateway => PaymentStatus::Paid,
                Settlement::Cash => PaymentStatus::Pending,
            };
        },

        LifecycleEvent::Cancel | LifecycleEvent::NoShow => {
            next.status = next_status(booking.status, event).ok_or_else(|| reject(booking, event))?;
        },

        LifecycleEvent::ServiceRendered => {
            let settled = booking.payment_status == PaymentStatus::Paid
                || booking.settlement == Some(Settlement::Cash);
            if !settled {
                return Err(reject(booking, event));
            }
            next.status = next_status(booking.status, event).ok_or_else(|| reject(booking, event))?;
        },

        LifecycleEvent::PaymentFailed { .. } => {
            if booking.status != BookingStatus::Pending
                || booking.payment_status != PaymentStatus::Pending
            {
                return Err(reject(booking, event));
            }
            next.payment_status = PaymentStatus::Failed;
        },

        LifecycleEvent::PaymentRetried => {
            if booking.status != BookingStatus::Pending
                || booking.payment_status != PaymentStatus::Failed
            {
                return Err(reject(booking, event));
            }
            next.payment_status = PaymentStatus::Pending;
        },

        LifecycleEvent::PaymentRefunded => {
            let refundable = matches!(
                booking.payment_status,
                PaymentStatus::Pending | PaymentStatus::Paid
            );
            if booking.status == BookingStatus::Draft || !refundable {
                return Err(reject(booking, event));
            }
            next.payment_status = PaymentStatus::Refunded;
        },

        LifecycleEvent::AddLineItem(detail) => {
            let duplicate = booking.line_items.iter().any(|item| item.id == detail.id);
            if booking.status != BookingStatus::Draft || duplicate {
                return Err(reject(booking, event));
            }
            next.line_items.push(detail.clone());
            next.recompute_total();
        },

        LifecycleEvent::RemoveLineItem { detail_id } => {
            if booking.status != BookingStatus::Draft {
                return Err(reject(booking, event));
            }
            let before = next.line_items.len();
            next.line_items.retain(|item| &item.id != detail_id);
            if next.line_items.len() == before {
                return Err(reject(booking, event));
            }
            next.recompute_total();
            evicts = next.line_items.is_empty();
        },
    }

    Ok(Transition {
        from: booking.status,
        booking: next,
        evicts,
    })
}

/// Whether `event` would be accepted right now.
#[must_use]
pub fn is_allowed(booking: &Booking, event: &LifecycleEvent) -> bool {
    transition(booking, event).is_ok()
}

/// Events the UI may offer for `booking` (line item edits excluded).
#[must_use]
pub fn allowed_events(booking: &Booking) -> Vec<LifecycleEvent> {
    CANDIDATES
        .into_iter()
        .filter(|event| is_allowed(booking, event))
        .collect()
}

/// Whether the UI should offer the "retry payment" action.
#[must_use]
pub fn can_retry_payment(booking: &Booking) -> bool {
    booking.status == BookingStatus::Pending && booking.payment_status == PaymentStatus::Failed
}
