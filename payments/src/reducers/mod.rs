//! Payment pipeline reducers.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.

pub mod booking;

// Re-export
pub use booking::BookingReducer;
