//! Domain types for sessions, bookings and payments.
//!
//! Wire shapes follow the backend's JSON (camelCase fields, snake_case enum
//! values). Amounts are integer minor units.

use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Booking identifier (backend-assigned).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub String);

impl BookingId {
    /// Wrap a backend id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gateway-assigned transaction identifier (`apptransid`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    /// Wrap a gateway id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Books services.
    Customer,
    /// Owns a business and its staff schedules.
    Business,
    /// Platform administrator.
    Admin,
}

/// Cached identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// User id.
    pub id: String,
    /// Role.
    pub role: Role,
    /// Email address.
    pub email: String,
    /// Display name, if set.
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Access/refresh pair as issued by `/auth/refresh-token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer credential.
    pub access_token: String,
    /// Longer-lived credential used only to obtain a new access credential.
    pub refresh_token: String,
}

/// Browser-session equivalent: credentials plus cached identity.
///
/// A stored session always carries an access credential; an absent session
/// means the caller is unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Current access credential.
    pub access_token: String,
    /// Refresh credential, if the login flow issued one.
    pub refresh_token: Option<String>,
    /// Cached identity.
    pub identity: Option<Identity>,
}

impl Session {
    /// Build a session from a freshly issued token pair.
    #[must_use]
    pub fn from_tokens(tokens: TokenPair, identity: Option<Identity>) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: Some(tokens.refresh_token),
            identity,
        }
    }

    /// Replace both credentials, keeping the cached identity.
    #[must_use]
    pub fn rotated(&self, tokens: TokenPair) -> Self {
        Self::from_tokens(tokens, self.identity.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Bookings
// ═══════════════════════════════════════════════════════════════════════

/// Booking status axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Customer is still adding services.
    Draft,
    /// Committed, awaiting payment settlement.
    Pending,
    /// Payment settled (online or cash agreed).
    Confirmed,
    /// Service rendered.
    Completed,
    /// Cancelled by the customer.
    Cancelled,
    /// Customer did not show up.
    NoShow,
}

impl BookingStatus {
    /// All statuses, for exhaustive checks.
    pub const ALL: [Self; 6] = [
        Self::Draft,
        Self::Pending,
        Self::Confirmed,
        Self::Completed,
        Self::Cancelled,
        Self::NoShow,
    ];

    /// Value sent to `PUT /bookings/{id}/status`.
    #[must_use]
    pub const fn as_wire(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// No further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }
}

/// Payment status axis (orthogonal to [`BookingStatus`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing settled yet.
    Pending,
    /// Settled through the gateway.
    Paid,
    /// Money returned.
    Refunded,
    /// Last transaction failed or timed out.
    Failed,
}

impl PaymentStatus {
    /// All statuses, for exhaustive checks.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Paid, Self::Refunded, Self::Failed];
}

/// How a booking's payment was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Customer pays at the venue.
    Cash,
    /// Paid through the payment gateway.
    Gateway,
}

/// Status of a single line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailStatus {
    /// Will be rendered.
    Scheduled,
    /// Dropped from the booking.
    Cancelled,
}

/// One service instance within a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    /// Line item id.
    pub id: String,
    /// Booked service.
    pub service_id: String,
    /// Assigned staff member, if chosen.
    #[serde(default)]
    pub staff_id: Option<String>,
    /// Slot start.
    pub start_time: DateTime<Utc>,
    /// Slot end.
    pub end_time: DateTime<Utc>,
    /// List price.
    pub price: i64,
    /// Discount applied.
    #[serde(default)]
    pub discount: i64,
    /// Price after discount.
    pub final_price: i64,
    /// Item status.
    pub status: DetailStatus,
}

/// Client-side cached view of a backend booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking id.
    pub id: BookingId,
    /// Booking status.
    pub status: BookingStatus,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// Settlement channel once confirmed.
    #[serde(default)]
    pub settlement: Option<Settlement>,
    /// Sum of line item final prices.
    pub total_amount: i64,
    /// Ordered line items.
    #[serde(default)]
    pub line_items: Vec<BookingDetail>,
}

impl Booking {
    /// A new server-side draft with no items.
    #[must_use]
    pub const fn draft(id: BookingId) -> Self {
        Self {
            id,
            status: BookingStatus::Draft,
            payment_status: PaymentStatus::Pending,
            settlement: None,
            total_amount: 0,
            line_items: Vec::new(),
        }
    }

    /// Recompute `total_amount` from scheduled line items.
    pub fn recompute_total(&mut self) {
        self.total_amount = self
            .line_items
            .iter()
            .filter(|item| item.status == DetailStatus::Scheduled)
            .map(|item| item.final_price)
            .sum();
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Payments
// ═══════════════════════════════════════════════════════════════════════

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Redirect to the external gateway.
    Gateway,
    /// Pay at the venue.
    Cash,
}

/// Canonical status of one gateway transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Not settled yet.
    Pending,
    /// Money captured.
    Success,
    /// Rejected by the gateway or bank.
    Failed,
    /// Gateway gave up waiting for the customer.
    Timeout,
}

impl TransactionStatus {
    /// Terminal statuses stop polling.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Terminal failures offer a retry (which creates a new transaction).
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }
}

/// One attempt to pay for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    /// Gateway transaction id.
    pub transaction_id: TransactionId,
    /// Booking being paid for.
    pub booking_id: BookingId,
    /// Canonical status.
    pub status: TransactionStatus,
    /// Amount charged.
    pub amount: i64,
    /// Gateway/bank explanation on failure.
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Response of `POST /payments/init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInit {
    /// Gateway checkout page; absent for cash.
    #[serde(default)]
    pub redirect_url: Option<String>,
    /// New gateway transaction.
    pub transaction_id: TransactionId,
}

/// Payment started from this client and not yet resolved.
///
/// Persisted so the landing page and the retry action work after a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightPayment {
    /// Transaction returned by `/payments/init`.
    pub transaction_id: TransactionId,
    /// Originating booking.
    pub booking_id: BookingId,
    /// Method used.
    pub method: PaymentMethod,
    /// When the payment was initialized.
    pub started_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Reducer state
// ═══════════════════════════════════════════════════════════════════════

/// Client-side booking cache owned by the booking reducer.
#[derive(Debug, Clone, Default)]
pub struct BookingState {
    /// Known bookings.
    pub bookings: HashMap<BookingId, Booking>,
    /// Most recent rejected transition (developer-facing).
    pub last_rejection: Option<PaymentError>,
    /// Most recent failed write-through.
    pub last_sync_error: Option<PaymentError>,
}

impl BookingState {
    /// Cached booking by id.
    #[must_use]
    pub fn booking(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    /// Cached booking status by id.
    #[must_use]
    pub fn status_of(&self, id: &BookingId) -> Option<BookingStatus> {
        self.bookings.get(id).map(|b| b.status)
    }

    /// Cached payment status by id.
    #[must_use]
    pub fn payment_status_of(&self, id: &BookingId) -> Option<PaymentStatus> {
        self.bookings.get(id).map(|b| b.payment_status)
    }
}
