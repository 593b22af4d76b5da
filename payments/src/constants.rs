//! Payment pipeline constants.
//!
//! Wire names shared with the backend and the gateway, and storage key layout.

/// Gateway redirect query parameter names.
pub mod redirect_params {
    /// External transaction id. Reconciliation only runs when present.
    pub const TRANSACTION_ID: &str = "apptransid";

    /// Gateway status code.
    pub const STATUS: &str = "status";

    /// Amount charged.
    pub const AMOUNT: &str = "amount";

    /// Merchant application id.
    pub const APP_ID: &str = "appid";

    /// Paying bank.
    pub const BANK_CODE: &str = "bankcode";

    /// Gateway checksum over the other parameters.
    pub const CHECKSUM: &str = "checksum";

    /// Marker appended to the landing URL once the redirect is settled.
    pub const PROCESSED: &str = "processed";
}

/// Gateway status codes.
pub mod gateway_codes {
    /// Payment captured.
    pub const SUCCESS: &str = "1";

    /// Customer did not complete payment in time.
    pub const TIMEOUT: &str = "-49";
}

/// Storage key prefixes.
///
/// Keys are `{prefix}{id}`; the session lives under a single key.
pub mod keys {
    /// Current session.
    pub const SESSION: &str = "slotpay:session";

    /// Idempotency marker per gateway transaction.
    pub const REDIRECT_PREFIX: &str = "slotpay:redirect:";

    /// The in-flight payment (transaction id + originating booking id).
    pub const IN_FLIGHT: &str = "slotpay:checkout:in_flight";

    /// Cached settled transaction by gateway id.
    pub const TRANSACTION_PREFIX: &str = "slotpay:transaction:";
}

/// Backend REST paths, relative to the API base URL.
pub mod paths {
    /// Credential refresh.
    pub const REFRESH_TOKEN: &str = "/auth/refresh-token";

    /// Payment initialization.
    pub const PAYMENT_INIT: &str = "/payments/init";

    /// Checksum-verified settlement of a gateway redirect.
    pub const PAYMENT_RESULT: &str = "/payments/result";

    /// Prefix for status queries by transaction id.
    pub const PAYMENT_STATUS: &str = "/payments/status/";

    /// Prefix for booking resources.
    pub const BOOKINGS: &str = "/bookings/";
}
