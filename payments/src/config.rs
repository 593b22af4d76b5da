//! Payment pipeline configuration.
//!
//! Values come from the application (or the environment via
//! [`PaymentConfig::from_env`]); nothing here is read ambiently at call time.

use crate::error::{PaymentError, Result};
use std::time::Duration;

/// Upper bound for any persisted client-side state.
pub const MAX_STATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration shared by the interceptor, reconciler and poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Backend API base URL, without trailing slash.
    ///
    /// Default: `http://localhost:8080/api`
    pub api_base_url: String,

    /// Delay between status queries while a transaction is pending.
    ///
    /// Default: 3 seconds
    pub poll_interval: Duration,

    /// Consecutive failed status queries tolerated before the poller gives up.
    ///
    /// Default: 3
    pub poll_max_failures: u32,

    /// Lifetime of a redirect idempotency marker.
    ///
    /// Default: 1 hour
    pub idempotency_ttl: Duration,

    /// Lifetime of persisted session and checkout state. Capped at one day.
    ///
    /// Default: 1 day
    pub state_ttl: Duration,

    /// Per-request timeout for the HTTP transport.
    ///
    /// Default: 10 seconds
    pub request_timeout: Duration,
}

impl PaymentConfig {
    /// Create configuration for the given API base URL.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the consecutive poll failure budget.
    #[must_use]
    pub const fn with_poll_max_failures(mut self, failures: u32) -> Self {
        self.poll_max_failures = failures;
        self
    }

    /// Set the idempotency marker lifetime.
    #[must_use]
    pub const fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    /// Set the persisted state lifetime (capped at one day).
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl.min(MAX_STATE_TTL);
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load configuration from `SLOTPAY_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Config`] if a variable is set but not a
    /// valid number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = lookup("SLOTPAY_API_URL").map_or_else(Self::default, |url| Self::new(url));

        if let Some(ms) = parse_var::<u64, _>(&lookup, "SLOTPAY_POLL_INTERVAL_MS")? {
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(failures) = parse_var::<u32, _>(&lookup, "SLOTPAY_POLL_MAX_FAILURES")? {
            config = config.with_poll_max_failures(failures);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SLOTPAY_IDEMPOTENCY_TTL_SECS")? {
            config = config.with_idempotency_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SLOTPAY_STATE_TTL_SECS")? {
            config = config.with_state_ttl(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "SLOTPAY_REQUEST_TIMEOUT_MS")? {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Join a backend path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| PaymentError::Config(format!("{name}={raw}")))
        })
        .transpose()
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            poll_interval: Duration::from_secs(3),
            poll_max_failures: 3,
            idempotency_ttl: Duration::from_secs(60 * 60),
            state_ttl: MAX_STATE_TTL,
            request_timeout: Duration::from_secs(10),
        }
    }
}
