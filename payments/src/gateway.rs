//! Gateway redirect boundary.
//!
//! The only place raw gateway strings are inspected. Everything past this
//! module works with [`RedirectParams`] and [`TransactionStatus`].

use crate::constants::{gateway_codes, redirect_params};
use crate::error::{PaymentError, Result};
use crate::state::{TransactionId, TransactionStatus};

/// Gateway status code, mapped once from the raw `status` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCode {
    /// `"1"`: money captured.
    Success,
    /// `"-49"`: customer did not finish in time.
    Timeout,
    /// Any other negative code.
    Failed {
        /// Raw gateway code.
        code: i32,
    },
    /// Anything else; the gateway has not decided yet.
    Processing,
}

impl GatewayCode {
    /// Map a raw gateway status code.
    ///
    /// # Examples
    ///
    /// ```
    /// # use slotpay_payments::gateway::GatewayCode;
    /// assert_eq!(GatewayCode::from_code("1"), GatewayCode::Success);
    /// assert_eq!(GatewayCode::from_code("-49"), GatewayCode::Timeout);
    /// assert_eq!(GatewayCode::from_code("-5"), GatewayCode::Failed { code: -5 });
    /// assert_eq!(GatewayCode::from_code("2"), GatewayCode::Processing);
    /// ```
    #[must_use]
    pub fn from_code(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == gateway_codes::SUCCESS {
            return Self::Success;
        }
        if raw == gateway_codes::TIMEOUT {
            return Self::Timeout;
        }
        match raw.parse::<i32>() {
            Ok(code) if code < 0 => Self::Failed { code },
            _ => Self::Processing,
        }
    }

    /// Canonical transaction status for this code.
    #[must_use]
    pub const fn status(self) -> TransactionStatus {
        match self {
            Self::Success => TransactionStatus::Success,
            Self::Timeout => TransactionStatus::Timeout,
            Self::Failed { .. } => TransactionStatus::Failed,
            Self::Processing => TransactionStatus::Pending,
        }
    }
}

/// Query parameters of a gateway redirect.
///
/// Untrusted: only the backend can verify the checksum. Raw pairs are kept
/// in order so they can be forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RedirectParams {
    pairs: Vec<(String, String)>,
}

impl RedirectParams {
    /// Parse a raw query string (with or without the leading `?`).
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::MalformedRedirect`] if the query is not valid
    /// `application/x-www-form-urlencoded`.
    pub fn from_query(query: &str) -> Result<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| PaymentError::MalformedRedirect(e.to_string()))?;
        Ok(Self { pairs })
    }

    /// Parse the query part of a landing URL. A URL without a query yields
    /// empty params.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::MalformedRedirect`] if the query cannot be decoded.
    pub fn from_url(url: &str) -> Result<Self> {
        let without_fragment = url.split('#').next().unwrap_or_default();
        match without_fragment.split_once('?') {
            Some((_, query)) => Self::from_query(query),
            None => Ok(Self::default()),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Gateway transaction id, if present and non-empty.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.get(redirect_params::TRANSACTION_ID)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(TransactionId::new)
    }

    /// Mapped gateway status; a missing code counts as still processing.
    #[must_use]
    pub fn code(&self) -> GatewayCode {
        self.get(redirect_params::STATUS)
            .map_or(GatewayCode::Processing, GatewayCode::from_code)
    }

    /// Amount as reported by the gateway.
    #[must_use]
    pub fn amount(&self) -> Option<i64> {
        self.get(redirect_params::AMOUNT)
            .and_then(|raw| raw.trim().parse().ok())
    }

    /// Paying bank, if reported.
    #[must_use]
    pub fn bank_code(&self) -> Option<&str> {
        self.get(redirect_params::BANK_CODE)
    }

    /// Whether a previous run on this URL already settled the redirect.
    #[must_use]
    pub fn is_marked_processed(&self) -> bool {
        self.get(redirect_params::PROCESSED).is_some()
    }

    /// Gateway parameters re-encoded for `/payments/result`, without the
    /// processed marker.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::MalformedRedirect`] if encoding fails.
    pub fn to_query(&self) -> Result<String> {
        let forwarded: Vec<&(String, String)> = self
            .pairs
            .iter()
            .filter(|(key, _)| key != redirect_params::PROCESSED)
            .collect();
        serde_urlencoded::to_string(forwarded)
            .map_err(|e| PaymentError::MalformedRedirect(e.to_string()))
    }
}

/// Append the processed marker to a landing URL, keeping any fragment.
///
/// Idempotent: a URL that already carries the marker is returned unchanged.
#[must_use]
pub fn mark_processed(url: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };

    let already = RedirectParams::from_url(base)
        .map(|params| params.is_marked_processed())
        .unwrap_or(false);

    let mut marked = base.to_string();
    if !already {
        let separator = if base.contains('?') { '&' } else { '?' };
        marked.push(separator);
        marked.push_str(redirect_params::PROCESSED);
        marked.push_str("=1");
    }
    if let Some(fragment) = fragment {
        marked.push('#');
        marked.push_str(fragment);
    }
    marked
}
