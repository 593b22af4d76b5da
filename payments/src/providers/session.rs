//! Session store trait.

use crate::error::Result;
use crate::state::Session;
use std::time::Duration;

/// Durable holder of the current session.
///
/// One session per client. Survives restarts (the browser-cookie
/// equivalent), bounded by a TTL of at most one day.
pub trait SessionStore: Send + Sync {
    /// Load the current session.
    ///
    /// # Returns
    ///
    /// `None` if signed out or expired.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails or the stored value is corrupt.
    fn load(&self) -> impl std::future::Future<Output = Result<Option<Session>>> + Send;

    /// Replace the current session.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn save(
        &self,
        session: &Session,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove the current session.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn clear(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}
