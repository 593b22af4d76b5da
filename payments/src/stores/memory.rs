//! In-memory store with clock-driven expiry.
//!
//! Implements every storage provider over one map of JSON values, so a test
//! (or a single-process embedding) can share it between the session context,
//! the idempotency guard and the checkout state. Expiry is evaluated against
//! the injected [`Clock`] on every read, which lets tests move time with a
//! `MockClock` instead of sleeping.

use crate::constants::keys;
use crate::error::{PaymentError, Result};
use crate::providers::{CheckoutStore, IdempotencyStore, SessionStore};
use crate::state::{InFlightPayment, PaymentTransaction, Session, TransactionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use slotpay_core::environment::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory store.
///
/// Clones share the same map.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// Create a store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose expiry follows `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of live (unexpired) entries.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn live_entries(&self) -> Result<usize> {
        let now = self.clock.now();
        Ok(self
            .lock()?
            .values()
            .filter(|entry| entry.expires_at > now)
            .count())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| PaymentError::Storage("Mutex lock failed".to_string()))
    }

    fn expiry(&self, ttl: Duration) -> Result<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| PaymentError::Config(format!("ttl out of range: {e}")))?;
        Ok(self.clock.now() + ttl)
    }

    fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value: serde_json::to_string(value)?,
            expires_at: self.expiry(ttl)?,
        };
        self.lock()?.insert(key.to_string(), entry);
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(serde_json::from_str(&entry.value)?)),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemoryStore {
    async fn load(&self) -> Result<Option<Session>> {
        self.fetch(keys::SESSION)
    }

    async fn save(&self, session: &Session, ttl: Duration) -> Result<()> {
        self.put(keys::SESSION, session, ttl)
    }

    async fn clear(&self) -> Result<()> {
        self.remove(keys::SESSION)
    }
}

impl IdempotencyStore for InMemoryStore {
    async fn is_processed(&self, key: &str) -> Result<bool> {
        Ok(self.fetch::<bool>(key)?.is_some())
    }

    async fn mark_processed(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl)?;
        let mut entries = self.lock()?;

        if entries.get(key).is_some_and(|entry| entry.expires_at > now) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: "true".to_string(),
                expires_at,
            },
        );
        Ok(true)
    }
}

impl CheckoutStore for InMemoryStore {
    async fn save_in_flight(&self, payment: &InFlightPayment, ttl: Duration) -> Result<()> {
        self.put(keys::IN_FLIGHT, payment, ttl)
    }

    async fn load_in_flight(&self) -> Result<Option<InFlightPayment>> {
        self.fetch(keys::IN_FLIGHT)
    }

    async fn clear_in_flight(&self) -> Result<()> {
        self.remove(keys::IN_FLIGHT)
    }

    async fn save_transaction(&self, transaction: &PaymentTransaction, ttl: Duration) -> Result<()> {
        let key = format!("{}{}", keys::TRANSACTION_PREFIX, transaction.transaction_id);
        self.put(&key, transaction, ttl)
    }

    async fn load_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<PaymentTransaction>> {
        self.fetch(&format!("{}{transaction_id}", keys::TRANSACTION_PREFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BookingId, TokenPair, TransactionStatus};
    use slotpay_testing::{MockClock, test_clock};

    fn clocked() -> (InMemoryStore, MockClock) {
        let clock = MockClock::starting_at(test_clock().now());
        (InMemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn markers_expire_with_the_clock() {
        let (store, clock) = clocked();
        let ttl = Duration::from_secs(3600);

        assert!(store.mark_processed("slotpay:redirect:T1", ttl).await.unwrap());
        assert!(!store.mark_processed("slotpay:redirect:T1", ttl).await.unwrap());
        assert!(store.is_processed("slotpay:redirect:T1").await.unwrap());

        clock.advance(chrono::Duration::minutes(61));

        assert!(!store.is_processed("slotpay:redirect:T1").await.unwrap());
        assert!(store.mark_processed("slotpay:redirect:T1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn session_round_trips_and_clears() {
        let (store, _clock) = clocked();
        let session = Session::from_tokens(
            TokenPair {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            },
            None,
        );

        store.save(&session, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn transactions_are_keyed_by_id() {
        let (store, clock) = clocked();
        let transaction = PaymentTransaction {
            transaction_id: TransactionId::new("T1"),
            booking_id: BookingId::new("b-1"),
            status: TransactionStatus::Success,
            amount: 200_000,
            failure_reason: None,
        };

        store
            .save_transaction(&transaction, Duration::from_secs(86_400))
            .await
            .unwrap();

        assert_eq!(
            store.load_transaction(&TransactionId::new("T1")).await.unwrap(),
            Some(transaction)
        );
        assert_eq!(store.load_transaction(&TransactionId::new("T2")).await.unwrap(), None);

        clock.advance(chrono::Duration::days(1));
        assert_eq!(store.live_entries().unwrap(), 0);
    }
}
