//! Redis-backed store.
//!
//! Durable equivalent of the browser cookie jar for server-driven variants of
//! the flow. Every value is JSON under a TTL (`SETEX`); idempotency claims use
//! `SET NX EX` so concurrent redirects for one transaction race on a single
//! atomic command.
//!
//! # Example
//!
//! ```no_run
//! use slotpay_payments::stores::RedisStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::new("redis://127.0.0.1:6379").await?.with_scope("device-42");
//! # Ok(())
//! # }
//! ```

use crate::constants::keys;
use crate::error::{PaymentError, Result};
use crate::providers::{CheckoutStore, IdempotencyStore, SessionStore};
use crate::state::{InFlightPayment, PaymentTransaction, Session, TransactionId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Redis store scoped to one client.
#[derive(Clone)]
pub struct RedisStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    /// Key prefix isolating one client's state.
    scope: String,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns error if connection to Redis fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| PaymentError::Storage(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            PaymentError::Storage(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self {
            conn_manager,
            scope: "default".to_string(),
        })
    }

    /// Isolate this store's keys under `scope` (a device or browser id).
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.scope)
    }

    fn ttl_seconds(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }

    async fn put<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let payload = serde_json::to_string(value)?;
        let _: () = conn
            .set_ex(self.key(key), payload, Self::ttl_seconds(ttl))
            .await?;
        Ok(())
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn_manager.clone();
        let payload: Option<String> = conn.get(self.key(key)).await?;
        payload
            .map(|raw| serde_json::from_str(&raw).map_err(PaymentError::from))
            .transpose()
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(self.key(key)).await?;
        Ok(())
    }
}

impl SessionStore for RedisStore {
    async fn load(&self) -> Result<Option<Session>> {
        self.fetch(keys::SESSION).await
    }

    async fn save(&self, session: &Session, ttl: Duration) -> Result<()> {
        self.put(keys::SESSION, session, ttl).await
    }

    async fn clear(&self) -> Result<()> {
        self.remove(keys::SESSION).await
    }
}

impl IdempotencyStore for RedisStore {
    async fn is_processed(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let exists: bool = conn.exists(self.key(key)).await?;
        Ok(exists)
    }

    async fn mark_processed(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        // Reply is "OK" when the key was set, nil when it already existed.
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;

        let claimed = reply.is_some();
        tracing::debug!(key = %key, claimed, "Idempotency claim");
        Ok(claimed)
    }
}

impl CheckoutStore for RedisStore {
    async fn save_in_flight(&self, payment: &InFlightPayment, ttl: Duration) -> Result<()> {
        self.put(keys::IN_FLIGHT, payment, ttl).await
    }

    async fn load_in_flight(&self) -> Result<Option<InFlightPayment>> {
        self.fetch(keys::IN_FLIGHT).await
    }

    async fn clear_in_flight(&self) -> Result<()> {
        self.remove(keys::IN_FLIGHT).await
    }

    async fn save_transaction(&self, transaction: &PaymentTransaction, ttl: Duration) -> Result<()> {
        let key = format!("{}{}", keys::TRANSACTION_PREFIX, transaction.transaction_id);
        self.put(&key, transaction, ttl).await
    }

    async fn load_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<PaymentTransaction>> {
        self.fetch(&format!("{}{transaction_id}", keys::TRANSACTION_PREFIX))
            .await
    }
}
