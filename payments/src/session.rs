//! Explicit session context.
//!
//! Constructed once per process and injected into every component that needs
//! credentials. All reads go to the store, so a credential rotated by one
//! request flow is visible to the next request immediately.

use crate::error::Result;
use crate::providers::SessionStore;
use crate::state::{Identity, Session, TokenPair};
use std::sync::Arc;
use std::time::Duration;

/// Handle to the current session.
#[derive(Debug)]
pub struct SessionContext<S> {
    store: Arc<S>,
    ttl: Duration,
}

impl<S> Clone for SessionContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
        }
    }
}

impl<S: SessionStore> SessionContext<S> {
    /// Wrap a store; persisted sessions live for `ttl`.
    #[must_use]
    pub const fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Start a session after a successful sign-in.
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be persisted.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, tokens: TokenPair, identity: Identity) -> Result<Session> {
        let session = Session::from_tokens(tokens, Some(identity));
        self.store.save(&session, self.ttl).await?;
        tracing::info!("Session started");
        Ok(session)
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self) -> Result<()> {
        self.store.clear().await?;
        tracing::info!("Session ended");
        Ok(())
    }

    /// The current session, if any.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn current(&self) -> Result<Option<Session>> {
        self.store.load().await
    }

    /// Current access credential, if signed in.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.current().await?.map(|session| session.access_token))
    }

    /// Whether an access credential is present.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.current().await?.is_some())
    }

    /// Persist a rotated credential pair, keeping the cached identity.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn replace_tokens(&self, tokens: TokenPair) -> Result<Session> {
        let session = match self.current().await? {
            Some(current) => current.rotated(tokens),
            None => Session::from_tokens(tokens, None),
        };
        self.store.save(&session, self.ttl).await?;
        Ok(session)
    }

    /// Drop the session after an irrecoverable refresh failure.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;
    use crate::stores::InMemoryStore;

    fn context() -> SessionContext<InMemoryStore> {
        SessionContext::new(Arc::new(InMemoryStore::new()), Duration::from_secs(86_400))
    }

    fn identity() -> Identity {
        Identity {
            id: "u-1".to_string(),
            role: Role::Customer,
            email: "linh@example.com".to_string(),
            full_name: Some("Linh".to_string()),
        }
    }

    fn pair(n: u8) -> TokenPair {
        TokenPair {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
        }
    }

    #[tokio::test]
    async fn login_then_logout() {
        let ctx = context();
        assert!(!ctx.is_authenticated().await.unwrap());

        ctx.login(pair(1), identity()).await.unwrap();
        assert!(ctx.is_authenticated().await.unwrap());
        assert_eq!(ctx.access_token().await.unwrap().as_deref(), Some("access-1"));

        ctx.logout().await.unwrap();
        assert_eq!(ctx.current().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rotation_is_visible_to_clones() {
        let ctx = context();
        let other = ctx.clone();
        ctx.login(pair(1), identity()).await.unwrap();

        ctx.replace_tokens(pair(2)).await.unwrap();

        let seen = other.current().await.unwrap().unwrap();
        assert_eq!(seen.access_token, "access-2");
        assert_eq!(seen.identity, Some(identity()));
    }
}
