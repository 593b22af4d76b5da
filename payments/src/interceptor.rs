//! Credential refresh interceptor.
//!
//! Wraps every backend call. Attaches the current access credential; on a
//! 401 for a request that has not been replayed yet, renews the credential
//! and replays the request exactly once.
//!
//! # Single-flight refresh
//!
//! Concurrent requests that all hit a 401 with the same stale credential
//! share one refresh. The first waiter to take the guard performs the
//! exchange; later waiters re-read the session and find either the rotated
//! credential (reuse it) or the recorded failure (return it).
//!
//! ```text
//! request ──► send ──► 401? ──no──► response
//!                        │yes
//!                   retried? ──yes──► Unauthorized
//!                        │no
//!                 lock refresh guard
//!                        │
//!       session rotated since? ──yes──► replay with current credential
//!                        │no
//!         POST /auth/refresh-token ──fail──► clear session, RefreshRejected / RefreshFailed
//!                        │ok
//!              persist pair, replay once
//! ```

use crate::config::PaymentConfig;
use crate::constants::paths;
use crate::error::{PaymentError, Result};
use crate::notice::{Notice, NoticeBus};
use crate::providers::SessionStore;
use crate::session::SessionContext;
use crate::state::TokenPair;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Backend request relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Method.
    pub method: Method,
    /// Path, e.g. `/payments/init`.
    pub path: String,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Already replayed after a refresh.
    pub retried: bool,
}

impl ApiRequest {
    /// GET `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    /// POST `path` with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            retried: false,
        }
    }

    /// PUT `path` with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
            retried: false,
        }
    }
}

/// Outcome of the last refresh that tore the session down.
#[derive(Debug)]
struct FailedRefresh {
    stale_token: Option<String>,
    error: PaymentError,
}

/// Attaches credentials and renews them on authorization failure.
pub struct CredentialRefreshInterceptor<T, S> {
    transport: Arc<T>,
    session: SessionContext<S>,
    config: Arc<PaymentConfig>,
    notices: NoticeBus,
    refresh_guard: Arc<Mutex<Option<FailedRefresh>>>,
}

impl<T, S> Clone for CredentialRefreshInterceptor<T, S> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            session: self.session.clone(),
            config: Arc::clone(&self.config),
            notices: self.notices.clone(),
            refresh_guard: Arc::clone(&self.refresh_guard),
        }
    }
}

impl<T, S> CredentialRefreshInterceptor<T, S>
where
    T: HttpTransport,
    S: SessionStore,
{
    /// Create an interceptor. Clones share one refresh guard.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        session: SessionContext<S>,
        config: Arc<PaymentConfig>,
        notices: NoticeBus,
    ) -> Self {
        Self {
            transport,
            session,
            config,
            notices,
            refresh_guard: Arc::new(Mutex::new(None)),
        }
    }

    /// The session this interceptor reads credentials from.
    #[must_use]
    pub const fn session(&self) -> &SessionContext<S> {
        &self.session
    }

    /// Send `request`, renewing the credential at most once on a 401.
    ///
    /// Non-401 responses are returned as-is, whatever their status.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::Unauthorized`] if the replay is rejected again, or
    ///   there is no refresh credential to renew with
    /// - [`PaymentError::RefreshRejected`] / [`PaymentError::RefreshFailed`]
    ///   if renewal fails (the session is cleared)
    /// - [`PaymentError::Network`] if the request itself gets no response
    #[tracing::instrument(skip(self, request), fields(method = ?request.method, path = %request.path))]
    pub async fn execute(&self, mut request: ApiRequest) -> Result<HttpResponse> {
        let token = self.session.access_token().await?;
        let response = self.send(&request, token.clone()).await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }

        if request.retried {
            tracing::warn!("Replayed request rejected again");
            metrics::counter!("payments.refresh.replay_rejected").increment(1);
            return Err(PaymentError::Unauthorized);
        }

        request.retried = true;
        let fresh = self.refresh_once(token).await?;

        let replay = self.send(&request, Some(fresh)).await?;
        if replay.is_unauthorized() {
            tracing::warn!("Replayed request rejected again");
            metrics::counter!("payments.refresh.replay_rejected").increment(1);
            return Err(PaymentError::Unauthorized);
        }

        tracing::debug!(status = replay.status, "Replayed request after refresh");
        Ok(replay)
    }

    /// [`Self::execute`], then decode a 2xx JSON body.
    ///
    /// # Errors
    ///
    /// As [`Self::execute`], plus [`PaymentError::Api`] for other non-2xx
    /// statuses and [`PaymentError::InvalidResponse`] for undecodable bodies.
    pub async fn execute_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R> {
        self.execute(request).await?.into_json()
    }

    async fn send(&self, request: &ApiRequest, bearer: Option<String>) -> Result<HttpResponse> {
        self.transport
            .send(HttpRequest {
                method: request.method,
                url: self.config.url(&request.path),
                bearer,
                body: request.body.clone(),
            })
            .await
    }

    /// Renew the credential that `stale_token` was, or reuse a renewal that
    /// already happened while waiting for the guard.
    async fn refresh_once(&self, stale_token: Option<String>) -> Result<String> {
        let mut last_failure = self.refresh_guard.lock().await;

        let Some(session) = self.session.current().await? else {
            // An earlier waiter already tore the session down.
            if let Some(failed) = last_failure
                .as_ref()
                .filter(|failed| failed.stale_token == stale_token)
            {
                metrics::counter!("payments.refresh.coalesced").increment(1);
                return Err(failed.error.clone());
            }
            return Err(PaymentError::Unauthorized);
        };

        if stale_token.as_deref() != Some(session.access_token.as_str()) {
            tracing::debug!("Credential already rotated by a concurrent request");
            metrics::counter!("payments.refresh.coalesced").increment(1);
            return Ok(session.access_token);
        }

        let Some(refresh_token) = session.refresh_token else {
            tracing::info!("No refresh credential; ending session");
            self.teardown().await;
            *last_failure = Some(FailedRefresh {
                stale_token,
                error: PaymentError::Unauthorized,
            });
            return Err(PaymentError::Unauthorized);
        };

        metrics::counter!("payments.refresh.attempted").increment(1);
        match self.exchange(&refresh_token).await {
            Ok(pair) => {
                let rotated = self.session.replace_tokens(pair).await?;
                *last_failure = None;
                metrics::counter!("payments.refresh.succeeded").increment(1);
                tracing::info!("Access credential renewed");
                Ok(rotated.access_token)
            },
            Err(error) => {
                tracing::warn!(error = %error, "Credential refresh failed; ending session");
                metrics::counter!("payments.refresh.failed").increment(1);
                self.teardown().await;
                *last_failure = Some(FailedRefresh {
                    stale_token,
                    error: error.clone(),
                });
                Err(error)
            },
        }
    }

    /// `POST /auth/refresh-token` on the raw transport. Never retried.
    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair> {
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::Post,
                url: self.config.url(paths::REFRESH_TOKEN),
                bearer: None,
                body: Some(serde_json::json!({ "refreshToken": refresh_token })),
            })
            .await
            .map_err(|e| PaymentError::RefreshFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(PaymentError::RefreshRejected {
                status: response.status,
            });
        }

        serde_json::from_str(&response.body)
            .map_err(|e| PaymentError::RefreshFailed(format!("malformed refresh response: {e}")))
    }

    async fn teardown(&self) {
        if let Err(e) = self.session.clear().await {
            tracing::error!(error = %e, "Failed to clear session");
        }
        self.notices.publish(Notice::ReauthenticationRequired);
    }
}
