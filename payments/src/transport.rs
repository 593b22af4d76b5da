//! HTTP transport seam.
//!
//! [`HttpTransport`] is the raw wire: no credentials logic, no status
//! interpretation. [`ReqwestTransport`] is the production implementation;
//! tests script [`crate::mocks::MockTransport`].

use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP method subset used by the backend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
}

/// Fully resolved outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Bearer credential, if any.
    pub bearer: Option<String>,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
}

/// Response status and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: String,
}

impl HttpResponse {
    /// Build a JSON response (used by test doubles).
    #[must_use]
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// 401.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decode a 2xx body, or turn any other status into
    /// [`PaymentError::Api`].
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Api`] for non-success statuses and
    /// [`PaymentError::InvalidResponse`] if the body does not decode.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        if !self.is_success() {
            return Err(PaymentError::Api {
                status: self.status,
                message: self.body,
            });
        }
        serde_json::from_str(&self.body).map_err(|e| PaymentError::InvalidResponse(e.to_string()))
    }
}

/// Raw HTTP client.
pub trait HttpTransport: Send + Sync {
    /// Send one request.
    ///
    /// Any HTTP status (including 4xx/5xx) is a successful send.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Network`] if no response was received.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl std::future::Future<Output = Result<HttpResponse>> + Send;
}

/// Correlation header attached to every outbound request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `reqwest` transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Config`] if the client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request_id = uuid::Uuid::new_v4();
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        }
        .header(REQUEST_ID_HEADER, request_id.to_string());

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(%request_id, error = %e, "Request got no response");
            PaymentError::Network(e.to_string())
        })?;

        let status = response.status().as_u16();
        tracing::trace!(%request_id, status, "Response received");
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}
