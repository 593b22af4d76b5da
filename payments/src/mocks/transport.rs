//! Scripted HTTP transport for testing.

use crate::error::{PaymentError, Result};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

#[derive(Debug, Default)]
struct Routes {
    /// One-shot responses, consumed before the standing one.
    queued: HashMap<(Method, String), VecDeque<Scripted>>,
    /// Answer given once the queue is empty.
    standing: HashMap<(Method, String), Scripted>,
    /// Every request received, in order.
    log: Vec<HttpRequest>,
    /// Credential required on routes other than the refresh endpoint.
    required_bearer: Option<String>,
}

/// Mock transport.
///
/// Routes match on method and URL path (scheme, host and query ignored).
/// Unknown routes answer 404. Clones share routes and the request log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Routes>>,
    latency: Option<Duration>,
}

/// Path part of an absolute URL, without query or fragment.
fn path_of(url: &str) -> &str {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = after_scheme
        .find('/')
        .map_or("/", |start| &after_scheme[start..]);
    path.split(['?', '#']).next().unwrap_or(path)
}

impl MockTransport {
    /// Create a transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, so concurrent callers overlap.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Always answer `method path` with `status` and a JSON body.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.routes().standing.insert(
            (method, path.to_string()),
            Scripted::Respond(HttpResponse::json(status, &body)),
        );
    }

    /// Answer the next call to `method path` with `status` and a JSON body.
    pub fn respond_once(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.routes()
            .queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted::Respond(HttpResponse::json(status, &body)));
    }

    /// Fail the next call to `method path` with a network error.
    pub fn fail_once(&self, method: Method, path: &str) {
        self.routes()
            .queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted::Fail("connection reset".to_string()));
    }

    /// Fail every call to `method path` with a network error.
    pub fn fail(&self, method: Method, path: &str) {
        self.routes().standing.insert(
            (method, path.to_string()),
            Scripted::Fail("connection refused".to_string()),
        );
    }

    /// Answer 401 on every route except the refresh endpoint unless the
    /// request carries `token`.
    pub fn require_bearer(&self, token: &str) {
        self.routes().required_bearer = Some(token.to_string());
    }

    /// All requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.routes().log.clone()
    }

    /// Number of requests received for `method path`.
    #[must_use]
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.routes()
            .log
            .iter()
            .filter(|request| request.method == method && path_of(&request.url) == path)
            .count()
    }

    fn answer(&self, request: &HttpRequest) -> Scripted {
        let mut routes = self.routes();
        routes.log.push(request.clone());

        let path = path_of(&request.url).to_string();
        if let Some(required) = &routes.required_bearer {
            let is_refresh = path == crate::constants::paths::REFRESH_TOKEN;
            if !is_refresh && request.bearer.as_ref() != Some(required) {
                return Scripted::Respond(HttpResponse::json(
                    401,
                    &serde_json::json!({"message": "token expired"}),
                ));
            }
        }

        let key = (request.method, path);
        if let Some(next) = routes.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return next;
        }
        routes.standing.get(&key).cloned().unwrap_or_else(|| {
            Scripted::Respond(HttpResponse::json(
                404,
                &serde_json::json!({"message": "no route"}),
            ))
        })
    }
}

impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let scripted = self.answer(&request);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match scripted {
            Scripted::Respond(response) => Ok(response),
            Scripted::Fail(reason) => Err(PaymentError::Network(reason)),
        }
    }
}
