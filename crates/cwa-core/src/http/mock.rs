//! # Mock Transport & Testing Guide
//!
//! `MockTransport` implements [`HttpTransport`] entirely in memory. It lets tests
//! script API responses and hub messages, then assert on the requests the core
//! actually issued, without a server.
//!
//! ## When to use the mock vs a live API
//!
//! | Feature | MockTransport | ReqwestTransport |
//! |---------|---------------|------------------|
//! | **Speed** | Instant (in-memory) | Network bound |
//! | **Determinism** | Scripted replies, paused-time friendly | Subject to the server |
//! | **Error Injection** | Easy (`return_status`, `return_error`) | Hard |
//! | **Use Case** | Fetcher, live-update and writer logic | The sample binary |
//!
//! ## Example
//!
//! ```rust
//! use cwa_core::http::{ApiRequest, HttpTransport, MockTransport};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     mock.expect_get("/_/pages/1")
//!         .return_json(json!({ "@id": "/_/pages/1", "@type": "Page" }));
//!
//!     let response = mock.send(ApiRequest::get("/_/pages/1")).await.unwrap();
//!     assert_eq!(response.body.unwrap()["@type"], "Page");
//!
//!     mock.verify(); // every expectation was hit, no unexpected call was made
//! }
//! ```
//!
//! ## Replies
//!
//! Replies registered for the same `(method, path)` are served in order; the last
//! one keeps answering once the others are used up. Unregistered requests get a 404
//! and are recorded as unexpected, which makes [`MockTransport::verify`] panic.
//!
//! ## Hub
//!
//! Every `subscribe` call is recorded and replaces the previous stream, whose
//! sender is dropped so the old stream ends like a closed connection.
//! [`MockTransport::push_event`] writes to the latest subscription.

use super::link::{API_DOCUMENTATION_REL, MERCURE_REL};
use super::sse::SseEvent;
use super::transport::{ApiRequest, ApiResponse, EventStream, HttpTransport, Method};
use crate::error::ApiError;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type RouteKey = (Method, String);
type HubSender = mpsc::UnboundedSender<Result<SseEvent, ApiError>>;

#[derive(Debug, Clone)]
enum MockReply {
    Ok(ApiResponse),
    Err(ApiError),
}

#[derive(Debug, Default)]
struct Route {
    replies: VecDeque<MockReply>,
    hits: usize,
}

#[derive(Default)]
struct Inner {
    routes: Mutex<HashMap<RouteKey, Route>>,
    calls: Mutex<Vec<ApiRequest>>,
    unexpected: Mutex<Vec<RouteKey>>,
    link_header: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    subscriptions: Mutex<Vec<(String, Option<String>)>>,
    hub: Mutex<Option<HubSender>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloning shares the same script and call log.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&self, method: Method, path: impl Into<String>) -> ReplyBuilder {
        ReplyBuilder {
            key: (method, path.into()),
            inner: self.inner.clone(),
        }
    }

    pub fn expect_get(&self, path: impl Into<String>) -> ReplyBuilder {
        self.expect(Method::Get, path)
    }

    pub fn expect_post(&self, path: impl Into<String>) -> ReplyBuilder {
        self.expect(Method::Post, path)
    }

    pub fn expect_patch(&self, path: impl Into<String>) -> ReplyBuilder {
        self.expect(Method::Patch, path)
    }

    pub fn expect_delete(&self, path: impl Into<String>) -> ReplyBuilder {
        self.expect(Method::Delete, path)
    }

    /// Attaches a `Link` header advertising these URLs to every successful response.
    pub fn with_links(self, api_documentation: Option<&str>, mercure_hub: Option<&str>) -> Self {
        let mut entries = Vec::new();
        if let Some(docs) = api_documentation {
            entries.push(format!("<{docs}>; rel=\"{API_DOCUMENTATION_REL}\""));
        }
        if let Some(hub) = mercure_hub {
            entries.push(format!("<{hub}>; rel=\"{MERCURE_REL}\""));
        }
        *lock(&self.inner.link_header) = (!entries.is_empty()).then(|| entries.join(", "));
        self
    }

    /// Every request waits this long before its reply; cancellation still wins.
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.inner.delay) = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        lock(&self.inner.calls).clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<ApiRequest> {
        lock(&self.inner.calls)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    /// Highest number of requests observed waiting at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// `(url, last_event_id)` of every subscription, oldest first.
    pub fn subscriptions(&self) -> Vec<(String, Option<String>)> {
        lock(&self.inner.subscriptions).clone()
    }

    /// Delivers an event on the latest subscription. Returns `false` if none is open.
    pub fn push_event(&self, event: SseEvent) -> bool {
        match lock(&self.inner.hub).as_ref() {
            Some(sender) => sender.unbounded_send(Ok(event)).is_ok(),
            None => false,
        }
    }

    pub fn push_json(&self, payload: &Value) -> bool {
        self.push_event(SseEvent::message(payload.to_string()))
    }

    /// Ends the current subscription as if the hub closed it.
    pub fn close_hub(&self) {
        lock(&self.inner.hub).take();
    }

    /// Panics if an expectation was never hit or a request had no expectation.
    pub fn verify(&self) {
        let unexpected = lock(&self.inner.unexpected);
        if !unexpected.is_empty() {
            panic!("Unexpected requests: {:?}", *unexpected);
        }
        let routes = lock(&self.inner.routes);
        let unused: Vec<_> = routes.iter().filter(|(_, r)| r.hits == 0).map(|(k, _)| k).collect();
        if !unused.is_empty() {
            panic!("Not all expectations were met: {unused:?}");
        }
    }

    fn next_reply(&self, key: &RouteKey) -> MockReply {
        if let Some(route) = lock(&self.inner.routes).get_mut(key) {
            route.hits += 1;
            let reply = if route.replies.len() > 1 {
                route.replies.pop_front()
            } else {
                route.replies.front().cloned()
            };
            return reply.unwrap_or_else(|| MockReply::Err(ApiError::not_found(&key.1)));
        }
        lock(&self.inner.unexpected).push(key.clone());
        MockReply::Err(ApiError::not_found(&key.1))
    }

    async fn wait(&self, request: &ApiRequest) -> Result<(), ApiError> {
        let delay = *lock(&self.inner.delay);
        let sleep = async {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        };
        match &request.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::cancelled(&request.path)),
                _ = sleep => Ok(()),
            },
            None => {
                sleep.await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        lock(&self.inner.calls).push(request.clone());
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let waited = self.wait(&request).await;
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        waited?;

        match self.next_reply(&(request.method, request.path.clone())) {
            MockReply::Ok(mut response) => {
                if let Some(link) = lock(&self.inner.link_header).clone() {
                    response.headers.insert("link".to_string(), link);
                }
                Ok(response)
            }
            MockReply::Err(e) => Err(e),
        }
    }

    async fn subscribe(
        &self,
        url: &str,
        last_event_id: Option<String>,
    ) -> Result<EventStream, ApiError> {
        lock(&self.inner.subscriptions).push((url.to_string(), last_event_id));
        let (sender, receiver) = mpsc::unbounded();
        *lock(&self.inner.hub) = Some(sender);
        Ok(receiver.boxed())
    }
}

/// Registers replies for one `(method, path)`.
pub struct ReplyBuilder {
    key: RouteKey,
    inner: Arc<Inner>,
}

impl ReplyBuilder {
    fn push(self, reply: MockReply) {
        lock(&self.inner.routes)
            .entry(self.key)
            .or_default()
            .replies
            .push_back(reply);
    }

    pub fn return_json(self, body: Value) {
        self.push(MockReply::Ok(ApiResponse::json(200, body)));
    }

    pub fn return_response(self, response: ApiResponse) {
        self.push(MockReply::Ok(response));
    }

    pub fn return_empty(self, status: u16) {
        self.push(MockReply::Ok(ApiResponse {
            status,
            headers: BTreeMap::new(),
            body: None,
        }));
    }

    /// A non-2xx reply normalized the way a real transport would.
    pub fn return_status(self, status: u16, body: Option<Value>) {
        let error = ApiError::from_response(status, self.key.1.clone(), body.as_ref());
        self.push(MockReply::Err(error));
    }

    pub fn return_error(self, error: ApiError) {
        self.push(MockReply::Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_replies_are_served_in_order_and_last_sticks() {
        let mock = MockTransport::new();
        mock.expect_get("/_/pages/1").return_status(500, None);
        mock.expect_get("/_/pages/1").return_json(json!({ "@id": "/_/pages/1" }));

        assert!(mock.send(ApiRequest::get("/_/pages/1")).await.is_err());
        assert!(mock.send(ApiRequest::get("/_/pages/1")).await.is_ok());
        assert!(mock.send(ApiRequest::get("/_/pages/1")).await.is_ok());
        assert_eq!(mock.call_count(Method::Get, "/_/pages/1"), 3);
        mock.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected requests")]
    async fn test_unexpected_request_fails_verify() {
        let mock = MockTransport::new();
        let err = mock.send(ApiRequest::get("/nope")).await.unwrap_err();
        assert!(err.is_not_found());
        mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_is_a_cancel_error() {
        let mock = MockTransport::new().with_delay(Duration::from_secs(5));
        mock.expect_get("/_/pages/1").return_json(json!({}));
        let token = CancellationToken::new();
        token.cancel();

        let err = mock
            .send(ApiRequest::get("/_/pages/1").with_cancel(token))
            .await
            .unwrap_err();
        assert!(err.is_cancel());
    }

    #[tokio::test]
    async fn test_hub_events_reach_latest_subscription() {
        let mock = MockTransport::new();
        let mut first = mock.subscribe("https://hub.test/a", None).await.unwrap();
        let mut second = mock
            .subscribe("https://hub.test/b", Some("urn:1".into()))
            .await
            .unwrap();

        assert!(mock.push_json(&json!({ "@id": "/_/pages/1" })));
        assert!(first.next().await.is_none());
        let event = second.next().await.unwrap().unwrap();
        assert_eq!(event.data, r#"{"@id":"/_/pages/1"}"#);
        assert_eq!(mock.subscriptions()[1].1.as_deref(), Some("urn:1"));
    }
}
