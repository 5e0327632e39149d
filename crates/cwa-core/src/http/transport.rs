//! The transport seam between the core and the hypermedia API.

use super::link::{parse_link_header, DiscoveredLinks};
use super::sse::SseEvent;
use crate::error::ApiError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use tokio_util::sync::CancellationToken;

pub const PRELOAD_HEADER: &str = "preload";
pub const PATH_HEADER: &str = "path";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request against the API. `path` is relative to the API root and may carry a
/// query string.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub cancel: Option<CancellationToken>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Vulcain-style hints; an empty list sends no header.
    pub fn with_preload<S: AsRef<str>>(self, paths: &[S]) -> Self {
        if paths.is_empty() {
            return self;
        }
        let joined = paths.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        self.with_header(PRELOAD_HEADER, joined)
    }

    /// The logical route being resolved, for server-side dynamic routing.
    pub fn with_route_path(self, route_path: impl Into<String>) -> Self {
        self.with_header(PATH_HEADER, route_path)
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Some(body),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn links(&self) -> DiscoveredLinks {
        self.header("link")
            .map(parse_link_header)
            .unwrap_or_default()
    }
}

pub type EventStream = BoxStream<'static, Result<SseEvent, ApiError>>;

/// Everything the core needs from the network.
///
/// Implementations must map non-2xx responses into [`ApiError::from_response`] and
/// return [`ApiError::cancelled`] when the request's token fires first.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;

    /// Opens a server-sent-event stream. `url` is absolute and already carries its
    /// `topic` query parameters.
    async fn subscribe(
        &self,
        url: &str,
        last_event_id: Option<String>,
    ) -> Result<EventStream, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preload_hints_are_comma_joined() {
        let request = ApiRequest::get("/_/routes//")
            .with_preload(&["/page", "/page/layout"])
            .with_route_path("/");

        assert_eq!(request.header("Preload"), Some("/page,/page/layout"));
        assert_eq!(request.header("path"), Some("/"));
    }

    #[test]
    fn test_empty_preload_sends_no_header() {
        let request = ApiRequest::post("/_/component_groups", json!({})).with_preload::<&str>(&[]);
        assert_eq!(request.header(PRELOAD_HEADER), None);
        assert_eq!(request.method, Method::Post);
    }
}
