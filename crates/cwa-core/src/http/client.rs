//! [`HttpTransport`] over `reqwest`.

use super::sse::SseParser;
use super::transport::{ApiRequest, ApiResponse, EventStream, HttpTransport, Method};
use crate::config::CwaConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

const JSON_LD: &str = "application/ld+json";
const MERGE_PATCH: &str = "application/merge-patch+json";
const EVENT_STREAM: &str = "text/event-stream";

pub struct ReqwestTransport {
    client: reqwest::Client,
    /// No overall timeout: an event stream stays open indefinitely.
    stream_client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &CwaConfig) -> Result<Self, ApiError> {
        let build_error = |e: reqwest::Error| ApiError::transport(&config.api_url, e.to_string());
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(build_error)?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(build_error)?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let endpoint = request.path.clone();
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, self.url(&request.path))
            .header(ACCEPT, JSON_LD);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let content_type = match request.method {
                Method::Patch => MERGE_PATCH,
                _ => JSON_LD,
            };
            builder = builder
                .header(CONTENT_TYPE, content_type)
                .body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(&endpoint, describe(&e)))?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(&endpoint, describe(&e)))?;
        let body = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        if !(200..300).contains(&status) {
            return Err(ApiError::from_response(status, endpoint, body.as_ref()));
        }
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        match request.cancel.clone() {
            Some(token) => {
                let endpoint = request.path.clone();
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Request cancelled");
                        Err(ApiError::cancelled(endpoint))
                    }
                    result = self.execute(request) => result,
                }
            }
            None => self.execute(request).await,
        }
    }

    #[instrument(skip(self))]
    async fn subscribe(
        &self,
        url: &str,
        last_event_id: Option<String>,
    ) -> Result<EventStream, ApiError> {
        let mut builder = self.stream_client.get(url).header(ACCEPT, EVENT_STREAM);
        if let Some(id) = last_event_id {
            builder = builder.header("Last-Event-ID", id);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(url, describe(&e)))?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(
                response.status().as_u16(),
                url,
                None,
            ));
        }

        let endpoint = url.to_string();
        let mut parser = SseParser::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => parser.feed(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(ApiError::transport(&endpoint, describe(&e)))],
            })
            .flat_map(stream::iter);

        Ok(events.boxed())
    }
}

/// Repeated headers (several `Link` lines) are joined with `, `.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timeout: {e}")
    } else if e.is_connect() {
        format!("connection error: {e}")
    } else if e.is_decode() {
        format!("decode error: {e}")
    } else {
        e.to_string()
    }
}
