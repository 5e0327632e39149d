//! API documentation client.
//!
//! Fetches the entrypoint (`/`) and the Hydra documentation together and memoizes
//! the pair. The documentation URL is only known once a response has advertised it
//! in a `Link` header, so a call made earlier waits on a `watch` until the fetcher
//! publishes it. Concurrent callers share one in-flight request.

use crate::error::ApiError;
use crate::http::{ApiRequest, HttpTransport};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

type DocsFuture = Shared<BoxFuture<'static, Result<ApiDocumentation, ApiError>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiDocumentation {
    pub entrypoint: Value,
    pub docs: Value,
}

impl ApiDocumentation {
    /// Entrypoint collections as `(key, endpoint)` pairs, JSON-LD keys skipped.
    pub fn entrypoint_collections(&self) -> Vec<(String, String)> {
        self.entrypoint
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| !key.starts_with('@'))
                    .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn supported_classes(&self) -> &[Value] {
        self.docs
            .get("hydra:supportedClass")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The supported class labelled `type_name` (`rdfs:label` or `hydra:title`).
    pub fn class_for(&self, type_name: &str) -> Option<&Value> {
        self.supported_classes().iter().find(|class| {
            ["rdfs:label", "hydra:title"]
                .iter()
                .any(|key| class.get(*key).and_then(Value::as_str) == Some(type_name))
        })
    }

    /// A type is publishable when its class documents a `publishedAt` property.
    pub fn is_publishable(&self, type_name: &str) -> bool {
        let Some(properties) = self
            .class_for(type_name)
            .and_then(|class| class.get("hydra:supportedProperty"))
            .and_then(Value::as_array)
        else {
            return false;
        };
        properties.iter().any(|property| {
            let title = property.get("hydra:title").and_then(Value::as_str);
            let label = property
                .get("hydra:property")
                .and_then(|p| p.get("rdfs:label"))
                .and_then(Value::as_str);
            title == Some("publishedAt") || label == Some("publishedAt")
        })
    }
}

#[derive(Clone)]
pub struct ApiDocsClient {
    transport: Arc<dyn HttpTransport>,
    docs_url: Arc<watch::Sender<Option<String>>>,
    cache: Arc<Mutex<Option<ApiDocumentation>>>,
    in_flight: Arc<Mutex<Option<DocsFuture>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ApiDocsClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        let (docs_url, _) = watch::channel(None);
        Self {
            transport,
            docs_url: Arc::new(docs_url),
            cache: Arc::new(Mutex::new(None)),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_docs_url(&self, url: &str) {
        let changed = self.docs_url.send_if_modified(|current| {
            if current.as_deref() == Some(url) {
                return false;
            }
            *current = Some(url.to_string());
            true
        });
        if changed {
            info!(%url, "API documentation URL discovered");
        }
    }

    pub fn docs_url(&self) -> Option<String> {
        self.docs_url.borrow().clone()
    }

    /// Returns the cached documentation unless `refresh`; otherwise joins or starts
    /// the shared fetch. Suspends until the documentation URL is known.
    #[instrument(skip(self))]
    pub async fn get_api_documentation(&self, refresh: bool) -> Result<ApiDocumentation, ApiError> {
        if !refresh {
            if let Some(cached) = lock(&self.cache).clone() {
                return Ok(cached);
            }
        }

        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.as_ref() {
                Some(shared) => {
                    debug!("Joining in-flight API documentation fetch");
                    shared.clone()
                }
                None => {
                    let shared = self.clone().fetch().boxed().shared();
                    *in_flight = Some(shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;
        {
            // a refresh may already have replaced the finished fetch
            let mut in_flight = lock(&self.in_flight);
            if in_flight.as_ref().is_some_and(|current| current.ptr_eq(&shared)) {
                in_flight.take();
            }
        }
        if let Ok(docs) = &result {
            *lock(&self.cache) = Some(docs.clone());
        }
        result
    }

    async fn fetch(self) -> Result<ApiDocumentation, ApiError> {
        let docs_url = {
            let mut receiver = self.docs_url.subscribe();
            let current = receiver
                .wait_for(Option::is_some)
                .await
                .map_err(|_| ApiError::transport("/", "API documentation URL never resolved"))?;
            current.clone().unwrap_or_default()
        };

        let (entrypoint, docs) = futures::try_join!(
            self.transport.send(ApiRequest::get("/")),
            self.transport.send(ApiRequest::get(docs_url.clone())),
        )?;
        info!(%docs_url, "API documentation loaded");

        Ok(ApiDocumentation {
            entrypoint: entrypoint.body.unwrap_or(Value::Null),
            docs: docs.body.unwrap_or(Value::Null),
        })
    }
}
