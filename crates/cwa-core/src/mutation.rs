//! # Local writes
//!
//! Every write holds a [`MutationGuard`](crate::gate::MutationGuard) while its request
//! is in flight, so the live-update worker never applies a hub echo in the middle of
//! a local edit. Successful responses are committed to the `current` partition.
//!
//! A failed write raises notifications on the [`EventBus`] and returns
//! [`CwaError::Update`] carrying them, so the input layer can revert its optimistic
//! state. Cancelled writes return the bare cancel error and raise nothing.

use crate::debounce::Debouncer;
use crate::error::{ApiError, CwaError};
use crate::events::{CwaEvent, EventBus};
use crate::gate::PendingMutations;
use crate::http::{ApiRequest, ApiResponse, HttpTransport};
use crate::resource::{Resource, SetResourceOptions};
use crate::store::StoreClient;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Sends writes and commits their results. Shared by the writer and its debouncer.
#[derive(Clone)]
struct Committer {
    transport: Arc<dyn HttpTransport>,
    store: StoreClient,
    events: EventBus,
    gate: PendingMutations,
}

impl Committer {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, CwaError> {
        let endpoint = request.path.clone();
        let _guard = self.gate.increment();
        self.transport
            .send(request)
            .await
            .map_err(|e| self.failed(&endpoint, e))
    }

    fn failed(&self, endpoint: &str, error: ApiError) -> CwaError {
        if error.is_cancel() {
            debug!(%endpoint, "Write cancelled");
            return CwaError::Api(error);
        }
        warn!(%endpoint, error = %error, "Write failed");
        let notifications = self.events.raise_api_error(&error);
        CwaError::Update {
            endpoint: endpoint.to_string(),
            source: error,
            notifications,
        }
    }

    async fn commit(&self, endpoint: &str, response: ApiResponse) -> Result<Resource, CwaError> {
        let status = response.status;
        let resource = response
            .body
            .and_then(|body| Resource::from_value(body).ok())
            .filter(|resource| resource.iri().is_some())
            .ok_or_else(|| CwaError::Api(ApiError::invalid_payload(status, endpoint)))?;
        self.store
            .set_resource(resource.clone(), SetResourceOptions::current())
            .await?;
        Ok(resource)
    }

    async fn update(&self, iri: &str, patch: Map<String, Value>) -> Result<Resource, CwaError> {
        let fields: Vec<String> = patch.keys().cloned().collect();
        let response = self
            .send(ApiRequest::patch(iri, Value::Object(patch)))
            .await?;
        let resource = self.commit(iri, response).await?;
        for field in &fields {
            self.events.clear_field(field, iri);
        }
        info!(%iri, ?fields, "Updated");
        Ok(resource)
    }
}

/// Create, update and delete against the API, plus debounced field edits.
#[derive(Clone)]
pub struct ResourceWriter {
    committer: Committer,
    debouncer: Debouncer<(String, String), Value>,
}

impl ResourceWriter {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: StoreClient,
        events: EventBus,
        gate: PendingMutations,
        debounce: Duration,
    ) -> Self {
        let committer = Committer {
            transport,
            store,
            events,
            gate: gate.clone(),
        };
        let flusher = committer.clone();
        let debouncer = Debouncer::new(debounce, gate, move |(iri, field): (String, String), value: Value| {
            let committer = flusher.clone();
            async move {
                let mut patch = Map::new();
                patch.insert(field.clone(), value);
                if let Err(e) = committer.update(&iri, patch).await {
                    committer.events.emit(CwaEvent::FieldUpdateFailed {
                        kind: e.kind(),
                        message: e.to_string(),
                        iri,
                        field,
                    });
                }
            }
        });
        Self {
            committer,
            debouncer,
        }
    }

    /// POSTs `body` to `endpoint` (a collection path), stores the created resource
    /// and highlights it.
    #[instrument(skip(self, body))]
    pub async fn create_resource(&self, endpoint: &str, body: Value) -> Result<Resource, CwaError> {
        let response = self
            .committer
            .send(ApiRequest::post(endpoint, body))
            .await?;
        let resource = self.committer.commit(endpoint, response).await?;
        info!(iri = ?resource.iri(), "Created");
        if let Some(iri) = resource.iri() {
            self.committer.events.highlight(iri);
        }
        Ok(resource)
    }

    /// PATCHes `iri` with the top-level keys of `patch` (merge-patch semantics).
    /// Field notifications for the patched keys are cleared on success.
    #[instrument(skip(self, patch))]
    pub async fn update_resource(&self, iri: &str, patch: Value) -> Result<Resource, CwaError> {
        let patch = match patch {
            Value::Object(map) => map,
            other => {
                return Err(CwaError::Structural(format!(
                    "Patch for {iri} must be an object, got {other}"
                )))
            }
        };
        self.committer.update(iri, patch).await
    }

    /// DELETEs `iri`, then removes it (and the positions placing it) from the store.
    #[instrument(skip(self))]
    pub async fn delete_resource_remote(&self, iri: &str) -> Result<Vec<String>, CwaError> {
        self.committer.send(ApiRequest::delete(iri)).await?;
        let removed = self.committer.store.delete_resource(iri).await?;
        for removed_iri in &removed {
            self.committer
                .events
                .emit(CwaEvent::ResourceDeleted(removed_iri.clone()));
        }
        info!(%iri, removed = removed.len(), "Deleted");
        Ok(removed)
    }

    /// Queues an edit of one field. Edits of the same field within the debounce
    /// window collapse into a single PATCH carrying the latest value.
    ///
    /// A failed PATCH is reported as [`CwaEvent::FieldUpdateFailed`] after its
    /// notifications.
    pub fn update_field_debounced(&self, iri: &str, field: &str, value: Value) {
        debug!(%iri, %field, "Field edit queued");
        self.debouncer
            .push((iri.to_string(), field.to_string()), value);
    }

    /// Drops a queued field edit. Returns `false` if none was waiting.
    pub fn cancel_field_update(&self, iri: &str, field: &str) -> bool {
        self.debouncer
            .cancel(&(iri.to_string(), field.to_string()))
    }

    pub fn pending_field_updates(&self) -> usize {
        self.debouncer.pending()
    }
}
