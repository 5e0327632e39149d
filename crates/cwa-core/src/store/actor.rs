//! # Store Actor
//!
//! The `StoreActor` is the server half of the resource store. It owns the one
//! [`ResourceState`] of the session and the receiving end of the request channel.
//!
//! **Concurrency Model**:
//! The fetcher, the live-update worker and the mutation writer all hold clones of
//! the same [`StoreClient`], and any number of their requests may be in flight at
//! once. The actor still applies them one at a time, in channel order, so the state
//! needs no `Mutex` and a reader never observes a half-applied write.
//!
//! # Usage Pattern
//!
//! 1.  **Create**: `StoreActor::new()` returns the actor and its client.
//! 2.  **Run**: spawn `actor.run()` on the runtime.
//! 3.  **Use**: clone the client into every component that reads or writes resources.
//!
//! ```rust
//! use cwa_core::resource::DiffExclusions;
//! use cwa_core::store::StoreActor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, store) = StoreActor::new(16, DiffExclusions::default());
//!     tokio::spawn(actor.run());
//!
//!     assert!(store.new_is_empty().await.unwrap());
//! }
//! ```

use super::client::StoreClient;
use super::message::{StoreRequest, StoreStats};
use crate::resource::{DiffExclusions, ResourceState, SetOutcome};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct StoreActor {
    receiver: mpsc::Receiver<StoreRequest>,
    state: ResourceState,
    stats: StoreStats,
}

impl StoreActor {
    /// Creates the actor and its client.
    ///
    /// `buffer_size` is the channel capacity; clients wait for room when it is full.
    pub fn new(buffer_size: usize, exclusions: DiffExclusions) -> (Self, StoreClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            state: ResourceState::new(exclusions),
            stats: StoreStats::default(),
        };
        (actor, StoreClient::new(sender))
    }

    /// Processes requests until every client has been dropped.
    pub async fn run(mut self) {
        info!("Store actor started");

        while let Some(msg) = self.receiver.recv().await {
            self.handle(msg);
        }

        info!(
            set_calls = self.stats.set_calls,
            rejected = self.stats.rejected,
            deleted = self.stats.deleted,
            "Store actor shutdown"
        );
    }

    fn handle(&mut self, msg: StoreRequest) {
        match msg {
            StoreRequest::SetResource {
                resource,
                options,
                respond_to,
            } => {
                self.stats.set_calls += 1;
                let iri = resource.iri().unwrap_or_default().to_string();
                let result = self.state.set_resource(resource, options);
                match &result {
                    Ok(SetOutcome::Rejected) => self.stats.rejected += 1,
                    Ok(outcome) => debug!(%iri, ?outcome, is_new = options.is_new, "SetResource"),
                    Err(e) => warn!(%iri, error = %e, "SetResource failed"),
                }
                let _ = respond_to.send(result);
            }
            StoreRequest::DeleteResource { iri, respond_to } => {
                let result = self.state.delete_resource(&iri);
                match &result {
                    Ok(removed) => {
                        self.stats.deleted += removed.len();
                        info!(%iri, removed = removed.len(), "Deleted");
                    }
                    Err(e) => warn!(%iri, error = %e, "Delete failed"),
                }
                let _ = respond_to.send(result);
            }
            StoreRequest::ResetCurrent { respond_to } => {
                self.state.reset_current_resources();
                debug!("Current resources reset");
                let _ = respond_to.send(Ok(()));
            }
            StoreRequest::MergeNew { respond_to } => {
                let merged = self.state.merge_new_resources();
                if !merged.is_empty() {
                    info!(count = merged.len(), "Merged new resources");
                }
                let _ = respond_to.send(Ok(merged));
            }
            StoreRequest::GetResource { iri, respond_to } => {
                let result = self.state.get_resource(&iri).map(|r| r.cloned());
                let _ = respond_to.send(result);
            }
            StoreRequest::GetLatestResource { iri, respond_to } => {
                let result = self.state.get_latest_resource(&iri).map(|r| r.cloned());
                let _ = respond_to.send(result);
            }
            StoreRequest::GetType {
                iri,
                category,
                respond_to,
            } => {
                let type_name = self
                    .state
                    .get_type_from_iri(&iri, category)
                    .map(str::to_string);
                let _ = respond_to.send(Ok(type_name));
            }
            StoreRequest::FindDraft { iri, respond_to } => {
                let _ = respond_to.send(Ok(self.state.find_draft_iri(&iri)));
            }
            StoreRequest::FindPublished { iri, respond_to } => {
                let _ = respond_to.send(Ok(self.state.find_published_iri(&iri)));
            }
            StoreRequest::TogglePublishable {
                iri,
                show_published,
                respond_to,
            } => {
                debug!(%iri, show_published, "TogglePublishable");
                self.state.toggle_publishable(&iri, show_published);
                let _ = respond_to.send(Ok(()));
            }
            StoreRequest::DisplayIri { iri, respond_to } => {
                let _ = respond_to.send(Ok(self.state.display_iri(&iri)));
            }
            StoreRequest::CurrentIds {
                type_name,
                respond_to,
            } => {
                let _ = respond_to.send(Ok(self.state.current_ids(&type_name)));
            }
            StoreRequest::AllIds {
                type_name,
                respond_to,
            } => {
                let _ = respond_to.send(Ok(self.state.all_ids(&type_name)));
            }
            StoreRequest::CurrentIris { respond_to } => {
                let _ = respond_to.send(Ok(self.state.current_iris()));
            }
            StoreRequest::CurrentResources {
                type_name,
                respond_to,
            } => {
                let _ = respond_to.send(Ok(self.state.current_resources(&type_name)));
            }
            StoreRequest::NewIsEmpty { respond_to } => {
                let _ = respond_to.send(Ok(self.state.new_is_empty()));
            }
            StoreRequest::Stats { respond_to } => {
                let _ = respond_to.send(Ok(self.stats));
            }
        }
    }
}
