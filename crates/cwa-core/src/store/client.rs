//! # Store Client
//!
//! Typed async handle to the [`StoreActor`](super::StoreActor).

use super::message::{Response, StoreRequest, StoreStats};
use crate::error::StoreError;
use crate::resource::{Category, Resource, SetOutcome, SetResourceOptions};
use tokio::sync::{mpsc, oneshot};

/// Cheap to clone: holds only the request sender.
///
/// Every method sends one request and waits for its reply. A closed channel maps to
/// [`StoreError::ActorClosed`], a dropped reply to [`StoreError::ActorDropped`].
#[derive(Clone, Debug)]
pub struct StoreClient {
    sender: mpsc::Sender<StoreRequest>,
}

impl StoreClient {
    pub fn new(sender: mpsc::Sender<StoreRequest>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Response<T>) -> StoreRequest,
    ) -> Result<T, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        response.await.map_err(|_| StoreError::ActorDropped)?
    }

    pub async fn set_resource(
        &self,
        resource: Resource,
        options: SetResourceOptions,
    ) -> Result<SetOutcome, StoreError> {
        self.request(|respond_to| StoreRequest::SetResource {
            resource,
            options,
            respond_to,
        })
        .await
    }

    /// Returns every IRI removed, cascaded positions included.
    pub async fn delete_resource(&self, iri: &str) -> Result<Vec<String>, StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::DeleteResource { iri, respond_to })
            .await
    }

    pub async fn reset_current_resources(&self) -> Result<(), StoreError> {
        self.request(|respond_to| StoreRequest::ResetCurrent { respond_to })
            .await
    }

    pub async fn merge_new_resources(&self) -> Result<Vec<String>, StoreError> {
        self.request(|respond_to| StoreRequest::MergeNew { respond_to })
            .await
    }

    pub async fn get_resource(&self, iri: &str) -> Result<Option<Resource>, StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::GetResource { iri, respond_to })
            .await
    }

    /// The copy staged by a pending live update if there is one, else the current one.
    pub async fn get_latest_resource(&self, iri: &str) -> Result<Option<Resource>, StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::GetLatestResource { iri, respond_to })
            .await
    }

    /// Pure function of the IRI shape; no round trip to the actor.
    pub fn get_category_from_iri(&self, iri: &str) -> Category {
        Category::from_iri(iri)
    }

    pub async fn get_type_from_iri(
        &self,
        iri: &str,
        category: Option<Category>,
    ) -> Result<Option<String>, StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::GetType {
            iri,
            category,
            respond_to,
        })
        .await
    }

    pub async fn find_draft_iri(&self, iri: &str) -> Result<Option<String>, StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::FindDraft { iri, respond_to })
            .await
    }

    pub async fn find_published_iri(&self, iri: &str) -> Result<Option<String>, StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::FindPublished { iri, respond_to })
            .await
    }

    pub async fn toggle_publishable(
        &self,
        iri: &str,
        show_published: bool,
    ) -> Result<(), StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::TogglePublishable {
            iri,
            show_published,
            respond_to,
        })
        .await
    }

    pub async fn display_iri(&self, iri: &str) -> Result<String, StoreError> {
        let iri = iri.to_string();
        self.request(|respond_to| StoreRequest::DisplayIri { iri, respond_to })
            .await
    }

    pub async fn current_ids(&self, type_name: &str) -> Result<Vec<String>, StoreError> {
        let type_name = type_name.to_string();
        self.request(|respond_to| StoreRequest::CurrentIds {
            type_name,
            respond_to,
        })
        .await
    }

    pub async fn all_ids(&self, type_name: &str) -> Result<Vec<String>, StoreError> {
        let type_name = type_name.to_string();
        self.request(|respond_to| StoreRequest::AllIds {
            type_name,
            respond_to,
        })
        .await
    }

    /// Every IRI in `current_ids` across all types; the live-update topic set.
    pub async fn current_iris(&self) -> Result<Vec<String>, StoreError> {
        self.request(|respond_to| StoreRequest::CurrentIris { respond_to })
            .await
    }

    pub async fn current_resources(&self, type_name: &str) -> Result<Vec<Resource>, StoreError> {
        let type_name = type_name.to_string();
        self.request(|respond_to| StoreRequest::CurrentResources {
            type_name,
            respond_to,
        })
        .await
    }

    pub async fn new_is_empty(&self) -> Result<bool, StoreError> {
        self.request(|respond_to| StoreRequest::NewIsEmpty { respond_to })
            .await
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.request(|respond_to| StoreRequest::Stats { respond_to })
            .await
    }
}
