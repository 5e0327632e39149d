//! # Store Messages
//!
//! The request enum sent from a [`StoreClient`](super::StoreClient) to the
//! [`StoreActor`](super::StoreActor). Every variant carries its own one-shot reply
//! channel, so a caller only ever waits for the answer to its own request.
//!
//! The variants form the narrow commit surface of the store: writes
//! (`SetResource`, `DeleteResource`, `ResetCurrent`, `MergeNew`,
//! `TogglePublishable`) and read-only lookups that return owned snapshots.

use crate::error::StoreError;
use crate::resource::{Category, Resource, SetOutcome, SetResourceOptions};
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the store actor.
pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;

/// Counters reported by [`StoreRequest::Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `SetResource` requests handled, collection members not counted separately.
    pub set_calls: usize,
    /// `SetResource` requests that were rejected by the diff-before-write rule.
    pub rejected: usize,
    /// IRIs removed by `DeleteResource`, cascades included.
    pub deleted: usize,
}

#[derive(Debug)]
pub enum StoreRequest {
    SetResource {
        resource: Resource,
        options: SetResourceOptions,
        respond_to: Response<SetOutcome>,
    },
    DeleteResource {
        iri: String,
        respond_to: Response<Vec<String>>,
    },
    ResetCurrent {
        respond_to: Response<()>,
    },
    MergeNew {
        respond_to: Response<Vec<String>>,
    },
    GetResource {
        iri: String,
        respond_to: Response<Option<Resource>>,
    },
    GetLatestResource {
        iri: String,
        respond_to: Response<Option<Resource>>,
    },
    GetType {
        iri: String,
        category: Option<Category>,
        respond_to: Response<Option<String>>,
    },
    FindDraft {
        iri: String,
        respond_to: Response<Option<String>>,
    },
    FindPublished {
        iri: String,
        respond_to: Response<Option<String>>,
    },
    TogglePublishable {
        iri: String,
        show_published: bool,
        respond_to: Response<()>,
    },
    DisplayIri {
        iri: String,
        respond_to: Response<String>,
    },
    CurrentIds {
        type_name: String,
        respond_to: Response<Vec<String>>,
    },
    AllIds {
        type_name: String,
        respond_to: Response<Vec<String>>,
    },
    CurrentIris {
        respond_to: Response<Vec<String>>,
    },
    CurrentResources {
        type_name: String,
        respond_to: Response<Vec<Resource>>,
    },
    NewIsEmpty {
        respond_to: Response<bool>,
    },
    Stats {
        respond_to: Response<StoreStats>,
    },
}
