//! # Group/Position Reconciler
//!
//! Keeps the ComponentGroup declared by the rendering layer for a location in sync
//! with the API. For a location (page, layout or component) and a declared set of
//! allowed component types:
//!
//! - no group with reference `{base}_{location.reference}` exists: POST one;
//! - one exists but its `allowedComponents` differ: PATCH them;
//! - otherwise nothing.
//!
//! Only editing sessions reconcile, and never while resources are still loading.

use crate::error::CwaError;
use crate::fetcher::{FetchStatus, StatusState};
use crate::mutation::ResourceWriter;
use crate::resource::{iri_id, Resource, SetResourceOptions, COMPONENT_GROUP};
use crate::store::StoreClient;
use serde_json::{json, Value};
use std::fmt::{self, Display};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const COMPONENT_GROUPS_ENDPOINT: &str = "/_/component_groups";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Page,
    Layout,
    Component,
}

impl LocationKind {
    /// The group's link back to its locations.
    pub fn group_field(&self) -> &'static str {
        match self {
            LocationKind::Page => "pages",
            LocationKind::Layout => "layouts",
            LocationKind::Component => "components",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLocation {
    pub kind: LocationKind,
    pub iri: String,
}

impl GroupLocation {
    pub fn page(iri: impl Into<String>) -> Self {
        Self {
            kind: LocationKind::Page,
            iri: iri.into(),
        }
    }

    pub fn layout(iri: impl Into<String>) -> Self {
        Self {
            kind: LocationKind::Layout,
            iri: iri.into(),
        }
    }

    pub fn component(iri: impl Into<String>) -> Self {
        Self {
            kind: LocationKind::Component,
            iri: iri.into(),
        }
    }
}

impl Display for GroupLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.iri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(String),
    Patched(String),
    Unchanged(String),
    /// Loading, unauthenticated, or the location is not in the store yet.
    Deferred,
}

/// `{base}_{reference}`, where the location's own `reference` falls back to the
/// last segment of its IRI.
pub fn group_reference(base_reference: &str, location: &Resource, location_iri: &str) -> String {
    let location_reference = location
        .str_field("reference")
        .unwrap_or_else(|| iri_id(location_iri));
    format!("{base_reference}_{location_reference}")
}

/// `null` means any component is allowed.
fn allowed_value(allowed: &[String]) -> Value {
    if allowed.is_empty() {
        Value::Null
    } else {
        json!(allowed)
    }
}

#[derive(Clone)]
pub struct GroupReconciler {
    store: StoreClient,
    writer: ResourceWriter,
    status: FetchStatus,
    authenticated: watch::Receiver<bool>,
}

impl GroupReconciler {
    pub fn new(
        store: StoreClient,
        writer: ResourceWriter,
        status: FetchStatus,
        authenticated: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            writer,
            status,
            authenticated,
        }
    }

    #[instrument(skip(self, allowed), fields(location = %location))]
    pub async fn reconcile(
        &self,
        location: &GroupLocation,
        base_reference: &str,
        allowed: &[String],
    ) -> Result<ReconcileOutcome, CwaError> {
        if !*self.authenticated.borrow() {
            debug!("Not authenticated, skipped");
            return Ok(ReconcileOutcome::Deferred);
        }
        if !self.status.is_idle() {
            debug!("Resources loading, deferred");
            return Ok(ReconcileOutcome::Deferred);
        }
        let Some(location_resource) = self.store.get_resource(&location.iri).await? else {
            debug!("Location not loaded, deferred");
            return Ok(ReconcileOutcome::Deferred);
        };

        let reference = group_reference(base_reference, &location_resource, &location.iri);
        let desired = allowed_value(allowed);

        let existing = self
            .store
            .current_resources(COMPONENT_GROUP)
            .await?
            .into_iter()
            .find(|group| group.str_field("reference") == Some(reference.as_str()));

        match existing {
            Some(group) => {
                let iri = group.iri().unwrap_or_default().to_string();
                let current = group.get("allowedComponents").cloned().unwrap_or(Value::Null);
                if current == desired {
                    return Ok(ReconcileOutcome::Unchanged(iri));
                }
                self.writer
                    .update_resource(&iri, json!({ "allowedComponents": desired }))
                    .await?;
                info!(%iri, %reference, "Allowed components updated");
                Ok(ReconcileOutcome::Patched(iri))
            }
            None => {
                let body = json!({
                    "reference": reference,
                    "location": location.iri,
                    location.kind.group_field(): [location.iri],
                    "allowedComponents": desired,
                });
                let created = self
                    .writer
                    .create_resource(COMPONENT_GROUPS_ENDPOINT, body)
                    .await?;
                let iri = created.iri().unwrap_or_default().to_string();
                self.link_to_location(location_resource, &iri).await?;
                info!(%iri, %reference, "Component group created");
                Ok(ReconcileOutcome::Created(iri))
            }
        }
    }

    /// The server does not push the location, so its group list is patched locally.
    async fn link_to_location(&self, mut location: Resource, group_iri: &str) -> Result<(), CwaError> {
        let mut groups = location.iri_list("componentGroups");
        if groups.iter().any(|iri| iri == group_iri) {
            return Ok(());
        }
        groups.push(group_iri.to_string());
        location.insert("componentGroups", json!(groups));
        self.store
            .set_resource(location, SetResourceOptions::current())
            .await?;
        Ok(())
    }

    /// Reconciles whenever a load completes or the session becomes authenticated,
    /// until `cancel` fires. The task holds a store client, so it must be cancelled
    /// before the system shuts down.
    pub fn watch(
        self,
        location: GroupLocation,
        base_reference: String,
        allowed: Vec<String>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut status = self.status.subscribe();
            let mut authenticated = self.authenticated.clone();
            loop {
                match self.reconcile(&location, &base_reference, &allowed).await {
                    Ok(outcome) => debug!(?outcome, "Reconciled"),
                    Err(e) if e.is_cancel() => {}
                    Err(e) => warn!(%location, error = %e, "Reconcile failed"),
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    // the next load cycle that ends
                    finished = async {
                        status.changed().await?;
                        status.wait_for(StatusState::is_idle).await.map(|_| ())
                    } => {
                        if finished.is_err() {
                            break;
                        }
                    }
                    changed = authenticated.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(%location, "Reconcile watch stopped");
        })
    }
}
