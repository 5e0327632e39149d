//! # Normalized Resource State
//!
//! `ResourceState` is the synchronous heart of the resource store. The
//! [`StoreActor`](crate::store::StoreActor) owns exactly one instance and applies
//! every request to it in order, so nothing here needs a lock.
//!
//! ## Partitions
//!
//! - **current**: per type, `by_id`, `all_ids` (every IRI ever seen) and
//!   `current_ids` (IRIs relevant to the loaded route). `current_ids` is always a
//!   subset of `all_ids`.
//! - **new**: same shape, staging for live updates that are not yet known to be
//!   safe. [`ResourceState::merge_new_resources`] moves them into `current`.
//! - **type registry**: per [`Category`], IRI prefix to type name. A prefix is
//!   never reassigned once recorded.
//! - **draft mapping**: published IRI to draft IRI, looked up in both directions.
//! - **map to published**: IRIs for which the published variant is forced on display.
//!
//! ## Diff-before-write
//!
//! A write with `is_new` and without `force` is rejected unless the IRI is already
//! in `current` and the incoming payload differs after stripping the configured
//! [`DiffExclusions`]. This stops live-update echo storms after local edits.

use super::diff::DiffExclusions;
use super::iri::{iri_prefix, validate_iri, Category};
use super::model::{Resource, COMPONENT_POSITION};
use crate::error::StoreError;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// One type's slice of a partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypePartition {
    by_id: HashMap<String, Resource>,
    all_ids: Vec<String>,
    current_ids: Vec<String>,
}

impl TypePartition {
    pub fn get(&self, iri: &str) -> Option<&Resource> {
        self.by_id.get(iri)
    }

    pub fn all_ids(&self) -> &[String] {
        &self.all_ids
    }

    pub fn current_ids(&self) -> &[String] {
        &self.current_ids
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn put(&mut self, iri: &str, resource: Resource) -> bool {
        self.by_id.insert(iri.to_string(), resource);
        if !self.all_ids.iter().any(|id| id == iri) {
            self.all_ids.push(iri.to_string());
        }
        if self.current_ids.iter().any(|id| id == iri) {
            false
        } else {
            self.current_ids.push(iri.to_string());
            true
        }
    }

    fn remove(&mut self, iri: &str) -> bool {
        let existed = self.by_id.remove(iri).is_some();
        self.all_ids.retain(|id| id != iri);
        self.current_ids.retain(|id| id != iri);
        existed
    }
}

/// Options for [`ResourceState::set_resource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetResourceOptions {
    /// Write into the `new` staging partition instead of `current`.
    pub is_new: bool,
    /// Category override; derived from the IRI when absent.
    pub category: Option<Category>,
    /// Skip the diff-before-write rule.
    pub force: bool,
}

impl SetResourceOptions {
    pub fn current() -> Self {
        Self::default()
    }

    pub fn live_update() -> Self {
        Self {
            is_new: true,
            ..Self::default()
        }
    }

    pub fn forced_live_update() -> Self {
        Self {
            is_new: true,
            force: true,
            ..Self::default()
        }
    }
}

/// What a `set_resource` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Written to `current`, and the IRI was not in `current_ids` before.
    Inserted,
    /// Written to `current` over an IRI already in `current_ids`.
    Updated,
    /// Written to the `new` partition.
    Staged,
    /// Not written: a live update for an untracked or unchanged resource.
    Rejected,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceState {
    current: BTreeMap<String, TypePartition>,
    new: BTreeMap<String, TypePartition>,
    types: HashMap<Category, HashMap<String, String>>,
    draft_mapping: HashMap<String, String>,
    map_to_published: HashSet<String>,
    exclusions: DiffExclusions,
}

impl ResourceState {
    pub fn new(exclusions: DiffExclusions) -> Self {
        Self {
            exclusions,
            ..Self::default()
        }
    }

    // --- Writes ---

    pub fn set_resource(
        &mut self,
        resource: Resource,
        options: SetResourceOptions,
    ) -> Result<SetOutcome, StoreError> {
        let iri = resource.iri().ok_or(StoreError::MissingIri)?.to_string();
        validate_iri(&iri)?;
        let category = options.category.unwrap_or_else(|| Category::from_iri(&iri));

        let type_name = match resource.type_name() {
            Some(type_name) => self.register_type(category, &iri, type_name)?,
            None => self
                .get_type_from_iri(&iri, Some(category))
                .map(str::to_string)
                .ok_or_else(|| StoreError::UnknownType(iri.clone()))?,
        };

        if resource.is_collection() {
            for member in resource.collection_members() {
                self.set_collection_member(member, options)?;
            }
        }

        if options.is_new && !options.force {
            let Some(existing) = self.current.get(&type_name).and_then(|p| p.get(&iri)) else {
                debug!(%iri, "Live update for an untracked resource rejected");
                return Ok(SetOutcome::Rejected);
            };
            if !self.exclusions.differs(existing, &resource) {
                debug!(%iri, "Live update without changes rejected");
                return Ok(SetOutcome::Rejected);
            }
        }

        self.record_draft_links(&iri, &resource);

        let partition = if options.is_new {
            self.new.entry(type_name).or_default()
        } else {
            self.current.entry(type_name).or_default()
        };
        let newly_current = partition.put(&iri, resource);

        Ok(match (options.is_new, newly_current) {
            (true, _) => SetOutcome::Staged,
            (false, true) => SetOutcome::Inserted,
            (false, false) => SetOutcome::Updated,
        })
    }

    /// Embedded collection members are merged into any known copy; the embedded
    /// keys win, keys only present on the stored copy survive.
    fn set_collection_member(
        &mut self,
        member: Resource,
        options: SetResourceOptions,
    ) -> Result<SetOutcome, StoreError> {
        let Some(member_iri) = member.iri().map(str::to_string) else {
            return Err(StoreError::MissingIri);
        };
        let merged = match self.get_resource(&member_iri) {
            Ok(Some(known)) => {
                let mut merged = known.clone();
                merged.merge_from(&member);
                merged
            }
            _ => member,
        };
        self.set_resource(
            merged,
            SetResourceOptions {
                category: None,
                ..options
            },
        )
    }

    /// Returns the type the prefix is registered under, which is the partition key
    /// for the write.
    fn register_type(
        &mut self,
        category: Category,
        iri: &str,
        type_name: &str,
    ) -> Result<String, StoreError> {
        let prefix = iri_prefix(iri)?;
        let registry = self.types.entry(category).or_default();
        match registry.get(&prefix) {
            Some(known) => {
                if known != type_name {
                    warn!(%prefix, %known, incoming = %type_name, "Type already registered for prefix, keeping the original");
                }
                Ok(known.clone())
            }
            None => {
                debug!(%category, %prefix, %type_name, "Type registered");
                registry.insert(prefix, type_name.to_string());
                Ok(type_name.to_string())
            }
        }
    }

    fn record_draft_links(&mut self, iri: &str, resource: &Resource) {
        match resource.published() {
            Some(false) => {
                if let Some(published) = resource.link("publishedResource") {
                    self.draft_mapping.insert(published, iri.to_string());
                }
            }
            Some(true) => {
                if let Some(draft) = resource.link("draftResource") {
                    self.draft_mapping.insert(iri.to_string(), draft);
                }
            }
            None => {}
        }
    }

    /// Removes an IRI from both partitions and returns every IRI removed.
    ///
    /// Deleting a Component cascades to the ComponentPositions that place it.
    /// This assumes positions are never referenced independently; a server-driven
    /// cascade would make it unnecessary.
    pub fn delete_resource(&mut self, iri: &str) -> Result<Vec<String>, StoreError> {
        validate_iri(iri)?;
        let mut removed = Vec::new();
        if self.remove_everywhere(iri) {
            removed.push(iri.to_string());
        }

        if Category::from_iri(iri) == Category::Component {
            let orphaned: Vec<String> = [&self.current, &self.new]
                .into_iter()
                .filter_map(|partitions| partitions.get(COMPONENT_POSITION))
                .flat_map(|positions| positions.by_id.values())
                .filter(|position| position.link("component").as_deref() == Some(iri))
                .filter_map(|position| position.iri().map(str::to_string))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();

            for position in orphaned {
                if self.remove_everywhere(&position) {
                    debug!(%iri, %position, "Cascade-deleted component position");
                    removed.push(position);
                }
            }
        }

        self.draft_mapping
            .retain(|published, draft| !removed.contains(published) && !removed.contains(draft));
        self.map_to_published.retain(|forced| !removed.contains(forced));
        Ok(removed)
    }

    fn remove_everywhere(&mut self, iri: &str) -> bool {
        let mut existed = false;
        for partitions in [&mut self.current, &mut self.new] {
            for partition in partitions.values_mut() {
                existed |= partition.remove(iri);
            }
        }
        existed
    }

    /// Starts a new route cycle: `new` is dropped and every `current_ids` emptied.
    /// `by_id` and `all_ids` are kept as a cache.
    pub fn reset_current_resources(&mut self) {
        self.new.clear();
        for partition in self.current.values_mut() {
            partition.current_ids.clear();
        }
    }

    /// Moves every staged resource into `current`. Returns the merged IRIs.
    pub fn merge_new_resources(&mut self) -> Vec<String> {
        let mut merged = Vec::new();
        for (type_name, mut staged) in std::mem::take(&mut self.new) {
            let target = self.current.entry(type_name).or_default();
            for iri in staged.all_ids.drain(..) {
                if let Some(resource) = staged.by_id.remove(&iri) {
                    target.put(&iri, resource);
                    merged.push(iri);
                }
            }
        }
        merged
    }

    pub fn toggle_publishable(&mut self, iri: &str, show_published: bool) {
        if show_published {
            self.map_to_published.insert(iri.to_string());
        } else {
            self.map_to_published.remove(iri);
        }
    }

    // --- Reads ---

    pub fn get_resource(&self, iri: &str) -> Result<Option<&Resource>, StoreError> {
        iri_prefix(iri)?;
        let Some(type_name) = self.get_type_from_iri(iri, None) else {
            return Ok(None);
        };
        Ok(self.current.get(type_name).and_then(|p| p.get(iri)))
    }

    /// Like [`get_resource`](Self::get_resource), but a copy staged in `new` wins
    /// over the current one.
    pub fn get_latest_resource(&self, iri: &str) -> Result<Option<&Resource>, StoreError> {
        iri_prefix(iri)?;
        let Some(type_name) = self.get_type_from_iri(iri, None) else {
            return Ok(None);
        };
        let staged = self.new.get(type_name).and_then(|p| p.get(iri));
        Ok(staged.or_else(|| self.current.get(type_name).and_then(|p| p.get(iri))))
    }

    pub fn get_category_from_iri(iri: &str) -> Category {
        Category::from_iri(iri)
    }

    /// Registry lookup; unknown or malformed IRIs resolve to `None`.
    pub fn get_type_from_iri(&self, iri: &str, category: Option<Category>) -> Option<&str> {
        let prefix = iri_prefix(iri).ok()?;
        let category = category.unwrap_or_else(|| Category::from_iri(iri));
        self.types
            .get(&category)
            .and_then(|registry| registry.get(&prefix))
            .map(String::as_str)
    }

    /// The draft counterpart of a published IRI, `None` if `iri` is itself a draft.
    pub fn find_draft_iri(&self, iri: &str) -> Option<String> {
        if self.is_known_draft(iri) {
            return None;
        }
        self.draft_mapping.get(iri).cloned()
    }

    /// The published counterpart of a draft IRI, found by reverse scan.
    pub fn find_published_iri(&self, iri: &str) -> Option<String> {
        if self.draft_mapping.contains_key(iri) {
            return None;
        }
        self.draft_mapping
            .iter()
            .find(|(_, draft)| draft.as_str() == iri)
            .map(|(published, _)| published.clone())
    }

    fn is_known_draft(&self, iri: &str) -> bool {
        matches!(self.get_resource(iri), Ok(Some(resource)) if resource.is_draft())
    }

    /// The IRI the rendering layer should display for `iri`.
    pub fn display_iri(&self, iri: &str) -> String {
        if self.map_to_published.contains(iri) {
            return iri.to_string();
        }
        self.find_draft_iri(iri).unwrap_or_else(|| iri.to_string())
    }

    pub fn is_mapped_to_published(&self, iri: &str) -> bool {
        self.map_to_published.contains(iri)
    }

    pub fn current_partition(&self, type_name: &str) -> Option<&TypePartition> {
        self.current.get(type_name)
    }

    pub fn new_partition(&self, type_name: &str) -> Option<&TypePartition> {
        self.new.get(type_name)
    }

    pub fn current_ids(&self, type_name: &str) -> Vec<String> {
        self.current
            .get(type_name)
            .map(|p| p.current_ids.clone())
            .unwrap_or_default()
    }

    pub fn all_ids(&self, type_name: &str) -> Vec<String> {
        self.current
            .get(type_name)
            .map(|p| p.all_ids.clone())
            .unwrap_or_default()
    }

    /// Every tracked IRI across all current types, ordered by type then arrival.
    pub fn current_iris(&self) -> Vec<String> {
        self.current
            .values()
            .flat_map(|p| p.current_ids.iter().cloned())
            .collect()
    }

    /// Current resources of one type, in `current_ids` order.
    pub fn current_resources(&self, type_name: &str) -> Vec<Resource> {
        self.current
            .get(type_name)
            .map(|p| {
                p.current_ids
                    .iter()
                    .filter_map(|iri| p.by_id.get(iri).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn new_is_empty(&self) -> bool {
        self.new.values().all(TypePartition::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn resource(value: Value) -> Resource {
        Resource::from_value(value).unwrap()
    }

    fn html(id: &str, body: &str) -> Resource {
        resource(json!({ "@id": id, "@type": "HtmlContent", "html": body }))
    }

    fn state() -> ResourceState {
        ResourceState::new(DiffExclusions::default())
    }

    #[test]
    fn test_set_and_get_resource() {
        let mut state = state();
        let outcome = state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();

        assert_eq!(outcome, SetOutcome::Inserted);
        assert_eq!(
            state.get_resource("/component/html_contents/1").unwrap(),
            Some(&html("/component/html_contents/1", "a"))
        );
        assert_eq!(state.get_type_from_iri("/component/html_contents/99", None), Some("HtmlContent"));
        assert_eq!(state.current_ids("HtmlContent"), vec!["/component/html_contents/1"]);
    }

    #[test]
    fn test_get_resource_rejects_null_iri() {
        assert_eq!(state().get_resource(""), Err(StoreError::NullIri));
        assert_eq!(state().get_type_from_iri("", None), None);
    }

    #[test]
    fn test_unregistered_type_is_none() {
        let state = state();
        assert_eq!(state.get_type_from_iri("/component/unknown/1", None), None);
        assert_eq!(state.get_resource("/component/unknown/1").unwrap(), None);
    }

    #[test]
    fn test_identical_writes_are_idempotent() {
        let mut once = state();
        once.set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();

        let mut twice = state();
        twice
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();
        let second = twice
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();

        assert_eq!(second, SetOutcome::Updated);
        assert_eq!(once.current_partition("HtmlContent"), twice.current_partition("HtmlContent"));
    }

    #[test]
    fn test_type_registration_is_stable() {
        let mut state = state();
        state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();
        let outcome = state
            .set_resource(
                resource(json!({ "@id": "/component/html_contents/2", "@type": "Imposter" })),
                SetResourceOptions::current(),
            )
            .unwrap();

        assert_eq!(outcome, SetOutcome::Inserted);
        assert_eq!(state.get_type_from_iri("/component/html_contents/2", None), Some("HtmlContent"));
        // stored under the registered type, so it stays reachable
        let stored = state.get_resource("/component/html_contents/2").unwrap().unwrap();
        assert_eq!(stored.type_name(), Some("Imposter"));
        assert!(state.current_partition("Imposter").is_none());
        assert_eq!(
            state.current_ids("HtmlContent"),
            vec!["/component/html_contents/1".to_string(), "/component/html_contents/2".to_string()]
        );
    }

    #[test]
    fn test_latest_resource_prefers_staged_copy() {
        let mut state = state();
        state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();
        assert_eq!(
            state.get_latest_resource("/component/html_contents/1").unwrap().unwrap().str_field("html"),
            Some("a")
        );

        state
            .set_resource(html("/component/html_contents/1", "b"), SetResourceOptions::live_update())
            .unwrap();

        let latest = state.get_latest_resource("/component/html_contents/1").unwrap().unwrap();
        assert_eq!(latest.str_field("html"), Some("b"));
        let current = state.get_resource("/component/html_contents/1").unwrap().unwrap();
        assert_eq!(current.str_field("html"), Some("a"));
        assert_eq!(state.get_latest_resource("/component/html_contents/9").unwrap(), None);
    }

    #[test]
    fn test_live_update_for_untracked_resource_is_rejected() {
        let mut state = state();
        let outcome = state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::live_update())
            .unwrap();

        assert_eq!(outcome, SetOutcome::Rejected);
        assert!(state.new_is_empty());
    }

    #[test]
    fn test_live_update_echo_is_rejected_and_change_is_staged() {
        let mut state = state();
        state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();

        let mut echo = html("/component/html_contents/1", "a");
        echo.insert("modifiedAt", json!("2024-05-01T10:00:00+00:00"));
        assert_eq!(
            state.set_resource(echo, SetResourceOptions::live_update()).unwrap(),
            SetOutcome::Rejected
        );

        assert_eq!(
            state
                .set_resource(html("/component/html_contents/1", "b"), SetResourceOptions::live_update())
                .unwrap(),
            SetOutcome::Staged
        );
        assert!(state.new_partition("HtmlContent").is_some());
        // current is untouched until the merge
        assert_eq!(
            state.get_resource("/component/html_contents/1").unwrap().and_then(|r| r.str_field("html")),
            Some("a")
        );
    }

    #[test]
    fn test_merge_moves_staged_resources_atomically() {
        let mut state = state();
        state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();
        state
            .set_resource(html("/component/html_contents/1", "b"), SetResourceOptions::live_update())
            .unwrap();
        state
            .set_resource(html("/component/html_contents/2", "c"), SetResourceOptions::forced_live_update())
            .unwrap();

        let merged = state.merge_new_resources();

        assert_eq!(merged.len(), 2);
        assert!(state.new_is_empty());
        assert_eq!(
            state.get_resource("/component/html_contents/1").unwrap().and_then(|r| r.str_field("html")),
            Some("b")
        );
        assert_eq!(
            state.current_ids("HtmlContent"),
            vec!["/component/html_contents/1", "/component/html_contents/2"]
        );
    }

    #[test]
    fn test_reset_then_merge_of_empty_new_is_noop() {
        let mut state = state();
        state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();
        state.reset_current_resources();
        let before = state.current_partition("HtmlContent").cloned();

        assert!(state.merge_new_resources().is_empty());
        assert_eq!(state.current_partition("HtmlContent").cloned(), before);
    }

    #[test]
    fn test_reset_keeps_cache_but_clears_current_ids() {
        let mut state = state();
        state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();
        state
            .set_resource(html("/component/html_contents/1", "b"), SetResourceOptions::live_update())
            .unwrap();

        state.reset_current_resources();

        assert!(state.current_ids("HtmlContent").is_empty());
        assert_eq!(state.all_ids("HtmlContent"), vec!["/component/html_contents/1"]);
        assert!(state.new_is_empty());
        assert!(state.get_resource("/component/html_contents/1").unwrap().is_some());
    }

    #[test]
    fn test_delete_component_cascades_to_positions() {
        let mut state = state();
        state
            .set_resource(html("/component/html_contents/1", "a"), SetResourceOptions::current())
            .unwrap();
        for position in ["/_/component_positions/1", "/_/component_positions/2"] {
            state
                .set_resource(
                    resource(json!({
                        "@id": position,
                        "@type": "ComponentPosition",
                        "component": "/component/html_contents/1"
                    })),
                    SetResourceOptions::current(),
                )
                .unwrap();
        }

        let mut removed = state.delete_resource("/component/html_contents/1").unwrap();
        removed.sort();

        assert_eq!(
            removed,
            vec![
                "/_/component_positions/1",
                "/_/component_positions/2",
                "/component/html_contents/1"
            ]
        );
        assert!(state.all_ids("ComponentPosition").is_empty());
        assert!(state.current_ids("ComponentPosition").is_empty());
        assert!(state.all_ids("HtmlContent").is_empty());
    }

    #[test]
    fn test_collection_members_merge_with_known_instances() {
        let mut state = state();
        state
            .set_resource(
                resource(json!({
                    "@id": "/page_data/articles/1",
                    "@type": "Article",
                    "title": "old",
                    "body": "kept"
                })),
                SetResourceOptions::current(),
            )
            .unwrap();

        state
            .set_resource(
                resource(json!({
                    "@id": "/component/collections/1",
                    "@type": "Collection",
                    "_metadata": { "collection": true },
                    "collection": { "hydra:member": [
                        { "@id": "/page_data/articles/1", "@type": "Article", "title": "new" }
                    ]}
                })),
                SetResourceOptions::current(),
            )
            .unwrap();

        let article = state.get_resource("/page_data/articles/1").unwrap().unwrap();
        assert_eq!(article.str_field("title"), Some("new"));
        assert_eq!(article.str_field("body"), Some("kept"));
    }

    #[test]
    fn test_draft_mapping_is_symmetric() {
        let mut state = state();
        state
            .set_resource(
                resource(json!({
                    "@id": "/component/html_contents/1",
                    "@type": "HtmlContent",
                    "_metadata": { "published": true }
                })),
                SetResourceOptions::current(),
            )
            .unwrap();
        state
            .set_resource(
                resource(json!({
                    "@id": "/component/html_contents/2",
                    "@type": "HtmlContent",
                    "publishedResource": "/component/html_contents/1",
                    "_metadata": { "published": false }
                })),
                SetResourceOptions::current(),
            )
            .unwrap();

        assert_eq!(
            state.find_draft_iri("/component/html_contents/1").as_deref(),
            Some("/component/html_contents/2")
        );
        assert_eq!(
            state.find_published_iri("/component/html_contents/2").as_deref(),
            Some("/component/html_contents/1")
        );
        // already in the requested state
        assert_eq!(state.find_draft_iri("/component/html_contents/2"), None);
        assert_eq!(state.find_published_iri("/component/html_contents/1"), None);
    }

    #[test]
    fn test_toggle_publishable_controls_display_iri() {
        let mut state = state();
        state
            .set_resource(
                resource(json!({
                    "@id": "/component/html_contents/2",
                    "@type": "HtmlContent",
                    "publishedResource": "/component/html_contents/1",
                    "_metadata": { "published": false }
                })),
                SetResourceOptions::current(),
            )
            .unwrap();

        assert_eq!(state.display_iri("/component/html_contents/1"), "/component/html_contents/2");
        state.toggle_publishable("/component/html_contents/1", true);
        assert_eq!(state.display_iri("/component/html_contents/1"), "/component/html_contents/1");
        state.toggle_publishable("/component/html_contents/1", false);
        assert!(!state.is_mapped_to_published("/component/html_contents/1"));
    }
}
