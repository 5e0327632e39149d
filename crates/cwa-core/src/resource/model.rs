//! The hypermedia resource wrapper and the well-known resource types.

use super::iri::Category;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display};

pub const ROUTE: &str = "Route";
pub const PAGE: &str = "Page";
pub const LAYOUT: &str = "Layout";
pub const COMPONENT_GROUP: &str = "ComponentGroup";
pub const COMPONENT_POSITION: &str = "ComponentPosition";

/// A JSON-LD object identified by `@id` and typed by `@type`.
///
/// The wrapper keeps the payload as an ordered JSON map so that resources survive
/// a round trip through the store untouched; accessors only read the keys the
/// core needs for graph traversal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Map<String, Value>);

impl Resource {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wraps a JSON value; anything but an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(StoreError::MissingIri),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Overlays `other` on top of `self`; keys present in `other` win.
    pub fn merge_from(&mut self, other: &Resource) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn iri(&self) -> Option<&str> {
        self.str_field("@id")
    }

    pub fn type_name(&self) -> Option<&str> {
        self.str_field("@type")
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("_metadata").and_then(Value::as_object)
    }

    /// `_metadata.published`, present on publishable resources only.
    pub fn published(&self) -> Option<bool> {
        self.metadata()
            .and_then(|m| m.get("published"))
            .and_then(Value::as_bool)
    }

    pub fn is_draft(&self) -> bool {
        self.published() == Some(false)
    }

    pub fn is_collection(&self) -> bool {
        self.metadata()
            .and_then(|m| m.get("collection"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Members embedded inline by a collection payload.
    ///
    /// Collection components nest a Hydra collection under `collection`; plain
    /// Hydra collections carry `hydra:member` at the top level.
    pub fn collection_members(&self) -> Vec<Resource> {
        let members = self
            .0
            .get("collection")
            .and_then(|c| c.get("hydra:member"))
            .or_else(|| self.0.get("hydra:member"));

        members
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object().cloned().map(Resource))
                    .filter(|member| member.iri().is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// IRIs listed under `key`; embedded objects contribute their `@id`.
    pub fn iri_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(link_iri).collect())
            .unwrap_or_default()
    }

    /// A single linked IRI under `key`, whether a plain string or an embedded object.
    pub fn link(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(link_iri)
    }

    /// A payload holding nothing but its `@id` is a deletion signal from the hub.
    pub fn is_deletion_signal(&self) -> bool {
        self.0.len() == 1 && self.iri().is_some()
    }
}

fn link_iri(value: &Value) -> Option<String> {
    match value {
        Value::String(iri) => Some(iri.clone()),
        Value::Object(map) => map.get("@id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        resource.into_value()
    }
}

/// Typed view of a resource's `@type`, used by the component registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Route,
    Page,
    Layout,
    ComponentGroup,
    ComponentPosition,
    Component(String),
    PageData(String),
    Other(String),
}

impl ResourceType {
    pub fn resolve(type_name: &str, category: Category) -> Self {
        match type_name {
            ROUTE => ResourceType::Route,
            PAGE => ResourceType::Page,
            LAYOUT => ResourceType::Layout,
            COMPONENT_GROUP => ResourceType::ComponentGroup,
            COMPONENT_POSITION => ResourceType::ComponentPosition,
            other => match category {
                Category::Component => ResourceType::Component(other.to_string()),
                Category::PageData => ResourceType::PageData(other.to_string()),
                Category::Default => ResourceType::Other(other.to_string()),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceType::Route => ROUTE,
            ResourceType::Page => PAGE,
            ResourceType::Layout => LAYOUT,
            ResourceType::ComponentGroup => COMPONENT_GROUP,
            ResourceType::ComponentPosition => COMPONENT_POSITION,
            ResourceType::Component(name)
            | ResourceType::PageData(name)
            | ResourceType::Other(name) => name,
        }
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(value: Value) -> Resource {
        Resource::from_value(value).unwrap()
    }

    #[test]
    fn test_links_accept_strings_and_embedded_objects() {
        let group = resource(json!({
            "@id": "/_/component_groups/1",
            "componentPositions": ["/_/component_positions/1", { "@id": "/_/component_positions/2" }],
            "location": { "@id": "/_/pages/1" }
        }));

        assert_eq!(
            group.iri_list("componentPositions"),
            vec!["/_/component_positions/1", "/_/component_positions/2"]
        );
        assert_eq!(group.link("location").as_deref(), Some("/_/pages/1"));
    }

    #[test]
    fn test_collection_members_read_nested_hydra_collection() {
        let collection = resource(json!({
            "@id": "/component/collections/1",
            "@type": "Collection",
            "_metadata": { "collection": true },
            "collection": {
                "hydra:member": [
                    { "@id": "/page_data/articles/1", "@type": "Article" },
                    { "title": "no id, skipped" }
                ]
            }
        }));

        assert!(collection.is_collection());
        let members = collection.collection_members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].iri(), Some("/page_data/articles/1"));
    }

    #[test]
    fn test_deletion_signal_is_a_lone_id() {
        assert!(resource(json!({ "@id": "/component/html_contents/1" })).is_deletion_signal());
        assert!(!resource(json!({ "@id": "/component/html_contents/1", "html": "" })).is_deletion_signal());
    }

    #[test]
    fn test_resource_type_resolution_uses_category() {
        assert_eq!(ResourceType::resolve("Page", Category::Default), ResourceType::Page);
        assert_eq!(
            ResourceType::resolve("HtmlContent", Category::Component),
            ResourceType::Component("HtmlContent".into())
        );
    }
}
