//! Resource type to UI component dispatch.
//!
//! The rendering layer asks "what renders this resource?" through the [`Renders`]
//! capability. [`ComponentRegistry`] answers from a table registered at startup,
//! typically built from the API entrypoint, and falls back to any extra renderers
//! registered after it.

use crate::api_docs::ApiDocumentation;
use crate::resource::{Category, ResourceType};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiComponent {
    pub name: String,
    pub publishable: bool,
}

impl UiComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            publishable: false,
        }
    }

    pub fn publishable(mut self, publishable: bool) -> Self {
        self.publishable = publishable;
        self
    }
}

pub trait Renders: Send + Sync {
    fn renders(&self, resource_type: &ResourceType) -> Option<UiComponent>;
}

#[derive(Default)]
pub struct ComponentRegistry {
    table: HashMap<ResourceType, UiComponent>,
    fallbacks: Vec<Box<dyn Renders>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_type: ResourceType, component: UiComponent) -> &mut Self {
        self.table.insert(resource_type, component);
        self
    }

    pub fn register_renderer(&mut self, renderer: Box<dyn Renders>) -> &mut Self {
        self.fallbacks.push(renderer);
        self
    }

    /// One entry per entrypoint collection under `component_base_path`. The type
    /// name is the entrypoint key with its first letter upper-cased
    /// (`htmlContent` -> `HtmlContent`), the component name is `{prefix}{type}`.
    pub fn from_api_documentation(
        docs: &ApiDocumentation,
        component_base_path: &str,
        prefix: &str,
    ) -> Self {
        let mut registry = Self::new();
        for (key, endpoint) in docs.entrypoint_collections() {
            if !endpoint.starts_with(component_base_path) {
                continue;
            }
            let type_name = upper_first(&key);
            let component = UiComponent::new(format!("{prefix}{type_name}"))
                .publishable(docs.is_publishable(&type_name));
            debug!(%type_name, component = %component.name, "Component registered");
            registry.register(ResourceType::Component(type_name), component);
        }
        registry
    }

    pub fn resolve(&self, resource_type: &ResourceType) -> Option<UiComponent> {
        self.table.get(resource_type).cloned().or_else(|| {
            self.fallbacks
                .iter()
                .find_map(|renderer| renderer.renders(resource_type))
        })
    }

    pub fn resolve_name(&self, type_name: &str, category: Category) -> Option<UiComponent> {
        self.resolve(&ResourceType::resolve(type_name, category))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Renders for ComponentRegistry {
    fn renders(&self, resource_type: &ResourceType) -> Option<UiComponent> {
        self.resolve(resource_type)
    }
}

fn upper_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct GroupRenderer;

    impl Renders for GroupRenderer {
        fn renders(&self, resource_type: &ResourceType) -> Option<UiComponent> {
            (*resource_type == ResourceType::ComponentGroup).then(|| UiComponent::new("CwaGroup"))
        }
    }

    #[test]
    fn test_registry_built_from_entrypoint() {
        let docs = ApiDocumentation {
            entrypoint: json!({
                "@id": "/",
                "htmlContent": "/component/html_contents",
                "user": "/users"
            }),
            docs: json!({
                "hydra:supportedClass": [{
                    "hydra:title": "HtmlContent",
                    "hydra:supportedProperty": [
                        { "hydra:property": { "rdfs:label": "publishedAt" } }
                    ]
                }]
            }),
        };

        let registry = ComponentRegistry::from_api_documentation(&docs, "/component/", "CwaComponent");

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.resolve_name("HtmlContent", Category::Component),
            Some(UiComponent::new("CwaComponentHtmlContent").publishable(true))
        );
        assert_eq!(registry.resolve_name("User", Category::Default), None);
    }

    #[test]
    fn test_fallback_renderers_are_consulted() {
        let mut registry = ComponentRegistry::new();
        registry.register_renderer(Box::new(GroupRenderer));

        assert_eq!(
            registry.renders(&ResourceType::ComponentGroup).map(|c| c.name),
            Some("CwaGroup".to_string())
        );
    }
}
