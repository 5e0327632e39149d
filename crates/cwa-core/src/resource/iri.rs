//! IRI shape rules: category derivation and type-registry keys.

use crate::error::StoreError;
use std::fmt::{self, Display};

/// Coarse partition of resources derived from the structural IRI prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Component,
    PageData,
    Default,
}

impl Category {
    /// `/component/...` is a Component, `/page_data/...` is PageData, anything else Default.
    pub fn from_iri(iri: &str) -> Self {
        if iri.starts_with("/component/") {
            Category::Component
        } else if iri.starts_with("/page_data/") {
            Category::PageData
        } else {
            Category::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Component => "Component",
            Category::PageData => "PageData",
            Category::Default => "Default",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejects null (empty) and relative IRIs.
pub fn validate_iri(iri: &str) -> Result<(), StoreError> {
    if iri.is_empty() {
        return Err(StoreError::NullIri);
    }
    if !iri.starts_with('/') {
        return Err(StoreError::MalformedIri(iri.to_string()));
    }
    Ok(())
}

/// The key under which an IRI's type is recorded in the registry.
///
/// Framework (`/_/`), component and page-data IRIs keep two segments
/// (`/component/html_contents/abc` -> `/component/html_contents`), every other
/// IRI keeps one (`/users/1` -> `/users`). The query string is ignored.
pub fn iri_prefix(iri: &str) -> Result<String, StoreError> {
    validate_iri(iri)?;
    let path = iri.split(['?', '#']).next().unwrap_or(iri);
    let mut segments = path.trim_start_matches('/').split('/');
    let first = segments.next().unwrap_or_default();
    if first.is_empty() {
        return Err(StoreError::MalformedIri(iri.to_string()));
    }

    match first {
        "_" | "component" | "page_data" => match segments.next() {
            Some(second) if !second.is_empty() => Ok(format!("/{first}/{second}")),
            _ => Err(StoreError::MalformedIri(iri.to_string())),
        },
        _ => Ok(format!("/{first}")),
    }
}

/// Strips the query string from an endpoint, leaving the resource IRI.
pub fn endpoint_iri(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

/// Last path segment, used to fill topic templates such as `/_/component_positions/{id}`.
pub fn iri_id(iri: &str) -> &str {
    endpoint_iri(iri).rsplit('/').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_iri() {
        assert_eq!(Category::from_iri("/component/html_contents/abc"), Category::Component);
        assert_eq!(Category::from_iri("/page_data/xyz"), Category::PageData);
        assert_eq!(Category::from_iri("/_/pages/1"), Category::Default);
        assert_eq!(Category::from_iri("/users/1"), Category::Default);
    }

    #[test]
    fn test_prefix_keeps_structural_segments() {
        assert_eq!(iri_prefix("/component/html_contents/abc").unwrap(), "/component/html_contents");
        assert_eq!(iri_prefix("/page_data/blog_articles/1").unwrap(), "/page_data/blog_articles");
        assert_eq!(iri_prefix("/_/routes//").unwrap(), "/_/routes");
        assert_eq!(iri_prefix("/_/pages/1?draft=true").unwrap(), "/_/pages");
        assert_eq!(iri_prefix("/users/1").unwrap(), "/users");
    }

    #[test]
    fn test_prefix_rejects_null_and_relative() {
        assert_eq!(iri_prefix(""), Err(StoreError::NullIri));
        assert!(matches!(iri_prefix("pages/1"), Err(StoreError::MalformedIri(_))));
        assert!(matches!(iri_prefix("/component"), Err(StoreError::MalformedIri(_))));
    }

    #[test]
    fn test_iri_id() {
        assert_eq!(iri_id("/_/component_positions/abc?x=1"), "abc");
    }
}
