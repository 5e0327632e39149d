//! Structural comparison used by the diff-before-write rule.
//!
//! A pushed update that only differs from the stored copy in volatile fields is an
//! echo of a change this client already holds, and must not be written.

use super::model::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const DEFAULT_EXCLUSIONS: &[&str] = &[
    "_metadata",
    "sortCollection",
    "publishedResource",
    "draftResource",
    "publishedAt",
    "createdAt",
    "modifiedAt",
    "dateCreated",
    "dateModified",
];

/// Top-level keys ignored when comparing two copies of a resource.
///
/// Null-valued keys are always ignored on top of this set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffExclusions(BTreeSet<String>);

impl Default for DiffExclusions {
    fn default() -> Self {
        Self::from_keys(DEFAULT_EXCLUSIONS.iter().copied())
    }
}

impl DiffExclusions {
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// The comparable part of a resource.
    pub fn strip(&self, resource: &Resource) -> Map<String, Value> {
        resource
            .as_map()
            .iter()
            .filter(|(key, value)| !value.is_null() && !self.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn differs(&self, stored: &Resource, incoming: &Resource) -> bool {
        self.strip(stored) != self.strip(incoming)
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
    fn test_volatile_fields_do_not_count_as_a_change() {
        let stored = resource(json!({
            "@id": "/component/html_contents/1",
            "html": "<p>hi</p>",
            "modifiedAt": "2024-01-01T00:00:00+00:00",
            "_metadata": { "published": true }
        }));
        let echo = resource(json!({
            "@id": "/component/html_contents/1",
            "html": "<p>hi</p>",
            "modifiedAt": "2024-01-02T00:00:00+00:00",
            "draftResource": null,
            "_metadata": { "published": true, "persisted": true }
        }));

        assert!(!DiffExclusions::default().differs(&stored, &echo));
    }

    #[test]
    fn test_real_change_is_detected() {
        let stored = resource(json!({ "@id": "/component/html_contents/1", "html": "a" }));
        let changed = resource(json!({ "@id": "/component/html_contents/1", "html": "b" }));
        assert!(DiffExclusions::default().differs(&stored, &changed));
    }

    #[test]
    fn test_exclusions_are_configurable() {
        let exclusions = DiffExclusions::from_keys(["html"]);
        let stored = resource(json!({ "@id": "/c/1", "html": "a", "modifiedAt": "x" }));
        let changed = resource(json!({ "@id": "/c/1", "html": "b", "modifiedAt": "y" }));
        assert!(exclusions.differs(&stored, &changed));

        let only_html = resource(json!({ "@id": "/c/1", "html": "c", "modifiedAt": "x" }));
        assert!(!exclusions.differs(&stored, &only_html));
    }
}
