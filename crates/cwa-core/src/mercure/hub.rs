//! Hub connection bookkeeping: state, desired topic URL and resume token.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HubState::Disconnected => "disconnected",
            HubState::Connecting => "connecting",
            HubState::Connected => "connected",
            HubState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Builds the subscription URL: one `topic` per tracked IRI, absolute against the
/// API, plus the position-creation wildcard. Topics are sorted so the same set
/// always yields the same URL.
pub fn topic_url(
    hub: &str,
    api_url: &str,
    iris: &[String],
    position_topic: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(hub)?;
    let base = api_url.trim_end_matches('/');
    let topics: BTreeSet<String> = iris
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(position_topic))
        .map(|iri| format!("{base}{iri}"))
        .collect();

    url.query_pairs_mut()
        .extend_pairs(topics.iter().map(|topic| ("topic", topic.as_str())));
    Ok(url.into())
}

/// What the synchronizer knows about its single connection to the hub.
///
/// The URL and last event id outlive individual streams so a reconnect resumes
/// where the previous stream stopped.
#[derive(Debug, Clone)]
pub struct HubConnection {
    state: HubState,
    url: Option<String>,
    last_event_id: Option<String>,
}

impl Default for HubConnection {
    fn default() -> Self {
        Self {
            state: HubState::Disconnected,
            url: None,
            last_event_id: None,
        }
    }
}

impl HubConnection {
    pub fn state(&self) -> HubState {
        self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn record_event_id(&mut self, id: Option<&str>) {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            self.last_event_id = Some(id.to_string());
        }
    }

    /// A connection is needed when none is open or the desired URL has changed.
    pub fn needs_connection(&self, desired: &str) -> bool {
        self.state != HubState::Connected || self.url.as_deref() != Some(desired)
    }

    /// Moves to `Connecting` (first connection) or `Reconnecting` (replacing or
    /// resuming one) for `url`.
    pub fn begin(&mut self, url: &str) -> HubState {
        let next = match (self.state, &self.url) {
            (HubState::Disconnected, None) => HubState::Connecting,
            _ => HubState::Reconnecting,
        };
        self.url = Some(url.to_string());
        self.transition(next)
    }

    pub fn opened(&mut self) -> HubState {
        self.transition(HubState::Connected)
    }

    /// The stream ended or could not be opened; the URL is kept for the retry.
    pub fn lost(&mut self) -> HubState {
        self.transition(HubState::Reconnecting)
    }

    pub fn close(&mut self) -> HubState {
        self.transition(HubState::Disconnected)
    }

    fn transition(&mut self, next: HubState) -> HubState {
        if self.state != next {
            info!(from = %self.state, to = %next, url = ?self.url, "Hub connection");
            self.state = next;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_are_absolute_sorted_and_include_the_wildcard() {
        let url = topic_url(
            "https://hub.example.com/.well-known/mercure",
            "https://api.example.com/",
            &["/_/pages/1".to_string(), "/_/layouts/1".to_string()],
            "/_/component_positions/{id}",
        )
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let topics: Vec<String> = parsed
            .query_pairs()
            .filter(|(k, _)| k == "topic")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(
            topics,
            vec![
                "https://api.example.com/_/component_positions/{id}",
                "https://api.example.com/_/layouts/1",
                "https://api.example.com/_/pages/1",
            ]
        );
    }

    #[test]
    fn test_same_topic_set_gives_same_url() {
        let a = topic_url("https://hub.test/", "https://api.test", &["/a".into(), "/b".into()], "/p")
            .unwrap();
        let b = topic_url("https://hub.test/", "https://api.test", &["/b".into(), "/a".into()], "/p")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_state_machine() {
        let mut connection = HubConnection::default();
        assert!(connection.needs_connection("https://hub.test/?topic=a"));

        assert_eq!(connection.begin("https://hub.test/?topic=a"), HubState::Connecting);
        assert_eq!(connection.opened(), HubState::Connected);
        assert!(!connection.needs_connection("https://hub.test/?topic=a"));

        // topic set grew
        assert!(connection.needs_connection("https://hub.test/?topic=a&topic=b"));
        assert_eq!(connection.begin("https://hub.test/?topic=a&topic=b"), HubState::Reconnecting);
        assert_eq!(connection.opened(), HubState::Connected);

        connection.record_event_id(Some("urn:uuid:1"));
        connection.record_event_id(None);
        assert_eq!(connection.close(), HubState::Disconnected);
        assert_eq!(connection.last_event_id(), Some("urn:uuid:1"));
    }
}
