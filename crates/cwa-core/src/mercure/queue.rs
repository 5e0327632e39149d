//! Pending hub messages, coalesced per IRI.

use crate::http::SseEvent;
use crate::resource::Resource;
use std::collections::VecDeque;

/// A decoded hub message.
#[derive(Debug, Clone, PartialEq)]
pub struct HubUpdate {
    pub iri: String,
    pub resource: Resource,
    pub event_id: Option<String>,
}

impl HubUpdate {
    /// Decodes the event's data as a JSON-LD object carrying an `@id`.
    pub fn from_event(event: &SseEvent) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(&event.data).map_err(|e| format!("invalid JSON: {e}"))?;
        let resource = Resource::from_value(value).map_err(|e| e.to_string())?;
        let iri = resource
            .iri()
            .ok_or_else(|| "message has no @id".to_string())?
            .to_string();
        Ok(Self {
            iri,
            resource,
            event_id: event.id.clone(),
        })
    }

    pub fn is_deletion(&self) -> bool {
        self.resource.is_deletion_signal()
    }
}

/// FIFO of updates with at most one entry per IRI.
///
/// A newer update for a queued IRI drops the older one and takes the back of the
/// queue, so the newest state is applied after everything that arrived before it.
#[derive(Debug, Default)]
pub struct MessageQueue {
    items: VecDeque<HubUpdate>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an older update for the same IRI was replaced.
    pub fn enqueue(&mut self, update: HubUpdate) -> bool {
        let replaced = match self.items.iter().position(|queued| queued.iri == update.iri) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        };
        self.items.push_back(update);
        replaced
    }

    pub fn pop(&mut self) -> Option<HubUpdate> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iris(&self) -> Vec<&str> {
        self.items.iter().map(|u| u.iri.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(iri: &str, title: &str) -> HubUpdate {
        HubUpdate::from_event(&SseEvent::message(
            json!({ "@id": iri, "title": title }).to_string(),
        ))
        .unwrap()
    }

    #[test]
    fn test_newer_message_replaces_queued_one() {
        let mut queue = MessageQueue::new();
        assert!(!queue.enqueue(update("/a", "1")));
        assert!(!queue.enqueue(update("/b", "1")));
        assert!(queue.enqueue(update("/a", "2")));

        assert_eq!(queue.iris(), vec!["/b", "/a"]);
        assert_eq!(queue.pop().unwrap().iri, "/b");
        assert_eq!(queue.pop().unwrap().resource.str_field("title"), Some("2"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_malformed_messages_are_rejected() {
        assert!(HubUpdate::from_event(&SseEvent::message("not json")).is_err());
        assert!(HubUpdate::from_event(&SseEvent::message(r#"{"title":"x"}"#)).is_err());
        assert!(HubUpdate::from_event(&SseEvent::message("[1,2]")).is_err());
    }

    #[test]
    fn test_single_key_payload_is_a_deletion() {
        let event = SseEvent::message(r#"{"@id":"/component/html_contents/1"}"#).with_id("e1");
        let update = HubUpdate::from_event(&event).unwrap();
        assert!(update.is_deletion());
        assert_eq!(update.event_id.as_deref(), Some("e1"));
    }
}
