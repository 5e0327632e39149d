//! # Event Bus
//!
//! Typed cross-cutting notifications for the editing layer: fetch status,
//! error notifications, highlights, redirects and live-update activity.
//!
//! Events travel over a `tokio::sync::broadcast` channel. Each subscriber sees
//! every event emitted after it subscribed, once. Emitting with no subscriber is
//! not an error.
//!
//! ## Field notifications
//!
//! Validation failures are scoped to a `(field, endpoint)` pair. The bus remembers
//! which pairs currently have notifications raised, so a clear is only emitted for
//! a pair that was set and every set is preceded by the clear of its previous
//! notifications. A subscriber can therefore keep an exact per-field view by
//! replaying the stream.

use crate::error::{ApiError, ErrorKind};
use crate::mercure::HubState;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub code: String,
    pub title: String,
    pub detail: Option<String>,
    pub endpoint: Option<String>,
    pub field: Option<String>,
}

impl Notification {
    pub fn new(level: NotificationLevel, code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            level,
            code: code.into(),
            title: title.into(),
            detail: None,
            endpoint: None,
            field: None,
        }
    }

    pub fn error(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, code, title)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// One notification per violation for validation failures, otherwise a single
    /// generic one. Cancellations produce none.
    pub fn from_api_error(error: &ApiError) -> Vec<Notification> {
        if error.is_cancel() {
            return Vec::new();
        }
        if error.is_validation() {
            return error
                .violations
                .iter()
                .map(|violation| {
                    Notification::error("input_validation", violation.message.clone())
                        .with_endpoint(error.endpoint.clone())
                        .with_field(violation.property_path.clone())
                })
                .collect();
        }
        let code = match error.status_code {
            Some(status) => format!("http_{status}"),
            None => "network".to_string(),
        };
        vec![Notification::error(code, "An error occurred")
            .with_detail(error.message.clone())
            .with_endpoint(error.endpoint.clone())]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CwaEvent {
    FetchStatus {
        fetching: usize,
        loading_route: Option<String>,
        loaded_route: Option<String>,
    },
    Notification(Notification),
    NotificationCleared {
        field: String,
        endpoint: String,
    },
    Highlight(String),
    /// A debounced field edit could not be saved; the input bound to it should
    /// revert to the stored value.
    FieldUpdateFailed {
        iri: String,
        field: String,
        kind: ErrorKind,
        message: String,
    },
    LiveUpdateApplied(String),
    ResourceDeleted(String),
    HubState(HubState),
    Redirect(String),
}

#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<CwaEvent>,
    active_fields: Arc<Mutex<HashSet<(String, String)>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            active_fields: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CwaEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: CwaEvent) {
        trace!(?event, "Emit");
        let _ = self.sender.send(event);
    }

    pub fn notify(&self, notification: Notification) {
        self.emit(CwaEvent::Notification(notification));
    }

    pub fn highlight(&self, iri: impl Into<String>) {
        self.emit(CwaEvent::Highlight(iri.into()));
    }

    /// Replaces the notifications raised for `(field, endpoint)`.
    pub fn set_field_notifications(
        &self,
        field: &str,
        endpoint: &str,
        notifications: Vec<Notification>,
    ) {
        self.clear_field(field, endpoint);
        if notifications.is_empty() {
            return;
        }
        self.active_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((field.to_string(), endpoint.to_string()));
        for notification in notifications {
            self.notify(notification);
        }
    }

    /// Emits `NotificationCleared` if, and only if, the pair had notifications.
    pub fn clear_field(&self, field: &str, endpoint: &str) -> bool {
        let was_active = self
            .active_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(field.to_string(), endpoint.to_string()));
        if was_active {
            debug!(%field, %endpoint, "Field notifications cleared");
            self.emit(CwaEvent::NotificationCleared {
                field: field.to_string(),
                endpoint: endpoint.to_string(),
            });
        }
        was_active
    }

    /// Raises the notifications for a failed request and returns them.
    pub fn raise_api_error(&self, error: &ApiError) -> Vec<Notification> {
        let notifications = Notification::from_api_error(error);
        let (scoped, general): (Vec<_>, Vec<_>) =
            notifications.iter().cloned().partition(|n| n.field.is_some());

        let mut fields: Vec<String> = scoped.iter().filter_map(|n| n.field.clone()).collect();
        fields.sort();
        fields.dedup();
        for field in fields {
            let for_field = scoped
                .iter()
                .filter(|n| n.field.as_deref() == Some(field.as_str()))
                .cloned()
                .collect();
            self.set_field_notifications(&field, &error.endpoint, for_field);
        }
        for notification in general {
            self.notify(notification);
        }
        notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn drain(receiver: &mut broadcast::Receiver<CwaEvent>) -> Vec<CwaEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_clear_is_paired_with_a_previous_set() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();

        assert!(!bus.clear_field("title", "/component/html_contents/1"));
        bus.set_field_notifications(
            "title",
            "/component/html_contents/1",
            vec![Notification::error("input_validation", "Too long")],
        );
        bus.set_field_notifications("title", "/component/html_contents/1", Vec::new());

        let events = drain(&mut receiver);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CwaEvent::Notification(_)));
        assert_eq!(
            events[1],
            CwaEvent::NotificationCleared {
                field: "title".into(),
                endpoint: "/component/html_contents/1".into()
            }
        );
    }

    #[test]
    fn test_validation_errors_become_field_notifications() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        let body = json!({ "violations": [
            { "propertyPath": "reference", "message": "Required" },
            { "propertyPath": "reference", "message": "Too short" }
        ]});
        let error = ApiError::from_response(422, "/_/component_groups", Some(&body));

        let raised = bus.raise_api_error(&error);

        assert_eq!(raised.len(), 2);
        assert!(raised.iter().all(|n| n.field.as_deref() == Some("reference")));
        assert_eq!(drain(&mut receiver).len(), 2);
    }

    #[test]
    fn test_cancel_raises_nothing() {
        let bus = EventBus::default();
        assert!(bus.raise_api_error(&ApiError::cancelled("/_/pages/1")).is_empty());
    }
}
