#![allow(dead_code)]

use cwa_core::{CwaConfig, CwaEvent, CwaSystem, MockTransport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const ROUTE: &str = "/_/routes//";
pub const PAGE: &str = "/_/pages/1";
pub const LAYOUT: &str = "/_/layouts/1";
pub const PAGE_GROUP: &str = "/_/component_groups/page_1";
pub const LAYOUT_GROUP: &str = "/_/component_groups/layout_1";
pub const PAGE_POSITION: &str = "/_/component_positions/1";
pub const LAYOUT_POSITION: &str = "/_/component_positions/2";
pub const COMPONENT: &str = "/component/html_contents/1";
pub const HUB: &str = "https://hub.test/.well-known/mercure";

/// Route `/` -> page -> layout; page and layout each own one group with one
/// position, both positions placing the same component.
pub fn route_mock() -> MockTransport {
    let mock = MockTransport::new().with_links(Some("/docs.jsonld"), Some(HUB));
    mock.expect_get(ROUTE).return_json(json!({
        "@id": ROUTE, "@type": "Route", "path": "/", "page": PAGE
    }));
    mock.expect_get(PAGE).return_json(json!({
        "@id": PAGE, "@type": "Page", "reference": "home",
        "layout": LAYOUT, "componentGroups": [PAGE_GROUP]
    }));
    mock.expect_get(LAYOUT).return_json(json!({
        "@id": LAYOUT, "@type": "Layout", "reference": "primary",
        "componentGroups": [LAYOUT_GROUP]
    }));
    mock.expect_get(PAGE_GROUP).return_json(json!({
        "@id": PAGE_GROUP, "@type": "ComponentGroup", "reference": "page_1",
        "componentPositions": [PAGE_POSITION]
    }));
    mock.expect_get(LAYOUT_GROUP).return_json(json!({
        "@id": LAYOUT_GROUP, "@type": "ComponentGroup", "reference": "layout_1",
        "componentPositions": [LAYOUT_POSITION]
    }));
    mock.expect_get(PAGE_POSITION).return_json(json!({
        "@id": PAGE_POSITION, "@type": "ComponentPosition",
        "componentGroup": PAGE_GROUP, "component": COMPONENT
    }));
    mock.expect_get(LAYOUT_POSITION).return_json(json!({
        "@id": LAYOUT_POSITION, "@type": "ComponentPosition",
        "componentGroup": LAYOUT_GROUP, "component": COMPONENT
    }));
    mock.expect_get(COMPONENT).return_json(json!({
        "@id": COMPONENT, "@type": "HtmlContent", "html": "<p>Hello</p>"
    }));
    mock
}

pub fn system(mock: &MockTransport) -> CwaSystem {
    system_with_config(mock, CwaConfig::new("https://api.test"))
}

pub fn system_with_config(mock: &MockTransport, config: CwaConfig) -> CwaSystem {
    CwaSystem::new(&config, Arc::new(mock.clone()))
}

/// Receives events until one matches, failing after five seconds.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<CwaEvent>,
    matches: impl Fn(&CwaEvent) -> bool,
) -> CwaEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("Event bus closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}
