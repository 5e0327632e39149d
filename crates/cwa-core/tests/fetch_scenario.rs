mod common;

use common::*;
use cwa_core::error::ErrorKind;
use cwa_core::fetcher::{HostErrorHandler, NavigationContext};
use cwa_core::http::Method;
use cwa_core::{CwaConfig, CwaError, CwaSystem, FetchItem, MockTransport};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingHost {
    errors: Mutex<Vec<(String, ErrorKind)>>,
    redirects: Mutex<Vec<String>>,
}

impl HostErrorHandler for RecordingHost {
    fn handle_error(&self, endpoint: &str, error: &CwaError) {
        self.errors
            .lock()
            .unwrap()
            .push((endpoint.to_string(), error.kind()));
    }
}

impl NavigationContext for RecordingHost {
    fn redirect(&self, path: &str) -> bool {
        self.redirects.lock().unwrap().push(path.to_string());
        true
    }
}

fn system_with_host(mock: &MockTransport, host: &Arc<RecordingHost>) -> CwaSystem {
    CwaSystem::with_host(
        &CwaConfig::new("https://api.test"),
        Arc::new(mock.clone()),
        host.clone(),
        host.clone(),
    )
}

/// Route, page, layout, two groups, two positions and the shared component: each is
/// stored exactly once, the component is requested once.
#[tokio::test]
async fn test_route_resolution_stores_every_resource_once() {
    let mock = route_mock();
    let system = system(&mock);

    let outcome = system
        .fetcher
        .fetch_route("/")
        .await
        .expect("Route resolution failed")
        .expect("Route was not loaded");

    assert_eq!(outcome.route.as_deref(), Some(ROUTE));
    assert_eq!(outcome.page.as_deref(), Some(PAGE));
    assert_eq!(system.store.stats().await.unwrap().set_calls, 8);
    assert_eq!(mock.call_count(Method::Get, COMPONENT), 1);
    assert_eq!(system.store.current_ids("Route").await.unwrap(), vec![ROUTE]);
    assert_eq!(
        system.store.current_ids("ComponentPosition").await.unwrap().len(),
        2
    );
    assert_eq!(system.status.loaded_route().as_deref(), Some(ROUTE));
    assert_eq!(system.status.loaded_page().as_deref(), Some(PAGE));
    assert!(system.status.is_idle());

    // hops carry preload hints and the logical route path
    let route_request = &mock.requests_to(Method::Get, ROUTE)[0];
    assert!(route_request
        .header("preload")
        .unwrap()
        .contains("/page/layout/componentGroups/*/componentPositions/*/component"));
    assert_eq!(mock.requests_to(Method::Get, PAGE)[0].header("path"), Some("/"));

    // links were discovered on the way
    assert_eq!(system.api_docs.docs_url().as_deref(), Some("/docs.jsonld"));
    assert_eq!(system.live.hub_url().as_deref(), Some(HUB));

    mock.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_loaded_or_loading_route_is_not_fetched_again() {
    let mock = route_mock().with_delay(Duration::from_millis(20));
    let system = system(&mock);

    let (first, second) = tokio::join!(
        system.fetcher.fetch_route("/"),
        system.fetcher.fetch_route("/")
    );
    let loaded = [first.unwrap(), second.unwrap()]
        .into_iter()
        .filter(Option::is_some)
        .count();
    assert_eq!(loaded, 1);

    assert!(system.fetcher.fetch_route("/").await.unwrap().is_none());
    assert_eq!(mock.call_count(Method::Get, ROUTE), 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fetched_item_matches_store() {
    let mock = MockTransport::new();
    mock.expect_get(COMPONENT).return_json(json!({
        "@id": COMPONENT, "@type": "HtmlContent", "html": "<p>Hi</p>", "_metadata": { "persisted": true }
    }));
    mock.expect_get("/component/html_contents/missing")
        .return_status(404, None);
    let system = system(&mock);

    let fetched = system
        .fetcher
        .fetch_item(FetchItem::new(COMPONENT))
        .await
        .unwrap()
        .unwrap();
    let stored = system.store.get_resource(COMPONENT).await.unwrap().unwrap();
    assert_eq!(stored, fetched);

    // 404 on a single resource is not an error
    let missing = system
        .fetcher
        .fetch_resource("/component/html_contents/missing")
        .await
        .unwrap();
    assert!(missing.is_none());

    mock.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_component_groups_fan_out_is_bounded() {
    let mock = MockTransport::new().with_delay(Duration::from_millis(10));
    let groups: Vec<String> = (1..=6).map(|i| format!("/_/component_groups/{i}")).collect();
    for group in &groups {
        mock.expect_get(group.as_str()).return_json(json!({
            "@id": group, "@type": "ComponentGroup", "componentPositions": []
        }));
    }
    let mut config = CwaConfig::new("https://api.test");
    config.fetch_concurrency = 2;
    let system = CwaSystem::new(&config, Arc::new(mock.clone()));

    system
        .fetcher
        .fetch_component_groups(groups.clone())
        .await
        .unwrap();

    assert!(mock.max_in_flight() <= 2, "max in flight {}", mock.max_in_flight());
    assert_eq!(
        system.store.current_ids("ComponentGroup").await.unwrap().len(),
        6
    );
    mock.verify();
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_page_data_without_page_is_forwarded_to_host() {
    let mock = MockTransport::new();
    mock.expect_get("/_/routes//blog/post").return_json(json!({
        "@id": "/_/routes//blog/post", "@type": "Route", "pageData": "/page_data/blog_posts/1"
    }));
    mock.expect_get("/page_data/blog_posts/1").return_json(json!({
        "@id": "/page_data/blog_posts/1", "@type": "BlogPost", "title": "Post"
    }));
    let host = Arc::new(RecordingHost::default());
    let system = system_with_host(&mock, &host);

    let err = system.fetcher.fetch_route("/blog/post").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Structural);
    assert_eq!(
        *host.errors.lock().unwrap(),
        vec![("/_/routes//blog/post".to_string(), ErrorKind::Structural)]
    );
    // a failed load can be retried
    assert!(system.status.loaded_route().is_none());
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_route_is_not_found() {
    let mock = MockTransport::new();
    mock.expect_get("/_/routes//nowhere").return_status(404, None);
    let host = Arc::new(RecordingHost::default());
    let system = system_with_host(&mock, &host);

    let err = system.fetcher.fetch_route("/nowhere").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(host.errors.lock().unwrap().len(), 1);
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_redirect_route_navigates() {
    let mock = MockTransport::new();
    mock.expect_get("/_/routes//old").return_json(json!({
        "@id": "/_/routes//old", "@type": "Route", "redirectPath": "/new"
    }));
    let host = Arc::new(RecordingHost::default());
    let system = system_with_host(&mock, &host);

    let outcome = system.fetcher.fetch_route("/old").await.unwrap().unwrap();

    assert_eq!(outcome.redirect.as_deref(), Some("/new"));
    assert!(outcome.page.is_none());
    assert_eq!(*host.redirects.lock().unwrap(), vec!["/new".to_string()]);
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_item_is_a_no_op() {
    let mock = MockTransport::new().with_delay(Duration::from_secs(30));
    mock.expect_get("/component/collections/1?page=2").return_json(json!({
        "@id": "/component/collections/1", "@type": "Collection"
    }));
    let system = system(&mock);
    let token = tokio_util::sync::CancellationToken::new();

    let fetch = system
        .fetcher
        .fetch_item(FetchItem::new("/component/collections/1?page=2").with_cancel(token.clone()));
    token.cancel();
    let err = fetch.await.unwrap_err();

    assert!(err.is_cancel());
    assert!(system
        .store
        .get_resource("/component/collections/1")
        .await
        .unwrap()
        .is_none());
    system.shutdown().await.unwrap();
}
