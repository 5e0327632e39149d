//! Loading and loaded state of the fetcher.
//!
//! Two levels are tracked:
//!
//! - the **top-level** load (route, page or page data): at most one endpoint at a
//!   time, guarded by [`FetchStatus::start_fetch`];
//! - individual **requests**, counted in `fetching`. The live-update worker only
//!   (re)connects while this count is zero and no top-level load is running.

use crate::events::{CwaEvent, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusState {
    /// Top-level endpoint currently loading.
    pub loading: Option<String>,
    /// Top-level endpoint last loaded successfully.
    pub loaded: Option<String>,
    /// Logical path sent in the `path` header of every request of the cycle.
    pub route_path: Option<String>,
    pub loaded_route: Option<String>,
    pub loaded_page: Option<String>,
    pub fetching: usize,
    /// Per-request state, reset with every top-level load.
    pub endpoints: HashMap<String, EndpointState>,
}

impl StatusState {
    pub fn is_idle(&self) -> bool {
        self.fetching == 0 && self.loading.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct FetchStatus {
    state: Arc<watch::Sender<StatusState>>,
    events: EventBus,
}

impl FetchStatus {
    pub fn new(events: EventBus) -> Self {
        let (state, _) = watch::channel(StatusState::default());
        Self {
            state: Arc::new(state),
            events,
        }
    }

    fn update(&self, change: impl FnOnce(&mut StatusState)) {
        self.state.send_modify(change);
        self.emit_status();
    }

    fn emit_status(&self) {
        let event = {
            let state = self.state.borrow();
            CwaEvent::FetchStatus {
                fetching: state.fetching,
                loading_route: state.loading.clone(),
                loaded_route: state.loaded_route.clone(),
            }
        };
        self.events.emit(event);
    }

    /// Starts a top-level load. Returns `false` when `endpoint` is already loading or
    /// is the endpoint currently loaded; the caller must then do nothing.
    pub fn start_fetch(&self, endpoint: &str, route_path: Option<&str>) -> bool {
        let started = self.state.send_if_modified(|state| {
            if state.loading.as_deref() == Some(endpoint) || state.loaded.as_deref() == Some(endpoint)
            {
                return false;
            }
            state.loading = Some(endpoint.to_string());
            state.route_path = route_path.map(str::to_string);
            state.endpoints.clear();
            true
        });
        if !started {
            debug!(%endpoint, "Already loading or loaded, skipped");
            return false;
        }
        self.emit_status();
        info!(%endpoint, "Top-level fetch started");
        true
    }

    /// Ends a top-level load. On success `route` and `page` become the loaded state.
    /// A load superseded by a newer `start_fetch` changes nothing.
    pub fn finish_fetch(
        &self,
        endpoint: &str,
        success: bool,
        route: Option<String>,
        page: Option<String>,
    ) {
        self.update(|state| {
            if state.loading.as_deref() != Some(endpoint) {
                return;
            }
            state.loading = None;
            if success {
                state.loaded = Some(endpoint.to_string());
                state.loaded_route = route;
                state.loaded_page = page;
            }
        });
        info!(%endpoint, success, "Top-level fetch finished");
    }

    pub fn request_started(&self, endpoint: &str) {
        self.update(|state| {
            state.fetching += 1;
            state
                .endpoints
                .insert(endpoint.to_string(), EndpointState::Loading);
        });
    }

    pub fn request_finished(&self, endpoint: &str, success: bool) {
        self.update(|state| {
            state.fetching = state.fetching.saturating_sub(1);
            let done = if success {
                EndpointState::Loaded
            } else {
                EndpointState::Failed
            };
            state.endpoints.insert(endpoint.to_string(), done);
        });
    }

    pub fn snapshot(&self) -> StatusState {
        self.state.borrow().clone()
    }

    pub fn is_idle(&self) -> bool {
        self.state.borrow().is_idle()
    }

    pub fn is_loading(&self) -> bool {
        !self.is_idle()
    }

    pub fn fetching_count(&self) -> usize {
        self.state.borrow().fetching
    }

    pub fn loading_route(&self) -> Option<String> {
        self.state.borrow().loading.clone()
    }

    pub fn loaded_route(&self) -> Option<String> {
        self.state.borrow().loaded_route.clone()
    }

    pub fn loaded_page(&self) -> Option<String> {
        self.state.borrow().loaded_page.clone()
    }

    pub fn route_path(&self) -> Option<String> {
        self.state.borrow().route_path.clone()
    }

    pub fn endpoint_state(&self, endpoint: &str) -> Option<EndpointState> {
        self.state.borrow().endpoints.get(endpoint).copied()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusState> {
        self.state.subscribe()
    }

    pub async fn wait_idle(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver.wait_for(StatusState::is_idle).await;
    }
}
