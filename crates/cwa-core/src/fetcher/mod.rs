//! # Fetcher / Resolver
//!
//! Walks the resource graph of a route and writes every resource it meets into the
//! store:
//!
//! ```text
//! /_/routes/{path} -> pageData? -> page -> layout
//!                                      \-> componentGroups -> componentPositions -> component
//!                                                                                  \-> componentGroups ...
//! ```
//!
//! The route, page and layout hops happen strictly one after another, each as a
//! single request carrying `preload` hints for everything below it. The component
//! groups of the page and layout then fan out breadth-wise; every level of that
//! fan-out (groups, positions of a group, nested groups of a component) is bounded
//! by `fetch_concurrency` through `buffer_unordered`.
//!
//! ## De-duplication
//!
//! - A top-level load (`fetch_route`, `fetch_page`, `fetch_page_data`) is refused
//!   while the same endpoint is loading or is the one currently loaded.
//! - Within a load cycle, concurrent and repeated requests for the same path share
//!   one in-flight future. The cache is cleared when the next top-level load starts.
//!   Requests carrying a cancellation token bypass it.
//!
//! ## Errors
//!
//! A 404 on an individual resource yields `None`, so a component whose published
//! variant does not exist (and whose draft the user may not see) is simply absent.
//! A 404 on a hop of the top-level resolution, a missing link between hops, and any
//! other failure end the load and are forwarded to the [`HostErrorHandler`].

pub mod host;
pub mod preload;
pub mod status;

pub use host::{HostErrorHandler, LogErrorHandler, NavigationContext, NoNavigation};
pub use status::{EndpointState, FetchStatus, StatusState};

use crate::api_docs::ApiDocsClient;
use crate::error::{ApiError, CwaError, StoreError};
use crate::events::{CwaEvent, EventBus};
use crate::http::{ApiRequest, ApiResponse, HttpTransport};
use crate::mercure::LiveUpdateHandle;
use crate::resource::{Category, Resource, SetOutcome, SetResourceOptions};
use crate::store::StoreClient;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A single-resource request.
#[derive(Debug, Clone, Default)]
pub struct FetchItem {
    pub path: String,
    pub preload: Vec<String>,
    pub cancel: Option<CancellationToken>,
}

impl FetchItem {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_preload(mut self, paths: &[&str]) -> Self {
        self.preload = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What a top-level load resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOutcome {
    pub endpoint: String,
    pub route: Option<String>,
    pub page_data: Option<String>,
    pub page: Option<String>,
    pub redirect: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum TopLevel {
    Route,
    PageData,
    Page,
}

/// Failure of a shared fetch; must be `Clone` to be handed to every waiter.
#[derive(Debug, Clone)]
enum FetchFailure {
    Api(ApiError),
    Store(StoreError),
}

impl From<FetchFailure> for CwaError {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Api(e) => CwaError::Api(e),
            FetchFailure::Store(e) => CwaError::Store(e),
        }
    }
}

#[derive(Debug, Clone)]
struct Fetched {
    resource: Resource,
    outcome: SetOutcome,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Option<Fetched>, FetchFailure>>>;

/// Collaborators handed to [`Fetcher::new`].
pub struct FetcherContext {
    pub transport: Arc<dyn HttpTransport>,
    pub store: StoreClient,
    pub api_docs: ApiDocsClient,
    pub status: FetchStatus,
    pub live: LiveUpdateHandle,
    pub events: EventBus,
    pub host: Arc<dyn HostErrorHandler>,
    pub navigation: Arc<dyn NavigationContext>,
    pub concurrency: usize,
}

/// The handles a single request needs. Kept apart from the fetcher so cached
/// futures never hold the fetcher itself.
#[derive(Clone)]
struct Loader {
    transport: Arc<dyn HttpTransport>,
    store: StoreClient,
    api_docs: ApiDocsClient,
    status: FetchStatus,
    live: LiveUpdateHandle,
}

impl Loader {
    async fn load(self, item: FetchItem) -> Result<Option<Fetched>, FetchFailure> {
        self.status.request_started(&item.path);
        let result = self.request(&item).await;
        self.status.request_finished(&item.path, result.is_ok());
        result
    }

    async fn request(&self, item: &FetchItem) -> Result<Option<Fetched>, FetchFailure> {
        let mut request = ApiRequest::get(item.path.clone()).with_preload(item.preload.as_slice());
        if let Some(route_path) = self.status.route_path() {
            request = request.with_route_path(route_path);
        }
        if let Some(token) = &item.cancel {
            request = request.with_cancel(token.clone());
        }

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!(path = %item.path, "Not found, skipped");
                return Ok(None);
            }
            Err(e) => return Err(FetchFailure::Api(e)),
        };
        self.observe_links(&response);

        let status = response.status;
        let resource = response
            .body
            .and_then(|body| Resource::from_value(body).ok())
            .filter(|resource| resource.iri().is_some())
            .ok_or_else(|| FetchFailure::Api(ApiError::invalid_payload(status, &item.path)))?;
        let category = Category::from_iri(resource.iri().unwrap_or(&item.path));
        let outcome = self
            .store
            .set_resource(
                resource.clone(),
                SetResourceOptions {
                    category: Some(category),
                    ..SetResourceOptions::current()
                },
            )
            .await
            .map_err(FetchFailure::Store)?;

        Ok(Some(Fetched { resource, outcome }))
    }

    fn observe_links(&self, response: &ApiResponse) {
        let links = response.links();
        if let Some(docs) = links.api_documentation {
            self.api_docs.set_docs_url(&docs);
        }
        if let Some(hub) = links.mercure_hub {
            self.live.set_hub_url(&hub);
        }
    }
}

struct Inner {
    loader: Loader,
    events: EventBus,
    host: Arc<dyn HostErrorHandler>,
    navigation: Arc<dyn NavigationContext>,
    concurrency: usize,
    cache: Mutex<HashMap<String, SharedFetch>>,
}

#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `/` -> `/_/routes//`, `/about` -> `/_/routes//about`.
pub fn route_endpoint(path: &str) -> String {
    format!("/_/routes/{path}")
}

/// `redirectPath`, else the `path` of an embedded `redirect` route, else its IRI.
fn redirect_target(route: &Resource) -> Option<String> {
    if let Some(path) = route.str_field("redirectPath") {
        return Some(path.to_string());
    }
    let redirect = route.get("redirect")?;
    redirect
        .get("path")
        .and_then(|p| p.as_str())
        .or_else(|| redirect.as_str())
        .map(str::to_string)
}

impl Fetcher {
    pub fn new(context: FetcherContext) -> Self {
        let loader = Loader {
            transport: context.transport,
            store: context.store,
            api_docs: context.api_docs,
            status: context.status,
            live: context.live,
        };
        Self {
            inner: Arc::new(Inner {
                loader,
                events: context.events,
                host: context.host,
                navigation: context.navigation,
                concurrency: context.concurrency.max(1),
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn status(&self) -> &FetchStatus {
        &self.inner.loader.status
    }

    pub fn store(&self) -> &StoreClient {
        &self.inner.loader.store
    }

    /// Resolves the route at `path`. `Ok(None)` when the route is already loading or
    /// loaded.
    #[instrument(skip(self))]
    pub async fn fetch_route(&self, path: &str) -> Result<Option<RouteOutcome>, CwaError> {
        self.top_level(TopLevel::Route, &route_endpoint(path), Some(path))
            .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_page(&self, page_iri: &str) -> Result<Option<RouteOutcome>, CwaError> {
        self.top_level(TopLevel::Page, page_iri, None).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_page_data(
        &self,
        page_data_iri: &str,
    ) -> Result<Option<RouteOutcome>, CwaError> {
        self.top_level(TopLevel::PageData, page_data_iri, None)
            .await
    }

    /// Fetches one resource. When it enters the current view for the first time the
    /// live-update topic set has grown and the hub connection is refreshed.
    #[instrument(skip(self, item), fields(path = %item.path))]
    pub async fn fetch_item(&self, item: FetchItem) -> Result<Option<Resource>, CwaError> {
        let Some(fetched) = self.fetch(item).await? else {
            return Ok(None);
        };
        if fetched.outcome == SetOutcome::Inserted {
            self.inner.loader.live.refresh();
        }
        Ok(Some(fetched.resource))
    }

    /// De-duplicated GET; `Ok(None)` on 404.
    pub async fn fetch_resource(&self, path: &str) -> Result<Option<Resource>, CwaError> {
        Ok(self
            .fetch(FetchItem::new(path))
            .await?
            .map(|fetched| fetched.resource))
    }

    /// Fetches groups, their positions and the positioned components, recursing into
    /// components that own groups. Every level is bounded by `fetch_concurrency`.
    pub async fn fetch_component_groups(&self, paths: Vec<String>) -> Result<(), CwaError> {
        self.groups(paths).await
    }

    pub fn clear_cache(&self) {
        lock(&self.inner.cache).clear();
    }

    async fn fetch(&self, item: FetchItem) -> Result<Option<Fetched>, CwaError> {
        if item.cancel.is_some() {
            return Ok(self.inner.loader.clone().load(item).await?);
        }

        let shared = {
            let mut cache = lock(&self.inner.cache);
            match cache.get(&item.path) {
                Some(shared) => {
                    debug!(path = %item.path, "Joining fetch of this cycle");
                    shared.clone()
                }
                None => {
                    let path = item.path.clone();
                    let shared = self.inner.loader.clone().load(item).boxed().shared();
                    cache.insert(path, shared.clone());
                    shared
                }
            }
        };
        Ok(shared.await?)
    }

    async fn fetch_required(&self, path: &str, preload: &[&str]) -> Result<Resource, CwaError> {
        self.fetch(FetchItem::new(path).with_preload(preload))
            .await?
            .map(|fetched| fetched.resource)
            .ok_or_else(|| CwaError::Api(ApiError::not_found(path)))
    }

    async fn top_level(
        &self,
        kind: TopLevel,
        endpoint: &str,
        route_path: Option<&str>,
    ) -> Result<Option<RouteOutcome>, CwaError> {
        let status = &self.inner.loader.status;
        if !status.start_fetch(endpoint, route_path) {
            return Ok(None);
        }

        match self.resolve(kind, endpoint).await {
            Ok(outcome) => {
                status.finish_fetch(endpoint, true, outcome.route.clone(), outcome.page.clone());
                info!(
                    %endpoint,
                    page = outcome.page.as_deref().unwrap_or_default(),
                    "Resolved"
                );
                if let Some(target) = &outcome.redirect {
                    self.redirect(target);
                }
                self.inner.loader.live.refresh();
                Ok(Some(outcome))
            }
            Err(e) => {
                status.finish_fetch(endpoint, false, None, None);
                if e.is_cancel() {
                    debug!(%endpoint, "Resolution cancelled");
                } else {
                    self.inner.host.handle_error(endpoint, &e);
                }
                Err(e)
            }
        }
    }

    async fn resolve(&self, kind: TopLevel, endpoint: &str) -> Result<RouteOutcome, CwaError> {
        self.inner.loader.store.reset_current_resources().await?;
        self.clear_cache();

        let mut outcome = RouteOutcome {
            endpoint: endpoint.to_string(),
            ..RouteOutcome::default()
        };
        match kind {
            TopLevel::Route => {
                let route = self.fetch_required(endpoint, preload::ROUTE).await?;
                outcome.route = route.iri().map(str::to_string);
                if let Some(target) = redirect_target(&route) {
                    outcome.redirect = Some(target);
                } else if let Some(page_data) = route.link("pageData") {
                    self.resolve_page_data(&page_data, &mut outcome).await?;
                } else if let Some(page) = route.link("page") {
                    self.resolve_page(&page, &mut outcome).await?;
                } else {
                    return Err(CwaError::Structural(format!(
                        "Route {endpoint} has neither a page nor page data"
                    )));
                }
            }
            TopLevel::PageData => self.resolve_page_data(endpoint, &mut outcome).await?,
            TopLevel::Page => self.resolve_page(endpoint, &mut outcome).await?,
        }
        Ok(outcome)
    }

    async fn resolve_page_data(
        &self,
        iri: &str,
        outcome: &mut RouteOutcome,
    ) -> Result<(), CwaError> {
        let page_data = self.fetch_required(iri, preload::PAGE_DATA).await?;
        outcome.page_data = Some(iri.to_string());
        let page = page_data.link("page").ok_or_else(|| {
            CwaError::Structural(format!("Page data {iri} has no page configured"))
        })?;
        self.resolve_page(&page, outcome).await
    }

    async fn resolve_page(&self, iri: &str, outcome: &mut RouteOutcome) -> Result<(), CwaError> {
        let page = self.fetch_required(iri, preload::PAGE).await?;
        outcome.page = Some(iri.to_string());

        let layout_iri = page
            .link("layout")
            .ok_or_else(|| CwaError::Structural(format!("Page {iri} has no layout")))?;
        let layout = self.fetch_required(&layout_iri, preload::LAYOUT).await?;

        let mut groups = layout.iri_list("componentGroups");
        groups.extend(page.iri_list("componentGroups"));
        self.groups(groups).await
    }

    fn groups(&self, paths: Vec<String>) -> BoxFuture<'_, Result<(), CwaError>> {
        let limit = self.inner.concurrency;
        stream::iter(paths)
            .map(move |path| self.component_group(path))
            .buffer_unordered(limit)
            .try_collect::<()>()
            .boxed()
    }

    fn component_group(&self, iri: String) -> BoxFuture<'_, Result<(), CwaError>> {
        async move {
            let item = FetchItem::new(iri).with_preload(preload::COMPONENT_GROUP);
            let Some(group) = self.fetch(item).await? else {
                return Ok(());
            };
            stream::iter(group.resource.iri_list("componentPositions"))
                .map(|position| self.component_position(position))
                .buffer_unordered(self.inner.concurrency)
                .try_collect::<()>()
                .await
        }
        .boxed()
    }

    fn component_position(&self, iri: String) -> BoxFuture<'_, Result<(), CwaError>> {
        async move {
            let item = FetchItem::new(iri).with_preload(preload::COMPONENT_POSITION);
            let Some(position) = self.fetch(item).await? else {
                return Ok(());
            };
            let Some(component_iri) = position.resource.link("component") else {
                debug!(position = ?position.resource.iri(), "Position without a component");
                return Ok(());
            };
            let item = FetchItem::new(component_iri).with_preload(preload::COMPONENT);
            let Some(component) = self.fetch(item).await? else {
                return Ok(());
            };
            let nested = component.resource.iri_list("componentGroups");
            if nested.is_empty() {
                return Ok(());
            }
            self.groups(nested).await
        }
        .boxed()
    }

    fn redirect(&self, target: &str) {
        self.inner.events.emit(CwaEvent::Redirect(target.to_string()));
        if !self.inner.navigation.redirect(target) {
            warn!(%target, "Redirect not followed");
        }
    }
}
