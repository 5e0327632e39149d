//! # System Lifecycle & Orchestration
//!
//! [`CwaSystem`] creates every component, wires them together and tears them down.
//!
//! ## Wiring
//!
//! The fetcher needs the live-update handle (to refresh the topic set) and the
//! live-update worker needs the fetcher (to prefetch components of spliced
//! positions). The cycle is broken by late binding: the worker is created first,
//! its handle goes into the fetcher, and the fetcher is handed to the worker only
//! when it starts running.
//!
//! ```text
//! StoreActor  <- StoreClient <- Fetcher, ResourceWriter, LiveUpdateWorker, GroupReconciler
//! LiveUpdateWorker <- LiveUpdateHandle <- Fetcher
//! ```
//!
//! ## Shutdown
//!
//! 1. Close the hub connection; the worker exits and drops its clients.
//! 2. Drop every remaining store client; the store actor sees its channel close.
//! 3. Await both tasks.
//!
//! The worker holds a handle to itself through the fetcher, so it is stopped with an
//! explicit `Close` rather than by channel closure.

use crate::api_docs::ApiDocsClient;
use crate::config::CwaConfig;
use crate::events::EventBus;
use crate::fetcher::{
    FetchStatus, Fetcher, FetcherContext, HostErrorHandler, LogErrorHandler, NavigationContext,
    NoNavigation,
};
use crate::gate::PendingMutations;
use crate::http::HttpTransport;
use crate::mercure::{LiveUpdateHandle, LiveUpdateWorker, SyncContext};
use crate::mutation::ResourceWriter;
use crate::reconciler::GroupReconciler;
use crate::store::{StoreActor, StoreClient};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct CwaSystem {
    pub store: StoreClient,
    pub fetcher: Fetcher,
    pub writer: ResourceWriter,
    pub live: LiveUpdateHandle,
    pub api_docs: ApiDocsClient,
    pub events: EventBus,
    pub gate: PendingMutations,
    pub status: FetchStatus,
    authenticated: watch::Sender<bool>,
    store_handle: JoinHandle<()>,
    live_handle: JoinHandle<()>,
}

impl CwaSystem {
    /// Starts the system with errors logged and redirects ignored. Must be called
    /// from within a Tokio runtime.
    pub fn new(config: &CwaConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_host(
            config,
            transport,
            Arc::new(LogErrorHandler),
            Arc::new(NoNavigation),
        )
    }

    pub fn with_host(
        config: &CwaConfig,
        transport: Arc<dyn HttpTransport>,
        host: Arc<dyn HostErrorHandler>,
        navigation: Arc<dyn NavigationContext>,
    ) -> Self {
        let events = EventBus::default();
        let gate = PendingMutations::new();
        let status = FetchStatus::new(events.clone());

        // 1. Create the actors, no dependencies yet
        let (store_actor, store) =
            StoreActor::new(config.store_buffer, config.diff_exclusions.clone());
        let (live_worker, live) = LiveUpdateWorker::new();

        // 2. Build the components on top of their clients
        let api_docs = ApiDocsClient::new(transport.clone());
        let fetcher = Fetcher::new(FetcherContext {
            transport: transport.clone(),
            store: store.clone(),
            api_docs: api_docs.clone(),
            status: status.clone(),
            live: live.clone(),
            events: events.clone(),
            host,
            navigation,
            concurrency: config.fetch_concurrency,
        });
        let writer = ResourceWriter::new(
            transport.clone(),
            store.clone(),
            events.clone(),
            gate.clone(),
            config.debounce(),
        );

        // 3. Start them with their context injected
        let store_handle = tokio::spawn(store_actor.run());
        let live_handle = tokio::spawn(live_worker.run(SyncContext {
            store: store.clone(),
            transport,
            fetcher: fetcher.clone(),
            status: status.clone(),
            gate: gate.clone(),
            events: events.clone(),
            api_url: config.api_url.clone(),
            position_topic: config.position_topic.clone(),
            reconnect_delay: config.reconnect_delay(),
        }));

        let (authenticated, _) = watch::channel(false);
        info!(api_url = %config.api_url, "CWA system started");

        Self {
            store,
            fetcher,
            writer,
            live,
            api_docs,
            events,
            gate,
            status,
            authenticated,
            store_handle,
            live_handle,
        }
    }

    /// Editing sessions reconcile component groups; anonymous ones never do.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.send_if_modified(|current| {
            let changed = *current != authenticated;
            *current = authenticated;
            changed
        });
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    /// The reconciler holds store and writer clients; drop it before [`shutdown`](Self::shutdown).
    pub fn reconciler(&self) -> GroupReconciler {
        GroupReconciler::new(
            self.store.clone(),
            self.writer.clone(),
            self.status.clone(),
            self.authenticated.subscribe(),
        )
    }

    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down CWA system...");

        // Step 1: stop the live-update worker, which holds clients of its own
        self.live.close();
        if let Err(e) = self.live_handle.await {
            error!("Live update worker failed: {:?}", e);
            return Err(format!("Live update worker failed: {:?}", e));
        }

        // Step 2: drop the remaining store clients so the actor sees its channel close
        drop(self.fetcher);
        drop(self.writer);
        drop(self.store);

        if let Err(e) = self.store_handle.await {
            error!("Store actor failed: {:?}", e);
            return Err(format!("Store actor failed: {:?}", e));
        }

        info!("CWA system shutdown complete.");
        Ok(())
    }
}
