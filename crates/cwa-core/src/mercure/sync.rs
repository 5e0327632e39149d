//! # Live Update Synchronizer
//!
//! A single worker task owns the hub connection and the message queue. It reacts to
//! four things, one at a time:
//!
//! | Input | Reaction |
//! |-------|----------|
//! | `Refresh` command | recompute the topic URL, reconnect if it changed |
//! | hub event | record its id, decode, enqueue (coalesced per IRI) |
//! | mutation gate reaches zero with a non-empty queue | drain the queue |
//! | retry timer | reopen a connection the hub closed |
//!
//! The connection is never (re)opened while the fetcher is busy. A refresh that
//! arrives during a fetch is remembered and replayed when the fetcher goes idle.

use super::hub::{topic_url, HubConnection, HubState};
use super::queue::{HubUpdate, MessageQueue};
use crate::error::{ApiError, CwaError};
use crate::events::{CwaEvent, EventBus};
use crate::fetcher::{preload, FetchItem, FetchStatus, Fetcher};
use crate::gate::PendingMutations;
use crate::http::{EventStream, HttpTransport, SseEvent};
use crate::resource::{SetOutcome, SetResourceOptions, COMPONENT_POSITION};
use crate::store::StoreClient;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum SyncCommand {
    Refresh,
    Snapshot(oneshot::Sender<HubSnapshot>),
    Close,
}

/// Point-in-time view of the synchronizer, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct HubSnapshot {
    pub state: HubState,
    pub url: Option<String>,
    pub last_event_id: Option<String>,
    pub queued: usize,
}

/// Cheap handle used by the fetcher and the system.
///
/// Never blocks: commands go over an unbounded channel, and a stopped worker turns
/// every call into a no-op.
#[derive(Clone, Debug)]
pub struct LiveUpdateHandle {
    sender: mpsc::UnboundedSender<SyncCommand>,
    hub_url: Arc<watch::Sender<Option<String>>>,
}

impl LiveUpdateHandle {
    /// Asks the worker to recompute its topic set.
    pub fn refresh(&self) {
        self.send(SyncCommand::Refresh);
    }

    /// Records a hub URL discovered in a `Link` header. A new URL triggers a refresh.
    pub fn set_hub_url(&self, url: &str) {
        let changed = self.hub_url.send_if_modified(|current| {
            if current.as_deref() == Some(url) {
                return false;
            }
            *current = Some(url.to_string());
            true
        });
        if changed {
            info!(%url, "Hub discovered");
            self.refresh();
        }
    }

    pub fn hub_url(&self) -> Option<String> {
        self.hub_url.borrow().clone()
    }

    pub fn close(&self) {
        self.send(SyncCommand::Close);
    }

    /// `None` once the worker has stopped.
    pub async fn snapshot(&self) -> Option<HubSnapshot> {
        let (respond_to, response) = oneshot::channel();
        self.sender.send(SyncCommand::Snapshot(respond_to)).ok()?;
        response.await.ok()
    }

    fn send(&self, command: SyncCommand) {
        if self.sender.send(command).is_err() {
            debug!("Live update worker stopped, command dropped");
        }
    }
}

/// Collaborators bound when the worker starts.
pub struct SyncContext {
    pub store: StoreClient,
    pub transport: Arc<dyn HttpTransport>,
    pub fetcher: Fetcher,
    pub status: FetchStatus,
    pub gate: PendingMutations,
    pub events: EventBus,
    pub api_url: String,
    pub position_topic: String,
    pub reconnect_delay: Duration,
}

pub struct LiveUpdateWorker {
    receiver: mpsc::UnboundedReceiver<SyncCommand>,
    hub_url: watch::Receiver<Option<String>>,
}

impl LiveUpdateWorker {
    pub fn new() -> (Self, LiveUpdateHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (hub_url, hub_url_receiver) = watch::channel(None);
        let worker = Self {
            receiver,
            hub_url: hub_url_receiver,
        };
        let handle = LiveUpdateHandle {
            sender,
            hub_url: Arc::new(hub_url),
        };
        (worker, handle)
    }

    /// Runs until [`LiveUpdateHandle::close`] is called or every handle is dropped.
    pub async fn run(self, context: SyncContext) {
        let mut receiver = self.receiver;
        let mut sync = Synchronizer {
            context,
            hub_url: self.hub_url,
            connection: HubConnection::default(),
            stream: None,
            queue: MessageQueue::new(),
            retry_at: None,
            deferred: false,
        };
        info!("Live update worker started");

        loop {
            // hub events first, so a command observes everything already received
            tokio::select! {
                biased;
                event = next_event(&mut sync.stream) => sync.on_event(event),
                command = receiver.recv() => match command {
                    Some(SyncCommand::Refresh) => sync.refresh_connection().await,
                    Some(SyncCommand::Snapshot(respond_to)) => {
                        let _ = respond_to.send(sync.snapshot());
                    }
                    Some(SyncCommand::Close) | None => {
                        sync.close();
                        break;
                    }
                },
                _ = sync.context.gate.wait_idle(), if !sync.queue.is_empty() => {
                    sync.process_queue().await;
                }
                _ = sync.context.status.wait_idle(), if sync.deferred => {
                    sync.deferred = false;
                    sync.refresh_connection().await;
                }
                _ = retry(sync.retry_at), if sync.retry_at.is_some() => {
                    sync.retry_at = None;
                    sync.refresh_connection().await;
                }
            }
        }

        info!(
            dropped = sync.queue.len(),
            last_event_id = ?sync.connection.last_event_id(),
            "Live update worker shut down"
        );
    }
}

async fn next_event(stream: &mut Option<EventStream>) -> Option<Result<SseEvent, ApiError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn retry(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

struct Synchronizer {
    context: SyncContext,
    hub_url: watch::Receiver<Option<String>>,
    connection: HubConnection,
    stream: Option<EventStream>,
    queue: MessageQueue,
    retry_at: Option<Instant>,
    deferred: bool,
}

impl Synchronizer {
    fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            state: self.connection.state(),
            url: self.connection.url().map(str::to_string),
            last_event_id: self.connection.last_event_id().map(str::to_string),
            queued: self.queue.len(),
        }
    }

    fn emit_state(&self, state: HubState) {
        self.context.events.emit(CwaEvent::HubState(state));
    }

    /// Opens or replaces the connection when the desired topic URL differs from the
    /// open one.
    async fn refresh_connection(&mut self) {
        let Some(hub) = self.hub_url.borrow().clone() else {
            debug!("No hub discovered yet");
            return;
        };
        if !self.context.status.is_idle() {
            debug!("Fetch in progress, connection deferred");
            self.deferred = true;
            return;
        }

        let iris = match self.context.store.current_iris().await {
            Ok(iris) => iris,
            Err(e) => {
                warn!(error = %e, "Cannot read tracked resources");
                return;
            }
        };
        let url = match topic_url(
            &hub,
            &self.context.api_url,
            &iris,
            &self.context.position_topic,
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!(%hub, error = %e, "Invalid hub URL");
                return;
            }
        };
        if !self.connection.needs_connection(&url) {
            return;
        }

        self.stream = None;
        let state = self.connection.begin(&url);
        self.emit_state(state);

        let last_event_id = self.connection.last_event_id().map(str::to_string);
        match self.context.transport.subscribe(&url, last_event_id).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.retry_at = None;
                let state = self.connection.opened();
                self.emit_state(state);
                debug!(topics = iris.len() + 1, "Subscribed");
            }
            Err(e) => {
                warn!(error = %e, "Hub subscription failed");
                self.connection_lost();
            }
        }
    }

    fn connection_lost(&mut self) {
        self.stream = None;
        let state = self.connection.lost();
        self.emit_state(state);
        self.retry_at = Some(Instant::now() + self.context.reconnect_delay);
    }

    fn on_event(&mut self, event: Option<Result<SseEvent, ApiError>>) {
        match event {
            Some(Ok(event)) => self.enqueue(event),
            Some(Err(e)) => {
                warn!(error = %e, "Hub stream failed");
                self.connection_lost();
            }
            None => {
                info!("Hub closed the stream");
                self.connection_lost();
            }
        }
    }

    fn enqueue(&mut self, event: SseEvent) {
        self.connection.record_event_id(event.id.as_deref());
        match HubUpdate::from_event(&event) {
            Ok(update) => {
                let iri = update.iri.clone();
                if self.queue.enqueue(update) {
                    debug!(%iri, "Queued update replaced");
                } else {
                    debug!(%iri, queued = self.queue.len(), "Update queued");
                }
            }
            Err(reason) => warn!(%reason, id = ?event.id, "Malformed hub message skipped"),
        }
    }

    /// Applies queued updates in order while no local mutation is pending, then
    /// promotes the staged resources into `current`.
    async fn process_queue(&mut self) {
        let mut processed = 0usize;
        while self.context.gate.is_idle() {
            let Some(update) = self.queue.pop() else {
                break;
            };
            let iri = update.iri.clone();
            if let Err(e) = Self::apply_message(&self.context, update).await {
                warn!(%iri, error = %e, "Live update not applied");
            }
            processed += 1;
        }
        if processed == 0 {
            return;
        }

        match self.context.store.merge_new_resources().await {
            Ok(merged) => {
                debug!(processed, merged = merged.len(), "Live updates merged");
                for iri in merged {
                    self.context.events.emit(CwaEvent::LiveUpdateApplied(iri));
                }
            }
            Err(e) => warn!(error = %e, "Cannot merge live updates"),
        }
        self.refresh_connection().await;
    }

    // The open stream is not `Sync`; only the context may be borrowed across awaits.
    async fn apply_message(ctx: &SyncContext, update: HubUpdate) -> Result<(), CwaError> {
        let store = &ctx.store;
        if update.is_deletion() {
            let removed = store.delete_resource(&update.iri).await?;
            info!(iri = %update.iri, removed = removed.len(), "Deleted by hub");
            for iri in removed {
                ctx.events.emit(CwaEvent::ResourceDeleted(iri));
            }
            return Ok(());
        }

        let is_new_position = update.resource.type_name() == Some(COMPONENT_POSITION)
            && store.get_resource(&update.iri).await?.is_none();
        if is_new_position {
            return Self::splice_position(ctx, update).await;
        }

        let outcome = store
            .set_resource(update.resource, SetResourceOptions::live_update())
            .await?;
        if outcome == SetOutcome::Rejected {
            debug!(iri = %update.iri, "Echo of a known state ignored");
        }
        Ok(())
    }

    /// Adds a position the hub announced to its group. The group itself is not
    /// pushed by the server, so its `componentPositions` is patched locally.
    ///
    /// The group is read with any splice already staged in this drain applied.
    async fn splice_position(ctx: &SyncContext, update: HubUpdate) -> Result<(), CwaError> {
        let store = &ctx.store;
        let position = update.resource;
        let iri = update.iri;

        let group_iri = position.link("componentGroup").ok_or_else(|| {
            CwaError::Structural(format!("Component position {iri} has no group"))
        })?;
        let Some(mut group) = store.get_latest_resource(&group_iri).await? else {
            debug!(%iri, group = %group_iri, "Group not tracked, position ignored");
            return Ok(());
        };

        if let Some(component) = position.link("component") {
            if store.get_resource(&component).await?.is_none() {
                let item = FetchItem::new(component.as_str()).with_preload(preload::COMPONENT);
                if let Err(e) = ctx.fetcher.fetch_item(item).await {
                    warn!(%component, error = %e, "Component prefetch failed");
                }
            }
        }

        store
            .set_resource(position, SetResourceOptions::forced_live_update())
            .await?;

        let mut positions = group.iri_list("componentPositions");
        if positions.contains(&iri) {
            return Ok(());
        }
        positions.push(iri.clone());
        group.insert("componentPositions", json!(positions));
        store
            .set_resource(group, SetResourceOptions::forced_live_update())
            .await?;
        info!(%iri, group = %group_iri, "Position spliced into group");
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
        self.retry_at = None;
        let state = self.connection.close();
        self.emit_state(state);
    }
}
