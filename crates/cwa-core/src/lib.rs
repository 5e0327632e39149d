//! # CWA Core
//!
//! The client-side core of a Component Web App: a normalized store of hypermedia
//! resources fetched from a JSON-LD/Hydra API, kept current by a Mercure hub.
//!
//! ## Architecture
//!
//! ```text
//!                 +-----------+   GET + preload    +--------------+
//!  fetch_route -> |  Fetcher  | -----------------> | HttpTransport|
//!                 +-----------+                    +--------------+
//!                   |  set_resource                   ^   ^
//!                   v                                 |   | SSE
//!                 +------------+   current_iris   +------------------+
//!                 | StoreActor | <--------------- | LiveUpdateWorker |
//!                 +------------+  set / delete    +------------------+
//!                   ^                                  ^ waits on
//!                   | commit                           |
//!                 +----------------+  holds guard  +------------------+
//!                 | ResourceWriter | ------------> | PendingMutations |
//!                 +----------------+               +------------------+
//! ```
//!
//! - **[`store`]**: the single owner of all resource state. An actor processes
//!   [`StoreRequest`](store::StoreRequest)s one at a time; [`StoreClient`] is the
//!   typed handle. The synchronous rules live in [`resource::ResourceState`].
//! - **[`fetcher`]**: resolves route → page data → page → layout → component groups,
//!   one request per hop with preload hints, then a bounded fan-out.
//! - **[`mercure`]**: subscribes to every tracked IRI, queues pushed updates per IRI
//!   and applies them only while no local write is pending.
//! - **[`reconciler`]**: creates or patches the component groups the rendering layer
//!   declares, for editing sessions.
//! - **[`mutation`]**: POST/PATCH/DELETE and debounced field edits.
//! - **[`api_docs`]**: the Hydra entrypoint and documentation, fetched once.
//!
//! Supporting modules: [`http`] (transport seam, reqwest implementation, mock),
//! [`events`] (typed event bus), [`gate`] and [`debounce`], [`components`]
//! (type → UI component registry), [`config`], [`error`], [`telemetry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cwa_core::{CwaConfig, CwaSystem, ReqwestTransport};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! cwa_core::setup_tracing();
//! let config = CwaConfig::new("https://api.example.com");
//! let transport = ReqwestTransport::new(&config)?;
//! let system = CwaSystem::new(&config, Arc::new(transport));
//!
//! system.fetcher.fetch_route("/").await?;
//! let route = system.status.loaded_route();
//!
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! [`MockTransport`] stands in for the API: scripted replies per `(method, path)`,
//! a call log, an optional delay and a scripted hub. See `tests/` for full-system
//! scenarios.

pub mod api_docs;
pub mod components;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod gate;
pub mod http;
pub mod mercure;
pub mod mutation;
pub mod reconciler;
pub mod resource;
pub mod store;
pub mod system;
pub mod telemetry;

pub use api_docs::{ApiDocsClient, ApiDocumentation};
pub use components::{ComponentRegistry, Renders, UiComponent};
pub use config::{ConfigError, CwaConfig};
pub use error::{ApiError, CwaError, ErrorKind, StoreError, Violation};
pub use events::{CwaEvent, EventBus, Notification, NotificationLevel};
pub use fetcher::{FetchItem, FetchStatus, Fetcher, RouteOutcome};
pub use gate::{MutationGuard, PendingMutations};
pub use http::{HttpTransport, MockTransport, ReqwestTransport};
pub use mercure::{HubState, LiveUpdateHandle};
pub use mutation::ResourceWriter;
pub use reconciler::{GroupLocation, GroupReconciler, ReconcileOutcome};
pub use resource::{Category, Resource, ResourceType};
pub use store::StoreClient;
pub use system::CwaSystem;
pub use telemetry::setup_tracing;
