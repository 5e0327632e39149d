//! Live updates pushed by a Mercure hub.
//!
//! - [`hub`]: connection state machine and topic URL
//! - [`queue`]: per-IRI coalescing message queue
//! - [`sync`]: the worker applying updates to the store

pub mod hub;
pub mod queue;
pub mod sync;

pub use hub::{topic_url, HubConnection, HubState};
pub use queue::{HubUpdate, MessageQueue};
pub use sync::{HubSnapshot, LiveUpdateHandle, LiveUpdateWorker, SyncContext};
