//! The resource store: a single actor owning the normalized state, reached through
//! a cloneable client.

pub mod actor;
pub mod client;
pub mod message;

pub use actor::StoreActor;
pub use client::StoreClient;
pub use message::{Response, StoreRequest, StoreStats};
