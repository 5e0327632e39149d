//! HTTP and server-sent-event plumbing.
//!
//! The core talks to the network only through [`HttpTransport`]. Production code
//! uses [`ReqwestTransport`]; tests use [`MockTransport`].

pub mod client;
pub mod link;
pub mod mock;
pub mod sse;
pub mod transport;

pub use client::ReqwestTransport;
pub use link::{parse_link_header, DiscoveredLinks};
pub use mock::MockTransport;
pub use sse::{SseEvent, SseParser};
pub use transport::{ApiRequest, ApiResponse, EventStream, HttpTransport, Method};
