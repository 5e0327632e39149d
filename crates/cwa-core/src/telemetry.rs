//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by
//! `RUST_LOG`. Module paths are hidden; every log line carries structured fields
//! (`endpoint`, `iri`, `path`) instead.
//!
//! ## Levels
//!
//! - `info`: lifecycle and state transitions (route resolved, hub connected,
//!   resource created or deleted, actor start/shutdown with counters)
//! - `debug`: per-request detail, skipped duplicates, rejected echoes, queued updates
//! - `warn`: failed writes, malformed hub messages, failed subscriptions
//! - `error`: errors forwarded to the host error handler
//!
//! ```bash
//! RUST_LOG=info cargo run -p cwa-sample -- --route /
//! RUST_LOG=cwa_core=debug cargo run -p cwa-sample -- --route / --watch
//! ```
//!
//! A route resolution with `RUST_LOG=info` reads:
//!
//! ```text
//! INFO Store actor started
//! INFO fetch_route{path="/"}: Top-level fetch started endpoint=/_/routes//
//! INFO fetch_route{path="/"}: Hub discovered url=https://localhost/.well-known/mercure
//! INFO fetch_route{path="/"}: Top-level fetch finished endpoint=/_/routes// success=true
//! INFO fetch_route{path="/"}: Resolved endpoint=/_/routes// page=/_/pages/1
//! INFO Hub connection from=disconnected to=connecting
//! INFO Hub connection from=connecting to=connected
//! ```

/// Initializes the global subscriber. A second call is a no-op, so tests and
/// binaries can both call it.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
