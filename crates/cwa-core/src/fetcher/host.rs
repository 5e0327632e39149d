//! Hooks into the host application: the error page and client-side navigation.

use crate::error::CwaError;
use tracing::{error, info};

/// Receives fatal errors from a top-level resolution, typically to render an error
/// page. Cancellations are never forwarded.
pub trait HostErrorHandler: Send + Sync {
    fn handle_error(&self, endpoint: &str, error: &CwaError);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl HostErrorHandler for LogErrorHandler {
    fn handle_error(&self, endpoint: &str, error: &CwaError) {
        error!(%endpoint, kind = ?error.kind(), error = %error, "Resolution failed");
    }
}

pub trait NavigationContext: Send + Sync {
    /// Navigates to `path`. Returns `false` when there is nothing to navigate.
    fn redirect(&self, path: &str) -> bool;
}

/// Used when running without a client-side router; redirects are logged only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNavigation;

impl NavigationContext for NoNavigation {
    fn redirect(&self, path: &str) -> bool {
        info!(%path, "Redirect ignored, no navigation context");
        false
    }
}
