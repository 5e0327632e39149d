//! # Errors
//!
//! This module defines the error types used throughout the CWA core. By centralizing
//! error definitions, every layer (store, transport, fetcher, live updates, mutations)
//! reports failures the same way and callers can branch on a single [`ErrorKind`].
//!
//! ## Taxonomy
//!
//! | Kind | Source | Treatment |
//! |------|--------|-----------|
//! | `Cancel` | request aborted by a cancellation token | no-op, never surfaced |
//! | `NotFound` | HTTP 404 | swallowed by resource fetches, otherwise propagated |
//! | `Validation` | 4xx with `violations` | field-scoped notifications |
//! | `Server` | 5xx or uncategorized transport failure | generic notification, logged |
//! | `Structural` | missing required linkage in the resource graph | forwarded to the host error handler |

use crate::config::ConfigError;
use crate::events::Notification;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field violation returned by the API in a validation failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub property_path: String,
    pub message: String,
}

/// An HTTP failure normalized into one shape, whatever the transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (endpoint {endpoint}, status {status_code:?})")]
pub struct ApiError {
    /// HTTP status, `None` when the request never produced a response.
    pub status_code: Option<u16>,
    pub endpoint: String,
    pub message: String,
    pub violations: Vec<Violation>,
    /// Set when the request was aborted through its cancellation token.
    pub is_cancel: bool,
}

impl ApiError {
    pub fn cancelled(endpoint: impl Into<String>) -> Self {
        Self {
            status_code: None,
            endpoint: endpoint.into(),
            message: "Request cancelled".to_string(),
            violations: Vec::new(),
            is_cancel: true,
        }
    }

    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            endpoint: endpoint.into(),
            message: message.into(),
            violations: Vec::new(),
            is_cancel: false,
        }
    }

    pub fn not_found(endpoint: impl Into<String>) -> Self {
        Self {
            status_code: Some(404),
            endpoint: endpoint.into(),
            message: "Not Found".to_string(),
            violations: Vec::new(),
            is_cancel: false,
        }
    }

    /// A 2xx response whose body is not a JSON-LD object.
    pub fn invalid_payload(status: u16, endpoint: impl Into<String>) -> Self {
        Self {
            status_code: Some(status),
            endpoint: endpoint.into(),
            message: "Response body is not a resource".to_string(),
            violations: Vec::new(),
            is_cancel: false,
        }
    }

    /// Builds an error from a non-success response.
    ///
    /// The message prefers `hydra:description`, then `message`, then the reason phrase.
    pub fn from_response(status: u16, endpoint: impl Into<String>, body: Option<&Value>) -> Self {
        let description = body.and_then(|b| {
            b.get("hydra:description")
                .or_else(|| b.get("message"))
                .and_then(Value::as_str)
        });
        let violations = body
            .and_then(|b| b.get("violations"))
            .and_then(|v| serde_json::from_value::<Vec<Violation>>(v.clone()).ok())
            .unwrap_or_default();

        Self {
            status_code: Some(status),
            endpoint: endpoint.into(),
            message: description
                .map(str::to_string)
                .unwrap_or_else(|| reason_phrase(status).to_string()),
            violations,
            is_cancel: false,
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.is_cancel
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }

    /// A 4xx response that carried structured field violations.
    pub fn is_validation(&self) -> bool {
        matches!(self.status_code, Some(400..=499)) && !self.violations.is_empty()
    }

    pub fn is_server_error(&self) -> bool {
        !self.is_cancel && !self.is_not_found() && !self.is_validation()
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_cancel {
            ErrorKind::Cancel
        } else if self.is_not_found() {
            ErrorKind::NotFound
        } else if self.is_validation() {
            ErrorKind::Validation
        } else {
            ErrorKind::Server
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Request failed",
    }
}

/// Errors raised by the resource store and its actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Cannot resolve a resource from a null IRI")]
    NullIri,
    #[error("Malformed IRI: {0}")]
    MalformedIri(String),
    #[error("Resource payload has no @id")]
    MissingIri,
    #[error("Cannot resolve a type for {0}")]
    UnknownType(String),
    #[error("Store actor closed")]
    ActorClosed,
    #[error("Store actor dropped response channel")]
    ActorDropped,
}

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Cancel,
    NotFound,
    Validation,
    Server,
    Structural,
    Internal,
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum CwaError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The resource graph is missing a link the resolution needs.
    #[error("Structural error: {0}")]
    Structural(String),

    /// A local write failed. Carries the notifications that were raised so the
    /// input layer can revert its optimistic state.
    #[error("Update of {endpoint} failed: {source}")]
    Update {
        endpoint: String,
        #[source]
        source: ApiError,
        notifications: Vec<Notification>,
    },
}

impl CwaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CwaError::Api(e) => e.kind(),
            CwaError::Update { source, .. } => source.kind(),
            CwaError::Structural(_) => ErrorKind::Structural,
            CwaError::Store(_) | CwaError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Cancelled requests are a no-op for callers, not a failure.
    pub fn is_cancel(&self) -> bool {
        self.kind() == ErrorKind::Cancel
    }
}

pub type Result<T, E = CwaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_payload_is_parsed() {
        let body = json!({
            "hydra:description": "reference: This value should not be blank.",
            "violations": [{ "propertyPath": "reference", "message": "This value should not be blank." }]
        });
        let err = ApiError::from_response(422, "/_/component_groups", Some(&body));

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message, "reference: This value should not be blank.");
        assert_eq!(err.violations[0].property_path, "reference");
    }

    #[test]
    fn test_message_falls_back_to_reason_phrase() {
        let err = ApiError::from_response(500, "/_/pages/1", None);
        assert_eq!(err.message, "Internal Server Error");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_cancel_kind_propagates_through_crate_error() {
        let err: CwaError = ApiError::cancelled("/component/html_contents").into();
        assert!(err.is_cancel());
    }
}
