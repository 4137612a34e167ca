//! Error types for the logs provider.
//!
//! [`ProviderError`] carries the full failure taxonomy of the reconciliation
//! engine. Two variants deserve special attention from callers:
//!
//! - [`ProviderError::NotFound`] is never fatal by itself. Its meaning depends
//!   on the operation (removed on refresh, success on delete, inconsistent
//!   write right after create), so callers match on it explicitly, usually via
//!   [`ProviderError::is_not_found`].
//! - [`ProviderError::Operation`] wraps another error with the lifecycle action
//!   and resource instance that failed. Classification helpers look through it.

use std::fmt;

use thiserror::Error;

/// The lifecycle action that was running when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Creating (or putting) a resource.
    Creating,
    /// Reading a resource.
    Reading,
    /// Updating a resource in place.
    Updating,
    /// Deleting a resource.
    Deleting,
    /// Importing an existing resource.
    Importing,
    /// Listing resources for a data source.
    Listing,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Reading => "reading",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Importing => "importing",
            Self::Listing => "listing",
        };
        f.write_str(s)
    }
}

/// The remote object does not exist.
///
/// Carries the request that produced the miss so diagnostics can show what
/// was asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct NotFoundError {
    /// Human-readable description of the miss.
    pub message: String,
    /// The originating request, if known.
    pub request: Option<serde_json::Value>,
}

impl NotFoundError {
    /// Create a not-found error without request context.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            request: None,
        }
    }

    /// Attach the originating request.
    pub fn with_request(mut self, request: serde_json::Value) -> Self {
        self.request = Some(request);
        self
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(request) = &self.request {
            write!(f, " (request: {})", request)?;
        }
        Ok(())
    }
}

/// Errors produced by the reconciliation engine and remote service clients.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(NotFoundError),

    /// A finder matched more objects than the key allows.
    #[error("Ambiguous result: {0}")]
    AmbiguousResult(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A structured document could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An externally supplied identifier is malformed.
    #[error("Invalid identifier: {0}")]
    Format(String),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Request rate limited by the remote service.
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Service temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out or was cancelled before any mutation was sent.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A mutation may or may not have been applied remotely.
    #[error("Unknown state, verify manually: {0}")]
    UnknownState(String),

    /// The remote write succeeded but the object could not be read back.
    #[error("Resource {identity} is tainted: written but not readable: {source}")]
    Tainted {
        /// Encoded identity of the written object.
        identity: String,
        /// The read-back failure.
        source: Box<ProviderError>,
    },

    /// An error annotated with the action and resource instance that failed.
    #[error("{action} {resource_type} ({id}): {source}")]
    Operation {
        /// The lifecycle action.
        action: Action,
        /// The resource type name.
        resource_type: String,
        /// Encoded identity, or a spec summary when no identity exists yet.
        id: String,
        /// The underlying failure.
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Shorthand for a [`ProviderError::NotFound`] without request context.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(NotFoundError::new(message))
    }

    /// Annotate this error with the action and resource instance that failed.
    ///
    /// Errors that are already annotated are returned unchanged.
    pub fn context(self, action: Action, resource_type: &str, id: impl Into<String>) -> Self {
        match self {
            err @ Self::Operation { .. } => err,
            err => Self::Operation {
                action,
                resource_type: resource_type.to_string(),
                id: id.into(),
                source: Box::new(err),
            },
        }
    }

    /// Strip [`ProviderError::Operation`] annotations.
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the remote object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            Self::Unavailable(_) | Self::ResourceExhausted(_) | Self::Throttled(_)
        )
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(err) => &err.message,
            Self::AmbiguousResult(msg)
            | Self::Validation(msg)
            | Self::Sdk(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Parse(msg)
            | Self::Format(msg)
            | Self::AlreadyExists(msg)
            | Self::PermissionDenied(msg)
            | Self::ResourceExhausted(msg)
            | Self::Throttled(msg)
            | Self::Unavailable(msg)
            | Self::DeadlineExceeded(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg)
            | Self::InvalidRequest(msg)
            | Self::UnknownState(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Tainted { source, .. } | Self::Operation { source, .. } => source.message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::not_found("log group grp-1");
        assert_eq!(format!("{}", err), "Resource not found: log group grp-1");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::Format("expected 2 parts".to_string());
        assert_eq!(format!("{}", err), "Invalid identifier: expected 2 parts");
    }

    #[test]
    fn test_not_found_carries_request() {
        let err = NotFoundError::new("no metric filter")
            .with_request(serde_json::json!({"log_group_name": "grp"}));
        assert_eq!(
            err.to_string(),
            r#"no metric filter (request: {"log_group_name":"grp"})"#
        );
    }

    #[test]
    fn test_context_wraps_once() {
        let err = ProviderError::Unavailable("503".to_string())
            .context(Action::Creating, "logs_metric_filter", "grp:f1")
            .context(Action::Reading, "other", "x");

        assert_eq!(
            err.to_string(),
            "creating logs_metric_filter (grp:f1): Service unavailable: 503"
        );
        assert_eq!(err.message(), "503");
    }

    #[test]
    fn test_classification_sees_through_context() {
        let err = ProviderError::not_found("gone").context(Action::Reading, "t", "id");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());

        let err = ProviderError::Throttled("slow down".to_string()).context(
            Action::Updating,
            "t",
            "id",
        );
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_tainted_is_not_not_found() {
        let err = ProviderError::Tainted {
            identity: "p1".to_string(),
            source: Box::new(ProviderError::not_found("p1")),
        };
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("p1 is tainted"));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Creating.to_string(), "creating");
        assert_eq!(Action::Deleting.to_string(), "deleting");
        assert_eq!(Action::Listing.to_string(), "listing");
    }
}
