//! Shared Error Types
//!
//! Error types used by every layer of the sync core.
//!
//! # Error Categories
//!
//! - `RemoteError` - failures reported by the remote document, blob or identity services,
//!   already classified into retryable and logical failures
//! - `SyncError` - failures surfaced by the synchronization façade to the view layer
//!
//! # Usage
//!
//! ```rust
//! use community_sync::shared::error::RemoteError;
//!
//! let error = RemoteError::unavailable("backend returned 503");
//! assert!(error.is_transient());
//! ```
use crate::shared::models::Category;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Service unreachable or temporarily unavailable
    Unavailable,
    /// Target document does not exist
    NotFound,
    /// Caller is not allowed to perform the operation
    PermissionDenied,
    /// Anything the service did not classify
    Unknown,
}

/// Failure reported by a remote collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network unreachable or service unavailable; eligible for retry
    #[error("service unavailable: {message}")]
    Unavailable {
        /// Human-readable error message
        message: String,
    },

    /// Requested document does not exist
    #[error("not found: {path}")]
    NotFound {
        /// `collection/id` of the missing document
        path: String,
    },

    /// Caller lacks permission
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Human-readable error message
        message: String,
    },

    /// Unclassified failure
    #[error("remote error: {message}")]
    Unknown {
        /// Human-readable error message
        message: String,
    },
}

impl RemoteError {
    /// Create a new unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a new not-found error for `collection/id`
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            path: format!("{}/{}", collection, id),
        }
    }

    /// Create a new permission-denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a new unclassified error
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Classification of this error
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            Self::Unavailable { .. } => RemoteErrorKind::Unavailable,
            Self::NotFound { .. } => RemoteErrorKind::NotFound,
            Self::PermissionDenied { .. } => RemoteErrorKind::PermissionDenied,
            Self::Unknown { .. } => RemoteErrorKind::Unknown,
        }
    }

    /// Whether the failure is likely temporary and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Whether the failure is a logical rejection that no retry can fix
    pub fn is_logical(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PermissionDenied { .. })
    }
}

/// Errors surfaced by the synchronization façade
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Remote read failed and nothing was cached for the category
    #[error("no cached {category} data available")]
    NoCachedData {
        /// Category that was requested
        category: Category,
        /// Remote failure that triggered the cache fallback
        source: RemoteError,
    },

    /// Remote call failed and the failure is surfaced as-is
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No signed-in session
    #[error("not signed in")]
    NotAuthenticated,

    /// Operation needs connectivity
    #[error("{operation} is not available offline")]
    OfflineUnavailable {
        /// Name of the rejected operation
        operation: &'static str,
    },

    /// Caller is not allowed to perform the operation locally
    #[error("forbidden: {message}")]
    Forbidden {
        /// Human-readable error message
        message: String,
    },

    /// Input rejected before reaching the network
    #[error("validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// The sync context was disposed
    #[error("sync context has been disposed")]
    Disposed,
}

impl SyncError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Remote failure behind this error, if any
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) | Self::NoCachedData { source: err, .. } => Some(err),
            _ => None,
        }
    }
}
