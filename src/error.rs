//! Error types for upload-orchestrator
//!
//! Two families live here:
//! - [`Error`] is returned from fallible calls on the session (bad configuration,
//!   unknown upload id, missing request options, shutdown).
//! - [`UploadError`] is what flows on the session's error stream. Policy
//!   rejections, transport failures and rejected responses are reported this way
//!   and never abort sibling uploads.

use serde::Serialize;
use thiserror::Error;

use crate::types::UploadId;

/// Result type alias for upload-orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for upload-orchestrator
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "allowed_types")
        key: Option<String>,
    },

    /// Execution was attempted before any request options (at least a URL) were set
    #[error("no request options set for upload {id}")]
    MissingRequestOptions {
        /// The upload that could not be executed
        id: UploadId,
    },

    /// Upload not present in the session registry
    #[error("upload {0} not found")]
    NotFound(UploadId),

    /// Session shut down - not accepting new files or commands
    #[error("shutdown in progress: not accepting new uploads")]
    ShuttingDown,

    /// HTTP client error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (reading on-disk files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::MissingRequestOptions { .. } => "missing_request_options",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
        }
    }
}

/// Error emitted on the session's error stream
///
/// These never surface as a failed call: the offending file is dropped (policy
/// errors) or the affected upload is marked failed (transport/rejection errors)
/// and processing continues for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadError {
    /// The file's content type is not in the allowed set
    #[error("{message}")]
    DisallowedContentType {
        /// Name of the rejected file
        file_name: String,
        /// Declared content type of the rejected file
        mime_type: String,
        /// Formatted message (default or from the configured formatter)
        message: String,
    },

    /// The file meets or exceeds the configured size limit
    #[error("{message}")]
    FileSizeLimitExceeded {
        /// Name of the rejected file
        file_name: String,
        /// File size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
        /// Formatted message (default or from the configured formatter)
        message: String,
    },

    /// An automatic execution found no URL to upload to
    #[error("no request options set for upload {id}")]
    MissingRequestOptions {
        /// The upload that could not be executed
        id: UploadId,
    },

    /// Network-level failure with no response
    #[error("transport error for upload {id}: {message}")]
    TransportError {
        /// The failed upload
        id: UploadId,
        /// Description of the failure
        message: String,
    },

    /// Terminal non-2xx/3xx response, or explicit rejection by the caller
    #[error("upload {id} rejected{}", .status_code.map(|c| format!(" with status {c}")).unwrap_or_default())]
    UploadRejected {
        /// The rejected upload
        id: UploadId,
        /// Response status, if a response was recorded
        status_code: Option<u16>,
        /// Response body, if a response was recorded
        body: Option<String>,
    },
}

impl UploadError {
    /// Machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::DisallowedContentType { .. } => "disallowed_content_type",
            UploadError::FileSizeLimitExceeded { .. } => "file_size_limit_exceeded",
            UploadError::MissingRequestOptions { .. } => "missing_request_options",
            UploadError::TransportError { .. } => "transport_error",
            UploadError::UploadRejected { .. } => "upload_rejected",
        }
    }

    /// The upload this error refers to, if it got far enough to have one
    pub fn upload_id(&self) -> Option<UploadId> {
        match self {
            UploadError::DisallowedContentType { .. }
            | UploadError::FileSizeLimitExceeded { .. } => None,
            UploadError::MissingRequestOptions { id }
            | UploadError::TransportError { id, .. }
            | UploadError::UploadRejected { id, .. } => Some(*id),
        }
    }
}
