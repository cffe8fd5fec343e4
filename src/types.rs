//! Core types for upload-orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::bytes::Bytes;

use crate::error::{Result, UploadError};
use crate::request::RequestOptions;

/// Unique identifier for an upload within one session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(pub u64);

impl UploadId {
    /// Create a new UploadId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for UploadId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer state of a single upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Created, transport not yet opened
    #[default]
    NotStarted,
    /// Transport open, bytes in flight
    InProgress,
    /// Terminal response received
    Completed,
    /// Transport failed or the response was rejected
    Failed,
}

impl UploadState {
    /// Whether no further transport events are expected in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

/// Progress of a single upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Percentage transferred (0.0 to 100.0)
    pub percent: f32,
    /// Current transfer state
    pub state: UploadState,
}

/// Terminal response recorded on an upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Response body as text
    pub body: String,
}

impl UploadResponse {
    /// Create a response record
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    /// 2xx and 3xx responses count as success
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status_code)
    }
}

/// Where a raw file's bytes come from
#[derive(Clone, Debug)]
pub enum FileData {
    /// Bytes already held in memory
    Memory(Bytes),
    /// File on disk, streamed when the transport opens
    Path(PathBuf),
}

/// A file as produced by an input source, before admission
#[derive(Clone, Debug)]
pub struct RawFile {
    /// File name as presented to the user
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Declared content type (may be empty when the source does not know it)
    pub mime_type: String,
    /// The file contents
    pub data: FileData,
}

impl RawFile {
    /// Build a raw file from in-memory bytes
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            mime_type: mime_type.into(),
            data: FileData::Memory(bytes),
        }
    }

    /// Build a raw file that refers to a file on disk
    ///
    /// The size is read from the filesystem; the name is the final path component.
    pub async fn from_path(path: impl AsRef<Path>, mime_type: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type: mime_type.into(),
            data: FileData::Path(path.to_path_buf()),
        })
    }
}

/// One file's upload attempt and its state
///
/// `Upload` values handed out by the session are snapshots; mutate them through the
/// [`Uploader`](crate::Uploader) commands so the session can publish the change and
/// abort in-flight work where needed.
#[derive(Clone, Debug, Serialize)]
pub struct Upload {
    pub(crate) id: UploadId,
    pub(crate) name: String,
    pub(crate) size: u64,
    pub(crate) mime_type: String,
    #[serde(skip)]
    pub(crate) file: RawFile,
    /// Progress and transfer state
    pub progress: Progress,
    /// Options used to build the transport request
    pub request_options: RequestOptions,
    /// Terminal response, once transport completes
    pub response: Option<UploadResponse>,
    /// Set on a rejected response or an explicit rejection
    pub rejected: bool,
    pub(crate) upload_has_started: bool,
    pub(crate) marked_for_removal: bool,
    /// Free-form caller data, typically filled in by the `on_created` hook
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub(crate) created_at: DateTime<Utc>,
    /// Incremented every time transport is opened; stale transport events are
    /// recognised by comparing against it
    #[serde(skip)]
    pub(crate) attempt: u32,
}

impl Upload {
    pub(crate) fn new(id: UploadId, file: RawFile, request_options: RequestOptions) -> Self {
        Self {
            id,
            name: file.name.clone(),
            size: file.size,
            mime_type: file.mime_type.clone(),
            file,
            progress: Progress::default(),
            request_options,
            response: None,
            rejected: false,
            upload_has_started: false,
            marked_for_removal: false,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Session-unique identifier
    pub fn id(&self) -> UploadId {
        self.id
    }

    /// File name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Declared content type
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The underlying file
    pub fn file(&self) -> &RawFile {
        &self.file
    }

    /// When the upload was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether transport was opened for the current attempt
    pub fn upload_has_started(&self) -> bool {
        self.upload_has_started
    }

    /// Whether the upload was removed
    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    /// Status code of the recorded response
    pub fn response_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status_code)
    }

    /// Completed and not failed
    pub fn succeeded(&self) -> bool {
        self.progress.state == UploadState::Completed && !self.failed()
    }

    /// Rejected, failed in transport, or answered outside 2xx/3xx
    pub fn failed(&self) -> bool {
        self.rejected
            || self.progress.state == UploadState::Failed
            || self.response.as_ref().is_some_and(|r| !r.is_success())
    }

    /// Shallow-merge `patch` into the request options (per top-level key)
    pub fn set_request_options(&mut self, patch: RequestOptions) {
        self.request_options.patch(patch);
    }

    /// Mark as rejected, optionally recording the response that caused it
    pub fn reject(&mut self, response: Option<UploadResponse>) {
        self.rejected = true;
        if response.is_some() {
            self.response = response;
        }
    }

    /// Return to the just-created state: no response, not rejected, 0%, `NotStarted`
    pub fn reset(&mut self) {
        self.progress = Progress::default();
        self.response = None;
        self.rejected = false;
        self.upload_has_started = false;
    }

    /// Flag for removal; calling it again has no further effect
    pub fn mark_for_removal(&mut self) {
        self.marked_for_removal = true;
    }

    /// Alias for [`mark_for_removal`](Self::mark_for_removal)
    pub fn remove(&mut self) {
        self.mark_for_removal();
    }

    /// The error to report for the current failure, if any
    pub(crate) fn rejection_error(&self) -> UploadError {
        UploadError::UploadRejected {
            id: self.id,
            status_code: self.response_code(),
            body: self.response.as_ref().map(|r| r.body.clone()),
        }
    }

    /// Take over the caller-visible fields of a hook's return value.
    ///
    /// Identity, the file, and the session-owned flags stay as they are.
    pub(crate) fn absorb(&mut self, returned: Upload) {
        self.progress = returned.progress;
        self.request_options = returned.request_options;
        self.response = returned.response;
        self.rejected = returned.rejected;
        self.metadata = returned.metadata;
    }
}

/// Event emitted during the upload lifecycle
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Upload admitted into the accumulated collection
    Queued {
        /// Upload ID
        id: UploadId,
        /// File name
        name: String,
    },

    /// Transport opened
    Started {
        /// Upload ID
        id: UploadId,
    },

    /// Progress update
    Progress {
        /// Upload ID
        id: UploadId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
    },

    /// Terminal 2xx/3xx response
    Completed {
        /// Upload ID
        id: UploadId,
        /// Response status
        status_code: u16,
    },

    /// Transport error or rejected response
    Failed {
        /// Upload ID
        id: UploadId,
        /// What went wrong
        error: UploadError,
    },

    /// Upload removed from the session
    Removed {
        /// Upload ID
        id: UploadId,
    },

    /// A batch was rejected because it would exceed the file-count limit
    LimitExceeded {
        /// The limit in force
        limit: usize,
        /// Number of files in the offending batch
        attempted: usize,
    },

    /// Every upload of an executed batch reached a terminal state
    AllUploaded {
        /// Final state of the batch (after the all-uploaded hook, if any)
        uploads: Vec<Upload>,
    },

    /// Session cleared
    Cleared,

    /// Session shut down
    Shutdown,
}
