//! # upload-orchestrator
//!
//! Async orchestration core for concurrent file uploads.
//!
//! ## Design Philosophy
//!
//! upload-orchestrator is designed to be:
//! - **Transport-agnostic** - HTTP out of the box, any [`Transport`] can be plugged in
//! - **Sensible defaults** - Accepts every type, no limits, multipart POST bodies
//! - **Library-first** - Input sources are traits; there is no UI in this crate
//! - **Event-driven** - Consumers subscribe to events and collection snapshots
//!
//! ## Quick Start
//!
//! ```no_run
//! use upload_orchestrator::{Config, Hooks, RawFile, RequestOptions, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         allowed_types: vec!["image/*".to_string()],
//!         max_files: 10,
//!         request_options: RequestOptions::with_url("https://example.com/upload"),
//!         ..Default::default()
//!     }
//!     .max_file_size_mib(25);
//!
//!     let uploader = Uploader::new(config, Hooks::new())?;
//!
//!     // Subscribe to events
//!     let mut events = uploader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let file = RawFile::from_path("holiday.jpg", "image/jpeg").await?;
//!     uploader.add_files(vec![file]).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Consumer callbacks
pub mod hooks;
/// Admission policy (content type and size)
pub mod policy;
/// Request options and request construction
pub mod request;
/// Input source contracts (file pickers, drop targets)
pub mod source;
/// Transport contract and the HTTP implementation
pub mod transport;
/// Core types and events
pub mod types;
/// Upload session (decomposed into focused submodules)
pub mod uploader;

// Re-export commonly used types
pub use config::{Config, MIB};
pub use error::{Error, Result, UploadError};
pub use hooks::Hooks;
pub use policy::PolicyFilter;
pub use request::{BodyMode, HttpMethod, RequestBody, RequestOptions, UploadRequest};
pub use source::{DragEvent, DropItem, DropPayload, DropTarget, FilePicker};
pub use transport::{HttpTransport, Transport, TransportEvent, TransportOperation};
pub use types::{
    Event, FileData, Progress, RawFile, Upload, UploadId, UploadResponse, UploadState,
};
pub use uploader::Uploader;
