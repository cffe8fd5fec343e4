//! Lifecycle hooks and other code-valued configuration
//!
//! Hooks are plain `Arc`ed closures so a [`Hooks`] value is cheap to clone and can
//! be shared with every task the session spawns. Asynchronous hooks return a
//! [`BoxFuture`]; the builder methods box ordinary `async` closures for you.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use crate::request::RequestOptions;
use crate::types::{RawFile, Upload};

/// Dynamically evaluated file-count limit (0 = unlimited)
pub type CountLimitFn = Arc<dyn Fn() -> usize + Send + Sync>;

/// Produces request options for one upload right before its transport opens
pub type RequestOptionsFactory =
    Arc<dyn Fn(Upload) -> BoxFuture<'static, RequestOptions> + Send + Sync>;

/// Whether drag-and-drop is currently permitted; asked on every drag event
pub type DragGate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Called on every freshly built upload before it is registered
pub type CreatedHook = Arc<dyn Fn(&mut Upload) + Send + Sync>;

/// Receives the not-yet-started uploads of a round; returns the set to execute
pub type QueuedHook = Arc<dyn Fn(Vec<Upload>) -> BoxFuture<'static, Vec<Upload>> + Send + Sync>;

/// Receives one successfully finished upload; returns its published state
pub type UploadedHook = Arc<dyn Fn(Upload) -> BoxFuture<'static, Upload> + Send + Sync>;

/// Receives the aggregate of a finished round; returns its published state
pub type AllUploadedHook =
    Arc<dyn Fn(Vec<Upload>) -> BoxFuture<'static, Vec<Upload>> + Send + Sync>;

/// Called with the limit when a batch is rejected for exceeding it
pub type LimitExceededHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Formats the message of a content-type rejection
pub type TypeMessageFn = Arc<dyn Fn(&RawFile) -> String + Send + Sync>;

/// Formats the message of a size rejection; receives the limit in bytes
pub type SizeMessageFn = Arc<dyn Fn(&RawFile, u64) -> String + Send + Sync>;

/// Code-valued session configuration
#[derive(Clone, Default)]
pub struct Hooks {
    /// Overrides `Config::max_files`, evaluated each time a batch is checked
    pub file_count_limit: Option<CountLimitFn>,
    /// Per-upload async request options, merged over the upload's own options
    pub request_options_factory: Option<RequestOptionsFactory>,
    /// Gate for drag-and-drop sources
    pub drag_gate: Option<DragGate>,
    /// Entity construction hook
    pub on_created: Option<CreatedHook>,
    /// Pre-flight hook
    pub on_queued: Option<QueuedHook>,
    /// Per-file completion hook
    pub on_uploaded: Option<UploadedHook>,
    /// All-complete hook
    pub on_all_uploaded: Option<AllUploadedHook>,
    /// Count-limit hook
    pub on_limit_exceeded: Option<LimitExceededHook>,
    /// Message for content-type rejections
    pub disallowed_type_message: Option<TypeMessageFn>,
    /// Message for size rejections
    pub file_size_message: Option<SizeMessageFn>,
}

impl Hooks {
    /// Empty hook set
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the file-count limit at check time
    pub fn file_count_limit<F>(mut self, f: F) -> Self
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        self.file_count_limit = Some(Arc::new(f));
        self
    }

    /// Resolve request options per upload
    pub fn request_options_factory<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Upload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RequestOptions> + Send + 'static,
    {
        self.request_options_factory = Some(Arc::new(
            move |u| -> BoxFuture<'static, RequestOptions> { Box::pin(f(u)) },
        ));
        self
    }

    /// Gate drag-and-drop on a predicate
    pub fn drag_gate<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.drag_gate = Some(Arc::new(f));
        self
    }

    /// Customise every new upload before registration
    pub fn on_created<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Upload) + Send + Sync + 'static,
    {
        self.on_created = Some(Arc::new(f));
        self
    }

    /// Pre-flight hook
    pub fn on_queued<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Upload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Upload>> + Send + 'static,
    {
        self.on_queued = Some(Arc::new(
            move |u| -> BoxFuture<'static, Vec<Upload>> { Box::pin(f(u)) },
        ));
        self
    }

    /// Per-file completion hook
    pub fn on_uploaded<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Upload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Upload> + Send + 'static,
    {
        self.on_uploaded = Some(Arc::new(
            move |u| -> BoxFuture<'static, Upload> { Box::pin(f(u)) },
        ));
        self
    }

    /// All-complete hook
    pub fn on_all_uploaded<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Upload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Upload>> + Send + 'static,
    {
        self.on_all_uploaded = Some(Arc::new(
            move |u| -> BoxFuture<'static, Vec<Upload>> { Box::pin(f(u)) },
        ));
        self
    }

    /// Count-limit hook
    pub fn on_limit_exceeded<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_limit_exceeded = Some(Arc::new(f));
        self
    }

    /// Custom content-type rejection message
    pub fn disallowed_type_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawFile) -> String + Send + Sync + 'static,
    {
        self.disallowed_type_message = Some(Arc::new(f));
        self
    }

    /// Custom size rejection message
    pub fn file_size_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawFile, u64) -> String + Send + Sync + 'static,
    {
        self.file_size_message = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("file_count_limit", &self.file_count_limit.is_some())
            .field(
                "request_options_factory",
                &self.request_options_factory.is_some(),
            )
            .field("drag_gate", &self.drag_gate.is_some())
            .field("on_created", &self.on_created.is_some())
            .field("on_queued", &self.on_queued.is_some())
            .field("on_uploaded", &self.on_uploaded.is_some())
            .field("on_all_uploaded", &self.on_all_uploaded.is_some())
            .field("on_limit_exceeded", &self.on_limit_exceeded.is_some())
            .field(
                "disallowed_type_message",
                &self.disallowed_type_message.is_some(),
            )
            .field("file_size_message", &self.file_size_message.is_some())
            .finish()
    }
}
