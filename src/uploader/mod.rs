//! Upload session split into focused submodules.
//!
//! The `Uploader` struct and its methods are organized by domain:
//! - [`accumulator`] - Batch folding, count limits and the session loop
//! - [`executor`] - Per-upload transport lifecycle and completion hooks
//! - [`control`] - Remove, retry, reset, reject, clear and shutdown
//! - [`sources`] - File picker and drop target listeners

mod accumulator;
mod control;
mod executor;
mod sources;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result, UploadError};
use crate::hooks::Hooks;
use crate::policy::PolicyFilter;
use crate::request::RequestOptions;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Event, RawFile, Upload, UploadId, UploadState};

use sources::SourceRegistration;

/// Registry and accumulated collection, guarded by one mutex
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Every live upload, including ones whose batch has not been folded yet
    pub(crate) registry: HashMap<UploadId, Upload>,
    /// The accumulated collection in first-seen order
    pub(crate) collection: Vec<UploadId>,
}

impl SessionState {
    /// Current non-removed collection, in order
    pub(crate) fn snapshot(&self) -> Vec<Upload> {
        self.collection
            .iter()
            .filter_map(|id| self.registry.get(id))
            .filter(|u| !u.marked_for_removal)
            .cloned()
            .collect()
    }

    /// Collection entries that have never been handed to transport
    pub(crate) fn pending(&self) -> Vec<UploadId> {
        self.collection
            .iter()
            .filter(|id| {
                self.registry.get(id).is_some_and(|u| {
                    !u.marked_for_removal
                        && !u.upload_has_started
                        && u.progress.state == UploadState::NotStarted
                })
            })
            .copied()
            .collect()
    }

    /// Write a hook's returned snapshot back into the registry
    ///
    /// The snapshot only applies to the attempt it was taken from: once the upload
    /// has been retried, reset or removed, the hook's view is stale and dropped. A
    /// snapshot the hook marked for removal removes the upload.
    pub(crate) fn write_back(&mut self, returned: Upload, attempt: u32) -> WriteBack {
        let Some(entry) = self.registry.get_mut(&returned.id) else {
            return WriteBack::Stale;
        };
        if entry.marked_for_removal || entry.attempt != attempt {
            return WriteBack::Stale;
        }

        if returned.marked_for_removal {
            entry.mark_for_removal();
            entry.attempt += 1;
            WriteBack::Removed
        } else {
            entry.absorb(returned);
            WriteBack::Absorbed
        }
    }
}

/// Result of [`SessionState::write_back`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteBack {
    Absorbed,
    /// The hook removed the upload; its transfer must be cancelled and the
    /// collection pruned
    Removed,
    Stale,
}

/// Messages processed in arrival order by the session loop
#[derive(Debug)]
pub(crate) enum Command {
    /// Fold a batch of freshly registered uploads into the collection
    Batch {
        ids: Vec<UploadId>,
        /// Single-file picker semantics: the batch replaces the collection
        replace: bool,
        ack: Option<oneshot::Sender<Vec<UploadId>>>,
    },
    /// Drop removed entries from the collection and republish
    Prune,
    /// Empty the session
    Reset { ack: oneshot::Sender<()> },
}

/// An in-flight transport, keyed by upload in [`Pipeline::active`]
#[derive(Debug)]
pub(crate) struct ActiveTransfer {
    pub(crate) attempt: u32,
    pub(crate) token: CancellationToken,
}

/// Shared state every session task works against (all fields are Arc-wrapped)
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) hooks: Arc<Hooks>,
    pub(crate) policy: Arc<PolicyFilter>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) state: Arc<Mutex<SessionState>>,
    /// Cancellation tokens of running transfers (lock after `state`, never before)
    pub(crate) active: Arc<Mutex<HashMap<UploadId, ActiveTransfer>>>,
    /// Session-level request options, merged last
    pub(crate) overrides: Arc<RwLock<RequestOptions>>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) error_tx: broadcast::Sender<UploadError>,
    pub(crate) uploads_tx: Arc<watch::Sender<Vec<Upload>>>,
    pub(crate) drag_tx: Arc<watch::Sender<bool>>,
}

impl Pipeline {
    /// Emit an event to all subscribers
    ///
    /// send() fails only when nobody is subscribed, in which case the event is dropped.
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Put an error on the error stream
    pub(crate) fn report(&self, error: UploadError) {
        tracing::warn!(code = error.code(), error = %error, "upload error");
        self.error_tx.send(error).ok();
    }

    /// Publish the current collection to watchers
    pub(crate) fn publish(&self, state: &SessionState) {
        self.uploads_tx.send_replace(state.snapshot());
    }

    pub(crate) fn set_drag_over(&self, value: bool) {
        self.drag_tx.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// File-count limit in force right now (0 = unlimited)
    pub(crate) fn count_limit(&self) -> usize {
        match &self.hooks.file_count_limit {
            Some(limit) => limit(),
            None => self.config.max_files,
        }
    }

    /// Cancel the transfer of one upload, if one is running
    pub(crate) async fn cancel(&self, id: UploadId) {
        let mut active = self.active.lock().await;
        if let Some(transfer) = active.remove(&id) {
            tracing::debug!(upload_id = id.0, "cancelling active transfer");
            transfer.token.cancel();
        }
    }

    /// Finish removing uploads already marked in the registry: abort their
    /// transfers, prune them from the collection and announce them
    pub(crate) async fn retire(&self, ids: Vec<UploadId>) {
        if ids.is_empty() {
            return;
        }
        for id in &ids {
            self.cancel(*id).await;
        }
        self.prune().await;
        for id in ids {
            tracing::info!(upload_id = id.0, "upload removed by hook");
            self.emit(Event::Removed { id });
        }
    }

    /// Cancel every running transfer
    pub(crate) async fn cancel_all(&self) {
        let mut active = self.active.lock().await;
        tracing::debug!(active_count = active.len(), "cancelling all active transfers");
        for (_, transfer) in active.drain() {
            transfer.token.cancel();
        }
    }
}

/// An upload session (cloneable - all fields are Arc-wrapped)
///
/// The session owns the registry of uploads, runs a loop that folds incoming
/// batches into one accumulated collection, starts transport for every upload that
/// has not been started yet and publishes the collection, drag-over state, errors
/// and lifecycle events on channels.
#[derive(Clone)]
pub struct Uploader {
    pub(crate) pipeline: Pipeline,
    /// Registered pickers and drop targets
    pub(crate) sources: Arc<Mutex<Vec<SourceRegistration>>>,
    next_id: Arc<AtomicU64>,
    command_tx: mpsc::UnboundedSender<Command>,
    /// Set to false during shutdown
    accepting_new: Arc<AtomicBool>,
    /// Stops the session loop and every source listener
    pub(crate) shutdown_token: CancellationToken,
}

impl Uploader {
    /// Create a session that uploads over HTTP
    ///
    /// Must be called from within a Tokio runtime: the session loop is spawned
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is invalid, or
    /// [`Error::Network`] when the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use upload_orchestrator::{Config, Hooks, RawFile, RequestOptions, Uploader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = Config {
    ///         allowed_types: vec!["image/*".to_string()],
    ///         request_options: RequestOptions::with_url("https://example.com/upload"),
    ///         ..Default::default()
    ///     };
    ///     let uploader = Uploader::new(config, Hooks::new())?;
    ///
    ///     let mut events = uploader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("Event: {:?}", event);
    ///         }
    ///     });
    ///
    ///     let file = RawFile::from_path("photo.jpg", "image/jpeg").await?;
    ///     uploader.add_files(vec![file]).await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(config: Config, hooks: Hooks) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Self::with_transport(config, hooks, Arc::new(transport))
    }

    /// Create a session on a custom transport
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is invalid.
    pub fn with_transport(
        config: Config,
        hooks: Hooks,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);
        let (error_tx, _rx) = broadcast::channel(config.event_buffer);
        let (uploads_tx, _rx) = watch::channel(Vec::new());
        let (drag_tx, _rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let policy = PolicyFilter::new(&config, &hooks);

        tracing::info!(
            transport = transport.name(),
            allowed_types = ?config.allowed_types,
            max_files = config.max_files,
            max_file_size = ?config.max_file_size,
            "upload session created"
        );

        let pipeline = Pipeline {
            config: Arc::new(config),
            hooks: Arc::new(hooks),
            policy: Arc::new(policy),
            transport,
            state: Arc::new(Mutex::new(SessionState::default())),
            active: Arc::new(Mutex::new(HashMap::new())),
            overrides: Arc::new(RwLock::new(RequestOptions::default())),
            event_tx,
            error_tx,
            uploads_tx: Arc::new(uploads_tx),
            drag_tx: Arc::new(drag_tx),
        };

        let shutdown_token = CancellationToken::new();
        tokio::spawn(accumulator::run(
            pipeline.clone(),
            command_rx,
            shutdown_token.clone(),
        ));

        Ok(Self {
            pipeline,
            sources: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            command_tx,
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token,
        })
    }

    /// Subscribe to lifecycle events
    ///
    /// Each subscriber receives all events independently. A subscriber that falls
    /// behind by more than `Config::event_buffer` events gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.pipeline.event_tx.subscribe()
    }

    /// Lifecycle events as a stream; lagged events are skipped
    pub fn event_stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|event| async move { event.ok() })
    }

    /// Subscribe to the error stream (policy rejections, transport failures,
    /// rejected responses, missing request options)
    pub fn errors(&self) -> broadcast::Receiver<UploadError> {
        self.pipeline.error_tx.subscribe()
    }

    /// The current collection (non-removed uploads, in first-seen order)
    pub fn uploads(&self) -> Vec<Upload> {
        self.pipeline.uploads_tx.borrow().clone()
    }

    /// Watch the collection
    pub fn watch_uploads(&self) -> watch::Receiver<Vec<Upload>> {
        self.pipeline.uploads_tx.subscribe()
    }

    /// The collection as a stream, starting with the current value
    pub fn uploads_stream(&self) -> WatchStream<Vec<Upload>> {
        WatchStream::new(self.watch_uploads())
    }

    /// Whether a permitted drag is currently over a registered drop target
    pub fn drag_over(&self) -> bool {
        *self.pipeline.drag_tx.borrow()
    }

    /// Watch the drag-over flag
    pub fn watch_drag_over(&self) -> watch::Receiver<bool> {
        self.pipeline.drag_tx.subscribe()
    }

    /// Snapshot of one upload, including ones not (or no longer) in the collection
    pub async fn get(&self, id: UploadId) -> Option<Upload> {
        self.pipeline.state.lock().await.registry.get(&id).cloned()
    }

    /// Get the session configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.pipeline.config)
    }

    /// Add files programmatically
    ///
    /// Runs the same pipeline as picker and drop-target input: every file is
    /// screened by the policy filter (rejections go to the error stream), the
    /// survivors become uploads and are folded into the collection as one batch.
    /// Returns the ids that entered the collection, which is empty when the batch
    /// was rejected by the file-count limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown).
    pub async fn add_files(&self, files: Vec<RawFile>) -> Result<Vec<UploadId>> {
        self.submit(files, false).await
    }

    /// Screen, register and fold one batch
    pub(crate) async fn submit(&self, files: Vec<RawFile>, replace: bool) -> Result<Vec<UploadId>> {
        self.ensure_accepting()?;

        let uploads = self.admit(files);
        let ids: Vec<UploadId> = uploads.iter().map(|u| u.id).collect();
        {
            let mut state = self.pipeline.state.lock().await;
            for upload in uploads {
                state.registry.insert(upload.id, upload);
            }
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Batch {
            ids,
            replace,
            ack: Some(ack_tx),
        })?;
        ack_rx.await.map_err(|_| Error::ShuttingDown)
    }

    /// Apply the policy filter and build uploads for the accepted files
    fn admit(&self, files: Vec<RawFile>) -> Vec<Upload> {
        let mut admitted = Vec::with_capacity(files.len());
        for file in files {
            if let Err(rejection) = self.pipeline.policy.check(&file) {
                self.pipeline.report(rejection);
                continue;
            }

            let id = UploadId(self.next_id.fetch_add(1, Ordering::SeqCst));
            let mut upload = Upload::new(id, file, self.pipeline.config.request_options.clone());
            if let Some(on_created) = &self.pipeline.hooks.on_created {
                on_created(&mut upload);
            }
            tracing::debug!(upload_id = id.0, name = %upload.name, size = upload.size, "file admitted");
            admitted.push(upload);
        }
        admitted
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    pub(crate) fn send(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).map_err(|_| Error::ShuttingDown)
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("transport", &self.pipeline.transport.name())
            .field("config", &self.pipeline.config)
            .field("accepting_new", &self.accepting_new.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
