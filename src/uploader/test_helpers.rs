//! Shared test helpers for creating Uploader instances in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::hooks::Hooks;
use crate::request::{RequestOptions, UploadRequest};
use crate::source::{DragEvent, DropTarget, FilePicker};
use crate::transport::{Transport, TransportEvent, TransportOperation};
use crate::types::{Event, RawFile, Upload, UploadResponse};
use crate::uploader::Uploader;

/// URL every test session uploads to
pub(crate) const TEST_URL: &str = "https://uploads.test/files";

/// How long a test waits for an expected state before failing
pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// What the mock transport does for one `open()` call
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Report progress `(loaded, total)` pairs, then complete with the response
    Respond {
        progress: Vec<(u64, u64)>,
        response: UploadResponse,
    },
    /// Report a transport error
    Fail(String),
    /// Keep the operation open; the test drives it through [`HeldOperation`]
    Hold,
}

impl Script {
    pub(crate) fn ok(status_code: u16, body: &str) -> Self {
        Script::Respond {
            progress: vec![(50, 100), (100, 100)],
            response: UploadResponse::new(status_code, body),
        }
    }
}

/// An operation opened with [`Script::Hold`]
#[derive(Clone, Debug)]
pub(crate) struct HeldOperation {
    pub(crate) events: mpsc::Sender<TransportEvent>,
    pub(crate) abort: CancellationToken,
    pub(crate) request: UploadRequest,
}

/// Transport that follows per-file scripts and records every request
pub(crate) struct MockTransport {
    default: Script,
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    requests: Mutex<Vec<UploadRequest>>,
    held: Mutex<Vec<HeldOperation>>,
    opened: watch::Sender<usize>,
}

impl MockTransport {
    /// Every upload gets `default` unless a per-file script says otherwise
    pub(crate) fn new(default: Script) -> Arc<Self> {
        let (opened, _rx) = watch::channel(0);
        Arc::new(Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            opened,
        })
    }

    /// Queue a script for the next `open()` of the named file
    pub(crate) fn script(&self, file_name: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(file_name.to_string())
            .or_default()
            .push_back(script);
    }

    pub(crate) fn requests(&self) -> Vec<UploadRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn held(&self) -> Vec<HeldOperation> {
        self.held.lock().unwrap().clone()
    }

    /// Wait until `open()` has been called at least `count` times
    pub(crate) async fn wait_opened(&self, count: usize) {
        let mut rx = self.opened.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|n| *n >= count))
            .await
            .expect("timed out waiting for transport to open")
            .expect("opened channel closed");
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, request: UploadRequest) -> Result<TransportOperation> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.body.file().name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.default.clone());
        self.requests.lock().unwrap().push(request.clone());

        let (tx, abort, operation) = TransportOperation::channel(64);
        match script {
            Script::Respond { progress, response } => {
                for (loaded, total) in progress {
                    tx.try_send(TransportEvent::Progress {
                        loaded,
                        total: Some(total),
                    })
                    .unwrap();
                }
                tx.try_send(TransportEvent::Complete(response)).unwrap();
            }
            Script::Fail(message) => {
                tx.try_send(TransportEvent::Error(message)).unwrap();
            }
            Script::Hold => {
                self.held.lock().unwrap().push(HeldOperation {
                    events: tx,
                    abort,
                    request,
                });
            }
        }

        self.opened.send_modify(|n| *n += 1);
        Ok(operation)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Picker whose selection is set by the test
pub(crate) struct FakePicker {
    selection: Mutex<Vec<RawFile>>,
    changed: broadcast::Sender<()>,
    multiple: bool,
    pub(crate) opened: AtomicUsize,
    pub(crate) cleared: AtomicUsize,
}

impl FakePicker {
    pub(crate) fn new(multiple: bool) -> Arc<Self> {
        let (changed, _rx) = broadcast::channel(16);
        Arc::new(Self {
            selection: Mutex::new(Vec::new()),
            changed,
            multiple,
            opened: AtomicUsize::new(0),
            cleared: AtomicUsize::new(0),
        })
    }

    /// Replace the selection and signal the change
    pub(crate) fn select(&self, files: Vec<RawFile>) {
        *self.selection.lock().unwrap() = files;
        self.changed.send(()).ok();
    }
}

impl FilePicker for FakePicker {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changed.subscribe()
    }

    fn files(&self) -> Vec<RawFile> {
        self.selection.lock().unwrap().clone()
    }

    fn is_multiple(&self) -> bool {
        self.multiple
    }

    fn clear(&self) {
        self.selection.lock().unwrap().clear();
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }

    fn open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }
}

/// Drop target driven by the test
pub(crate) struct FakeDropTarget {
    events: broadcast::Sender<DragEvent>,
    pub(crate) cleared: AtomicUsize,
}

impl FakeDropTarget {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _rx) = broadcast::channel(16);
        Arc::new(Self {
            events,
            cleared: AtomicUsize::new(0),
        })
    }

    pub(crate) fn send(&self, event: DragEvent) {
        self.events.send(event).ok();
    }
}

impl DropTarget for FakeDropTarget {
    fn subscribe(&self) -> broadcast::Receiver<DragEvent> {
        self.events.subscribe()
    }

    fn clear(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

/// Config pointing at [`TEST_URL`]
pub(crate) fn test_config() -> Config {
    Config {
        request_options: RequestOptions::with_url(TEST_URL),
        ..Default::default()
    }
}

pub(crate) fn create_test_uploader(
    config: Config,
    hooks: Hooks,
    transport: &Arc<MockTransport>,
) -> Uploader {
    let transport: Arc<dyn Transport> = transport.clone();
    Uploader::with_transport(config, hooks, transport).unwrap()
}

pub(crate) fn text_file(name: &str) -> RawFile {
    RawFile::from_bytes(name, "text/plain", format!("contents of {name}").into_bytes())
}

/// Wait until the published collection satisfies `predicate`
pub(crate) async fn wait_for_uploads<F>(uploader: &Uploader, predicate: F) -> Vec<Upload>
where
    F: Fn(&[Upload]) -> bool,
{
    let mut rx = uploader.watch_uploads();
    let uploads = tokio::time::timeout(WAIT, rx.wait_for(|uploads| predicate(uploads.as_slice())))
        .await
        .expect("timed out waiting for uploads")
        .expect("uploads channel closed");
    uploads.clone()
}

/// Wait until the drag-over flag equals `expected`
pub(crate) async fn wait_for_drag_over(uploader: &Uploader, expected: bool) {
    let mut rx = uploader.watch_drag_over();
    tokio::time::timeout(WAIT, rx.wait_for(|v| *v == expected))
        .await
        .expect("timed out waiting for drag-over")
        .expect("drag-over channel closed");
}

/// Receive events until one matches `predicate`
pub(crate) async fn next_event<F>(events: &mut broadcast::Receiver<Event>, predicate: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Receive the next error from the error stream
pub(crate) async fn next_error(errors: &mut broadcast::Receiver<UploadError>) -> UploadError {
    tokio::time::timeout(WAIT, errors.recv())
        .await
        .expect("timed out waiting for error")
        .expect("error channel closed")
}

/// Wait until a transport operation has been aborted
pub(crate) async fn wait_aborted(operation: &HeldOperation) {
    tokio::time::timeout(WAIT, operation.abort.cancelled())
        .await
        .expect("timed out waiting for abort");
}
