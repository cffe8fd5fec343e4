//! Transport contract and implementations
//!
//! A [`Transport`] turns an [`UploadRequest`] into a running
//! [`TransportOperation`]: a stream of [`TransportEvent`]s (progress, then exactly
//! one of completion or error) plus an abort switch. The session consumes events in
//! order and stops reading as soon as it aborts, so anything a transport emits
//! after an abort is ignored.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::request::UploadRequest;
use crate::types::UploadResponse;

/// Default capacity of a transport's event channel
pub const TRANSPORT_EVENT_BUFFER: usize = 64;

/// Event reported by a running transport operation
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// Bytes sent so far; `total` is `None` when the transport cannot tell
    Progress {
        /// Bytes transferred
        loaded: u64,
        /// Total bytes, if known
        total: Option<u64>,
    },
    /// The server answered (any status)
    Complete(UploadResponse),
    /// No response at all (connection refused, reset, DNS, ...)
    Error(String),
}

/// A running transfer
#[derive(Debug)]
pub struct TransportOperation {
    events: mpsc::Receiver<TransportEvent>,
    abort: CancellationToken,
}

impl TransportOperation {
    /// Wrap an event receiver and the token that aborts the transfer
    pub fn new(events: mpsc::Receiver<TransportEvent>, abort: CancellationToken) -> Self {
        Self { events, abort }
    }

    /// Create an operation together with the sending half and abort token a
    /// transport implementation drives it with
    pub fn channel(buffer: usize) -> (mpsc::Sender<TransportEvent>, CancellationToken, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        let abort = CancellationToken::new();
        (tx, abort.clone(), Self::new(rx, abort))
    }

    /// Next event, or `None` once the transport has gone away
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Ask the transport to stop; does not wait for confirmation
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Whether [`abort`](Self::abort) was called
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// Performs the network side of one upload
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start sending `request`
    ///
    /// # Errors
    ///
    /// Returns an error only when the operation cannot be started at all; failures
    /// after that point are reported as [`TransportEvent::Error`].
    async fn open(&self, request: UploadRequest) -> Result<TransportOperation>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
