//! Source listeners -- file pickers and drop targets feeding the session.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::source::{DragEvent, DropTarget, FilePicker};

use super::Uploader;

/// A registered input source
#[derive(Clone)]
pub(crate) enum SourceHandle {
    Picker(Arc<dyn FilePicker>),
    DropTarget(Arc<dyn DropTarget>),
}

impl SourceHandle {
    fn clear(&self) {
        match self {
            SourceHandle::Picker(picker) => picker.clear(),
            SourceHandle::DropTarget(target) => target.clear(),
        }
    }
}

/// One registration and the token that stops its listener
pub(crate) struct SourceRegistration {
    /// Address of the source, used to de-duplicate registrations
    key: usize,
    handle: SourceHandle,
    token: CancellationToken,
}

fn source_key<T: ?Sized>(source: &Arc<T>) -> usize {
    Arc::as_ptr(source) as *const () as usize
}

impl Uploader {
    /// Listen to a file picker
    ///
    /// Every selection change becomes a batch. A single-file picker replaces the
    /// collection (previous uploads are removed and their transfers aborted); a
    /// multi-file picker adds to it. Returns `false` if this picker is already
    /// registered.
    pub async fn register_picker(&self, picker: Arc<dyn FilePicker>) -> bool {
        let key = source_key(&picker);
        let mut sources = self.sources.lock().await;
        if sources.iter().any(|s| s.key == key) {
            tracing::debug!("picker already registered");
            return false;
        }

        let token = self.shutdown_token.child_token();
        let changes = picker.subscribe();
        tokio::spawn(self.clone().listen_picker(
            Arc::clone(&picker),
            changes,
            token.clone(),
        ));

        sources.push(SourceRegistration {
            key,
            handle: SourceHandle::Picker(picker),
            token,
        });
        true
    }

    /// Listen to a drop target
    ///
    /// Drops become additive batches and drag events drive the drag-over flag, both
    /// subject to the drag gate. Returns `false` if this target is already
    /// registered.
    pub async fn register_drop_target(&self, target: Arc<dyn DropTarget>) -> bool {
        let key = source_key(&target);
        let mut sources = self.sources.lock().await;
        if sources.iter().any(|s| s.key == key) {
            tracing::debug!("drop target already registered");
            return false;
        }

        let token = self.shutdown_token.child_token();
        let events = target.subscribe();
        tokio::spawn(self.clone().listen_drop_target(events, token.clone()));

        sources.push(SourceRegistration {
            key,
            handle: SourceHandle::DropTarget(target),
            token,
        });
        true
    }

    /// Open the first registered picker; returns `false` when there is none
    pub async fn open_picker(&self) -> bool {
        let sources = self.sources.lock().await;
        let picker = sources.iter().find_map(|s| match &s.handle {
            SourceHandle::Picker(picker) => Some(Arc::clone(picker)),
            SourceHandle::DropTarget(_) => None,
        });
        drop(sources);

        match picker {
            Some(picker) => {
                picker.open();
                true
            }
            None => false,
        }
    }

    /// Stop every listener, clear every source and forget the registrations
    pub(crate) async fn detach_sources(&self) {
        let registrations = std::mem::take(&mut *self.sources.lock().await);
        for registration in &registrations {
            registration.token.cancel();
        }
        for registration in registrations {
            registration.handle.clear();
        }
    }

    async fn listen_picker(
        self,
        picker: Arc<dyn FilePicker>,
        mut changes: broadcast::Receiver<()>,
        token: CancellationToken,
    ) {
        loop {
            let change = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                change = changes.recv() => change,
            };
            match change {
                Ok(()) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }

            let files = picker.files();
            if files.is_empty() {
                continue;
            }
            if let Err(e) = self.submit(files, !picker.is_multiple()).await {
                tracing::debug!(error = %e, "picker listener stopping");
                break;
            }
        }
    }

    async fn listen_drop_target(
        self,
        mut events: broadcast::Receiver<DragEvent>,
        token: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = events.recv() => event,
            };
            let event = match event {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "drop target listener lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                DragEvent::Enter | DragEvent::Over => {
                    if self.drag_allowed() {
                        self.pipeline.set_drag_over(true);
                    }
                }
                DragEvent::Leave => self.pipeline.set_drag_over(false),
                DragEvent::Drop(payload) => {
                    self.pipeline.set_drag_over(false);
                    if !self.drag_allowed() {
                        tracing::debug!("drop ignored by drag gate");
                        continue;
                    }
                    let files = payload.files();
                    if files.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.submit(files, false).await {
                        tracing::debug!(error = %e, "drop target listener stopping");
                        break;
                    }
                }
            }
        }
    }

    fn drag_allowed(&self) -> bool {
        self.pipeline.hooks.drag_gate.as_ref().is_none_or(|gate| gate())
    }
}
