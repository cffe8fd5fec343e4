//! Input sources: file pickers and drop targets
//!
//! The session only needs the capabilities described by these traits, not a
//! concrete UI toolkit. Implementations publish change notifications on a
//! `tokio::sync::broadcast` channel; the session subscribes once per registration.

use tokio::sync::broadcast;

use crate::types::RawFile;

/// A file-picker-like input
///
/// # Examples
///
/// ```
/// use std::sync::Mutex;
/// use tokio::sync::broadcast;
/// use upload_orchestrator::{FilePicker, RawFile};
///
/// struct MemoryPicker {
///     selection: Mutex<Vec<RawFile>>,
///     changed: broadcast::Sender<()>,
/// }
///
/// impl FilePicker for MemoryPicker {
///     fn subscribe(&self) -> broadcast::Receiver<()> {
///         self.changed.subscribe()
///     }
///     fn files(&self) -> Vec<RawFile> {
///         self.selection.lock().map(|s| s.clone()).unwrap_or_default()
///     }
///     fn is_multiple(&self) -> bool {
///         true
///     }
///     fn clear(&self) {
///         if let Ok(mut s) = self.selection.lock() {
///             s.clear();
///         }
///     }
///     fn open(&self) {}
/// }
/// ```
pub trait FilePicker: Send + Sync {
    /// Notification stream, one message per "selection changed" event
    fn subscribe(&self) -> broadcast::Receiver<()>;

    /// The current selection
    fn files(&self) -> Vec<RawFile>;

    /// Whether the picker accepts several files (additive batches) or one (replacing)
    fn is_multiple(&self) -> bool;

    /// Reset to an empty selection
    fn clear(&self);

    /// Open the picker, the equivalent of clicking it
    fn open(&self);
}

/// A drop-target-like input
pub trait DropTarget: Send + Sync {
    /// Stream of drag-and-drop events
    fn subscribe(&self) -> broadcast::Receiver<DragEvent>;

    /// Reset any selection state the target keeps
    fn clear(&self) {}
}

/// Drag-and-drop event
#[derive(Clone, Debug)]
pub enum DragEvent {
    /// Pointer entered the target while dragging
    Enter,
    /// Pointer moved over the target while dragging
    Over,
    /// Pointer left the target
    Leave,
    /// Payload dropped onto the target
    Drop(DropPayload),
}

/// One item carried by a drop
#[derive(Clone, Debug)]
pub enum DropItem {
    /// A file
    File(RawFile),
    /// Dragged text or a link; never uploaded
    Text(String),
}

/// What was dropped
#[derive(Clone, Debug, Default)]
pub struct DropPayload {
    /// Dropped items in source order
    pub items: Vec<DropItem>,
}

impl DropPayload {
    /// Payload consisting only of files
    pub fn from_files(files: Vec<RawFile>) -> Self {
        Self {
            items: files.into_iter().map(DropItem::File).collect(),
        }
    }

    /// Extract the files, skipping non-file items
    pub fn files(&self) -> Vec<RawFile> {
        self.items
            .iter()
            .filter_map(|item| match item {
                DropItem::File(f) => Some(f.clone()),
                DropItem::Text(_) => None,
            })
            .collect()
    }
}
