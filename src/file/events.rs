//! Live change feed for file records.

use tokio::sync::broadcast;

use super::FileRecord;
use crate::auth::Caller;

/// Buffered events per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// A record was created.
    Created,
    /// A record's status or folder changed.
    Updated,
    /// A record was deleted.
    Deleted,
}

impl FileEventKind {
    /// Event name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileEventKind::Created => "created",
            FileEventKind::Updated => "updated",
            FileEventKind::Deleted => "deleted",
        }
    }
}

/// A change to one file record.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// Kind of change.
    pub kind: FileEventKind,
    /// Record after the change (before it, for deletions).
    pub file: FileRecord,
}

impl FileEvent {
    /// Whether `caller` may see this event.
    pub fn visible_to(&self, caller: &Caller) -> bool {
        caller.can_access(&self.file.owner_id)
    }
}

/// Broadcast hub for file events.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<FileEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    /// Create a feed with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Get a receiver for all events. Filter with [`FileEvent::visible_to`].
    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers that got it.
    pub fn publish(&self, kind: FileEventKind, file: &FileRecord) -> usize {
        self.sender
            .send(FileEvent {
                kind,
                file: file.clone(),
            })
            .unwrap_or(0)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
