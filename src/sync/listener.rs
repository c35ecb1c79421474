//! Event sink notified of synchronization milestones.

/// Receives progress of a pass. Every method defaults to a no-op so sinks
/// only implement what they display.
pub trait SyncListener: Send + Sync {
    fn sync_started(&self, _folder: &str) {}
    fn sync_authentication_success(&self) {}
    fn sync_headers_started(&self, _folder: &str) {}
    fn sync_headers_progress(&self, _folder: &str, _completed: usize, _total: usize) {}
    fn sync_headers_finished(&self, _folder: &str, _completed: usize, _total: usize) {}
    fn sync_progress(&self, _folder: &str, _completed: usize, _total: usize) {}
    fn sync_new_message(&self, _folder: &str, _uid: &str, _is_old: bool) {}
    fn sync_removed_message(&self, _folder: &str, _uid: &str) {}
    fn sync_flag_changed(&self, _folder: &str, _uid: &str) {}
    fn folder_status_changed(&self, _folder: &str, _unread_count: usize) {}
    fn sync_finished(&self, _folder: &str, _total_count: i64, _new_count: usize) {}
    fn sync_failed(&self, _folder: &str, _reason: &str, _cause: &anyhow::Error) {}
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SyncListener for NoopListener {}
