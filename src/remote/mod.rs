//! Capability interface over a remote mailbox (IMAP, POP3, WebDAV, ...).
//!
//! The engine depends only on these traits; concrete transports live in the
//! embedding application.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::error::FetchFailure;
use crate::mail::{FetchProfile, RemoteMessage, compare_uids};

/// Access mode requested when opening a remote folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Result of one message inside a batch fetch.
pub type FetchResult = std::result::Result<RemoteMessage, FetchFailure>;

/// Hands out remote folder handles by server id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn folder(&self, server_id: &str) -> Result<Box<dyn RemoteFolder>>;
}

#[async_trait]
pub trait RemoteFolder: Send {
    fn server_id(&self) -> &str;

    async fn exists(&mut self) -> Result<bool>;

    /// Open (or re-open in another mode) the folder. Authentication failures
    /// must be reported as [`crate::error::SyncError::AuthenticationFailed`].
    async fn open(&mut self, mode: OpenMode) -> Result<()>;

    async fn close(&mut self);

    /// Number of messages; message numbers run from 1 to this value in
    /// ascending recency.
    async fn message_count(&mut self) -> Result<i64>;

    /// UIDVALIDITY-like epoch; a change invalidates every cached UID.
    async fn uid_validity(&mut self) -> Result<Option<u64>> {
        Ok(None)
    }

    /// List uid-level metadata for message numbers `start..=end`, optionally
    /// restricted to messages on or after `since`.
    async fn get_messages(
        &mut self,
        start: i64,
        end: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteMessage>>;

    /// Look up a single message by uid.
    async fn get_message(&mut self, uid: &str) -> Result<RemoteMessage>;

    /// Batch fetch the items of `profile` for `messages`.
    ///
    /// The outer error aborts the pass. Per-message anomalies are returned
    /// as [`FetchFailure`]s, except that an unparseable full-content fetch
    /// should fail the whole call.
    async fn fetch(
        &mut self,
        messages: &[RemoteMessage],
        profile: FetchProfile,
        max_download_size: Option<u64>,
    ) -> Result<Vec<FetchResult>>;

    /// Fetch the decoded content of a single MIME part.
    async fn fetch_part(
        &mut self,
        message: &RemoteMessage,
        part_id: &str,
        max_download_size: Option<u64>,
    ) -> Result<Vec<u8>>;

    /// Whether messages older than message number `window_start` exist
    /// (on or after `since`).
    async fn are_more_messages_available(
        &mut self,
        window_start: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    async fn expunge(&mut self) -> Result<()>;

    /// Advance an opaque push resumption token past `message`. Transports
    /// without push support return None.
    fn new_push_state(&self, _current: Option<&str>, _message: &RemoteMessage) -> Option<String> {
        None
    }

    /// Order UIDs oldest first.
    fn compare_uids(&self, a: &str, b: &str) -> Ordering {
        compare_uids(a, b)
    }
}
