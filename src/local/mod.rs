//! Capability interface over the durable per-folder message cache.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::mail::{MessageFlags, MoreMessages, RemoteMessage};

/// Hands out local folder handles by server id.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn folder(&self, server_id: &str) -> Result<Box<dyn LocalFolder>>;
}

#[async_trait]
pub trait LocalFolder: Send + Sync {
    async fn name(&self) -> Result<String>;

    /// Highest numeric UID known locally.
    async fn last_uid(&self) -> Result<Option<u64>>;

    /// Every locally known UID with its recorded effective date.
    async fn all_messages_and_effective_dates(
        &self,
    ) -> Result<HashMap<String, Option<DateTime<Utc>>>>;

    /// Negative means "not configured".
    async fn visible_limit(&self) -> Result<i32>;

    async fn more_messages(&self) -> Result<MoreMessages>;
    async fn set_more_messages(&self, more_messages: MoreMessages) -> Result<()>;

    async fn is_message_present(&self, uid: &str) -> Result<bool>;
    async fn message_flags(&self, uid: &str) -> Result<MessageFlags>;
    async fn set_message_flag(&self, uid: &str, flag: MessageFlags, value: bool) -> Result<()>;

    /// Store a fully downloaded message; marks it DOWNLOADED_FULL.
    async fn save_complete_message(&self, message: &RemoteMessage) -> Result<()>;
    /// Store a partially downloaded message; marks it DOWNLOADED_PARTIAL.
    async fn save_partial_message(&self, message: &RemoteMessage) -> Result<()>;

    async fn destroy_messages(&self, uids: &[String]) -> Result<()>;

    /// Drop every cached message of the folder.
    async fn clear_all_messages(&self) -> Result<()>;

    /// Remove messages beyond the visible limit, returning their UIDs.
    async fn purge_to_visible_limit(&self) -> Result<Vec<String>>;

    async fn push_state(&self) -> Result<Option<String>>;
    async fn set_push_state(&self, state: Option<&str>) -> Result<()>;

    async fn unread_message_count(&self) -> Result<usize>;
    async fn set_last_checked(&self, at: DateTime<Utc>) -> Result<()>;
    async fn set_status(&self, status: Option<&str>) -> Result<()>;

    async fn folder_extra_number(&self, key: &str) -> Result<Option<i64>>;
    async fn set_folder_extra_number(&self, key: &str, value: i64) -> Result<()>;
}
