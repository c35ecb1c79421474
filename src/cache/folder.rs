//! [`LocalFolder`] backed by the SQLite cache.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::message;
use crate::local::LocalFolder;
use crate::mail::{DownloadState, MessageFlags, MoreMessages, RemoteMessage};

/// Bookkeeping row of a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderState {
    pub name: String,
    pub visible_limit: i32,
    pub more_messages: MoreMessages,
    pub push_state: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Handle to one folder of the cache.
pub struct CacheFolder {
    pool: SqlitePool,
    server_id: String,
}

impl CacheFolder {
    pub(super) fn new(pool: SqlitePool, server_id: impl Into<String>) -> Self {
        Self {
            pool,
            server_id: server_id.into(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub async fn state(&self) -> Result<FolderState> {
        let row = sqlx::query(
            r#"
            SELECT name, visible_limit, more_messages, push_state, last_checked, status
            FROM folders WHERE server_id = ?
            "#,
        )
        .bind(&self.server_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(FolderState {
            name: row.get("name"),
            visible_limit: row.get("visible_limit"),
            more_messages: MoreMessages::parse(&row.get::<String, _>("more_messages")),
            push_state: row.get("push_state"),
            last_checked: row
                .get::<Option<i64>, _>("last_checked")
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            status: row.get("status"),
        })
    }

    pub async fn set_visible_limit(&self, limit: i32) -> Result<()> {
        sqlx::query("UPDATE folders SET visible_limit = ? WHERE server_id = ?")
            .bind(limit)
            .bind(&self.server_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn message(&self, uid: &str) -> Result<Option<message::StoredMessage>> {
        message::get_message(&self.pool, &self.server_id, uid).await
    }

    pub async fn parts(&self, uid: &str) -> Result<Vec<message::StoredPart>> {
        message::get_parts(&self.pool, &self.server_id, uid).await
    }

    async fn set_column(&self, sql: &str, value: Option<&str>) -> Result<()> {
        sqlx::query(sql)
            .bind(value)
            .bind(&self.server_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LocalFolder for CacheFolder {
    async fn name(&self) -> Result<String> {
        let name: String = sqlx::query_scalar("SELECT name FROM folders WHERE server_id = ?")
            .bind(&self.server_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(name)
    }

    async fn last_uid(&self) -> Result<Option<u64>> {
        message::get_last_uid(&self.pool, &self.server_id).await
    }

    async fn all_messages_and_effective_dates(
        &self,
    ) -> Result<HashMap<String, Option<DateTime<Utc>>>> {
        message::get_uids_and_dates(&self.pool, &self.server_id).await
    }

    async fn visible_limit(&self) -> Result<i32> {
        let limit: i32 = sqlx::query_scalar("SELECT visible_limit FROM folders WHERE server_id = ?")
            .bind(&self.server_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(limit)
    }

    async fn more_messages(&self) -> Result<MoreMessages> {
        let value: String =
            sqlx::query_scalar("SELECT more_messages FROM folders WHERE server_id = ?")
                .bind(&self.server_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(MoreMessages::parse(&value))
    }

    async fn set_more_messages(&self, more_messages: MoreMessages) -> Result<()> {
        self.set_column(
            "UPDATE folders SET more_messages = ? WHERE server_id = ?",
            Some(more_messages.as_str()),
        )
        .await
    }

    async fn is_message_present(&self, uid: &str) -> Result<bool> {
        message::message_exists(&self.pool, &self.server_id, uid).await
    }

    async fn message_flags(&self, uid: &str) -> Result<MessageFlags> {
        Ok(message::get_flags(&self.pool, &self.server_id, uid)
            .await?
            .unwrap_or_default())
    }

    async fn set_message_flag(&self, uid: &str, flag: MessageFlags, value: bool) -> Result<()> {
        message::set_flag(&self.pool, &self.server_id, uid, flag, value).await
    }

    async fn save_complete_message(&self, message: &RemoteMessage) -> Result<()> {
        message::save_message(&self.pool, &self.server_id, message, DownloadState::Full).await
    }

    async fn save_partial_message(&self, message: &RemoteMessage) -> Result<()> {
        message::save_message(&self.pool, &self.server_id, message, DownloadState::Partial).await
    }

    async fn destroy_messages(&self, uids: &[String]) -> Result<()> {
        message::delete_messages(&self.pool, &self.server_id, uids).await
    }

    async fn clear_all_messages(&self) -> Result<()> {
        message::clear_folder(&self.pool, &self.server_id).await
    }

    async fn purge_to_visible_limit(&self) -> Result<Vec<String>> {
        let limit = self.visible_limit().await?;
        message::purge_to_limit(&self.pool, &self.server_id, limit).await
    }

    async fn push_state(&self) -> Result<Option<String>> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT push_state FROM folders WHERE server_id = ?")
                .bind(&self.server_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(state)
    }

    async fn set_push_state(&self, state: Option<&str>) -> Result<()> {
        self.set_column("UPDATE folders SET push_state = ? WHERE server_id = ?", state)
            .await
    }

    async fn unread_message_count(&self) -> Result<usize> {
        message::get_unread_count(&self.pool, &self.server_id).await
    }

    async fn set_last_checked(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE folders SET last_checked = ? WHERE server_id = ?")
            .bind(at.timestamp())
            .bind(&self.server_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_status(&self, status: Option<&str>) -> Result<()> {
        self.set_column("UPDATE folders SET status = ? WHERE server_id = ?", status)
            .await
    }

    async fn folder_extra_number(&self, key: &str) -> Result<Option<i64>> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM folder_extras WHERE folder = ? AND key = ?")
                .bind(&self.server_id)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set_folder_extra_number(&self, key: &str, value: i64) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO folder_extras (folder, key, value) VALUES (?, ?, ?)")
            .bind(&self.server_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
