//! Message row operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::constants::LOCAL_UID_PREFIX;
use crate::mail::parser::summarize_body;
use crate::mail::{DownloadState, MessageBody, MessageFlags, RemoteMessage};

/// A cached message as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub uid: String,
    pub flags: MessageFlags,
    pub date: Option<DateTime<Utc>>,
    pub size: u64,
    pub subject: String,
    pub from_addr: Option<String>,
    pub from_name: Option<String>,
    pub preview: Option<String>,
    pub raw_message: Option<Vec<u8>>,
}

/// A stored MIME part of a partially downloaded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPart {
    pub part_id: String,
    pub mime_type: String,
    pub disposition: Option<String>,
    pub size: u64,
    pub content: Option<Vec<u8>>,
}

fn row_to_stored_message(row: SqliteRow) -> StoredMessage {
    StoredMessage {
        uid: row.get("uid"),
        flags: flags_from_db(row.get("flags")),
        date: row
            .get::<Option<i64>, _>("date")
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        size: row.get::<i64, _>("size").max(0) as u64,
        subject: row.get("subject"),
        from_addr: row.get("from_addr"),
        from_name: row.get("from_name"),
        preview: row.get("preview"),
        raw_message: row.get("raw_message"),
    }
}

fn flags_from_db(bits: i64) -> MessageFlags {
    MessageFlags::from_bits_truncate(bits as u32)
}

fn flags_to_db(flags: MessageFlags) -> i64 {
    i64::from(flags.bits())
}

pub async fn get_message(pool: &SqlitePool, folder: &str, uid: &str) -> Result<Option<StoredMessage>> {
    let row = sqlx::query(
        r#"
        SELECT uid, flags, date, size, subject, from_addr, from_name, preview, raw_message
        FROM messages WHERE folder = ? AND uid = ?
        "#,
    )
    .bind(folder)
    .bind(uid)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_stored_message))
}

pub async fn get_parts(pool: &SqlitePool, folder: &str, uid: &str) -> Result<Vec<StoredPart>> {
    let rows = sqlx::query(
        r#"
        SELECT part_id, mime_type, disposition, size, content
        FROM message_parts WHERE folder = ? AND uid = ?
        ORDER BY part_id
        "#,
    )
    .bind(folder)
    .bind(uid)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| StoredPart {
            part_id: row.get("part_id"),
            mime_type: row.get("mime_type"),
            disposition: row.get("disposition"),
            size: row.get::<i64, _>("size").max(0) as u64,
            content: row.get("content"),
        })
        .collect())
}

pub async fn get_flags(pool: &SqlitePool, folder: &str, uid: &str) -> Result<Option<MessageFlags>> {
    let bits: Option<i64> = sqlx::query_scalar("SELECT flags FROM messages WHERE folder = ? AND uid = ?")
        .bind(folder)
        .bind(uid)
        .fetch_optional(pool)
        .await?;
    Ok(bits.map(flags_from_db))
}

/// Store fetched content for a message.
///
/// Remote flags are taken from the message. A partial save never downgrades
/// a message that is already stored in full.
pub async fn save_message(
    pool: &SqlitePool,
    folder: &str,
    message: &RemoteMessage,
    state: DownloadState,
) -> Result<()> {
    let previous = get_flags(pool, folder, &message.uid).await?;
    let remote_flags = message.flags - MessageFlags::LOCAL_ONLY;

    if state == DownloadState::Partial
        && previous.is_some_and(|flags| flags.contains(MessageFlags::DOWNLOADED_FULL))
    {
        tracing::debug!("Message {} already stored in full, updating flags only", message.uid);
        set_flags(pool, folder, &message.uid, remote_flags | MessageFlags::DOWNLOADED_FULL).await?;
        return Ok(());
    }

    let summary = summarize_body(message.body.as_ref());
    let flags = remote_flags | state.flag();
    let date = message.effective_date().or(summary.sent_date);
    let raw = match &message.body {
        Some(MessageBody::Raw(raw)) => Some(raw.as_slice()),
        _ => None,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO messages
        (folder, uid, flags, date, internal_date, size, subject, from_addr, from_name, preview, raw_message)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(folder, uid) DO UPDATE SET
            flags = excluded.flags,
            date = excluded.date,
            internal_date = excluded.internal_date,
            size = excluded.size,
            subject = excluded.subject,
            from_addr = excluded.from_addr,
            from_name = excluded.from_name,
            preview = excluded.preview,
            raw_message = excluded.raw_message
        "#,
    )
    .bind(folder)
    .bind(&message.uid)
    .bind(flags_to_db(flags))
    .bind(date.map(|d| d.timestamp()))
    .bind(message.internal_date.map(|d| d.timestamp()))
    .bind(i64::try_from(message.size).unwrap_or(i64::MAX))
    .bind(&summary.subject)
    .bind(&summary.from_addr)
    .bind(&summary.from_name)
    .bind(&summary.preview)
    .bind(raw)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM message_parts WHERE folder = ? AND uid = ?")
        .bind(folder)
        .bind(&message.uid)
        .execute(&mut *tx)
        .await?;

    if let Some(MessageBody::Structure(structure)) = &message.body {
        for part in structure.walk().into_iter().filter(|p| !p.is_multipart()) {
            sqlx::query(
                r#"
                INSERT INTO message_parts (folder, uid, part_id, mime_type, disposition, size, content)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(folder)
            .bind(&message.uid)
            .bind(&part.part_id)
            .bind(&part.mime_type)
            .bind(&part.disposition)
            .bind(i64::try_from(part.size).unwrap_or(i64::MAX))
            .bind(part.content.as_deref())
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

pub async fn set_flags(pool: &SqlitePool, folder: &str, uid: &str, flags: MessageFlags) -> Result<()> {
    sqlx::query("UPDATE messages SET flags = ? WHERE folder = ? AND uid = ?")
        .bind(flags_to_db(flags))
        .bind(folder)
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(())
}

/// Set or clear one flag without touching the others.
pub async fn set_flag(
    pool: &SqlitePool,
    folder: &str,
    uid: &str,
    flag: MessageFlags,
    value: bool,
) -> Result<()> {
    let sql = if value {
        "UPDATE messages SET flags = flags | ? WHERE folder = ? AND uid = ?"
    } else {
        "UPDATE messages SET flags = flags & ~? WHERE folder = ? AND uid = ?"
    };
    sqlx::query(sql)
        .bind(flags_to_db(flag))
        .bind(folder)
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn message_exists(pool: &SqlitePool, folder: &str, uid: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM messages WHERE folder = ? AND uid = ?")
        .bind(folder)
        .bind(uid)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn get_uids_and_dates(
    pool: &SqlitePool,
    folder: &str,
) -> Result<HashMap<String, Option<DateTime<Utc>>>> {
    let rows = sqlx::query("SELECT uid, date FROM messages WHERE folder = ?")
        .bind(folder)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let date = row
                .get::<Option<i64>, _>("date")
                .and_then(|ts| DateTime::from_timestamp(ts, 0));
            (row.get::<String, _>("uid"), date)
        })
        .collect())
}

/// Largest numeric UID stored in the folder.
pub async fn get_last_uid(pool: &SqlitePool, folder: &str) -> Result<Option<u64>> {
    let uids: Vec<String> = sqlx::query_scalar("SELECT uid FROM messages WHERE folder = ?")
        .bind(folder)
        .fetch_all(pool)
        .await?;
    Ok(uids.iter().filter_map(|uid| uid.parse::<u64>().ok()).max())
}

pub async fn delete_messages(pool: &SqlitePool, folder: &str, uids: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for uid in uids {
        sqlx::query("DELETE FROM messages WHERE folder = ? AND uid = ?")
            .bind(folder)
            .bind(uid)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn clear_folder(pool: &SqlitePool, folder: &str) -> Result<()> {
    sqlx::query("DELETE FROM messages WHERE folder = ?")
        .bind(folder)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove everything but the newest `limit` messages by effective date.
/// Local-only messages are never purged.
pub async fn purge_to_limit(pool: &SqlitePool, folder: &str, limit: i32) -> Result<Vec<String>> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let excess: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT uid FROM messages
        WHERE folder = ? AND uid NOT LIKE ?
        ORDER BY date DESC, CAST(uid AS INTEGER) DESC
        LIMIT -1 OFFSET ?
        "#,
    )
    .bind(folder)
    .bind(format!("{LOCAL_UID_PREFIX}%"))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    if !excess.is_empty() {
        tracing::debug!("Purging {} messages beyond visible limit of {}", excess.len(), folder);
        delete_messages(pool, folder, &excess).await?;
    }
    Ok(excess)
}

/// Messages lacking SEEN that are not deleted.
pub async fn get_unread_count(pool: &SqlitePool, folder: &str) -> Result<usize> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE folder = ? AND (flags & ?) = 0",
    )
    .bind(folder)
    .bind(flags_to_db(MessageFlags::SEEN | MessageFlags::DELETED))
    .fetch_one(pool)
    .await?;
    Ok(usize::try_from(count).unwrap_or(0))
}
