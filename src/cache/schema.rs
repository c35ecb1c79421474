//! Database schema initialization.

use anyhow::Result;
use sqlx::SqlitePool;

/// Create tables and indexes. Idempotent.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        -- Per-folder bookkeeping
        CREATE TABLE IF NOT EXISTS folders (
            server_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            visible_limit INTEGER NOT NULL DEFAULT -1,
            more_messages TEXT NOT NULL DEFAULT 'unknown',
            push_state TEXT,
            last_checked INTEGER,
            status TEXT
        );

        -- Numeric key/value extras (UIDVALIDITY, ...)
        CREATE TABLE IF NOT EXISTS folder_extras (
            folder TEXT NOT NULL,
            key TEXT NOT NULL,
            value INTEGER NOT NULL,
            PRIMARY KEY (folder, key)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        -- Cached messages; date is the effective date in unix seconds
        CREATE TABLE IF NOT EXISTS messages (
            folder TEXT NOT NULL,
            uid TEXT NOT NULL,
            flags INTEGER NOT NULL DEFAULT 0,
            date INTEGER,
            internal_date INTEGER,
            size INTEGER NOT NULL DEFAULT 0,
            subject TEXT NOT NULL DEFAULT '',
            from_addr TEXT,
            from_name TEXT,
            preview TEXT,
            raw_message BLOB,
            PRIMARY KEY (folder, uid)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_folder_date ON messages(folder, date DESC);
        CREATE INDEX IF NOT EXISTS idx_messages_flags ON messages(flags);

        -- MIME parts of partially downloaded messages
        CREATE TABLE IF NOT EXISTS message_parts (
            folder TEXT NOT NULL,
            uid TEXT NOT NULL,
            part_id TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            disposition TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            content BLOB,
            PRIMARY KEY (folder, uid, part_id),
            FOREIGN KEY (folder, uid) REFERENCES messages(folder, uid) ON DELETE CASCADE
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
