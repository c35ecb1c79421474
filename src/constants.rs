//! Crate-wide constants for tuning synchronization behavior
//!
//! Centralizes magic numbers to make them discoverable and configurable.

/// Number of most-recent messages kept fully indexed when neither the folder
/// nor the configuration says otherwise.
pub const DEFAULT_VISIBLE_LIMIT: i32 = 25;

/// Messages larger than this (in bytes) are only partially downloaded.
/// A value of 0 disables the limit.
pub const DEFAULT_MAX_AUTO_DOWNLOAD_SIZE: u64 = 32 * 1024;

/// Upper bound of the body prefix fetched for large messages whose structure
/// could not be resolved by the server.
pub const BODY_SANE_SUGGESTED_SIZE: u64 = 50 * 1024;

/// UIDs with this prefix exist only locally (drafts, pending uploads).
pub const LOCAL_UID_PREFIX: &str = "local:";

/// Folder extra holding the last UIDVALIDITY seen for a folder.
pub const EXTRA_UID_VALIDITY: &str = "imapUidValidity";

/// Status string reported when the remote rejects our credentials.
pub const AUTHENTICATION_FAILURE_REASON: &str = "Authentication failure";

/// Number of characters kept in a cached message preview.
pub const PREVIEW_LENGTH: usize = 200;

/// Column width used when rendering HTML-only bodies into preview text.
pub const PREVIEW_RENDER_WIDTH: usize = 80;

// === Scheduler ===

/// Seconds between automatic polls of the configured folders.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Capacity of the command channel feeding a sync actor.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the event channel drained by the UI.
/// Progress events are dropped rather than blocking a pass when it is full.
pub const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Maximum number of retries for an on-demand message download.
pub const MAX_RETRIES: u32 = 3;

/// Initial delay before retrying an on-demand message download.
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Maximum retry delay in seconds.
pub const MAX_RETRY_DELAY_SECS: u64 = 30;

// === Cache ===

/// SQLite connection pool size.
pub const CACHE_POOL_SIZE: u32 = 4;

/// Seconds a connection waits on a locked database before failing.
pub const CACHE_BUSY_TIMEOUT_SECS: u64 = 5;
