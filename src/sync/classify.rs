//! Pure routing decisions of a pass: fetch window, cutoff filter, tier
//! classification and newest-first truncation. Nothing here touches a
//! transport or the local store.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::mail::{MessageFlags, RemoteMessage};

/// Message number range `[start, end]` to list, newest messages preferred.
///
/// Returns None for an empty folder. A non-positive visible limit selects
/// the whole folder.
pub fn fetch_window(remote_count: i64, visible_limit: i32) -> Option<(i64, i64)> {
    if remote_count <= 0 {
        return None;
    }

    // Message numbers start at 1.
    let start = if visible_limit > 0 {
        (remote_count - i64::from(visible_limit)).max(0) + 1
    } else {
        1
    };
    Some((start, remote_count))
}

/// Whether a listed message survives the earliest-poll cutoff.
///
/// `local_date` is None when the message is unknown locally, and
/// `Some(None)` when it is known without a recorded date.
pub fn passes_cutoff(
    listed: &RemoteMessage,
    local_date: Option<Option<DateTime<Utc>>>,
    cutoff: Option<DateTime<Utc>>,
) -> bool {
    match local_date {
        Some(Some(date)) => cutoff.is_none_or(|cutoff| date >= cutoff),
        Some(None) => true,
        None => !listed.older_than(cutoff),
    }
}

/// Where a candidate message goes in the download pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Needs content.
    Unsynced,
    /// Already downloaded (or deleted remotely); only flags are reconciled.
    FlagsOnly,
    /// Nothing to do.
    Skip,
}

/// Route a candidate given its local flags (None when absent locally).
pub fn route(message: &RemoteMessage, local_flags: Option<MessageFlags>, flag_sync_only: bool) -> Route {
    if message.is_set(MessageFlags::DELETED) {
        return Route::FlagsOnly;
    }

    match local_flags {
        None if flag_sync_only => Route::Skip,
        None => Route::Unsynced,
        Some(flags) if flags.contains(MessageFlags::DELETED) => Route::Skip,
        // A prior fetch was interrupted before any content was stored.
        Some(flags) if !flags.is_downloaded() => Route::Unsynced,
        Some(_) => Route::FlagsOnly,
    }
}

/// Content tier of an unsynced message once its envelope is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Small,
    Large,
}

pub fn size_tier(message: &RemoteMessage, max_auto_download_size: Option<u64>) -> Tier {
    match max_auto_download_size {
        Some(max) if max > 0 && message.size > max => Tier::Large,
        _ => Tier::Small,
    }
}

/// Sort newest first and keep at most `visible_limit` messages.
///
/// The sort is stable and truncation always drops the oldest excess.
pub fn keep_newest<F>(messages: &mut Vec<RemoteMessage>, visible_limit: i32, compare: F)
where
    F: Fn(&str, &str) -> Ordering,
{
    messages.sort_by(|a, b| compare(&b.uid, &a.uid));

    if let Ok(limit) = usize::try_from(visible_limit)
        && limit > 0
        && messages.len() > limit
    {
        messages.truncate(limit);
    }
}
