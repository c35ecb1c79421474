//! Ordering of server-assigned message identifiers.

use std::cmp::Ordering;

/// Compare two UIDs, oldest first.
///
/// Numeric UIDs (IMAP UIDs, POP3 sequence numbers) compare by value so that
/// "9" sorts before "10". Anything else falls back to a lexical comparison;
/// a numeric UID sorts before a non-numeric one so the ordering stays total.
pub fn compare_uids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Whether a message was already known before this pass.
///
/// Messages whose UID is not numeric are always treated as new.
pub fn is_old_message(uid: &str, last_uid: Option<u64>) -> bool {
    let Some(last_uid) = last_uid else {
        return false;
    };

    match uid.parse::<u64>() {
        Ok(uid) => uid <= last_uid,
        Err(e) => {
            tracing::warn!("Couldn't parse UID {}: {}", uid, e);
            false
        }
    }
}
