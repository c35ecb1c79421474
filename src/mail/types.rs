use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Named boolean attributes of a message.
    ///
    /// The `DOWNLOADED_*` flags are local bookkeeping and never exist on the
    /// remote side.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MessageFlags: u32 {
        const SEEN = 0b0000_0001;
        const ANSWERED = 0b0000_0010;
        const FLAGGED = 0b0000_0100;
        const DELETED = 0b0000_1000;
        const DRAFT = 0b0001_0000;
        const FORWARDED = 0b0010_0000;
        const DOWNLOADED_FULL = 0b0100_0000;
        const DOWNLOADED_PARTIAL = 0b1000_0000;
    }
}

impl MessageFlags {
    /// Flags that only the local store assigns.
    pub const LOCAL_ONLY: Self = Self::DOWNLOADED_FULL.union(Self::DOWNLOADED_PARTIAL);

    /// Whether some content (full or partial) was stored for the message.
    pub fn is_downloaded(self) -> bool {
        self.intersects(Self::LOCAL_ONLY)
    }
}

bitflags! {
    /// Which items a batch fetch should retrieve from the remote folder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FetchProfile: u8 {
        const FLAGS = 0b0000_0001;
        const ENVELOPE = 0b0000_0010;
        const BODY = 0b0000_0100;
        const BODY_SANE = 0b0000_1000;
        const STRUCTURE = 0b0001_0000;
    }
}

/// Whether messages older than the fetched window still exist remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoreMessages {
    True,
    False,
    #[default]
    Unknown,
}

impl MoreMessages {
    pub fn as_str(self) -> &'static str {
        match self {
            MoreMessages::True => "true",
            MoreMessages::False => "false",
            MoreMessages::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "true" => MoreMessages::True,
            "false" => MoreMessages::False,
            _ => MoreMessages::Unknown,
        }
    }
}

impl From<bool> for MoreMessages {
    fn from(available: bool) -> Self {
        if available {
            MoreMessages::True
        } else {
            MoreMessages::False
        }
    }
}

/// How far a message's content was stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Full,
    Partial,
}

impl DownloadState {
    pub fn flag(self) -> MessageFlags {
        match self {
            DownloadState::Full => MessageFlags::DOWNLOADED_FULL,
            DownloadState::Partial => MessageFlags::DOWNLOADED_PARTIAL,
        }
    }
}

/// One node of a message's MIME tree as reported by a STRUCTURE fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    /// Server-side part specifier, e.g. "1.2" for IMAP sections.
    pub part_id: String,
    /// Lowercase `type/subtype`.
    pub mime_type: String,
    pub disposition: Option<String>,
    pub size: u64,
    /// Decoded content, present once the part has been fetched.
    pub content: Option<Vec<u8>>,
    pub children: Vec<BodyPart>,
}

impl BodyPart {
    pub fn leaf(part_id: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            part_id: part_id.into(),
            mime_type: mime_type.into().to_ascii_lowercase(),
            disposition: None,
            size,
            content: None,
            children: Vec::new(),
        }
    }

    pub fn multipart(
        part_id: impl Into<String>,
        mime_type: impl Into<String>,
        children: Vec<BodyPart>,
    ) -> Self {
        let size = children.iter().map(|c| c.size).sum();
        Self {
            part_id: part_id.into(),
            mime_type: mime_type.into().to_ascii_lowercase(),
            disposition: None,
            size,
            content: None,
            children,
        }
    }

    pub fn with_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = Some(disposition.into());
        self
    }

    pub fn is_multipart(&self) -> bool {
        self.mime_type.starts_with("multipart/")
    }

    pub fn is_attachment(&self) -> bool {
        self.disposition
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case("attachment"))
    }

    /// Find a part anywhere in the tree by its specifier.
    pub fn find_mut(&mut self, part_id: &str) -> Option<&mut BodyPart> {
        if self.part_id == part_id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(part_id))
    }

    /// Iterate over every node of the tree, depth first.
    pub fn walk(&self) -> Vec<&BodyPart> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.walk());
        }
        nodes
    }
}

/// Content returned by a BODY, BODY_SANE or STRUCTURE fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// RFC 822 bytes. For BODY_SANE fetches this may be a truncated prefix.
    Raw(Vec<u8>),
    /// The MIME tree; leaves get their content filled in by part fetches.
    Structure(BodyPart),
}

/// A message as seen through the remote folder.
///
/// Listing yields a stub carrying the uid (and whatever flags the server
/// volunteered); later fetches return enriched copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub uid: String,
    pub flags: MessageFlags,
    pub size: u64,
    pub internal_date: Option<DateTime<Utc>>,
    pub sent_date: Option<DateTime<Utc>>,
    pub body: Option<MessageBody>,
}

impl RemoteMessage {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            flags: MessageFlags::empty(),
            size: 0,
            internal_date: None,
            sent_date: None,
            body: None,
        }
    }

    pub fn is_set(&self, flag: MessageFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Date used for cutoff decisions: sent date, else internal date.
    pub fn effective_date(&self) -> Option<DateTime<Utc>> {
        self.sent_date.or(self.internal_date)
    }

    /// True only when both a cutoff and a date are known and the date is
    /// before the cutoff.
    pub fn older_than(&self, cutoff: Option<DateTime<Utc>>) -> bool {
        match (cutoff, self.effective_date()) {
            (Some(cutoff), Some(date)) => date < cutoff,
            _ => false,
        }
    }
}
