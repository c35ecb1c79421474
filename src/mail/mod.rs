pub mod parser;
pub mod types;
pub mod uid;

pub use parser::{collect_text_parts, parse_sent_date, MessageSummary};
pub use types::{
    BodyPart, DownloadState, FetchProfile, MessageBody, MessageFlags, MoreMessages,
    RemoteMessage,
};
pub use uid::{compare_uids, is_old_message};
