use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, PartType};

use crate::constants::{PREVIEW_LENGTH, PREVIEW_RENDER_WIDTH};

use super::types::{BodyPart, MessageBody};

/// Header-level facts extracted from stored content, used by the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSummary {
    pub subject: String,
    pub from_addr: Option<String>,
    pub from_name: Option<String>,
    pub sent_date: Option<DateTime<Utc>>,
    pub preview: Option<String>,
}

/// Parse the `Date:` header of raw message bytes.
pub fn parse_sent_date(raw: &[u8]) -> Option<DateTime<Utc>> {
    let message = MessageParser::default().parse(raw)?;
    let timestamp = message.date()?.to_timestamp();
    DateTime::from_timestamp(timestamp, 0)
}

/// Summarize a raw RFC 822 message (possibly a truncated prefix).
pub fn summarize_raw(raw: &[u8]) -> MessageSummary {
    let Some(message) = MessageParser::default().parse(raw) else {
        return MessageSummary::default();
    };

    let (from_addr, from_name) = match message.from().and_then(|addrs| addrs.first()) {
        Some(addr) => (
            addr.address().map(|s| s.to_string()),
            addr.name().map(|s| s.to_string()),
        ),
        None => (None, None),
    };

    let sent_date = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    let preview = extract_text_body(&message)
        .or_else(|| extract_html_body(&message).map(|html| render_html(&html)))
        .map(|text| make_preview(&text));

    MessageSummary {
        subject: message.subject().map(|s| s.to_string()).unwrap_or_default(),
        from_addr,
        from_name,
        sent_date,
        preview,
    }
}

/// Preview for a partially downloaded message whose text parts were fetched
/// individually.
pub fn structure_preview(structure: &BodyPart) -> Option<String> {
    let fetched = |mime: &str| {
        structure
            .walk()
            .into_iter()
            .find(|p| p.mime_type == mime && p.content.is_some())
            .and_then(|p| p.content.as_deref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    };

    fetched("text/plain")
        .or_else(|| fetched("text/html").map(|html| render_html(&html)))
        .map(|text| make_preview(&text))
}

/// Summary of whatever content a fetch produced.
pub fn summarize_body(body: Option<&MessageBody>) -> MessageSummary {
    match body {
        Some(MessageBody::Raw(raw)) => summarize_raw(raw),
        Some(MessageBody::Structure(structure)) => MessageSummary {
            preview: structure_preview(structure),
            ..MessageSummary::default()
        },
        None => MessageSummary::default(),
    }
}

/// Part specifiers of the viewable (text/plain, text/html) parts of a
/// message structure. Everything else is an attachment and left for later.
pub fn collect_text_parts(structure: &BodyPart) -> Vec<String> {
    let mut parts = Vec::new();
    collect_viewables(structure, &mut parts);
    parts
}

fn collect_viewables(part: &BodyPart, out: &mut Vec<String>) {
    if part.mime_type == "multipart/alternative" {
        // Keep every textual alternative; the renderer picks one.
        for child in &part.children {
            if child.is_multipart() {
                collect_viewables(child, out);
            } else if is_textual_body(child) {
                out.push(child.part_id.clone());
            }
        }
    } else if part.is_multipart() {
        for child in &part.children {
            collect_viewables(child, out);
        }
    } else if part.mime_type == "message/rfc822" {
        if !part.is_attachment() {
            for child in &part.children {
                collect_viewables(child, out);
            }
        }
    } else if is_textual_body(part) {
        out.push(part.part_id.clone());
    }
}

fn is_textual_body(part: &BodyPart) -> bool {
    !part.is_attachment() && (part.mime_type == "text/plain" || part.mime_type == "text/html")
}

fn extract_text_body(message: &mail_parser::Message) -> Option<String> {
    for part in message.text_bodies() {
        if let PartType::Text(text) = &part.body {
            return Some(text.to_string());
        }
    }
    None
}

fn extract_html_body(message: &mail_parser::Message) -> Option<String> {
    for part in message.html_bodies() {
        if let PartType::Html(html) = &part.body {
            return Some(html.to_string());
        }
    }
    None
}

fn render_html(html: &str) -> String {
    html2text::from_read(html.as_bytes(), PREVIEW_RENDER_WIDTH).unwrap_or_else(|_| html.to_string())
}

fn make_preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(PREVIEW_LENGTH).collect()
}
