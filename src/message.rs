//! Normalization of raw retrieved messages into [`Candidate`] records.
//!
//! Raw messages follow the Gmail API `format=full` JSON layout: a payload with
//! a header list, a MIME type, base64url body data and optional nested parts.

use crate::error::{Error, Result};
use crate::extract::{find_unsubscribe_link_in_body, parse_unsubscribe_header};
use crate::models::{Candidate, UnsubscribeMethod};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A message as returned by the mail retrieval collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// One node of the MIME part tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartBody {
    /// URL-safe base64 content.
    #[serde(default)]
    pub data: Option<String>,
}

impl MessagePart {
    fn data(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| b.data.as_deref())
    }
}

/// Header fields needed for unsubscribe detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    pub from: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub list_unsubscribe: Option<String>,
}

/// Collect the first `From`, `Subject`, `Date` and `List-Unsubscribe` values,
/// matching header names case-insensitively.
pub fn collect_metadata(headers: &[MessageHeader]) -> MessageMetadata {
    let mut meta = MessageMetadata::default();
    for header in headers {
        let slot = match header.name.to_ascii_lowercase().as_str() {
            "from" => &mut meta.from,
            "subject" => &mut meta.subject,
            "date" => &mut meta.date,
            "list-unsubscribe" => &mut meta.list_unsubscribe,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(header.value.clone());
        }
    }
    meta
}

/// Split a `From` header into `(display name, address)`.
///
/// Accepts `"Name" <addr>`, `Name <addr>` and a bare address. Without a
/// display name the local part of the address stands in for it.
pub fn parse_sender(value: &str) -> Option<(String, String)> {
    let re = Regex::new(r#"^(?:"?([^"]*)"?\s)?<?([^>]+)>?"#).ok()?;
    let caps = re.captures(value.trim())?;
    let email = caps.get(2)?.as_str().trim().to_string();
    if email.is_empty() {
        return None;
    }
    let name = caps
        .get(1)
        .map(|m| m.as_str().trim().trim_matches('"').trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    Some((name, email))
}

/// Render an RFC 5322 date as RFC 3339, or hand back the raw text.
pub fn normalize_date(value: &str) -> String {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return dt.to_rfc3339();
    }
    // Trailing zone comments such as "(UTC)" are common and not always accepted.
    if let Some((head, _)) = trimmed.rsplit_once(" (") {
        if let Ok(dt) = DateTime::parse_from_rfc2822(head.trim()) {
            return dt.to_rfc3339();
        }
    }
    value.to_string()
}

fn lenient_engine() -> GeneralPurpose {
    GeneralPurpose::new(
        &alphabet::URL_SAFE,
        GeneralPurposeConfig::new()
            .with_decode_padding_mode(DecodePaddingMode::Indifferent)
            .with_decode_allow_trailing_bits(true),
    )
}

/// Decode base64url content, dropping anything that is not part of the
/// alphabet and any bytes that are not valid UTF-8.
pub fn decode_body_data(data: &str) -> String {
    let mut cleaned: String = data
        .chars()
        .filter_map(|c| match c {
            '+' => Some('-'),
            '/' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect();
    // A lone trailing sextet cannot encode a byte.
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    match lenient_engine().decode(cleaned.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).replace('\u{FFFD}', ""),
        Err(err) => {
            debug!("undecodable body segment dropped: {err}");
            String::new()
        }
    }
}

fn non_empty_leaf(part: &MessagePart) -> Option<String> {
    part.data()
        .map(decode_body_data)
        .filter(|text| !text.is_empty())
}

fn walk_parts(parts: &[MessagePart], plain: &mut Option<String>) -> Option<String> {
    for part in parts {
        if let Some(children) = &part.parts {
            if let Some(html) = walk_parts(children, plain) {
                return Some(html);
            }
        }
        let mime = part.mime_type.to_ascii_lowercase();
        if mime.starts_with("text/html") {
            if let Some(html) = non_empty_leaf(part) {
                return Some(html);
            }
        } else if mime.starts_with("text/plain") && plain.is_none() {
            *plain = non_empty_leaf(part);
        }
    }
    None
}

/// Flatten the part tree to one body string.
///
/// The first HTML leaf found depth-first wins outright; otherwise the first
/// plain-text leaf is used. A payload without parts is decoded as is.
pub fn extract_body(payload: &MessagePart) -> Option<String> {
    match &payload.parts {
        Some(parts) if !parts.is_empty() => {
            let mut plain = None;
            walk_parts(parts, &mut plain).or(plain)
        }
        _ => non_empty_leaf(payload),
    }
}

/// Turn one raw message into a [`Candidate`].
///
/// Only a missing payload is an error; every per-field problem degrades to a
/// default value.
pub fn normalize_message(message: &RawMessage) -> Result<Candidate> {
    let payload = message
        .payload
        .as_ref()
        .ok_or_else(|| Error::Parse(format!("message {} has no payload", message.id)))?;

    let meta = collect_metadata(&payload.headers);
    let (sender_name, sender_email) = meta
        .from
        .as_deref()
        .and_then(parse_sender)
        .unwrap_or_default();
    let date = meta.date.as_deref().map(normalize_date).unwrap_or_default();

    let mut unsubscribe_link = meta
        .list_unsubscribe
        .as_deref()
        .and_then(parse_unsubscribe_header);
    let mut unsubscribe_method = if unsubscribe_link.is_some() {
        UnsubscribeMethod::Header
    } else {
        UnsubscribeMethod::None
    };

    if unsubscribe_link.is_none() {
        if let Some(body) = extract_body(payload) {
            unsubscribe_link = find_unsubscribe_link_in_body(&body);
            if unsubscribe_link.is_some() {
                unsubscribe_method = UnsubscribeMethod::Body;
            }
        }
    }

    Ok(Candidate {
        id: message.id.clone(),
        sender_email: sender_email.to_lowercase(),
        sender_name,
        subject: meta.subject.unwrap_or_default(),
        date,
        unsubscribe_link,
        unsubscribe_method,
    })
}
