use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use google_gmail1::api::{Message, MessagePart};
use uuid::Uuid;

use crate::util::truncate_chars;

/// Stored bodies are capped to bound storage and model input.
pub const MAX_BODY_CHARS: usize = 10_000;
pub const NO_SUBJECT: &str = "(No Subject)";
const UNREAD_LABEL: &str = "UNREAD";
const HTML_WRAP_WIDTH: usize = 400;

#[derive(Debug, Display)]
pub enum ParseError {
    #[display("message is missing {_0}")]
    MissingField(&'static str),
    #[display("{mime_type} part is not valid utf-8: {source}")]
    BodyEncoding {
        mime_type: String,
        source: std::string::FromUtf8Error,
    },
    #[display("internal date {_0} is out of range")]
    InvalidTimestamp(i64),
}

impl std::error::Error for ParseError {}

/// A fetched Gmail message normalized into the shape we persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub account_id: Uuid,
    pub gmail_id: String,
    pub thread_id: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub subject: String,
    pub snippet: String,
    pub body_text: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub labels: Vec<String>,
}

impl ParsedMessage {
    pub fn from_gmail_message(msg: Message, account_id: Uuid) -> Result<Self, ParseError> {
        let gmail_id = msg.id.ok_or(ParseError::MissingField("id"))?;
        let thread_id = msg.thread_id.ok_or(ParseError::MissingField("threadId"))?;
        let payload = msg.payload.ok_or(ParseError::MissingField("payload"))?;
        let internal_date = msg
            .internal_date
            .ok_or(ParseError::MissingField("internalDate"))?;
        let received_at = DateTime::from_timestamp_millis(internal_date)
            .ok_or(ParseError::InvalidTimestamp(internal_date))?;

        let from = get_header(&payload, "From").ok_or(ParseError::MissingField("From header"))?;
        let (sender_email, sender_name) = split_sender(&from);
        if sender_email.is_empty() {
            return Err(ParseError::MissingField("sender address"));
        }

        let subject = get_header(&payload, "Subject")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| NO_SUBJECT.to_string());

        let body_text = extract_body_text(&payload)?
            .map(|b| truncate_chars(&b, MAX_BODY_CHARS).to_string())
            .filter(|b| !b.is_empty());

        let labels = msg.label_ids.unwrap_or_default();
        let is_read = !labels.iter().any(|l| l == UNREAD_LABEL);

        Ok(ParsedMessage {
            account_id,
            gmail_id,
            thread_id,
            sender_email,
            sender_name,
            subject,
            snippet: msg.snippet.unwrap_or_default(),
            body_text,
            received_at,
            is_read,
            labels,
        })
    }
}

fn get_header(part: &MessagePart, name: &str) -> Option<String> {
    part.headers
        .as_ref()?
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .map(|n| n.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .and_then(|h| h.value.clone())
}

/// Splits a `"Name" <addr>` header into `(addr, Some(Name))`.
/// Without angle brackets the whole header is the address.
pub fn split_sender(header: &str) -> (String, Option<String>) {
    let header = header.trim();
    match (header.find('<'), header.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let address = header[open + 1..close].trim().to_string();
            let name = header[..open].trim().trim_matches('"').trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (address, name)
        }
        _ => (header.to_string(), None),
    }
}

/// Plain text wins: a direct text body first, then the first non-empty
/// `text/plain` leaf found walking multipart containers in order.
/// Only when no plain text exists anywhere is the first html part converted.
fn extract_body_text(payload: &MessagePart) -> Result<Option<String>, ParseError> {
    if let Some(text) = find_plain_text(payload)? {
        return Ok(Some(text));
    }

    match find_part(payload, "text/html") {
        Some(html_part) => Ok(decode_part(html_part)?
            .map(|html| html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH))),
        None => Ok(None),
    }
}

fn find_plain_text(part: &MessagePart) -> Result<Option<String>, ParseError> {
    let mime_type = part.mime_type.as_deref().unwrap_or("text/plain");

    match mime_type {
        "text/plain" => decode_part(part),
        mime if mime.starts_with("multipart/") => {
            for sub_part in part.parts.iter().flatten() {
                if let Some(text) = find_plain_text(sub_part)? {
                    return Ok(Some(text));
                }
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn find_part<'a>(part: &'a MessagePart, wanted: &str) -> Option<&'a MessagePart> {
    match part.mime_type.as_deref() {
        Some(mime) if mime.eq_ignore_ascii_case(wanted) => Some(part),
        Some(mime) if mime.starts_with("multipart/") => part
            .parts
            .iter()
            .flatten()
            .find_map(|sub_part| find_part(sub_part, wanted)),
        _ => None,
    }
}

/// Body bytes arrive base64-decoded; only the charset remains to check.
fn decode_part(part: &MessagePart) -> Result<Option<String>, ParseError> {
    let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) else {
        return Ok(None);
    };
    if data.is_empty() {
        return Ok(None);
    }

    let text = String::from_utf8(data.clone()).map_err(|source| ParseError::BodyEncoding {
        mime_type: part.mime_type.clone().unwrap_or_default(),
        source,
    })?;

    Ok((!text.trim().is_empty()).then_some(text))
}
