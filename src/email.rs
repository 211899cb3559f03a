//! Raw email capture — the immutable input to the pipeline.
//!
//! Mailbox retrieval lives outside this crate. Callers either build a
//! `RawEmail` directly or hand us RFC 822 bytes via `RawEmail::from_rfc822`.

use chrono::{DateTime, TimeZone, Utc};
use mail_parser::{MessageParser, PartType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IntakeError;

/// One captured notification email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEmail {
    /// Message-ID header, or a generated UUID when the header is missing.
    pub message_id: String,
    /// Sender address (`From` header).
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// When the message was received (or its `Date` header).
    pub received_at: DateTime<Utc>,
    /// Plain-text body.
    pub text_body: String,
    /// HTML body, when the message has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
}

impl RawEmail {
    pub fn new(
        message_id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        text_body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            sender: sender.into(),
            subject: subject.into(),
            received_at: Utc::now(),
            text_body: text_body.into(),
            html_body: None,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    /// Parse an RFC 822 message.
    ///
    /// A message without a plain-text part gets its text body from the
    /// tag-stripped HTML part.
    pub fn from_rfc822(bytes: &[u8]) -> Result<Self, IntakeError> {
        let parsed = MessageParser::default()
            .parse(bytes)
            .ok_or(IntakeError::Unparseable)?;

        let message_id = parsed
            .message_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let sender = extract_sender(&parsed);
        let subject = parsed.subject().unwrap_or_default().to_string();

        let received_at = parsed
            .date()
            .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single())
            .unwrap_or_else(Utc::now);

        // body_text/body_html convert between formats on the fly, so look at
        // the actual parts to tell a real HTML body from a generated one.
        let html_body = parsed.html_part(0).and_then(|part| match &part.body {
            PartType::Html(html) => Some(html.to_string()),
            _ => None,
        });
        let text_body = match parsed.text_part(0).map(|part| &part.body) {
            Some(PartType::Text(text)) => text.to_string(),
            _ => html_body.as_deref().map(html_to_text).unwrap_or_default(),
        };

        Ok(Self {
            message_id,
            sender,
            subject,
            received_at,
            text_body,
            html_body,
        })
    }

    /// Read and parse a `.eml` file.
    pub fn from_eml_file(path: &std::path::Path) -> Result<Self, IntakeError> {
        let bytes = std::fs::read(path)?;
        Self::from_rfc822(&bytes)
    }

    /// Lower-cased domain of the sender address, if it has one.
    ///
    /// Accepts both `user@host` and `Display Name <user@host>`.
    pub fn sender_domain(&self) -> Option<String> {
        let addr = match (self.sender.rfind('<'), self.sender.rfind('>')) {
            (Some(start), Some(end)) if start < end => &self.sender[start + 1..end],
            _ => self.sender.as_str(),
        };
        let (_, domain) = addr.trim().rsplit_once('@')?;
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        (!domain.is_empty()).then_some(domain)
    }
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Strip HTML tags from content, decoding the common entities.
///
/// Every tag becomes whitespace so adjacent table cells don't run together.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    decode_entities(&result)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render HTML as plain text, keeping one line per block element.
///
/// Line-oriented extraction patterns need the line structure that
/// `strip_html` flattens away.
pub fn html_to_text(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name: String = tag
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                let breaks_line = matches!(
                    name.as_str(),
                    "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "table"
                );
                result.push(if breaks_line { '\n' } else { ' ' });
            }
            _ if in_tag => tag.push(ch),
            _ => result.push(ch),
        }
    }

    decode_entities(&result)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode the handful of HTML entities notification layouts actually use.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&yen;", "¥")
        .replace("&euro;", "€")
        .replace("&pound;", "£")
        .replace("&amp;", "&")
}
