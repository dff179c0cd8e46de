//! Bridge wire record.
//!
//! One chat message travels as a single-line JSON object:
//!
//! ```text
//! {"type":"DISCORD_MESSAGE","author":"..","content":"..","timestamp":"..","channel":".."}
//! ```
//!
//! The receiving side shares the line with arbitrary console noise, so the
//! `type` discriminator is the only thing that marks a line as a message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigrelay_core::ChatMessage;
use std::fmt;

/// Discriminator carried by every message record.
pub const MESSAGE_RECORD_TYPE: &str = "DISCORD_MESSAGE";

#[derive(Serialize)]
struct OutboundRecord<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    author: &'a str,
    content: &'a str,
    timestamp: &'a str,
    channel: &'a str,
}

#[derive(Deserialize)]
struct InboundRecord {
    author: String,
    content: String,
    timestamp: String,
    channel: String,
}

/// Why a received line was not turned into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not valid JSON at all.
    NotJson,
    /// Valid JSON but not an object.
    NotObject,
    /// Object without the message discriminator.
    NotMessage,
    /// Discriminator present, fields missing or not strings.
    MalformedFields,
    /// Well-formed record with neither author nor content.
    Empty,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotJson => "not_json",
            Self::NotObject => "not_object",
            Self::NotMessage => "not_message",
            Self::MalformedFields => "malformed_fields",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize a message into its single-line wire form.
///
/// Returns `None` if serialization fails; the sender treats that as loss.
pub fn encode(msg: &ChatMessage) -> Option<String> {
    let record = OutboundRecord {
        kind: MESSAGE_RECORD_TYPE,
        author: msg.author(),
        content: msg.content(),
        timestamp: msg.timestamp(),
        channel: msg.channel(),
    };
    serde_json::to_string(&record).ok()
}

/// Parse one received line, reporting why it was dropped.
///
/// Extra fields are ignored.
pub fn decode_record(line: &str) -> Result<ChatMessage, DropReason> {
    let value: Value = serde_json::from_str(line.trim()).map_err(|_| DropReason::NotJson)?;
    let Value::Object(ref object) = value else {
        return Err(DropReason::NotObject);
    };
    match object.get("type").and_then(Value::as_str) {
        Some(MESSAGE_RECORD_TYPE) => {}
        _ => return Err(DropReason::NotMessage),
    }

    let record: InboundRecord =
        serde_json::from_value(value).map_err(|_| DropReason::MalformedFields)?;
    ChatMessage::new(
        record.author,
        record.content,
        record.timestamp,
        record.channel,
    )
    .ok_or(DropReason::Empty)
}

/// Parse one received line, discarding anything that is not a message record.
pub fn decode(line: &str) -> Option<ChatMessage> {
    decode_record(line).ok()
}
