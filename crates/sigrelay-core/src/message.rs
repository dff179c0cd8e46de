//! Structured chat message.
//!
//! A `ChatMessage` is the unit handed from the extraction heuristics to the
//! bridge and from the bridge to the pipeline. It is immutable once built and
//! compares structurally.

use std::fmt;

/// One chat message lifted out of the observed client.
///
/// Invariant: at least one of `author` / `content` is non-empty. The only way
/// to build a value is [`ChatMessage::new`], which enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatMessage {
    author: String,
    content: String,
    /// ISO-8601 timestamp as read from the source (or the capture instant).
    timestamp: String,
    channel: String,
}

impl ChatMessage {
    /// Build a message, returning `None` when both author and content are
    /// empty (after trimming whitespace).
    pub fn new(
        author: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        channel: impl Into<String>,
    ) -> Option<Self> {
        let author = author.into();
        let content = content.into();
        if author.trim().is_empty() && content.trim().is_empty() {
            return None;
        }
        Some(Self {
            author,
            content,
            timestamp: timestamp.into(),
            channel: channel.into(),
        })
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.channel, self.author, self.timestamp, self.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_author_or_content() {
        assert!(ChatMessage::new("", "", "2024-01-01T00:00:00.000Z", "general").is_none());
        assert!(ChatMessage::new("  ", "\n", "2024-01-01T00:00:00.000Z", "general").is_none());
        assert!(ChatMessage::new("alice", "", "2024-01-01T00:00:00.000Z", "general").is_some());
        assert!(ChatMessage::new("", "hello", "2024-01-01T00:00:00.000Z", "general").is_some());
    }

    #[test]
    fn test_structural_equality() {
        let a = ChatMessage::new("bob", "BTC long", "2024-01-15T10:30:00.000Z", "signals").unwrap();
        let b = ChatMessage::new("bob", "BTC long", "2024-01-15T10:30:00.000Z", "signals").unwrap();
        let c = ChatMessage::new("bob", "BTC short", "2024-01-15T10:30:00.000Z", "signals").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_format() {
        let msg = ChatMessage::new("TraderJoe", "BTC up", "2024-01-15T10:30:00.000Z", "signals")
            .unwrap();
        assert_eq!(
            msg.to_string(),
            "[signals] TraderJoe (2024-01-15T10:30:00.000Z): BTC up"
        );
    }
}
