//! Extraction heuristics.
//!
//! Turns one message-shaped node into a [`ChatMessage`]. The observed markup
//! has no stable schema, so every field is resolved by an ordered list of
//! strategies; the first one that finds non-empty text wins and results are
//! never combined. Nothing in here panics or returns an error: a miss only
//! degrades the field, and a node with neither author nor content yields no
//! message at all.

use crate::dom::DomNode;
use chrono::{SecondsFormat, Utc};
use sigrelay_core::ChatMessage;

/// Markers that end the author name inside a message's accessibility label.
const AUTHOR_MARKERS: [&str; 4] = [" said", "說", "说", "\u{2014}"];
const USERNAME_MARKER: &str = "username";
const CONTENT_MARKER: &str = "messageContent";
const MESSAGE_ROLE: &str = "article";
const CONTENT_CONTAINERS: [&str; 5] = ["div", "span", "section", "article", "p"];

/// Outcome of one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Found(String),
    Miss,
}

impl Attempt {
    /// `Found` with the trimmed text, or `Miss` if nothing is left.
    fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Self::Miss
        } else {
            Self::Found(text.to_string())
        }
    }

    fn from_node(node: Option<&DomNode>) -> Self {
        node.map_or(Self::Miss, |n| Self::from_text(&n.text_content()))
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Found(s) => Some(s),
            Self::Miss => None,
        }
    }
}

type Strategy<T> = fn(&T) -> Attempt;

fn first_found<T>(input: &T, strategies: &[Strategy<T>]) -> Option<String> {
    strategies
        .iter()
        .find_map(|strategy| strategy(input).into_option())
}

/// Page-level context used to resolve the channel name.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    /// Document title.
    pub title: String,
    /// Snapshot of the channel header region, if the host found one.
    pub header: Option<DomNode>,
}

/// True if `node` is a message-node.
pub fn is_message_node(node: &DomNode) -> bool {
    node.attr("role") == Some(MESSAGE_ROLE)
}

fn is_heading(node: &DomNode) -> bool {
    matches!(node.tag(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
        || node.attr("role") == Some("heading")
}

fn has_username_marker(node: &DomNode) -> bool {
    node.attr_contains("id", USERNAME_MARKER) || node.attr_contains("class", USERNAME_MARKER)
}

// Author strategies

fn author_from_label(node: &DomNode) -> Attempt {
    let Some(label) = node.attr("aria-label") else {
        return Attempt::Miss;
    };
    AUTHOR_MARKERS
        .iter()
        .filter_map(|marker| label.find(marker))
        .min()
        .map_or(Attempt::Miss, |end| Attempt::from_text(&label[..end]))
}

fn author_from_heading(node: &DomNode) -> Attempt {
    let Some(heading) = node.find(is_heading) else {
        return Attempt::Miss;
    };
    heading
        .children()
        .iter()
        .map(|child| match child {
            crate::dom::DomChild::Text(t) => Attempt::from_text(t),
            crate::dom::DomChild::Element(e) => Attempt::from_text(&e.text_content()),
        })
        .find(|a| matches!(a, Attempt::Found(_)))
        .unwrap_or(Attempt::Miss)
}

fn author_from_username(node: &DomNode) -> Attempt {
    Attempt::from_node(node.find(has_username_marker))
}

const AUTHOR_STRATEGIES: [Strategy<DomNode>; 3] =
    [author_from_label, author_from_heading, author_from_username];

// Content strategies

fn content_by_id(node: &DomNode) -> Attempt {
    Attempt::from_node(node.find(|n| n.attr_contains("id", CONTENT_MARKER)))
}

fn content_by_container(node: &DomNode) -> Attempt {
    Attempt::from_node(node.find(|n| {
        CONTENT_CONTAINERS.contains(&n.tag()) && n.attr_contains("class", CONTENT_MARKER)
    }))
}

fn content_from_remaining_text(node: &DomNode) -> Attempt {
    let stripped = node.pruned(&|n: &DomNode| {
        is_heading(n) || n.tag() == "time" || has_username_marker(n)
    });
    Attempt::from_text(&collapse_whitespace(&stripped.text_content()))
}

const CONTENT_STRATEGIES: [Strategy<DomNode>; 3] =
    [content_by_id, content_by_container, content_from_remaining_text];

// Channel strategies

fn channel_from_page_heading(page: &PageContext) -> Attempt {
    let Some(header) = page.header.as_ref() else {
        return Attempt::Miss;
    };
    if header.tag() == "h1" {
        return Attempt::from_node(Some(header));
    }
    Attempt::from_node(header.find(|n| n.tag() == "h1"))
}

fn channel_from_heading_role(page: &PageContext) -> Attempt {
    let Some(header) = page.header.as_ref() else {
        return Attempt::Miss;
    };
    if header.attr("role") == Some("heading") {
        return Attempt::from_node(Some(header));
    }
    Attempt::from_node(header.find(|n| n.attr("role") == Some("heading")))
}

fn channel_from_title(page: &PageContext) -> Attempt {
    Attempt::from_text(&channel_from_title_text(&page.title))
}

const CHANNEL_STRATEGIES: [Strategy<PageContext>; 3] = [
    channel_from_page_heading,
    channel_from_heading_role,
    channel_from_title,
];

/// Parse a document title: `#token`, then text before ` | `, then text
/// before ` - `, else the raw title.
pub fn channel_from_title_text(title: &str) -> String {
    let title = title.trim();
    if let Some(rest) = title.strip_prefix('#') {
        let token: String = rest
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '|')
            .collect();
        if !token.is_empty() {
            return token;
        }
    }
    for separator in [" | ", " - "] {
        if let Some((head, _)) = title.split_once(separator) {
            let head = head.trim();
            if !head.is_empty() {
                return head.to_string();
            }
        }
    }
    title.to_string()
}

/// Resolve the timestamp: `time[datetime]`, then the time element's text,
/// then the capture instant.
pub fn extract_timestamp(node: &DomNode) -> String {
    node.find(|n| n.tag() == "time")
        .and_then(|time| {
            time.attr("datetime")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| Attempt::from_text(&time.text_content()).into_option())
        })
        .unwrap_or_else(capture_instant)
}

fn capture_instant() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn extract_author(node: &DomNode) -> Option<String> {
    first_found(node, &AUTHOR_STRATEGIES)
}

pub fn extract_content(node: &DomNode) -> Option<String> {
    first_found(node, &CONTENT_STRATEGIES)
}

pub fn extract_channel(page: &PageContext) -> Option<String> {
    first_found(page, &CHANNEL_STRATEGIES)
}

/// Extract one message, or `None` when both author and content are empty.
pub fn extract_message(node: &DomNode, page: &PageContext) -> Option<ChatMessage> {
    let author = extract_author(node).unwrap_or_default();
    let content = extract_content(node).unwrap_or_default();
    if author.is_empty() && content.is_empty() {
        return None;
    }
    let channel = extract_channel(page).unwrap_or_default();
    ChatMessage::new(author, content, extract_timestamp(node), channel)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
