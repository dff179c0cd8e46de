//! Channel allow-list.

use sigrelay_core::ChatMessage;
use std::collections::HashSet;
use tracing::trace;

/// Result of filtering one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Pass(ChatMessage),
    Rejected,
}

impl FilterOutcome {
    pub fn into_message(self) -> Option<ChatMessage> {
        match self {
            Self::Pass(msg) => Some(msg),
            Self::Rejected => None,
        }
    }
}

/// Exact-match, case-sensitive set of channel names.
///
/// An empty filter is valid and rejects everything. Warning about that is
/// the caller's job, once per startup.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    channels: HashSet<String>,
}

impl ChannelFilter {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    /// True if no channel can ever pass.
    pub fn is_closed(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn should_process(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    pub fn filter_message(&self, msg: ChatMessage) -> FilterOutcome {
        if self.should_process(msg.channel()) {
            FilterOutcome::Pass(msg)
        } else {
            trace!(channel = msg.channel(), "Message rejected by channel filter");
            FilterOutcome::Rejected
        }
    }
}
