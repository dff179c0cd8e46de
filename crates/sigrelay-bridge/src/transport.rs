//! In-process bridge transport.
//!
//! An unbounded, ordered, unacknowledged channel of text lines. The sending
//! half never blocks and never learns whether a line arrived; the receiving
//! half parses lines back into messages and drops everything else.

use crate::record::{decode_record, encode};
use sigrelay_core::ChatMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One-way text sink for bridge records.
///
/// Implementations must not block and must not report failure to the caller.
pub trait BridgeSink {
    fn emit(&self, line: String);
}

/// Counters shared by both halves of one bridge.
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Lines handed to the transport by the sender.
    emitted: AtomicU64,
    /// Lines lost on the sending side (serialization failure or closed receiver).
    lost: AtomicU64,
    /// Lines decoded into messages.
    accepted: AtomicU64,
    /// Lines discarded by the receiver.
    dropped: AtomicU64,
}

impl BridgeStats {
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a connected bridge pair.
pub fn bridge_channel() -> (BridgeSender, BridgeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(BridgeStats::default());
    (
        BridgeSender {
            tx,
            stats: stats.clone(),
        },
        BridgeReceiver { rx, stats },
    )
}

/// Sending half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BridgeSender {
    tx: mpsc::UnboundedSender<String>,
    stats: Arc<BridgeStats>,
}

impl BridgeSender {
    /// Serialize and emit one message.
    pub fn send_message(&self, msg: &ChatMessage) {
        match encode(msg) {
            Some(line) => self.emit(line),
            None => {
                self.stats.lost.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> Arc<BridgeStats> {
        self.stats.clone()
    }
}

impl BridgeSink for BridgeSender {
    fn emit(&self, line: String) {
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(line).is_err() {
            self.stats.lost.fetch_add(1, Ordering::Relaxed);
            trace!("Bridge receiver gone, line lost");
        }
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct BridgeReceiver {
    rx: mpsc::UnboundedReceiver<String>,
    stats: Arc<BridgeStats>,
}

impl BridgeReceiver {
    /// Wait for the next message, silently skipping non-message lines.
    ///
    /// Returns `None` once every sender is gone (or after [`close`](Self::close))
    /// and the buffered lines are exhausted.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        while let Some(line) = self.rx.recv().await {
            match decode_record(&line) {
                Ok(msg) => {
                    self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                    return Some(msg);
                }
                Err(reason) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(%reason, len = line.len(), "Dropped bridge line");
                }
            }
        }
        None
    }

    /// Stop accepting new lines. Already-buffered lines can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn stats(&self) -> Arc<BridgeStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> ChatMessage {
        ChatMessage::new("alice", content, "2024-01-15T10:30:00.000Z", "signals").unwrap()
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (tx, mut rx) = bridge_channel();
        tx.send_message(&msg("one"));
        tx.send_message(&msg("two"));
        tx.send_message(&msg("three"));
        drop(tx);

        let mut got = Vec::new();
        while let Some(m) = rx.recv().await {
            got.push(m.content().to_string());
        }
        assert_eq!(got, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_noise_is_skipped() {
        let (tx, mut rx) = bridge_channel();
        tx.emit("Download the React DevTools".to_string());
        tx.emit(r#"{"type":"PING"}"#.to_string());
        tx.send_message(&msg("real"));
        tx.emit(String::new());
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().content(), "real");
        assert!(rx.recv().await.is_none());

        let stats = rx.stats();
        assert_eq!(stats.emitted(), 4);
        assert_eq!(stats.accepted(), 1);
        assert_eq!(stats.dropped(), 3);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (tx, rx) = bridge_channel();
        drop(rx);
        tx.send_message(&msg("lost"));
        assert_eq!(tx.stats().lost(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_buffered() {
        let (tx, mut rx) = bridge_channel();
        tx.send_message(&msg("buffered"));
        rx.close();
        tx.send_message(&msg("late"));

        assert_eq!(rx.recv().await.unwrap().content(), "buffered");
        assert!(rx.recv().await.is_none());
        assert_eq!(tx.stats().lost(), 1);
    }
}
