//! Hand-written reasoning and venue doubles.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sigrelay_core::{ClientOrderId, OrderReceipt, TradeSide, VenueId};
use sigrelay_executor::{ExecutorError, ExecutorResult, VenueClient};
use sigrelay_signal::{ReasoningClient, SignalError, SignalResult};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

pub const NO_SIGNAL_REPLY: &str = r#"{"has_signal": false, "summary": "general chat"}"#;

pub fn signal_reply(symbol: &str, side: &str, confidence: u8) -> String {
    format!(
        "```json\n{{\"has_signal\": true, \"symbol\": \"{symbol}\", \"side\": \"{side}\", \"confidence\": {confidence}, \"summary\": \"called by trader\"}}\n```"
    )
}

/// Replies with the first rule whose needle occurs in the prompt.
///
/// Prompts matching a `fail_on` needle get a service error instead.
pub struct ScriptedReasoning {
    rules: Vec<(String, String)>,
    failures: Vec<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedReasoning {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            failures: Vec::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, needle: &str, reply: impl Into<String>) -> Self {
        self.rules.push((needle.to_string(), reply.into()));
        self
    }

    pub fn fail_on(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningClient for ScriptedReasoning {
    async fn generate(&self, prompt: &str) -> SignalResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failures.iter().any(|needle| prompt.contains(needle.as_str())) {
            return Err(SignalError::Api {
                status: 503,
                body: "upstream overloaded".to_string(),
            });
        }
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| NO_SIGNAL_REPLY.to_string()))
    }
}

/// Records every order; optionally refuses to connect.
pub struct RecordingVenue {
    venue: VenueId,
    reachable: bool,
    orders: Mutex<Vec<(String, TradeSide, Decimal)>>,
    reconnects: AtomicUsize,
}

impl RecordingVenue {
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            reachable: true,
            orders: Mutex::new(Vec::new()),
            reconnects: AtomicUsize::new(0),
        }
    }

    pub fn unreachable(venue: VenueId) -> Self {
        Self {
            reachable: false,
            ..Self::new(venue)
        }
    }

    pub fn orders(&self) -> Vec<(String, TradeSide, Decimal)> {
        self.orders.lock().unwrap().clone()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueClient for RecordingVenue {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> ExecutorResult<OrderReceipt> {
        self.orders
            .lock()
            .unwrap()
            .push((symbol.to_string(), side, amount));
        let order_id = format!("{}-{}", self.venue, self.orders.lock().unwrap().len());
        Ok(OrderReceipt {
            venue: self.venue,
            order_id,
            client_order_id: ClientOrderId::new(),
            symbol: symbol.to_string(),
            side,
            requested_amount: amount,
            filled_amount: None,
            price: None,
        })
    }

    async fn reconnect(&self) -> ExecutorResult<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(())
        } else {
            Err(ExecutorError::Connection {
                venue: self.venue,
                message: "connection refused".to_string(),
            })
        }
    }
}

/// Shared buffer for a test subscriber's formatted output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
