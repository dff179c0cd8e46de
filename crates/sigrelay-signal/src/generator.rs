//! Signal generator.
//!
//! `analyze` is single-attempt: one prompt, one reply, bounded by a timeout.
//! Every failure mode collapses to `None` after being logged, so the caller
//! can move on to the next message.

use crate::client::ReasoningClient;
use crate::error::SignalError;
use serde_json::Value;
use sigrelay_core::{ChatMessage, TradeSide, TradeSignal};
use sigrelay_telemetry::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of interpreting one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Signal(TradeSignal),
    /// The service saw no actionable signal; carries its explanation.
    NoSignal(String),
    /// Unparsable reply or a signal that violates an invariant.
    Invalid(String),
}

impl Analysis {
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Signal(_) => "signal",
            Self::NoSignal(_) => "no_signal",
            Self::Invalid(_) => "invalid",
        }
    }

    pub fn into_signal(self) -> Option<TradeSignal> {
        match self {
            Self::Signal(s) => Some(s),
            Self::NoSignal(_) | Self::Invalid(_) => None,
        }
    }
}

/// Prompt embedding the message and the expected reply schema.
pub fn build_prompt(msg: &ChatMessage) -> String {
    format!(
        r#"Analyze the following chat message and decide whether it contains a clear cryptocurrency trade signal.

Message:
- Author: {author}
- Channel: {channel}
- Time: {timestamp}
- Content: {content}

Decide:
1. Whether the message gives an explicit long or short recommendation
2. Which asset it refers to (BTC, ETH, ...)
3. The direction: BUY for long, SELL for short
4. Your confidence in the signal, as an integer from 0 to 100

If there is a clear signal, reply with:
{{
    "has_signal": true,
    "symbol": "ASSET/USDT (for example BTC/USDT)",
    "side": "BUY or SELL",
    "confidence": 0-100,
    "summary": "short rationale"
}}

If there is no clear signal (small talk, questions, vague opinions), reply with:
{{
    "has_signal": false,
    "summary": "why this is not a trade signal"
}}

Reply with JSON only."#,
        author = msg.author(),
        channel = msg.channel(),
        timestamp = msg.timestamp(),
        content = msg.content(),
    )
}

fn strip_code_fence(reply: &str) -> &str {
    let mut s = reply.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Interpret a reply. Never panics.
///
/// A missing `confidence` reads as 0; a fractional one is truncated.
pub fn parse_reply(reply: &str) -> Analysis {
    let value: Value = match serde_json::from_str(strip_code_fence(reply)) {
        Ok(v) => v,
        Err(e) => return Analysis::Invalid(format!("reply is not JSON: {e}")),
    };
    let Some(obj) = value.as_object() else {
        return Analysis::Invalid("reply is not a JSON object".to_string());
    };

    let summary = obj.get("summary").and_then(Value::as_str).unwrap_or("");
    if !obj.get("has_signal").and_then(Value::as_bool).unwrap_or(false) {
        return Analysis::NoSignal(summary.to_string());
    }

    let side = match obj.get("side").and_then(Value::as_str).map(str::parse::<TradeSide>) {
        Some(Ok(side)) => side,
        _ => {
            return Analysis::Invalid(format!(
                "side must be BUY or SELL, got {}",
                obj.get("side").unwrap_or(&Value::Null)
            ))
        }
    };
    let confidence = match obj.get("confidence") {
        None => 0,
        Some(v) => match v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64)) {
            Some(c) => c,
            None => return Analysis::Invalid(format!("confidence is not a number: {v}")),
        },
    };
    let symbol = obj.get("symbol").and_then(Value::as_str).unwrap_or("");

    match TradeSignal::new(symbol, side, confidence, summary) {
        Ok(signal) => Analysis::Signal(signal),
        Err(e) => Analysis::Invalid(e.to_string()),
    }
}

/// Turns chat messages into trade signals.
#[derive(Clone)]
pub struct SignalGenerator {
    client: Arc<dyn ReasoningClient>,
    timeout: Duration,
}

impl SignalGenerator {
    pub fn new(client: Arc<dyn ReasoningClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Ask the service and interpret its reply.
    pub async fn evaluate(&self, msg: &ChatMessage) -> Result<Analysis, SignalError> {
        let prompt = build_prompt(msg);
        let reply = tokio::time::timeout(self.timeout, self.client.generate(&prompt))
            .await
            .map_err(|_| SignalError::Timeout(self.timeout.as_millis() as u64))??;
        Ok(parse_reply(&reply))
    }

    /// Signal for `msg`, or `None`. Logs one summary line per call.
    pub async fn analyze(&self, msg: &ChatMessage) -> Option<TradeSignal> {
        let started = Instant::now();
        let result = self.evaluate(msg).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(Analysis::Signal(signal)) => {
                Metrics::analysis("signal", elapsed_ms);
                info!(
                    author = msg.author(),
                    channel = msg.channel(),
                    side = %signal.side(),
                    symbol = signal.symbol(),
                    confidence = signal.confidence(),
                    summary = signal.summary(),
                    "Analysis complete: trade signal"
                );
                Some(signal)
            }
            Ok(analysis @ Analysis::NoSignal(_)) | Ok(analysis @ Analysis::Invalid(_)) => {
                Metrics::analysis(analysis.outcome(), elapsed_ms);
                let detail = match &analysis {
                    Analysis::NoSignal(s) | Analysis::Invalid(s) => s.as_str(),
                    Analysis::Signal(_) => "",
                };
                info!(
                    author = msg.author(),
                    channel = msg.channel(),
                    outcome = analysis.outcome(),
                    detail,
                    "Analysis complete: no trade signal"
                );
                None
            }
            Err(e) => {
                let outcome = match &e {
                    SignalError::Timeout(_) => "timeout",
                    _ => "failed",
                };
                Metrics::analysis(outcome, elapsed_ms);
                warn!(
                    author = msg.author(),
                    channel = msg.channel(),
                    error = %e,
                    "Analysis failed: no trade signal"
                );
                None
            }
        }
    }
}
