//! REST venue clients.
//!
//! - [`BinanceStyleClient`]: Binance and MEXC spot (`/api/v3`), query-string
//!   HMAC-SHA256 signatures
//! - [`BybitClient`]: Bybit v5 spot, header HMAC-SHA256 signatures
//!
//! All orders are MARKET orders sized in quote currency.

use crate::error::{ExecutorError, ExecutorResult};
use crate::venue::VenueClient;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use sigrelay_core::{ClientOrderId, Credentials, OrderReceipt, TradeSide, VenueId};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: u64 = 5000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub const BINANCE_BASE_URL: &str = "https://api.binance.com";
pub const MEXC_BASE_URL: &str = "https://api.mexc.com";
pub const BYBIT_BASE_URL: &str = "https://api.bybit.com";

/// `BTC/USDT`, `btc-usdt` and `BTCUSDT` all become `BTCUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn sign_hex(secret: &str, payload: &str) -> ExecutorResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExecutorError::Signing(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn http_client() -> ExecutorResult<Client> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn decimal_field(value: &Value, key: &str) -> Option<Decimal> {
    match value.get(key)? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build the client for `venue`. `base_url` overrides the public endpoint.
pub fn build_client(
    venue: VenueId,
    credentials: Credentials,
    base_url: Option<String>,
) -> ExecutorResult<Arc<dyn VenueClient>> {
    Ok(match venue {
        VenueId::Binance => Arc::new(BinanceStyleClient::binance(credentials, base_url)?),
        VenueId::Mexc => Arc::new(BinanceStyleClient::mexc(credentials, base_url)?),
        VenueId::Bybit => Arc::new(BybitClient::new(credentials, base_url)?),
    })
}

// ============================================================================
// Binance / MEXC
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Binance-compatible spot API (Binance, MEXC).
pub struct BinanceStyleClient {
    venue: VenueId,
    credentials: Credentials,
    base_url: String,
    api_key_header: &'static str,
    http: Client,
}

impl BinanceStyleClient {
    pub fn binance(credentials: Credentials, base_url: Option<String>) -> ExecutorResult<Self> {
        Self::new(
            VenueId::Binance,
            credentials,
            base_url.unwrap_or_else(|| BINANCE_BASE_URL.to_string()),
            "X-MBX-APIKEY",
        )
    }

    pub fn mexc(credentials: Credentials, base_url: Option<String>) -> ExecutorResult<Self> {
        Self::new(
            VenueId::Mexc,
            credentials,
            base_url.unwrap_or_else(|| MEXC_BASE_URL.to_string()),
            "X-MEXC-APIKEY",
        )
    }

    fn new(
        venue: VenueId,
        credentials: Credentials,
        base_url: String,
        api_key_header: &'static str,
    ) -> ExecutorResult<Self> {
        Ok(Self {
            venue,
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_header,
            http: http_client()?,
        })
    }

    fn order_query(
        &self,
        symbol: &str,
        side: TradeSide,
        amount: Decimal,
        client_order_id: &ClientOrderId,
        timestamp: i64,
    ) -> String {
        format!(
            "symbol={symbol}&side={}&type=MARKET&quoteOrderQty={}&newClientOrderId={client_order_id}&recvWindow={RECV_WINDOW_MS}&timestamp={timestamp}",
            side.as_str(),
            amount.normalize(),
        )
    }

    async fn error_from(&self, response: Response) -> ExecutorError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiError>(&body) {
            Ok(err) if !err.msg.is_empty() => ExecutorError::OrderRejected {
                venue: self.venue,
                code: err.code,
                message: err.msg,
            },
            _ => ExecutorError::OrderRejected {
                venue: self.venue,
                code: i64::from(status),
                message: body,
            },
        }
    }
}

#[async_trait]
impl VenueClient for BinanceStyleClient {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> ExecutorResult<OrderReceipt> {
        let client_order_id = ClientOrderId::new();
        let query = self.order_query(
            &normalize_symbol(symbol),
            side,
            amount,
            &client_order_id,
            now_ms(),
        );
        let signature = sign_hex(self.credentials.api_secret(), &query)?;
        let url = format!("{}/api/v3/order?{query}&signature={signature}", self.base_url);

        debug!(venue = %self.venue, %client_order_id, "Submitting market order");
        let response = self
            .http
            .post(&url)
            .header(self.api_key_header, self.credentials.api_key())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from(response).await);
        }

        let body: Value = response.json().await?;
        let order_id = id_field(&body, "orderId").ok_or_else(|| {
            ExecutorError::InvalidResponse(format!("{} reply without orderId: {body}", self.venue))
        })?;
        let filled = decimal_field(&body, "executedQty").filter(|q| !q.is_zero());
        let price = match (filled, decimal_field(&body, "cummulativeQuoteQty")) {
            (Some(qty), Some(quote)) => Some(quote / qty),
            _ => None,
        };

        let receipt = OrderReceipt {
            venue: self.venue,
            order_id,
            client_order_id,
            symbol: symbol.to_string(),
            side,
            requested_amount: amount,
            filled_amount: filled,
            price,
        };
        info!(%receipt, "Order accepted");
        Ok(receipt)
    }

    async fn reconnect(&self) -> ExecutorResult<()> {
        let url = format!("{}/api/v3/ping", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ExecutorError::Connection {
                venue: self.venue,
                message: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExecutorError::Connection {
                venue: self.venue,
                message: format!("ping returned {}", response.status()),
            })
        }
    }
}

// ============================================================================
// Bybit
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitEnvelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

/// Bybit v5 unified API, spot category.
pub struct BybitClient {
    credentials: Credentials,
    base_url: String,
    http: Client,
}

impl BybitClient {
    pub fn new(credentials: Credentials, base_url: Option<String>) -> ExecutorResult<Self> {
        Ok(Self {
            credentials,
            base_url: base_url
                .unwrap_or_else(|| BYBIT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            http: http_client()?,
        })
    }

    fn side_str(side: TradeSide) -> &'static str {
        match side {
            TradeSide::Buy => "Buy",
            TradeSide::Sell => "Sell",
        }
    }

    /// `timestamp + api_key + recv_window + body`
    fn signature(&self, timestamp: i64, body: &str) -> ExecutorResult<String> {
        let payload = format!(
            "{timestamp}{}{RECV_WINDOW_MS}{body}",
            self.credentials.api_key()
        );
        sign_hex(self.credentials.api_secret(), &payload)
    }

    async fn envelope(response: Response) -> ExecutorResult<BybitEnvelope> {
        let status = response.status();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|_| {
            ExecutorError::InvalidResponse(format!("bybit returned {status}: {body}"))
        })
    }
}

#[async_trait]
impl VenueClient for BybitClient {
    fn venue(&self) -> VenueId {
        VenueId::Bybit
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> ExecutorResult<OrderReceipt> {
        let client_order_id = ClientOrderId::new();
        let body = json!({
            "category": "spot",
            "symbol": normalize_symbol(symbol),
            "side": Self::side_str(side),
            "orderType": "Market",
            "qty": amount.normalize().to_string(),
            "marketUnit": "quoteCoin",
            "orderLinkId": client_order_id.as_str(),
        })
        .to_string();
        let timestamp = now_ms();
        let signature = self.signature(timestamp, &body)?;

        debug!(venue = "bybit", %client_order_id, "Submitting market order");
        let response = self
            .http
            .post(format!("{}/v5/order/create", self.base_url))
            .header("X-BAPI-API-KEY", self.credentials.api_key())
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let envelope = Self::envelope(response).await?;
        if envelope.ret_code != 0 {
            return Err(ExecutorError::OrderRejected {
                venue: VenueId::Bybit,
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }
        let order_id = id_field(&envelope.result, "orderId").ok_or_else(|| {
            ExecutorError::InvalidResponse(format!("bybit reply without orderId: {}", envelope.result))
        })?;

        // Fills arrive asynchronously on Bybit.
        let receipt = OrderReceipt {
            venue: VenueId::Bybit,
            order_id,
            client_order_id,
            symbol: symbol.to_string(),
            side,
            requested_amount: amount,
            filled_amount: None,
            price: None,
        };
        info!(%receipt, "Order accepted");
        Ok(receipt)
    }

    async fn reconnect(&self) -> ExecutorResult<()> {
        let connection = |message: String| ExecutorError::Connection {
            venue: VenueId::Bybit,
            message,
        };
        let response = self
            .http
            .get(format!("{}/v5/market/time", self.base_url))
            .send()
            .await
            .map_err(|e| connection(e.to_string()))?;
        let envelope = Self::envelope(response)
            .await
            .map_err(|e| connection(e.to_string()))?;
        if envelope.ret_code == 0 {
            Ok(())
        } else {
            Err(connection(envelope.ret_msg))
        }
    }
}
