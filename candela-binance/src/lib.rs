//! candela-binance
//!
//! `ExchangeClient` implementation over the public Binance spot REST API
//! (`GET /api/v3/klines`). No authentication is involved.
#![warn(missing_docs)]

mod builder;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use candela_core::{CandelaError, Candle, ExchangeClient, Timeframe};
use rust_decimal::Decimal;
use serde_json::Value;
use url::Url;

/// Public spot API root.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Largest page the klines endpoint serves.
pub const MAX_LIMIT: usize = 1_000;

const NAME: &str = "binance";

/// Binance klines client.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new_default()
    }
}

impl BinanceClient {
    /// Client against the public API with a 30 second request timeout.
    #[must_use]
    pub fn new_default() -> Self {
        Self::new_with_client(reqwest::Client::new(), DEFAULT_BASE_URL)
    }

    /// Client with an existing `reqwest::Client` and base URL (e.g. a mirror or test server).
    pub fn new_with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Point the client at another API root (mirror, testnet, local proxy).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exchange market id for a `BASE/QUOTE` pair, e.g. `BTC/USDT` → `BTCUSDT`.
    #[must_use]
    pub fn market_id(symbol: &str) -> String {
        symbol
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    fn klines_url(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Url, CandelaError> {
        let base = self.base_url.trim_end_matches('/');
        let limit = limit.clamp(1, MAX_LIMIT).to_string();
        let since = since_ms.to_string();
        let market = Self::market_id(symbol);
        Url::parse_with_params(
            &format!("{base}/api/v3/klines"),
            [
                ("symbol", market.as_str()),
                ("interval", timeframe.label()),
                ("startTime", since.as_str()),
                ("limit", limit.as_str()),
            ],
        )
        .map_err(|e| CandelaError::InvalidArg(format!("bad base url '{base}': {e}")))
    }

    fn map_transport(err: &reqwest::Error) -> CandelaError {
        if err.is_timeout() {
            CandelaError::provider_timeout(NAME)
        } else {
            CandelaError::connector(NAME, err.to_string())
        }
    }

    /// Only a body that arrived but does not decode is a data problem; a body cut
    /// off mid-transfer is retried like any other transport failure.
    fn map_body(err: &reqwest::Error) -> CandelaError {
        Self::classify_body(err.is_decode(), err.is_timeout(), err.to_string())
    }

    fn classify_body(is_decode: bool, is_timeout: bool, msg: String) -> CandelaError {
        if is_decode {
            CandelaError::Data(format!("{NAME}: invalid klines body: {msg}"))
        } else if is_timeout {
            CandelaError::provider_timeout(NAME)
        } else {
            CandelaError::connector(NAME, msg)
        }
    }

    async fn map_status(resp: reqwest::Response) -> CandelaError {
        let status = resp.status();
        let retry_after_ms = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(0, |secs| secs.saturating_mul(1_000));
        let body = resp.text().await.unwrap_or_default();
        let msg = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("msg").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);

        match status.as_u16() {
            429 | 418 => CandelaError::RateLimitExceeded {
                limit: 0,
                window_ms: retry_after_ms,
            },
            400 => CandelaError::InvalidArg(format!("{NAME}: {msg}")),
            404 => CandelaError::not_found(format!("{NAME} endpoint: {msg}")),
            _ => CandelaError::connector(NAME, format!("HTTP {status}: {msg}")),
        }
    }
}

/// Parse a klines payload: `[[openTime, open, high, low, close, volume, closeTime, ...], ...]`.
///
/// # Errors
/// Returns `Data` when the payload is not an array of well-formed klines.
pub fn parse_klines(json: &Value) -> Result<Vec<Candle>, CandelaError> {
    let rows = json
        .as_array()
        .ok_or_else(|| CandelaError::Data("klines payload is not an array".into()))?;
    rows.iter()
        .enumerate()
        .map(|(i, row)| parse_kline(row).map_err(|e| CandelaError::Data(format!("kline {i}: {e}"))))
        .collect()
}

fn parse_kline(row: &Value) -> Result<Candle, String> {
    let arr = row.as_array().ok_or("not an array")?;
    if arr.len() < 6 {
        return Err(format!("expected at least 6 fields, got {}", arr.len()));
    }
    let ts = arr[0].as_i64().ok_or("open time is not an integer")?;
    let num = |idx: usize| -> Result<Decimal, String> {
        match &arr[idx] {
            Value::String(s) => Decimal::from_str(s).map_err(|e| format!("field {idx}: {e}")),
            Value::Number(n) => {
                Decimal::from_str(&n.to_string()).map_err(|e| format!("field {idx}: {e}"))
            }
            other => Err(format!("field {idx} is not numeric: {other}")),
        }
    };
    Ok(Candle::new(ts, num(1)?, num(2)?, num(3)?, num(4)?, num(5)?))
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &'static str {
        NAME
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "candela_binance::fetch_candles",
            skip(self, timeframe),
            fields(timeframe = %timeframe),
            err,
        )
    )]
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, CandelaError> {
        let url = self.klines_url(symbol, timeframe, since_ms, limit)?;
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::map_transport(&e))?;
        if !resp.status().is_success() {
            return Err(Self::map_status(resp).await);
        }
        let json: Value = resp.json().await.map_err(|e| Self::map_body(&e))?;
        parse_klines(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_id_strips_separator() {
        assert_eq!(BinanceClient::market_id("BTC/USDT"), "BTCUSDT");
        assert_eq!(BinanceClient::market_id("1000shib/usdt"), "1000SHIBUSDT");
    }

    #[test]
    fn url_caps_limit_and_uses_labels() {
        let c = BinanceClient::new_with_client(reqwest::Client::new(), "http://localhost:1/");
        let url = c.klines_url("ETH/USDT", Timeframe::H4, 42, 5_000).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:1/api/v3/klines?symbol=ETHUSDT&interval=4h&startTime=42&limit=1000"
        );
    }

    #[test]
    fn interrupted_body_is_transient() {
        let cut = BinanceClient::classify_body(false, false, "connection reset".into());
        assert!(matches!(cut, CandelaError::Connector { .. }));
        assert!(cut.is_transient());

        let slow = BinanceClient::classify_body(false, true, "timed out".into());
        assert!(matches!(slow, CandelaError::ProviderTimeout { .. }));

        let garbled = BinanceClient::classify_body(true, false, "expected value".into());
        assert!(matches!(garbled, CandelaError::Data(_)));
        assert!(!garbled.is_transient());
    }

    #[test]
    fn parse_rejects_short_rows() {
        let v = serde_json::json!([[1, "1", "2"]]);
        assert!(matches!(parse_klines(&v), Err(CandelaError::Data(_))));
    }
}
