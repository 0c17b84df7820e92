//! Binance market-data connector.
//!
//! Serves all five capabilities: spot klines, 24h ticker and depth, plus
//! funding rate and open interest from the futures API. Every call returns
//! a classified `ProviderError` so the registry can retry or fail over.

use crate::domain::errors::ProviderError;
use crate::domain::market::{Candle, DepthLevel, DepthLevels, Pair, Ticker};
use crate::domain::ports::{
    Capability, FundingSample, MarketDataProvider, OpenInterestSample,
};
use crate::infrastructure::http::HttpClientFactory;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct BinanceProvider {
    id: String,
    client: Client,
    api_key: String,
    base_url: String,
    futures_url: String,
    capabilities: Vec<Capability>,
}

impl BinanceProvider {
    pub fn builder() -> BinanceProviderBuilder {
        BinanceProviderBuilder::default()
    }

    fn api_symbol(pair: &Pair) -> String {
        format!("{}{}", pair.base, pair.quote)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let mut request = self.client.get(url).query(query);
        if !self.api_key.is_empty() {
            request = request.header("X-MBX-APIKEY", &self.api_key);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &body));
        }

        response.json::<T>().await.map_err(|e| ProviderError::Permanent {
            reason: format!("unparseable Binance payload: {}", e),
        })
    }
}

#[derive(Default)]
pub struct BinanceProviderBuilder {
    id: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    futures_url: Option<String>,
    capabilities: Option<Vec<Capability>>,
}

impl BinanceProviderBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn futures_url(mut self, futures_url: impl Into<String>) -> Self {
        self.futures_url = Some(futures_url.into());
        self
    }

    pub fn capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn build(self) -> BinanceProvider {
        BinanceProvider {
            id: self.id.unwrap_or_else(|| "binance".to_string()),
            client: HttpClientFactory::create_client(),
            api_key: self.api_key.unwrap_or_default(),
            base_url: self
                .base_url
                .unwrap_or_else(|| "https://api.binance.com".to_string()),
            futures_url: self
                .futures_url
                .unwrap_or_else(|| "https://fapi.binance.com".to_string()),
            capabilities: self.capabilities.unwrap_or_else(|| {
                vec![
                    Capability::Candles,
                    Capability::Ticker,
                    Capability::Depth,
                    Capability::Funding,
                    Capability::OpenInterest,
                ]
            }),
        }
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        // Kline rows: [openTime, open, high, low, close, volume, closeTime,
        // quoteVolume, trades, ...]
        let rows: Vec<Vec<serde_json::Value>> = self
            .get_json(
                &url,
                &[
                    ("symbol", Self::api_symbol(pair)),
                    ("interval", pair.interval.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(parse_kline_row(&row)?);
        }
        debug!(
            "BinanceProvider: Fetched {} candles for {}",
            candles.len(),
            pair
        );
        Ok(candles)
    }

    async fn fetch_ticker(&self, pair: &Pair) -> Result<Ticker, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Ticker24hr {
            last_price: String,
            bid_price: String,
            ask_price: String,
            volume: String,
            close_time: i64,
        }

        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let raw: Ticker24hr = self
            .get_json(&url, &[("symbol", Self::api_symbol(pair))])
            .await?;

        Ok(Ticker {
            last: parse_decimal(&raw.last_price, "lastPrice")?,
            bid: parse_decimal(&raw.bid_price, "bidPrice")?,
            ask: parse_decimal(&raw.ask_price, "askPrice")?,
            volume_24h: parse_decimal(&raw.volume, "volume")?,
            timestamp: millis_to_utc(raw.close_time)?,
        })
    }

    async fn fetch_depth(
        &self,
        pair: &Pair,
        levels: usize,
    ) -> Result<DepthLevels, ProviderError> {
        #[derive(Deserialize)]
        struct DepthPayload {
            bids: Vec<(String, String)>,
            asks: Vec<(String, String)>,
        }

        let url = format!("{}/api/v3/depth", self.base_url);
        let raw: DepthPayload = self
            .get_json(
                &url,
                &[
                    ("symbol", Self::api_symbol(pair)),
                    ("limit", levels.to_string()),
                ],
            )
            .await?;

        Ok(DepthLevels {
            bids: parse_levels(&raw.bids)?,
            asks: parse_levels(&raw.asks)?,
            // The depth endpoint carries no timestamp; receipt time is the
            // freshest consistent stamp available.
            timestamp: Utc::now(),
        })
    }

    async fn fetch_funding(&self, pair: &Pair) -> Result<FundingSample, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PremiumIndex {
            mark_price: String,
            index_price: String,
            last_funding_rate: String,
            time: i64,
        }

        let url = format!("{}/fapi/v1/premiumIndex", self.futures_url);
        let raw: PremiumIndex = self
            .get_json(&url, &[("symbol", Self::api_symbol(pair))])
            .await?;

        let mark = parse_decimal(&raw.mark_price, "markPrice")?;
        let index = parse_decimal(&raw.index_price, "indexPrice")?;
        Ok(FundingSample {
            funding_rate: parse_decimal(&raw.last_funding_rate, "lastFundingRate")?,
            basis: mark - index,
            timestamp: millis_to_utc(raw.time)?,
        })
    }

    async fn fetch_open_interest(
        &self,
        pair: &Pair,
    ) -> Result<OpenInterestSample, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct OpenInterestPayload {
            open_interest: String,
            time: i64,
        }

        let url = format!("{}/fapi/v1/openInterest", self.futures_url);
        let raw: OpenInterestPayload = self
            .get_json(&url, &[("symbol", Self::api_symbol(pair))])
            .await?;

        Ok(OpenInterestSample {
            open_interest: parse_decimal(&raw.open_interest, "openInterest")?,
            timestamp: millis_to_utc(raw.time)?,
        })
    }
}

fn parse_kline_row(row: &[serde_json::Value]) -> Result<Candle, ProviderError> {
    if row.len() < 9 {
        return Err(ProviderError::Permanent {
            reason: format!("kline row has {} fields, expected >= 9", row.len()),
        });
    }
    let open_time = row[0].as_i64().ok_or_else(|| malformed("openTime"))?;
    let close_time = row[6].as_i64().ok_or_else(|| malformed("closeTime"))?;
    let trades = row[8].as_u64().ok_or_else(|| malformed("trades"))?;

    Ok(Candle {
        open_time: millis_to_utc(open_time)?,
        open: parse_decimal(row[1].as_str().ok_or_else(|| malformed("open"))?, "open")?,
        high: parse_decimal(row[2].as_str().ok_or_else(|| malformed("high"))?, "high")?,
        low: parse_decimal(row[3].as_str().ok_or_else(|| malformed("low"))?, "low")?,
        close: parse_decimal(row[4].as_str().ok_or_else(|| malformed("close"))?, "close")?,
        volume: parse_decimal(
            row[5].as_str().ok_or_else(|| malformed("volume"))?,
            "volume",
        )?,
        close_time: millis_to_utc(close_time)?,
        trades,
    })
}

fn parse_levels(raw: &[(String, String)]) -> Result<Vec<DepthLevel>, ProviderError> {
    raw.iter()
        .map(|(price, size)| {
            Ok(DepthLevel {
                price: parse_decimal(price, "price")?,
                size: parse_decimal(size, "size")?,
            })
        })
        .collect()
}

pub(crate) fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, ProviderError> {
    Decimal::from_str_exact(raw).map_err(|_| ProviderError::Permanent {
        reason: format!("non-numeric {}: '{}'", field, raw),
    })
}

pub(crate) fn millis_to_utc(millis: i64) -> Result<DateTime<Utc>, ProviderError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ProviderError::Permanent {
            reason: format!("timestamp out of range: {}", millis),
        })
}

fn malformed(field: &str) -> ProviderError {
    ProviderError::Permanent {
        reason: format!("malformed kline field: {}", field),
    }
}

pub(crate) fn classify_transport(err: reqwest::Error) -> ProviderError {
    ProviderError::Transient {
        reason: format!("transport failure: {}", err),
    }
}

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps an HTTP status to the provider error taxonomy. 451 is the
/// region-block status both Binance and Coinbase use.
pub(crate) fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth {
            reason: format!("HTTP {}: {}", status, truncate(body)),
        },
        418 | 429 => ProviderError::RateLimited {
            retry_after: retry_after.unwrap_or(Duration::from_secs(1)),
        },
        451 => ProviderError::RegionBlocked,
        400 | 404 => ProviderError::Permanent {
            reason: format!("HTTP {}: {}", status, truncate(body)),
        },
        _ => ProviderError::Transient {
            reason: format!("HTTP {}: {}", status, truncate(body)),
        },
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Interval;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kline_row_parsing() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1709294400000, "50000.1", "50500.0", "49800.5", "50200.0", "120.5",
                1709297999999, "6049000.0", 5123]"#,
        )
        .unwrap();
        let candle = parse_kline_row(&row).unwrap();
        assert_eq!(candle.open, dec!(50000.1));
        assert_eq!(candle.trades, 5123);
        assert!(candle.validate(Interval::OneHour).is_ok());
    }

    #[test]
    fn test_kline_row_rejects_short_rows() {
        let row: Vec<serde_json::Value> = serde_json::from_str(r#"[1709294400000]"#).unwrap();
        assert!(matches!(
            parse_kline_row(&row),
            Err(ProviderError::Permanent { .. })
        ));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(429, Some(Duration::from_secs(2)), ""),
            ProviderError::RateLimited { retry_after } if retry_after == Duration::from_secs(2)
        ));
        assert!(matches!(
            classify_status(451, None, ""),
            ProviderError::RegionBlocked
        ));
        assert!(matches!(
            classify_status(401, None, "bad key"),
            ProviderError::Auth { .. }
        ));
        assert!(matches!(
            classify_status(503, None, ""),
            ProviderError::Transient { .. }
        ));
        assert!(matches!(
            classify_status(404, None, ""),
            ProviderError::Permanent { .. }
        ));
    }

    #[test]
    fn test_api_symbol_concatenation() {
        let pair = Pair::new("BTC", "USDT", Interval::OneHour);
        assert_eq!(BinanceProvider::api_symbol(&pair), "BTCUSDT");
    }
}
