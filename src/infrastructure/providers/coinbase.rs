//! Coinbase Exchange market-data connector.
//!
//! Fallback venue serving CANDLES, TICKER and DEPTH only; the registry's
//! capability filter keeps it out of funding and open-interest chains.

use super::binance::{classify_status, classify_transport, parse_decimal, parse_retry_after};
use crate::domain::errors::ProviderError;
use crate::domain::market::{Candle, DepthLevel, DepthLevels, Pair, Ticker};
use crate::domain::ports::{Capability, MarketDataProvider};
use crate::infrastructure::http::HttpClientFactory;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Granularities the Coinbase candles endpoint accepts, in seconds.
const SUPPORTED_GRANULARITIES: &[i64] = &[60, 300, 900, 3_600, 21_600, 86_400];

pub struct CoinbaseProvider {
    id: String,
    client: Client,
    base_url: String,
    capabilities: Vec<Capability>,
}

impl CoinbaseProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client: HttpClientFactory::create_client(),
            base_url: base_url.into(),
            capabilities: vec![Capability::Candles, Capability::Ticker, Capability::Depth],
        }
    }

    fn product_id(pair: &Pair) -> String {
        format!("{}-{}", pair.base, pair.quote)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::USER_AGENT, "quorum/0.4")
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &body));
        }

        response.json::<T>().await.map_err(|e| ProviderError::Permanent {
            reason: format!("unparseable Coinbase payload: {}", e),
        })
    }
}

#[async_trait]
impl MarketDataProvider for CoinbaseProvider {
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
        let granularity = pair.interval.to_coinbase_granularity();
        if !SUPPORTED_GRANULARITIES.contains(&granularity) {
            return Err(ProviderError::Permanent {
                reason: format!(
                    "Coinbase does not serve {} candles",
                    pair.interval
                ),
            });
        }

        let url = format!("{}/products/{}/candles", self.base_url, Self::product_id(pair));
        // Rows come newest-first as [time, low, high, open, close, volume].
        let rows: Vec<Vec<serde_json::Value>> = self
            .get_json(&url, &[("granularity", granularity.to_string())])
            .await?;

        let mut candles = Vec::with_capacity(limit.min(rows.len()));
        for row in rows.into_iter().take(limit) {
            candles.push(parse_candle_row(&row, granularity)?);
        }
        candles.reverse();
        debug!(
            "CoinbaseProvider: Fetched {} candles for {}",
            candles.len(),
            pair
        );
        Ok(candles)
    }

    async fn fetch_ticker(&self, pair: &Pair) -> Result<Ticker, ProviderError> {
        #[derive(Deserialize)]
        struct TickerPayload {
            price: String,
            bid: String,
            ask: String,
            volume: String,
            time: DateTime<Utc>,
        }

        let url = format!("{}/products/{}/ticker", self.base_url, Self::product_id(pair));
        let raw: TickerPayload = self.get_json(&url, &[]).await?;

        Ok(Ticker {
            last: parse_decimal(&raw.price, "price")?,
            bid: parse_decimal(&raw.bid, "bid")?,
            ask: parse_decimal(&raw.ask, "ask")?,
            volume_24h: parse_decimal(&raw.volume, "volume")?,
            timestamp: raw.time,
        })
    }

    async fn fetch_depth(
        &self,
        pair: &Pair,
        levels: usize,
    ) -> Result<DepthLevels, ProviderError> {
        #[derive(Deserialize)]
        struct BookPayload {
            bids: Vec<Vec<serde_json::Value>>,
            asks: Vec<Vec<serde_json::Value>>,
        }

        let url = format!("{}/products/{}/book", self.base_url, Self::product_id(pair));
        let raw: BookPayload = self.get_json(&url, &[("level", "2".to_string())]).await?;

        Ok(DepthLevels {
            bids: parse_book_side(&raw.bids, levels)?,
            asks: parse_book_side(&raw.asks, levels)?,
            timestamp: Utc::now(),
        })
    }
}

fn parse_candle_row(row: &[serde_json::Value], granularity: i64) -> Result<Candle, ProviderError> {
    if row.len() < 6 {
        return Err(ProviderError::Permanent {
            reason: format!("candle row has {} fields, expected 6", row.len()),
        });
    }
    let time = row[0].as_i64().ok_or_else(|| malformed("time"))?;
    let open_time = Utc
        .timestamp_opt(time, 0)
        .single()
        .ok_or_else(|| malformed("time"))?;

    Ok(Candle {
        open_time,
        open: parse_numeric(&row[3], "open")?,
        high: parse_numeric(&row[2], "high")?,
        low: parse_numeric(&row[1], "low")?,
        close: parse_numeric(&row[4], "close")?,
        volume: parse_numeric(&row[5], "volume")?,
        close_time: open_time + ChronoDuration::seconds(granularity - 1),
        // Coinbase candle rows carry no trade count.
        trades: 0,
    })
}

fn parse_book_side(
    rows: &[Vec<serde_json::Value>],
    levels: usize,
) -> Result<Vec<DepthLevel>, ProviderError> {
    rows.iter()
        .take(levels)
        .map(|row| {
            if row.len() < 2 {
                return Err(malformed("book level"));
            }
            Ok(DepthLevel {
                price: parse_numeric(&row[0], "price")?,
                size: parse_numeric(&row[1], "size")?,
            })
        })
        .collect()
}

/// Coinbase mixes strings and bare numbers across endpoints.
fn parse_numeric(value: &serde_json::Value, field: &str) -> Result<rust_decimal::Decimal, ProviderError> {
    match value {
        serde_json::Value::String(s) => parse_decimal(s, field),
        serde_json::Value::Number(n) => parse_decimal(&n.to_string(), field),
        _ => Err(malformed(field)),
    }
}

fn malformed(field: &str) -> ProviderError {
    ProviderError::Permanent {
        reason: format!("malformed Coinbase field: {}", field),
    }
}
