use super::Interval;
use crate::domain::errors::ValidationError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A base/quote trading pair with its candle interval. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
    pub interval: Interval,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>, interval: Interval) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
            interval,
        }
    }

    /// "BTC/USDT", the journal and CLI spelling.
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Parses a "BASE/QUOTE" symbol; the interval comes from configuration.
    pub fn from_symbol(symbol: &str, interval: Interval) -> Result<Self, ValidationError> {
        let (base, quote) = symbol.split_once('/').ok_or_else(|| ValidationError::Pair {
            reason: format!("expected BASE/QUOTE, got '{}'", symbol),
        })?;
        if base.is_empty() || quote.is_empty() {
            return Err(ValidationError::Pair {
                reason: format!("empty base or quote in '{}'", symbol),
            });
        }
        Ok(Self::new(base, quote, interval))
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// One OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub trades: u64,
}

impl Candle {
    /// Enforces the candle invariants:
    /// low <= min(open, close) <= max(open, close) <= high, volume >= 0,
    /// open_time < close_time, open_time aligned to the interval.
    pub fn validate(&self, interval: Interval) -> Result<(), ValidationError> {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if self.low > body_low || body_high > self.high {
            return Err(ValidationError::Candle {
                reason: format!(
                    "OHLC out of order: low={} open={} close={} high={}",
                    self.low, self.open, self.close, self.high
                ),
            });
        }
        if self.volume < Decimal::ZERO {
            return Err(ValidationError::Candle {
                reason: format!("negative volume: {}", self.volume),
            });
        }
        if self.open_time >= self.close_time {
            return Err(ValidationError::Candle {
                reason: format!(
                    "open_time {} not before close_time {}",
                    self.open_time, self.close_time
                ),
            });
        }
        if !interval.is_boundary(self.open_time) {
            return Err(ValidationError::Candle {
                reason: format!(
                    "open_time {} not aligned to {} boundary",
                    self.open_time, interval
                ),
            });
        }
        Ok(())
    }
}

/// A single price level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order book depth: bids descending, asks ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevels {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub timestamp: DateTime<Utc>,
}

impl DepthLevels {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Bid volume minus ask volume over total, in [-1, 1]. Used by the
    /// liquidity analyst digest.
    pub fn imbalance(&self) -> f64 {
        let bid_vol: Decimal = self.bids.iter().map(|l| l.size).sum();
        let ask_vol: Decimal = self.asks.iter().map(|l| l.size).sum();
        let total = bid_vol + ask_vol;
        if total.is_zero() {
            return 0.0;
        }
        use rust_decimal::prelude::ToPrimitive;
        ((bid_vol - ask_vol) / total).to_f64().unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for level in self.bids.iter().chain(self.asks.iter()) {
            if level.price <= Decimal::ZERO || level.size <= Decimal::ZERO {
                return Err(ValidationError::Depth {
                    reason: format!(
                        "non-positive level: price={} size={}",
                        level.price, level.size
                    ),
                });
            }
        }
        if !self.bids.windows(2).all(|w| w[0].price > w[1].price) {
            return Err(ValidationError::Depth {
                reason: "bids not strictly descending".to_string(),
            });
        }
        if !self.asks.windows(2).all(|w| w[0].price < w[1].price) {
            return Err(ValidationError::Depth {
                reason: "asks not strictly ascending".to_string(),
            });
        }
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask())
            && bid >= ask
        {
            return Err(ValidationError::Depth {
                reason: format!("crossed book: best bid {} >= best ask {}", bid, ask),
            });
        }
        Ok(())
    }
}

/// Latest trade/quote summary for a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bid > self.last || self.last > self.ask {
            return Err(ValidationError::Ticker {
                reason: format!(
                    "quote out of order: bid={} last={} ask={}",
                    self.bid, self.last, self.ask
                ),
            });
        }
        if self.last <= Decimal::ZERO {
            return Err(ValidationError::Ticker {
                reason: format!("non-positive last price: {}", self.last),
            });
        }
        Ok(())
    }

    pub fn spread_pct(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        if self.last.is_zero() {
            return 0.0;
        }
        ((self.ask - self.bid) / self.last).to_f64().unwrap_or(0.0)
    }
}

/// Derivatives market context, optional per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativesFact {
    pub funding_rate: Decimal,
    pub open_interest: Decimal,
    pub basis: Decimal,
    pub timestamp: DateTime<Utc>,
}
