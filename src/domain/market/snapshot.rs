use super::{Candle, DepthLevels, DerivativesFact, Pair, Ticker};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Whether every configured component made it into the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotQuality {
    Full,
    Partial,
}

/// Immutable bundle of market data feeding one cycle.
///
/// `t_snap` is the minimum timestamp among the required components
/// (candles, ticker, depth); no required component is older than that.
/// Derivatives data is optional and its absence degrades `quality` to
/// Partial without blocking the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub pair: Pair,
    pub t_snap: DateTime<Utc>,
    pub candles: Vec<Candle>,
    pub ticker: Ticker,
    pub depth: DepthLevels,
    pub derivatives: Option<DerivativesFact>,
    pub quality: SnapshotQuality,
}

impl MarketSnapshot {
    /// The price the sizer converts quote notional with.
    pub fn reference_price(&self) -> Decimal {
        self.ticker.last
    }

    /// Close prices oldest-first, for indicator and volatility windows.
    pub fn closes(&self) -> Vec<f64> {
        self.candles
            .iter()
            .filter_map(|c| c.close.to_f64())
            .collect()
    }

    pub fn latest_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }
}
