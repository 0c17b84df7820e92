//! Built-in analyst roles.
//!
//! Each role reduces the snapshot to the digest its specialty cares about;
//! the digest travels to the opinion source as plain JSON so LLM-backed
//! sources can drop it straight into a prompt.

use crate::domain::analysis::DataQuality;
use crate::domain::market::MarketSnapshot;
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;
use ta::Next;
use ta::indicators::{
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};

const RSI_PERIOD: usize = 14;
const SMA_FAST_PERIOD: usize = 10;
const SMA_SLOW_PERIOD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalystRole {
    Technical,
    Sentiment,
    Liquidity,
    Funding,
    OpenInterest,
}

/// A role's reduced view of the snapshot plus how complete that view was.
#[derive(Debug, Clone)]
pub struct RoleDigest {
    pub value: serde_json::Value,
    pub quality: DataQuality,
}

impl AnalystRole {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "technical" => Some(AnalystRole::Technical),
            "sentiment" => Some(AnalystRole::Sentiment),
            "liquidity" => Some(AnalystRole::Liquidity),
            "funding" => Some(AnalystRole::Funding),
            "open_interest" => Some(AnalystRole::OpenInterest),
            _ => None,
        }
    }

    pub fn digest(&self, snapshot: &MarketSnapshot) -> RoleDigest {
        match self {
            AnalystRole::Technical => technical_digest(snapshot),
            AnalystRole::Sentiment => sentiment_digest(snapshot),
            AnalystRole::Liquidity => liquidity_digest(snapshot),
            AnalystRole::Funding => derivatives_digest(snapshot, "funding"),
            AnalystRole::OpenInterest => derivatives_digest(snapshot, "open_interest"),
        }
    }
}

fn technical_digest(snapshot: &MarketSnapshot) -> RoleDigest {
    let closes = snapshot.closes();

    // Indicators need a warm window; a short one still yields values but
    // flags the opinion as PARTIAL.
    let quality = if closes.len() >= SMA_SLOW_PERIOD {
        DataQuality::Full
    } else {
        DataQuality::Partial
    };

    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).expect("period > 0");
    let mut sma_fast = SimpleMovingAverage::new(SMA_FAST_PERIOD).expect("period > 0");
    let mut sma_slow = SimpleMovingAverage::new(SMA_SLOW_PERIOD).expect("period > 0");
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).expect("valid periods");

    let mut rsi_val = 50.0;
    let mut fast_val = 0.0;
    let mut slow_val = 0.0;
    let mut macd_hist = 0.0;
    for close in &closes {
        rsi_val = rsi.next(*close);
        fast_val = sma_fast.next(*close);
        slow_val = sma_slow.next(*close);
        macd_hist = macd.next(*close).histogram;
    }

    RoleDigest {
        value: json!({
            "last_close": closes.last().copied().unwrap_or(0.0),
            "rsi": rsi_val,
            "sma_fast": fast_val,
            "sma_slow": slow_val,
            "macd_hist": macd_hist,
            "window": closes.len(),
        }),
        quality,
    }
}

fn sentiment_digest(snapshot: &MarketSnapshot) -> RoleDigest {
    let closes = snapshot.closes();
    let change_pct = match (closes.first(), closes.last()) {
        (Some(first), Some(last)) if *first > 0.0 => (last - first) / first * 100.0,
        _ => 0.0,
    };

    RoleDigest {
        value: json!({
            "price_change_pct": change_pct,
            "volume_24h": snapshot.ticker.volume_24h.to_f64().unwrap_or(0.0),
            "trades_last_candle": snapshot.latest_candle().map(|c| c.trades).unwrap_or(0),
        }),
        quality: DataQuality::Full,
    }
}

fn liquidity_digest(snapshot: &MarketSnapshot) -> RoleDigest {
    RoleDigest {
        value: json!({
            "imbalance": snapshot.depth.imbalance(),
            "spread_pct": snapshot.ticker.spread_pct(),
            "bid_levels": snapshot.depth.bids.len(),
            "ask_levels": snapshot.depth.asks.len(),
        }),
        quality: DataQuality::Full,
    }
}

/// Funding and open-interest roles share the derivatives fact; without it
/// they still run, on a PARTIAL view.
fn derivatives_digest(snapshot: &MarketSnapshot, focus: &str) -> RoleDigest {
    match &snapshot.derivatives {
        Some(fact) => {
            let price = snapshot.reference_price().to_f64().unwrap_or(0.0);
            let basis_pct = if price > 0.0 {
                fact.basis.to_f64().unwrap_or(0.0) / price * 100.0
            } else {
                0.0
            };
            RoleDigest {
                value: json!({
                    "focus": focus,
                    "funding_rate": fact.funding_rate.to_f64().unwrap_or(0.0),
                    "open_interest": fact.open_interest.to_f64().unwrap_or(0.0),
                    "basis_pct": basis_pct,
                }),
                quality: DataQuality::Full,
            }
        }
        None => RoleDigest {
            value: json!({ "focus": focus }),
            quality: DataQuality::Partial,
        },
    }
}
