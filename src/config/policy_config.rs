use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decision combiner thresholds (§ weighted-mean aggregation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinerConfig {
    #[serde(default = "CombinerConfig::default_theta")]
    pub theta_buy: f64,
    #[serde(default = "CombinerConfig::default_theta")]
    pub theta_sell: f64,
    /// Weight multiplier applied to PARTIAL/FALLBACK opinions before
    /// renormalization.
    #[serde(default = "CombinerConfig::default_fallback_penalty")]
    pub fallback_penalty: f64,
}

impl CombinerConfig {
    fn default_theta() -> f64 {
        0.15
    }

    fn default_fallback_penalty() -> f64 {
        0.5
    }
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            theta_buy: Self::default_theta(),
            theta_sell: Self::default_theta(),
            fallback_penalty: Self::default_fallback_penalty(),
        }
    }
}

/// Guard-chain thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Cap on total open notional across the portfolio, in quote currency.
    pub exposure_cap_quote: Decimal,
    /// Max share of portfolio equity a single base asset may reach, in %.
    pub per_asset_cap_pct: f64,
    /// Drawdown from peak (%) at or above which new entries downgrade.
    pub drawdown_pause_pct: f64,
    /// Minimum seconds between intents for the same pair.
    pub cooldown_sec: u64,
    /// Realized volatility (%) above which new entries downgrade.
    pub vol_upper_pct: f64,
}

impl GuardConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_sec)
    }
}

/// Position sizing parameters (quote-notional model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub base_notional_quote: Decimal,
    pub min_quote: Decimal,
    pub max_quote: Decimal,
    #[serde(default = "SizingConfig::default_confidence_multiplier")]
    pub confidence_multiplier: f64,
    #[serde(default = "SizingConfig::default_vol_floor")]
    pub vol_floor: f64,
    #[serde(default = "SizingConfig::default_vol_cap")]
    pub vol_cap: f64,
    #[serde(default = "SizingConfig::default_vol_sensitivity")]
    pub vol_sensitivity: f64,
}

impl SizingConfig {
    fn default_confidence_multiplier() -> f64 {
        1.0
    }

    fn default_vol_floor() -> f64 {
        0.5
    }

    fn default_vol_cap() -> f64 {
        10.0
    }

    fn default_vol_sensitivity() -> f64 {
        1.0
    }
}

/// Snapshot assembly budgets. Candle staleness is expressed in intervals
/// because it scales with the pair's timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "SnapshotConfig::default_candle_limit")]
    pub candle_limit: usize,
    #[serde(default = "SnapshotConfig::default_depth_levels")]
    pub depth_levels: usize,
    #[serde(default = "SnapshotConfig::default_candle_max_age_intervals")]
    pub candle_max_age_intervals: u32,
    #[serde(default = "SnapshotConfig::default_ticker_max_age_ms")]
    pub ticker_max_age_ms: u64,
    #[serde(default = "SnapshotConfig::default_depth_max_age_ms")]
    pub depth_max_age_ms: u64,
    #[serde(default = "SnapshotConfig::default_derivatives_max_age_ms")]
    pub derivatives_max_age_ms: u64,
}

impl SnapshotConfig {
    fn default_candle_limit() -> usize {
        50
    }

    fn default_depth_levels() -> usize {
        20
    }

    fn default_candle_max_age_intervals() -> u32 {
        1
    }

    fn default_ticker_max_age_ms() -> u64 {
        5_000
    }

    fn default_depth_max_age_ms() -> u64 {
        10_000
    }

    fn default_derivatives_max_age_ms() -> u64 {
        60_000
    }

    pub fn ticker_max_age(&self) -> Duration {
        Duration::from_millis(self.ticker_max_age_ms)
    }

    pub fn depth_max_age(&self) -> Duration {
        Duration::from_millis(self.depth_max_age_ms)
    }

    pub fn derivatives_max_age(&self) -> Duration {
        Duration::from_millis(self.derivatives_max_age_ms)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            candle_limit: Self::default_candle_limit(),
            depth_levels: Self::default_depth_levels(),
            candle_max_age_intervals: Self::default_candle_max_age_intervals(),
            ticker_max_age_ms: Self::default_ticker_max_age_ms(),
            depth_max_age_ms: Self::default_depth_max_age_ms(),
            derivatives_max_age_ms: Self::default_derivatives_max_age_ms(),
        }
    }
}

/// Journal sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    pub path: String,
    #[serde(default = "JournalConfig::default_fsync")]
    pub fsync_each_record: bool,
}

impl JournalConfig {
    fn default_fsync() -> bool {
        true
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            exposure_cap_quote: dec!(50000),
            per_asset_cap_pct: 25.0,
            drawdown_pause_pct: 10.0,
            cooldown_sec: 3_600,
            vol_upper_pct: 8.0,
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_notional_quote: dec!(1000),
            min_quote: dec!(100),
            max_quote: dec!(5000),
            confidence_multiplier: Self::default_confidence_multiplier(),
            vol_floor: Self::default_vol_floor(),
            vol_cap: Self::default_vol_cap(),
            vol_sensitivity: Self::default_vol_sensitivity(),
        }
    }
}
