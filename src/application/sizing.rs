//! Position sizing: (intent, confidence, volatility) -> base quantity.
//!
//! Quote-notional model. Confidence scales the base notional up to 1x;
//! realized volatility divides it; the result clamps into the configured
//! [min_quote, max_quote] band. Every intermediate lands in
//! `sizing_inputs` on the intent for audit.

use crate::config::SizingConfig;
use crate::domain::analysis::{CombinedDecision, Signal};
use crate::domain::market::MarketSnapshot;
use crate::domain::trading::{OrderSide, SizingInputs, TradeIntent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::info;

pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    fn confidence_factor(&self, confidence: u8) -> f64 {
        (f64::from(confidence) / 100.0 * self.config.confidence_multiplier).clamp(0.1, 1.0)
    }

    fn vol_factor(&self, vol_pct: f64) -> f64 {
        let clamped = vol_pct.clamp(self.config.vol_floor, self.config.vol_cap);
        ((clamped / 2.0).powf(self.config.vol_sensitivity)).max(0.1)
    }

    /// The quote notional this decision would trade at. Deterministic;
    /// the guard chain uses the same number the final intent carries.
    pub fn position_quote(&self, confidence: u8, vol_pct: f64) -> Decimal {
        let scale = self.confidence_factor(confidence) / self.vol_factor(vol_pct);
        let scaled = self.config.base_notional_quote
            * Decimal::from_f64(scale).unwrap_or(Decimal::ONE);
        scaled
            .round_dp(2)
            .clamp(self.config.min_quote, self.config.max_quote)
    }

    /// Builds the intent for a PASS decision.
    pub fn build_intent(
        &self,
        decision: &CombinedDecision,
        snapshot: &MarketSnapshot,
        vol_pct: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<TradeIntent> {
        let side = match decision.signal {
            Signal::Buy => OrderSide::Buy,
            Signal::Sell => OrderSide::Sell,
            Signal::Hold => return None,
        };

        let reference_price = snapshot.reference_price();
        if reference_price <= Decimal::ZERO {
            return None;
        }

        let confidence_factor = self.confidence_factor(decision.confidence);
        let vol_factor = self.vol_factor(vol_pct);
        let position_quote = self.position_quote(decision.confidence, vol_pct);
        let quantity_base = (position_quote / reference_price).round_dp(8);

        info!(
            "PositionSizer: {} {} {} base ({} quote, conf_factor={:.3}, vol_factor={:.3})",
            side, quantity_base, decision.pair, position_quote, confidence_factor, vol_factor
        );

        // Marketable limit for entries, market-style for exits.
        let limit_price = match side {
            OrderSide::Buy => Some(snapshot.ticker.ask),
            OrderSide::Sell => None,
        };

        Some(TradeIntent {
            pair: decision.pair.clone(),
            side,
            quantity_base,
            limit_price,
            source_decision_id: decision.id,
            timestamp,
            sizing_inputs: SizingInputs {
                base_notional_quote: self.config.base_notional_quote,
                confidence_factor,
                vol_pct,
                vol_factor,
                position_quote,
                reference_price,
            },
        })
    }
}
