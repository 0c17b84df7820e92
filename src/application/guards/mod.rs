//! Guard chain: portfolio- and risk-level checks between the combiner and
//! the sizer.
//!
//! Guards run in a fixed order against one immutable portfolio copy taken
//! at chain entry; the first non-PASS outcome short-circuits. A VETO or
//! DOWNGRADE is a normal, journaled result, not an error.

mod concentration;
mod cooldown;
mod drawdown;
mod exposure;
mod volatility_guard;

pub use concentration::ConcentrationGuard;
pub use cooldown::CooldownGuard;
pub use drawdown::DrawdownGuard;
pub use exposure::ExposureGuard;
pub use volatility_guard::VolatilityGuard;

use crate::config::GuardConfig;
use crate::domain::analysis::CombinedDecision;
use crate::domain::market::MarketSnapshot;
use crate::domain::trading::{GuardOutcome, PortfolioState};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Everything a guard may observe. The portfolio is a copy taken once at
/// chain entry; the prospective notional is the sizer's deterministic
/// quote amount for this decision.
pub struct GuardContext<'a> {
    pub decision: &'a CombinedDecision,
    pub portfolio: &'a PortfolioState,
    pub snapshot: &'a MarketSnapshot,
    pub config: &'a GuardConfig,
    pub prospective_notional: Decimal,
    pub realized_vol_pct: f64,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

pub trait Guard: Send + Sync {
    fn id(&self) -> &'static str;

    fn evaluate(&self, ctx: &GuardContext<'_>) -> GuardOutcome;
}

/// The mandatory chain in its fixed order.
pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardChain {
    pub fn standard() -> Self {
        Self {
            guards: vec![
                Box::new(ExposureGuard),
                Box::new(ConcentrationGuard),
                Box::new(DrawdownGuard),
                Box::new(CooldownGuard),
                Box::new(VolatilityGuard),
            ],
        }
    }

    #[cfg(test)]
    pub fn of(guards: Vec<Box<dyn Guard>>) -> Self {
        Self { guards }
    }

    pub fn evaluate(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        for guard in &self.guards {
            let outcome = guard.evaluate(ctx);
            if !matches!(outcome, GuardOutcome::Pass) {
                info!(
                    "GuardChain: {} {} for {} ({})",
                    guard.id(),
                    outcome.result_str(),
                    ctx.decision.pair,
                    outcome.reason().unwrap_or("")
                );
                return outcome;
            }
        }
        GuardOutcome::Pass
    }
}

/// Last intent publication time per pair, feeding the cooldown guard. The
/// orchestrator records a publication; the chain only reads.
#[derive(Default)]
pub struct CooldownTracker {
    last_trade: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, symbol: &str, at: DateTime<Utc>) {
        self.last_trade
            .lock()
            .unwrap()
            .insert(symbol.to_string(), at);
    }

    pub fn last(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_trade.lock().unwrap().get(symbol).copied()
    }
}
