use crate::domain::market::Pair;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// One open position as reported by the portfolio collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub qty: Decimal,
    pub avg_entry: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Current market value of the position in quote currency.
    pub fn notional(&self) -> Decimal {
        self.qty * self.avg_entry + self.unrealized_pnl
    }
}

/// Read-only view of the external portfolio, copied once at guard-chain
/// entry so every guard sees the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash_quote: Decimal,
    pub positions: HashMap<String, Position>,
    pub open_risk_exposure: Decimal,
    /// Percent below the equity peak, e.g. 12.0 for a 12% drawdown.
    pub drawdown_from_peak: f64,
}

impl PortfolioState {
    pub fn total_equity(&self) -> Decimal {
        self.cash_quote + self.positions.values().map(|p| p.notional()).sum::<Decimal>()
    }

    pub fn position_notional(&self, base: &str) -> Decimal {
        self.positions
            .get(base)
            .map(|p| p.notional())
            .unwrap_or(Decimal::ZERO)
    }
}

/// Every input the sizer used, recorded on the intent for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingInputs {
    pub base_notional_quote: Decimal,
    pub confidence_factor: f64,
    pub vol_pct: f64,
    pub vol_factor: f64,
    pub position_quote: Decimal,
    pub reference_price: Decimal,
}

/// The order the execution collaborator is asked to place. The core never
/// touches the venue itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub pair: Pair,
    pub side: OrderSide,
    pub quantity_base: Decimal,
    pub limit_price: Option<Decimal>,
    pub source_decision_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sizing_inputs: SizingInputs,
}

/// Verdict of the guard chain for one decision. A non-PASS outcome is a
/// normal result, not an error; it still produces a journal record.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    Pass,
    Veto { by: String, reason: String },
    Downgrade { by: String, reason: String },
}

impl GuardOutcome {
    pub fn result_str(&self) -> &'static str {
        match self {
            GuardOutcome::Pass => "PASS",
            GuardOutcome::Veto { .. } => "VETO",
            GuardOutcome::Downgrade { .. } => "DOWNGRADE",
        }
    }

    pub fn guard_id(&self) -> Option<&str> {
        match self {
            GuardOutcome::Pass => None,
            GuardOutcome::Veto { by, .. } | GuardOutcome::Downgrade { by, .. } => Some(by),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            GuardOutcome::Pass => None,
            GuardOutcome::Veto { reason, .. } | GuardOutcome::Downgrade { reason, .. } => {
                Some(reason)
            }
        }
    }
}
