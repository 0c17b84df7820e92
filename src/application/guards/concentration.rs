use super::{Guard, GuardContext};
use crate::domain::trading::GuardOutcome;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Vetoes when the base asset's share of portfolio equity would exceed the
/// per-asset cap.
pub struct ConcentrationGuard;

impl Guard for ConcentrationGuard {
    fn id(&self) -> &'static str {
        "ConcentrationGuard"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        let equity = ctx.portfolio.total_equity();
        if equity <= Decimal::ZERO {
            return GuardOutcome::Veto {
                by: self.id().to_string(),
                reason: "portfolio equity is not positive".to_string(),
            };
        }

        let base = &ctx.decision.pair.base;
        let projected = ctx.portfolio.position_notional(base) + ctx.prospective_notional;
        let share_pct = (projected / equity).to_f64().unwrap_or(f64::MAX) * 100.0;
        if share_pct > ctx.config.per_asset_cap_pct {
            return GuardOutcome::Veto {
                by: self.id().to_string(),
                reason: format!(
                    "{} would reach {:.1}% of equity (cap {:.1}%)",
                    base, share_pct, ctx.config.per_asset_cap_pct
                ),
            };
        }
        GuardOutcome::Pass
    }
}
