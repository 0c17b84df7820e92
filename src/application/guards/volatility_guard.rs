use super::{Guard, GuardContext};
use crate::domain::trading::GuardOutcome;

/// Downgrades to HOLD when realized volatility breaches the upper bound:
/// no new entries during turmoil.
pub struct VolatilityGuard;

impl Guard for VolatilityGuard {
    fn id(&self) -> &'static str {
        "VolatilityGuard"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        if ctx.realized_vol_pct > ctx.config.vol_upper_pct {
            return GuardOutcome::Downgrade {
                by: self.id().to_string(),
                reason: format!(
                    "realized volatility {:.2}% above bound {:.2}%",
                    ctx.realized_vol_pct, ctx.config.vol_upper_pct
                ),
            };
        }
        GuardOutcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::GuardConfig;
    use crate::domain::analysis::Signal;
    use rust_decimal_macros::dec;

    fn evaluate(vol_pct: f64) -> GuardOutcome {
        let snapshot = snapshot();
        let decision = decision(Signal::Sell, 70);
        let portfolio = flat_portfolio(dec!(100000));
        let config = GuardConfig {
            vol_upper_pct: 8.0,
            ..GuardConfig::default()
        };
        VolatilityGuard.evaluate(&GuardContext {
            decision: &decision,
            portfolio: &portfolio,
            snapshot: &snapshot,
            config: &config,
            prospective_notional: dec!(1000),
            realized_vol_pct: vol_pct,
            last_trade_at: None,
            now: now(),
        })
    }

    #[test]
    fn test_downgrades_in_turmoil() {
        assert_eq!(evaluate(9.5).result_str(), "DOWNGRADE");
    }

    #[test]
    fn test_passes_calm_markets() {
        assert_eq!(evaluate(2.0), GuardOutcome::Pass);
        // The bound itself is still tradable.
        assert_eq!(evaluate(8.0), GuardOutcome::Pass);
    }
}
