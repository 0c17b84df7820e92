use super::{Guard, GuardContext};
use crate::domain::trading::GuardOutcome;

/// Downgrades to HOLD while the portfolio sits at or beyond the configured
/// drawdown from its peak. New entries pause; nothing is force-closed.
pub struct DrawdownGuard;

impl Guard for DrawdownGuard {
    fn id(&self) -> &'static str {
        "DrawdownGuard"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        let drawdown = ctx.portfolio.drawdown_from_peak;
        if drawdown >= ctx.config.drawdown_pause_pct {
            return GuardOutcome::Downgrade {
                by: self.id().to_string(),
                reason: format!(
                    "drawdown {:.1}% at or above pause threshold {:.1}%",
                    drawdown, ctx.config.drawdown_pause_pct
                ),
            };
        }
        GuardOutcome::Pass
    }
}
