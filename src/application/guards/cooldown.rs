use super::{Guard, GuardContext};
use crate::domain::trading::GuardOutcome;
use chrono::Duration as ChronoDuration;

/// Vetoes when the pair traded more recently than the cooldown interval.
/// The boundary is inclusive: a trigger at exactly `last + cooldown`
/// passes.
pub struct CooldownGuard;

impl Guard for CooldownGuard {
    fn id(&self) -> &'static str {
        "CooldownGuard"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        let Some(last_trade) = ctx.last_trade_at else {
            return GuardOutcome::Pass;
        };
        let cooldown = ChronoDuration::seconds(ctx.config.cooldown_sec as i64);
        let ready_at = last_trade + cooldown;
        if ctx.now < ready_at {
            let remaining = ready_at - ctx.now;
            return GuardOutcome::Veto {
                by: self.id().to_string(),
                reason: format!(
                    "traded {}s ago, cooldown has {}s left",
                    (ctx.now - last_trade).num_seconds(),
                    remaining.num_seconds()
                ),
            };
        }
        GuardOutcome::Pass
    }
}
