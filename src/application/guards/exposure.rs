use super::{Guard, GuardContext};
use crate::domain::trading::GuardOutcome;

/// Vetoes when opening the intent would push total open notional above the
/// configured cap.
pub struct ExposureGuard;

impl Guard for ExposureGuard {
    fn id(&self) -> &'static str {
        "ExposureGuard"
    }

    fn evaluate(&self, ctx: &GuardContext<'_>) -> GuardOutcome {
        let projected = ctx.portfolio.open_risk_exposure + ctx.prospective_notional;
        if projected > ctx.config.exposure_cap_quote {
            return GuardOutcome::Veto {
                by: self.id().to_string(),
                reason: format!(
                    "projected exposure {} exceeds cap {}",
                    projected, ctx.config.exposure_cap_quote
                ),
            };
        }
        GuardOutcome::Pass
    }
}
