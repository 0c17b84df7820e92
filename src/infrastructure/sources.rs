//! Opinion sources.
//!
//! The production deployment points analysts at an LLM-backed
//! `AnalystOpinionSource` collaborator. This module ships the
//! deterministic rule-based source used in dev environments and backtests:
//! plain indicator heuristics over the role digest, no credentials, no
//! network.

use crate::domain::ports::{AnalystOpinionSource, OpinionDraft, OpinionRequest};
use anyhow::Result;
use async_trait::async_trait;

/// Deterministic heuristics standing in for an LLM. Confidence is scaled
/// from how far the digest sits from its neutral zone, capped at 90 so the
/// rule source never claims certainty.
pub struct RuleBasedOpinionSource;

impl RuleBasedOpinionSource {
    fn opine(request: &OpinionRequest) -> OpinionDraft {
        let field = |name: &str| request.digest.get(name).and_then(|v| v.as_f64());

        match request.analyst_id.as_str() {
            "technical" => {
                let rsi = field("rsi").unwrap_or(50.0);
                let macd_hist = field("macd_hist").unwrap_or(0.0);
                let sma_fast = field("sma_fast").unwrap_or(0.0);
                let sma_slow = field("sma_slow").unwrap_or(0.0);

                if rsi < 30.0 {
                    draft("BUY", 40.0 + (30.0 - rsi) * 2.0, format!("RSI oversold at {:.1}", rsi))
                } else if rsi > 70.0 {
                    draft("SELL", 40.0 + (rsi - 70.0) * 2.0, format!("RSI overbought at {:.1}", rsi))
                } else if macd_hist > 0.0 && sma_fast > sma_slow {
                    draft("BUY", 45.0, "MACD histogram positive above rising SMA".to_string())
                } else if macd_hist < 0.0 && sma_fast < sma_slow {
                    draft("SELL", 45.0, "MACD histogram negative below falling SMA".to_string())
                } else {
                    draft("HOLD", 20.0, "Mixed momentum and trend readings".to_string())
                }
            }
            "liquidity" => {
                let imbalance = field("imbalance").unwrap_or(0.0);
                let spread_pct = field("spread_pct").unwrap_or(0.0);
                // Wide spreads make the book read unreliable.
                let damp = if spread_pct > 0.002 { 0.5 } else { 1.0 };

                if imbalance > 0.25 {
                    draft(
                        "BUY",
                        imbalance * 100.0 * damp,
                        format!("Bid-heavy book, imbalance {:.2}", imbalance),
                    )
                } else if imbalance < -0.25 {
                    draft(
                        "SELL",
                        -imbalance * 100.0 * damp,
                        format!("Ask-heavy book, imbalance {:.2}", imbalance),
                    )
                } else {
                    draft("HOLD", 15.0, "Balanced order book".to_string())
                }
            }
            "funding" => {
                let funding_rate = field("funding_rate").unwrap_or(0.0);
                if funding_rate > 0.0005 {
                    draft(
                        "SELL",
                        (funding_rate * 60_000.0).min(80.0),
                        format!("Crowded longs, funding {:.4}%", funding_rate * 100.0),
                    )
                } else if funding_rate < -0.0005 {
                    draft(
                        "BUY",
                        (-funding_rate * 60_000.0).min(80.0),
                        format!("Crowded shorts, funding {:.4}%", funding_rate * 100.0),
                    )
                } else {
                    draft("HOLD", 10.0, "Funding near neutral".to_string())
                }
            }
            "open_interest" => {
                let basis = field("basis_pct").unwrap_or(0.0);
                if basis > 0.1 {
                    draft("BUY", (basis * 200.0).min(60.0), format!("Futures premium {:.2}%", basis))
                } else if basis < -0.1 {
                    draft("SELL", (-basis * 200.0).min(60.0), format!("Futures discount {:.2}%", basis))
                } else {
                    draft("HOLD", 10.0, "Basis near flat".to_string())
                }
            }
            "sentiment" => {
                let change = field("price_change_pct").unwrap_or(0.0);
                if change > 2.0 {
                    draft("BUY", (change * 10.0).min(70.0), format!("Tape up {:.1}% over window", change))
                } else if change < -2.0 {
                    draft("SELL", (-change * 10.0).min(70.0), format!("Tape down {:.1}% over window", change))
                } else {
                    draft("HOLD", 15.0, "Tape flat over window".to_string())
                }
            }
            other => draft("HOLD", 0.0, format!("No heuristic for role '{}'", other)),
        }
    }
}

fn draft(signal: &str, confidence: f64, reasoning: String) -> OpinionDraft {
    OpinionDraft {
        signal: signal.to_string(),
        confidence: confidence.clamp(0.0, 90.0).round() as i64,
        reasoning,
    }
}

#[async_trait]
impl AnalystOpinionSource for RuleBasedOpinionSource {
    async fn generate(&self, request: &OpinionRequest) -> Result<OpinionDraft> {
        Ok(Self::opine(request))
    }
}
