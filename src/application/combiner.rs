//! Decision combiner: weighted-mean aggregation with thresholding.
//!
//! Deterministic given opinions and config. Degraded opinions lose weight
//! before renormalization, and aggregate confidence can never exceed the
//! confidence of the strongest analyst agreeing with the final direction.

use crate::config::{AnalystConfig, CombinerConfig};
use crate::domain::analysis::{
    AnalystOpinion, CombinedDecision, Contribution, DataQuality, Signal, mood_tag,
};
use crate::domain::market::Pair;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

pub struct DecisionCombiner {
    config: CombinerConfig,
    /// Configured weight per analyst id.
    weights: HashMap<String, f64>,
}

impl DecisionCombiner {
    pub fn new(config: CombinerConfig, analysts: &[AnalystConfig]) -> Self {
        let weights = analysts
            .iter()
            .map(|a| (a.id.clone(), a.weight))
            .collect();
        Self { config, weights }
    }

    pub fn combine(
        &self,
        pair: &Pair,
        opinions: &[AnalystOpinion],
        timestamp: DateTime<Utc>,
    ) -> CombinedDecision {
        // Penalize degraded opinions, then renormalize so weights still
        // sum to one.
        let penalized: Vec<f64> = opinions
            .iter()
            .map(|opinion| {
                let configured = self.weights.get(&opinion.analyst_id).copied().unwrap_or(0.0);
                match opinion.data_quality {
                    DataQuality::Full => configured,
                    DataQuality::Partial | DataQuality::Fallback => {
                        configured * self.config.fallback_penalty
                    }
                }
            })
            .collect();
        let weight_sum: f64 = penalized.iter().sum();

        let mut score = 0.0;
        let mut contributions = Vec::with_capacity(opinions.len());
        for (opinion, penalized_weight) in opinions.iter().zip(&penalized) {
            let weight = if weight_sum > 0.0 {
                penalized_weight / weight_sum
            } else {
                0.0
            };
            let signed = f64::from(opinion.signal.direction())
                * (f64::from(opinion.confidence) / 100.0);
            let weighted_score = weight * signed;
            score += weighted_score;
            contributions.push(Contribution {
                analyst_id: opinion.analyst_id.clone(),
                signal: opinion.signal,
                confidence: opinion.confidence,
                weight,
                weighted_score,
            });
        }

        let signal = if score >= self.config.theta_buy {
            Signal::Buy
        } else if score <= -self.config.theta_sell {
            Signal::Sell
        } else {
            // Disagreement under the threshold is an explicit HOLD, never
            // a fabricated direction.
            Signal::Hold
        };

        let confidence = self.confidence_for(signal, score, &contributions);

        debug!(
            "DecisionCombiner: {} S={:.4} -> {} ({}%)",
            pair, score, signal, confidence
        );

        CombinedDecision {
            id: Uuid::new_v4(),
            pair: pair.clone(),
            timestamp,
            signal,
            confidence,
            score,
            mood_tag: mood_tag(signal, confidence),
            contributions,
        }
    }

    /// `round(100·|S|)`, capped by the top-weighted agreeing analyst so a
    /// split panel cannot inflate conviction.
    fn confidence_for(
        &self,
        signal: Signal,
        score: f64,
        contributions: &[Contribution],
    ) -> u8 {
        let raw = (score.abs() * 100.0).round().clamp(0.0, 100.0) as u8;
        if signal == Signal::Hold {
            return raw;
        }
        let cap = contributions
            .iter()
            .filter(|c| c.signal == signal)
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|c| c.confidence);
        match cap {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }
}
