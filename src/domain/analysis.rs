use crate::domain::market::Pair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Directional trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Signed direction used by the combiner: BUY=+1, SELL=-1, HOLD=0.
    pub fn direction(&self) -> i8 {
        match self {
            Signal::Buy => 1,
            Signal::Sell => -1,
            Signal::Hold => 0,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// How much of the requested market context the analyst actually saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataQuality {
    Full,
    Partial,
    Fallback,
}

/// One analyst's independent read of a snapshot. Read-only after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystOpinion {
    pub analyst_id: String,
    pub signal: Signal,
    pub confidence: u8,
    pub reasoning_text: String,
    pub produced_at: DateTime<Utc>,
    pub data_quality: DataQuality,
}

impl AnalystOpinion {
    /// The degraded opinion substituted when a slot fails, times out, or
    /// returns something that does not validate.
    pub fn fallback(analyst_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            analyst_id: analyst_id.into(),
            signal: Signal::Hold,
            confidence: 0,
            reasoning_text: reason.into(),
            produced_at: Utc::now(),
            data_quality: DataQuality::Fallback,
        }
    }
}

/// One analyst's share of the combined score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub analyst_id: String,
    pub signal: Signal,
    pub confidence: u8,
    pub weight: f64,
    pub weighted_score: f64,
}

/// The aggregated directional decision for one cycle. Deterministic given
/// the opinions and combiner config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedDecision {
    pub id: Uuid,
    pub pair: Pair,
    pub timestamp: DateTime<Utc>,
    pub signal: Signal,
    pub confidence: u8,
    pub score: f64,
    pub contributions: Vec<Contribution>,
    pub mood_tag: String,
}

/// Short label the tone collaborator uses to pick a register. Derived, not
/// configured.
pub fn mood_tag(signal: Signal, confidence: u8) -> String {
    let tag = match (signal, confidence) {
        (Signal::Hold, _) => "neutral",
        (Signal::Buy, c) if c >= 70 => "decisive_bull",
        (Signal::Buy, c) if c >= 30 => "leaning_bull",
        (Signal::Buy, _) => "tentative_bull",
        (Signal::Sell, c) if c >= 70 => "decisive_bear",
        (Signal::Sell, c) if c >= 30 => "leaning_bear",
        (Signal::Sell, _) => "tentative_bear",
    };
    tag.to_string()
}
