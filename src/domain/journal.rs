use crate::domain::analysis::{AnalystOpinion, CombinedDecision, DataQuality, Signal};
use crate::domain::market::{Interval, MarketSnapshot, SnapshotQuality};
use crate::domain::trading::{GuardOutcome, OrderSide, SizingInputs, TradeIntent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const JOURNAL_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerCause {
    Scheduled,
    Manual,
    Emergency,
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerCause::Scheduled => write!(f, "SCHEDULED"),
            TriggerCause::Manual => write!(f, "MANUAL"),
            TriggerCause::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerStamp {
    pub cause: TriggerCause,
    pub fire_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStamp {
    pub t_snap: DateTime<Utc>,
    pub quality: SnapshotQuality,
}

/// One analyst line in the record: the opinion plus its combined-decision
/// contribution. Weight and score stay zero when the combiner never ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionStamp {
    pub analyst_id: String,
    pub signal: Signal,
    pub confidence: u8,
    pub data_quality: DataQuality,
    pub weight: f64,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStamp {
    pub signal: Signal,
    pub confidence: u8,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardStamp {
    pub result: String,
    pub by: Option<String>,
    pub reason: Option<String>,
}

impl From<&GuardOutcome> for GuardStamp {
    fn from(outcome: &GuardOutcome) -> Self {
        Self {
            result: outcome.result_str().to_string(),
            by: outcome.guard_id().map(str::to_string),
            reason: outcome.reason().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentStamp {
    pub side: OrderSide,
    pub quantity_base: Decimal,
    pub sizing_inputs: SizingInputs,
}

impl From<&TradeIntent> for IntentStamp {
    fn from(intent: &TradeIntent) -> Self {
        Self {
            side: intent.side,
            quantity_base: intent.quantity_base,
            sizing_inputs: intent.sizing_inputs.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorStamp {
    pub stage: String,
    pub kind: String,
    pub detail: String,
}

/// One line of the append-only journal, one per cycle regardless of
/// outcome. Serialized as a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub v: u8,
    pub cycle_id: Uuid,
    pub pair: String,
    pub interval: Interval,
    pub trigger: TriggerStamp,
    pub snapshot: Option<SnapshotStamp>,
    pub opinions: Vec<OpinionStamp>,
    pub decision: Option<DecisionStamp>,
    pub guard_outcome: Option<GuardStamp>,
    pub intent: Option<IntentStamp>,
    pub errors: Vec<ErrorStamp>,
    pub duration_ms: u64,
}

impl JournalRecord {
    /// Skeleton record created when the cycle starts; stages fill it in as
    /// they complete.
    pub fn begin(cycle_id: Uuid, pair: String, interval: Interval, trigger: TriggerStamp) -> Self {
        Self {
            v: JOURNAL_SCHEMA_VERSION,
            cycle_id,
            pair,
            interval,
            trigger,
            snapshot: None,
            opinions: Vec::new(),
            decision: None,
            guard_outcome: None,
            intent: None,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn stamp_snapshot(&mut self, snapshot: &MarketSnapshot) {
        self.snapshot = Some(SnapshotStamp {
            t_snap: snapshot.t_snap,
            quality: snapshot.quality,
        });
    }

    pub fn stamp_opinions(&mut self, opinions: &[AnalystOpinion]) {
        self.opinions = opinions
            .iter()
            .map(|o| OpinionStamp {
                analyst_id: o.analyst_id.clone(),
                signal: o.signal,
                confidence: o.confidence,
                data_quality: o.data_quality,
                weight: 0.0,
                weighted_score: 0.0,
            })
            .collect();
    }

    pub fn stamp_decision(&mut self, decision: &CombinedDecision) {
        self.decision = Some(DecisionStamp {
            signal: decision.signal,
            confidence: decision.confidence,
            score: decision.score,
        });
        for contribution in &decision.contributions {
            if let Some(stamp) = self
                .opinions
                .iter_mut()
                .find(|o| o.analyst_id == contribution.analyst_id)
            {
                stamp.weight = contribution.weight;
                stamp.weighted_score = contribution.weighted_score;
            }
        }
    }

    pub fn push_error(
        &mut self,
        stage: impl Into<String>,
        kind: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.errors.push(ErrorStamp {
            stage: stage.into(),
            kind: kind.into(),
            detail: detail.into(),
        });
    }
}
