//! Analyst pool: the only parallel region inside a cycle.
//!
//! Every configured role fans out as its own task against one shared
//! snapshot. Slots are isolated: a failure, timeout, or invalid payload in
//! one degrades that slot to a fallback opinion and never touches the
//! others. The emitted list is always in configured order.

mod roles;

pub use roles::{AnalystRole, RoleDigest};

use crate::config::AnalystConfig;
use crate::domain::analysis::{AnalystOpinion, Signal};
use crate::domain::market::MarketSnapshot;
use crate::domain::ports::{AnalystOpinionSource, OpinionDraft, OpinionRequest};
use crate::infrastructure::observability::Metrics;
use anyhow::{Result, anyhow};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Recorded failure of one slot, destined for the journal's error list.
#[derive(Debug, Clone)]
pub struct SlotError {
    pub analyst_id: String,
    pub kind: &'static str,
    pub detail: String,
}

struct Slot {
    id: String,
    role: AnalystRole,
    timeout: Duration,
    source: Arc<dyn AnalystOpinionSource>,
}

pub struct AnalystPool {
    slots: Vec<Arc<Slot>>,
    metrics: Arc<Metrics>,
}

impl AnalystPool {
    /// Builds the pool in configured order. Unknown role ids were already
    /// rejected by config validation; hitting one here is a wiring bug.
    pub fn new(
        configs: &[AnalystConfig],
        source: Arc<dyn AnalystOpinionSource>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let slots = configs
            .iter()
            .map(|config| {
                let role = AnalystRole::from_id(&config.id)
                    .ok_or_else(|| anyhow!("no built-in role for analyst '{}'", config.id))?;
                Ok(Arc::new(Slot {
                    id: config.id.clone(),
                    role,
                    timeout: config.timeout(),
                    source: source.clone(),
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots, metrics })
    }

    /// Fans out all slots concurrently and joins them with their
    /// individual deadlines. Never fails as a whole.
    pub async fn collect(
        &self,
        snapshot: Arc<MarketSnapshot>,
    ) -> (Vec<AnalystOpinion>, Vec<SlotError>) {
        let handles: Vec<_> = self
            .slots
            .iter()
            .map(|slot| {
                let slot = slot.clone();
                let snapshot = snapshot.clone();
                tokio::spawn(async move { run_slot(&slot, &snapshot).await })
            })
            .collect();

        // Join barrier; join_all preserves spawn order, which is the
        // configured analyst order.
        let results = futures::future::join_all(handles).await;

        let mut opinions = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for (slot, result) in self.slots.iter().zip(results) {
            let (opinion, error) = match result {
                Ok(slot_result) => slot_result,
                // A panicked slot degrades like any other failure.
                Err(join_err) => degraded(&slot.id, "AnalystFailure", join_err.to_string()),
            };
            if let Some(error) = &error {
                self.metrics
                    .analyst_degraded_total
                    .with_label_values(&[error.analyst_id.as_str(), error.kind])
                    .inc();
                errors.push(error.clone());
            }
            opinions.push(opinion);
        }
        (opinions, errors)
    }
}

async fn run_slot(slot: &Slot, snapshot: &MarketSnapshot) -> (AnalystOpinion, Option<SlotError>) {
    let digest = slot.role.digest(snapshot);
    let request = OpinionRequest {
        analyst_id: slot.id.clone(),
        pair: snapshot.pair.symbol(),
        interval: snapshot.pair.interval.to_string(),
        digest: digest.value,
    };

    match tokio::time::timeout(slot.timeout, slot.source.generate(&request)).await {
        Err(_) => degraded(
            &slot.id,
            "AnalystTimeout",
            format!("no opinion within {:?}", slot.timeout),
        ),
        Ok(Err(source_err)) => degraded(&slot.id, "AnalystFailure", source_err.to_string()),
        Ok(Ok(draft)) => match validate_draft(&slot.id, &draft, digest.quality) {
            Ok(opinion) => {
                debug!(
                    "AnalystPool: {} -> {} ({}%)",
                    slot.id, opinion.signal, opinion.confidence
                );
                (opinion, None)
            }
            Err(detail) => degraded(&slot.id, "AnalystInvalidOutput", detail),
        },
    }
}

fn validate_draft(
    analyst_id: &str,
    draft: &OpinionDraft,
    quality: crate::domain::analysis::DataQuality,
) -> Result<AnalystOpinion, String> {
    let signal = match draft.signal.as_str() {
        "BUY" => Signal::Buy,
        "SELL" => Signal::Sell,
        "HOLD" => Signal::Hold,
        other => return Err(format!("unknown signal '{}'", other)),
    };
    if !(0..=100).contains(&draft.confidence) {
        return Err(format!("confidence {} outside [0, 100]", draft.confidence));
    }
    Ok(AnalystOpinion {
        analyst_id: analyst_id.to_string(),
        signal,
        confidence: draft.confidence as u8,
        reasoning_text: draft.reasoning.clone(),
        produced_at: Utc::now(),
        data_quality: quality,
    })
}

fn degraded(
    analyst_id: &str,
    kind: &'static str,
    detail: String,
) -> (AnalystOpinion, Option<SlotError>) {
    warn!("AnalystPool: {} degraded ({}): {}", analyst_id, kind, detail);
    (
        AnalystOpinion::fallback(analyst_id, detail.clone()),
        Some(SlotError {
            analyst_id: analyst_id.to_string(),
            kind,
            detail,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::DataQuality;
    use crate::domain::market::{Interval, Pair, SnapshotQuality};
    use crate::infrastructure::mock::{
        MockOpinionSource, candles_fixture, depth_fixture, ticker_fixture,
    };
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn snapshot() -> Arc<MarketSnapshot> {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Arc::new(MarketSnapshot {
            pair: Pair::new("BTC", "USDT", Interval::OneHour),
            t_snap: now,
            candles: candles_fixture(dec!(50000), 50, now),
            ticker: ticker_fixture(dec!(50000), now),
            depth: depth_fixture(dec!(50000), now),
            derivatives: None,
            quality: SnapshotQuality::Partial,
        })
    }

    fn configs(ids: &[&str]) -> Vec<AnalystConfig> {
        let weight = 1.0 / ids.len() as f64;
        ids.iter()
            .map(|id| AnalystConfig {
                id: id.to_string(),
                weight,
                timeout_ms: 200,
                source_config: Default::default(),
            })
            .collect()
    }

    fn pool(configs: &[AnalystConfig], source: MockOpinionSource) -> AnalystPool {
        AnalystPool::new(configs, Arc::new(source), Arc::new(Metrics::new().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn test_opinions_emitted_in_configured_order() {
        let source = MockOpinionSource::new()
            .with_draft("technical", "BUY", 80)
            .with_draft("liquidity", "SELL", 60)
            .with_draft("sentiment", "HOLD", 10)
            // liquidity answers last but must stay in slot two.
            .with_delay("liquidity", Duration::from_millis(50));

        let pool = pool(&configs(&["technical", "liquidity", "sentiment"]), source);
        let (opinions, errors) = pool.collect(snapshot()).await;

        assert!(errors.is_empty());
        let ids: Vec<&str> = opinions.iter().map(|o| o.analyst_id.as_str()).collect();
        assert_eq!(ids, vec!["technical", "liquidity", "sentiment"]);
        assert_eq!(opinions[1].signal, Signal::Sell);
    }

    #[tokio::test]
    async fn test_timeout_degrades_only_that_slot() {
        let source = MockOpinionSource::new()
            .with_draft("technical", "BUY", 80)
            .with_draft("liquidity", "BUY", 70)
            .with_delay("liquidity", Duration::from_secs(5));

        let pool = pool(&configs(&["technical", "liquidity"]), source);
        let (opinions, errors) = pool.collect(snapshot()).await;

        assert_eq!(opinions[0].signal, Signal::Buy);
        assert_eq!(opinions[1].signal, Signal::Hold);
        assert_eq!(opinions[1].confidence, 0);
        assert_eq!(opinions[1].data_quality, DataQuality::Fallback);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "AnalystTimeout");
    }

    #[tokio::test]
    async fn test_invalid_output_is_coerced_to_fallback() {
        let source = MockOpinionSource::new()
            .with_raw_draft(
                "technical",
                crate::domain::ports::OpinionDraft {
                    signal: "MOON".to_string(),
                    confidence: 80,
                    reasoning: "to the moon".to_string(),
                },
            )
            .with_raw_draft(
                "liquidity",
                crate::domain::ports::OpinionDraft {
                    signal: "BUY".to_string(),
                    confidence: 250,
                    reasoning: "very sure".to_string(),
                },
            );

        let pool = pool(&configs(&["technical", "liquidity"]), source);
        let (opinions, errors) = pool.collect(snapshot()).await;

        assert!(opinions.iter().all(|o| o.signal == Signal::Hold));
        assert!(opinions.iter().all(|o| o.data_quality == DataQuality::Fallback));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == "AnalystInvalidOutput"));
    }

    #[tokio::test]
    async fn test_source_failure_is_isolated() {
        let source = MockOpinionSource::new()
            .with_draft("technical", "SELL", 55)
            .with_failure("sentiment");

        let pool = pool(&configs(&["technical", "sentiment"]), source);
        let (opinions, errors) = pool.collect(snapshot()).await;

        assert_eq!(opinions[0].signal, Signal::Sell);
        assert_eq!(opinions[1].signal, Signal::Hold);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "AnalystFailure");
    }
}
