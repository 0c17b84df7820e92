//! End-to-end decision scenarios: trigger in, journal record out, against
//! mock providers and opinion sources.

mod common;

use common::*;
use chrono::Duration as ChronoDuration;
use quorum::application::scheduler::Trigger;
use quorum::config::GuardConfig;
use quorum::domain::analysis::Signal;
use quorum::domain::journal::TriggerCause;
use quorum::domain::ports::OpinionDraft;
use quorum::domain::trading::{OrderSide, PortfolioState};
use quorum::infrastructure::mock::MockOpinionSource;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_happy_path_weighted_buy() {
    let mut builder = HarnessBuilder::new();
    builder.source = MockOpinionSource::new()
        .with_draft("technical", "BUY", 80)
        .with_draft("liquidity", "BUY", 60)
        .with_draft("sentiment", "HOLD", 0);
    let harness = builder.build().await;

    let record = harness.orchestrator.run_cycle(scheduled_trigger()).await;

    // S = 0.5*0.8 + 0.3*0.6 + 0.2*0 = 0.58 -> BUY at min(58, 80).
    let decision = record.decision.as_ref().unwrap();
    assert_eq!(decision.signal, Signal::Buy);
    assert_eq!(decision.confidence, 58);
    assert!((decision.score - 0.58).abs() < 1e-9);
    assert_eq!(record.guard_outcome.as_ref().unwrap().result, "PASS");

    let intent = record.intent.as_ref().unwrap();
    assert_eq!(intent.side, OrderSide::Buy);
    let sizing = &intent.sizing_inputs;
    assert!(sizing.position_quote >= dec!(100) && sizing.position_quote <= dec!(5000));

    let executed = harness.sink.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].quantity_base, intent.quantity_base);

    // The journal holds exactly this record.
    let written = harness.journal();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0], record);

    // Weights sum to one in the journaled contributions.
    let weight_sum: f64 = written[0].opinions.iter().map(|o| o.weight).sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_even_conflict_resolves_to_hold() {
    let mut builder = HarnessBuilder::new();
    builder.analysts = analyst_configs(&[("technical", 0.5), ("liquidity", 0.5)]);
    builder.source = MockOpinionSource::new()
        .with_draft("technical", "BUY", 70)
        .with_draft("liquidity", "SELL", 70);
    let harness = builder.build().await;

    let record = harness.orchestrator.run_cycle(scheduled_trigger()).await;

    let decision = record.decision.as_ref().unwrap();
    assert_eq!(decision.signal, Signal::Hold);
    assert_eq!(decision.confidence, 0);
    assert!(record.intent.is_none());
    assert!(record.guard_outcome.is_none());
    assert!(harness.sink.executed().is_empty());
}

#[tokio::test]
async fn test_fallback_penalty_renormalizes() {
    let mut builder = HarnessBuilder::new();
    builder.analysts = analyst_configs(&[("funding", 0.5), ("liquidity", 0.5)]);
    // funding degrades (source failure); liquidity holds flat.
    builder.source = MockOpinionSource::new().with_raw_draft(
        "liquidity",
        OpinionDraft {
            signal: "HOLD".to_string(),
            confidence: 0,
            reasoning: "balanced".to_string(),
        },
    );
    let harness = builder.build().await;

    let record = harness.orchestrator.run_cycle(scheduled_trigger()).await;

    // The degraded slot carries half weight after the penalty: effective
    // weights 1/3 and 2/3, and a HOLD/0 fallback contributes no score.
    let funding = record
        .opinions
        .iter()
        .find(|o| o.analyst_id == "funding")
        .unwrap();
    assert!((funding.weight - 1.0 / 3.0).abs() < 1e-9);
    let decision = record.decision.as_ref().unwrap();
    assert_eq!(decision.signal, Signal::Hold);
    assert!(!record.errors.is_empty());
}

#[tokio::test]
async fn test_cooldown_boundary_is_inclusive() {
    let configure = || {
        let mut builder = HarnessBuilder::new();
        builder.guards = GuardConfig {
            cooldown_sec: 60,
            ..GuardConfig::default()
        };
        builder.source = MockOpinionSource::new()
            .with_draft("technical", "BUY", 80)
            .with_draft("liquidity", "BUY", 60)
            .with_draft("sentiment", "HOLD", 0);
        builder
    };

    // Exactly at last_trade + cooldown: passes.
    let harness = configure().build().await;
    harness
        .cooldowns
        .record("BTC/USDT", trigger_time() - ChronoDuration::seconds(60));
    let record = harness.orchestrator.run_cycle(scheduled_trigger()).await;
    assert_eq!(record.guard_outcome.as_ref().unwrap().result, "PASS");

    // One nanosecond inside the window: vetoed.
    let harness = configure().build().await;
    harness.cooldowns.record(
        "BTC/USDT",
        trigger_time() - ChronoDuration::seconds(60) + ChronoDuration::nanoseconds(1),
    );
    let record = harness.orchestrator.run_cycle(scheduled_trigger()).await;
    let guard = record.guard_outcome.as_ref().unwrap();
    assert_eq!(guard.result, "VETO");
    assert_eq!(guard.by.as_deref(), Some("CooldownGuard"));
    assert!(record.intent.is_none());
}

#[tokio::test]
async fn test_cooldown_vetoes_recent_trade() {
    let mut builder = HarnessBuilder::new();
    builder.guards = GuardConfig {
        cooldown_sec: 60,
        ..GuardConfig::default()
    };
    builder.source = MockOpinionSource::new()
        .with_draft("technical", "BUY", 80)
        .with_draft("liquidity", "BUY", 60)
        .with_draft("sentiment", "HOLD", 0);
    let harness = builder.build().await;

    let first = harness.orchestrator.run_cycle(scheduled_trigger()).await;
    assert!(first.intent.is_some());

    // 30s after the first trade, well inside cooldown_sec = 60.
    let second = harness
        .orchestrator
        .run_cycle(Trigger {
            fire_time: trigger_time() + ChronoDuration::seconds(30),
            ..scheduled_trigger()
        })
        .await;

    let guard = second.guard_outcome.as_ref().unwrap();
    assert_eq!(guard.result, "VETO");
    assert_eq!(guard.by.as_deref(), Some("CooldownGuard"));
    assert!(second.intent.is_none());
    assert_eq!(harness.sink.executed().len(), 1);

    let written = harness.journal();
    assert_eq!(written.len(), 2);
}

#[tokio::test]
async fn test_drawdown_downgrade_blocks_confident_buy() {
    let mut builder = HarnessBuilder::new();
    builder.portfolio_state = Some(PortfolioState {
        cash_quote: dec!(88000),
        positions: Default::default(),
        open_risk_exposure: dec!(0),
        drawdown_from_peak: 12.0,
    });
    builder.guards = GuardConfig {
        drawdown_pause_pct: 10.0,
        ..GuardConfig::default()
    };
    builder.source = MockOpinionSource::new()
        .with_draft("technical", "BUY", 80)
        .with_draft("liquidity", "BUY", 75)
        .with_draft("sentiment", "BUY", 70);
    let harness = builder.build().await;

    let record = harness.orchestrator.run_cycle(scheduled_trigger()).await;

    let decision = record.decision.as_ref().unwrap();
    assert_eq!(decision.signal, Signal::Buy);
    assert!(decision.confidence >= 70);

    let guard = record.guard_outcome.as_ref().unwrap();
    assert_eq!(guard.result, "DOWNGRADE");
    assert_eq!(guard.by.as_deref(), Some("DrawdownGuard"));
    assert!(record.intent.is_none());
    assert!(harness.sink.executed().is_empty());
}

#[tokio::test]
async fn test_emergency_trigger_cause_is_journaled() {
    let mut builder = HarnessBuilder::new();
    builder.source = MockOpinionSource::new()
        .with_draft("technical", "HOLD", 10)
        .with_draft("liquidity", "HOLD", 10)
        .with_draft("sentiment", "HOLD", 10);
    let harness = builder.build().await;

    let record = harness
        .orchestrator
        .run_cycle(Trigger {
            cause: TriggerCause::Emergency,
            ..scheduled_trigger()
        })
        .await;

    assert_eq!(record.trigger.cause, TriggerCause::Emergency);
    let line = serde_json::to_string(&record).unwrap();
    assert!(line.contains("\"cause\":\"EMERGENCY\""));
}
