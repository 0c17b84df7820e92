//! Cycle orchestration: trigger in, journal record out.
//!
//! One cycle walks FETCHING -> ANALYZING -> COMBINING -> GUARDING ->
//! SIZING -> PUBLISHING -> LOGGING. Any stage failure jumps straight to
//! LOGGING with an error-flavored record; vetoes and downgrades are normal
//! outcomes. The whole cycle runs under a deadline of
//! min(2 x interval, 90 s). A cancelled cycle (shutdown) writes nothing.

use crate::application::analysts::AnalystPool;
use crate::application::combiner::DecisionCombiner;
use crate::application::guards::{CooldownTracker, GuardChain, GuardContext};
use crate::application::scheduler::Trigger;
use crate::application::sizing::PositionSizer;
use crate::application::snapshot::SnapshotAssembler;
use crate::application::volatility::realized_volatility_pct;
use crate::config::GuardConfig;
use crate::domain::analysis::Signal;
use crate::domain::journal::{GuardStamp, IntentStamp, JournalRecord, TriggerStamp};
use crate::domain::ports::{IntentSink, PortfolioView, ToneReporter};
use crate::domain::trading::GuardOutcome;
use crate::infrastructure::journal::JournalWriter;
use crate::infrastructure::observability::Metrics;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_CYCLE_DEADLINE: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleStage {
    Fetching,
    Analyzing,
    Combining,
    Guarding,
    Sizing,
    Publishing,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Fetching => "FETCHING",
            CycleStage::Analyzing => "ANALYZING",
            CycleStage::Combining => "COMBINING",
            CycleStage::Guarding => "GUARDING",
            CycleStage::Sizing => "SIZING",
            CycleStage::Publishing => "PUBLISHING",
        };
        write!(f, "{}", name)
    }
}

pub struct OrchestratorParts {
    pub assembler: SnapshotAssembler,
    pub pool: AnalystPool,
    pub combiner: DecisionCombiner,
    pub guards: GuardChain,
    pub guard_config: GuardConfig,
    pub sizer: PositionSizer,
    pub journal: JournalWriter,
    pub portfolio: Arc<dyn PortfolioView>,
    pub sink: Arc<dyn IntentSink>,
    pub tone: Option<Arc<dyn ToneReporter>>,
    pub cooldowns: Arc<CooldownTracker>,
    pub metrics: Arc<Metrics>,
}

pub struct Orchestrator {
    parts: OrchestratorParts,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self { parts }
    }

    fn cycle_deadline(&self, trigger: &Trigger) -> Duration {
        (trigger.pair.interval.duration() * 2).min(MAX_CYCLE_DEADLINE)
    }

    /// Runs one cycle to completion and journals it. Always returns the
    /// record, even when the cycle failed; only cancellation (dropping
    /// this future) leaves no trace.
    pub async fn run_cycle(&self, trigger: Trigger) -> JournalRecord {
        let started = Instant::now();
        let cycle_id = Uuid::new_v4();
        let mut record = JournalRecord::begin(
            cycle_id,
            trigger.pair.symbol(),
            trigger.pair.interval,
            TriggerStamp {
                cause: trigger.cause,
                fire_time: trigger.fire_time,
            },
        );
        info!(
            "Orchestrator: Cycle {} for {} ({})",
            cycle_id, trigger.pair, trigger.cause
        );

        let deadline = self.cycle_deadline(&trigger);
        let outcome = match tokio::time::timeout(deadline, self.drive(&trigger, &mut record)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Orchestrator: Cycle {} exceeded deadline of {:?}",
                    cycle_id, deadline
                );
                record.push_error(
                    "CYCLE",
                    "DeadlineExceeded",
                    format!("cycle deadline of {:?} exceeded", deadline),
                );
                "error"
            }
        };

        // LOGGING: the decision stands even if the journal is down; the
        // failure is surfaced through the counter.
        record.duration_ms = started.elapsed().as_millis() as u64;
        if let Err(journal_err) = self.parts.journal.append(&record).await {
            self.parts.metrics.journal_write_failures_total.inc();
            warn!(
                "Orchestrator: JournalWriteFailed for cycle {}: {}",
                cycle_id, journal_err
            );
        }
        self.parts
            .metrics
            .cycles_total
            .with_label_values(&[record.pair.as_str(), outcome])
            .inc();

        if let Some(tone) = &self.parts.tone {
            let tone = tone.clone();
            let finished = record.clone();
            // Terminal collaborator: fire and forget.
            tokio::spawn(async move { tone.report(&finished).await });
        }

        record
    }

    async fn drive(&self, trigger: &Trigger, record: &mut JournalRecord) -> &'static str {
        let symbol = trigger.pair.symbol();

        debug!("Orchestrator: {} -> {}", symbol, CycleStage::Fetching);
        let snapshot = match self
            .parts
            .assembler
            .assemble(&trigger.pair, trigger.fire_time)
            .await
        {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                record.push_error(CycleStage::Fetching.to_string(), err.kind(), err.to_string());
                return "error";
            }
        };
        record.stamp_snapshot(&snapshot);

        debug!("Orchestrator: {} -> {}", symbol, CycleStage::Analyzing);
        let (opinions, slot_errors) = self.parts.pool.collect(snapshot.clone()).await;
        record.stamp_opinions(&opinions);
        for slot_error in slot_errors {
            record.push_error(
                CycleStage::Analyzing.to_string(),
                slot_error.kind,
                format!("{}: {}", slot_error.analyst_id, slot_error.detail),
            );
        }

        debug!("Orchestrator: {} -> {}", symbol, CycleStage::Combining);
        let decision = self
            .parts
            .combiner
            .combine(&trigger.pair, &opinions, trigger.fire_time);
        record.stamp_decision(&decision);

        if decision.signal == Signal::Hold {
            debug!("Orchestrator: {} holds, no intent", symbol);
            return "hold";
        }

        debug!("Orchestrator: {} -> {}", symbol, CycleStage::Guarding);
        // One consistent portfolio copy for the whole chain.
        let portfolio = match self.parts.portfolio.portfolio_state().await {
            Ok(portfolio) => portfolio,
            Err(err) => {
                record.push_error(
                    CycleStage::Guarding.to_string(),
                    "Internal",
                    format!("portfolio state unavailable: {}", err),
                );
                return "error";
            }
        };
        let vol_pct = realized_volatility_pct(&snapshot.closes()).unwrap_or(0.0);
        let prospective_notional = self
            .parts
            .sizer
            .position_quote(decision.confidence, vol_pct);

        let outcome = self.parts.guards.evaluate(&GuardContext {
            decision: &decision,
            portfolio: &portfolio,
            snapshot: &snapshot,
            config: &self.parts.guard_config,
            prospective_notional,
            realized_vol_pct: vol_pct,
            last_trade_at: self.parts.cooldowns.last(&symbol),
            now: trigger.fire_time,
        });
        record.guard_outcome = Some(GuardStamp::from(&outcome));
        match outcome {
            GuardOutcome::Veto { .. } => return "veto",
            GuardOutcome::Downgrade { .. } => return "downgrade",
            GuardOutcome::Pass => {}
        }

        debug!("Orchestrator: {} -> {}", symbol, CycleStage::Sizing);
        let Some(intent) =
            self.parts
                .sizer
                .build_intent(&decision, &snapshot, vol_pct, trigger.fire_time)
        else {
            record.push_error(
                CycleStage::Sizing.to_string(),
                "Internal",
                "sizer produced no intent for a PASS decision",
            );
            return "error";
        };
        record.intent = Some(IntentStamp::from(&intent));

        debug!("Orchestrator: {} -> {}", symbol, CycleStage::Publishing);
        match self.parts.sink.execute(&intent).await {
            Ok(()) => {
                self.parts.cooldowns.record(&symbol, trigger.fire_time);
                info!(
                    "Orchestrator: Published {} {} {} for {}",
                    intent.side, intent.quantity_base, intent.pair.base, symbol
                );
                "intent"
            }
            Err(err) => {
                record.push_error(
                    CycleStage::Publishing.to_string(),
                    "Internal",
                    format!("intent sink rejected: {}", err),
                );
                "error"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::analysts::AnalystPool;
    use crate::config::{
        AnalystConfig, CombinerConfig, JournalConfig, SizingConfig, SnapshotConfig,
    };
    use crate::domain::journal::TriggerCause;
    use crate::domain::market::{Interval, Pair};
    use crate::infrastructure::mock::{
        MockIntentSink, MockOpinionSource, MockPortfolio, MockProvider, MockToneReporter,
    };
    use crate::infrastructure::providers::{ProviderRegistry, RetryPolicy};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn analysts() -> Vec<AnalystConfig> {
        [("technical", 0.5), ("liquidity", 0.3), ("sentiment", 0.2)]
            .iter()
            .map(|(id, weight)| AnalystConfig {
                id: id.to_string(),
                weight: *weight,
                timeout_ms: 500,
                source_config: Default::default(),
            })
            .collect()
    }

    struct Fixture {
        orchestrator: Orchestrator,
        sink: Arc<MockIntentSink>,
        tone: Arc<MockToneReporter>,
        journal_path: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    async fn fixture(source: MockOpinionSource, portfolio: MockPortfolio) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let journal_path = dir.path().join("journal.jsonl");
        let metrics = Arc::new(Metrics::new().unwrap());

        let provider = Arc::new(MockProvider::healthy("binance", dec!(50000), trigger_time()));
        let registry = Arc::new(ProviderRegistry::new(
            vec![provider],
            RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                ..RetryPolicy::default()
            },
        ));

        let (journal, _handle) = JournalWriter::open(&JournalConfig {
            path: journal_path.to_string_lossy().into_owned(),
            fsync_each_record: false,
        })
        .await
        .unwrap();

        let sink = Arc::new(MockIntentSink::new());
        let tone = Arc::new(MockToneReporter::new());
        let analysts = analysts();

        let orchestrator = Orchestrator::new(OrchestratorParts {
            assembler: SnapshotAssembler::new(
                registry,
                SnapshotConfig::default(),
                metrics.clone(),
            ),
            pool: AnalystPool::new(&analysts, Arc::new(source), metrics.clone()).unwrap(),
            combiner: DecisionCombiner::new(CombinerConfig::default(), &analysts),
            guards: GuardChain::standard(),
            guard_config: GuardConfig::default(),
            sizer: PositionSizer::new(SizingConfig::default()),
            journal,
            portfolio: Arc::new(portfolio),
            sink: sink.clone(),
            tone: Some(tone.clone()),
            cooldowns: Arc::new(CooldownTracker::new()),
            metrics,
        });

        Fixture {
            orchestrator,
            sink,
            tone,
            journal_path,
            _dir: dir,
        }
    }

    fn trigger_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn trigger() -> Trigger {
        Trigger {
            pair: Pair::new("BTC", "USDT", Interval::OneHour),
            fire_time: trigger_time(),
            cause: TriggerCause::Scheduled,
        }
    }

    #[tokio::test]
    async fn test_happy_path_emits_intent_and_journals() {
        let source = MockOpinionSource::new()
            .with_draft("technical", "BUY", 80)
            .with_draft("liquidity", "BUY", 60)
            .with_draft("sentiment", "HOLD", 0);
        let fx = fixture(source, MockPortfolio::flat(dec!(100000))).await;

        let record = fx.orchestrator.run_cycle(trigger()).await;

        let decision = record.decision.as_ref().unwrap();
        assert_eq!(decision.signal, Signal::Buy);
        assert_eq!(decision.confidence, 58);
        assert_eq!(record.guard_outcome.as_ref().unwrap().result, "PASS");
        assert!(record.intent.is_some());
        assert_eq!(fx.sink.executed().len(), 1);

        let written = crate::infrastructure::journal::read_records(&fx.journal_path, None).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], record);
    }

    #[tokio::test]
    async fn test_cooldown_vetoes_second_cycle() {
        let source = MockOpinionSource::new()
            .with_draft("technical", "BUY", 80)
            .with_draft("liquidity", "BUY", 60)
            .with_draft("sentiment", "HOLD", 0);
        let fx = fixture(source, MockPortfolio::flat(dec!(100000))).await;

        let first = fx.orchestrator.run_cycle(trigger()).await;
        assert!(first.intent.is_some());

        // 30s later, inside the default 3600s cooldown.
        let mut second_trigger = trigger();
        second_trigger.fire_time = trigger_time() + chrono::Duration::seconds(30);
        let second = fx.orchestrator.run_cycle(second_trigger).await;

        let guard = second.guard_outcome.as_ref().unwrap();
        assert_eq!(guard.result, "VETO");
        assert_eq!(guard.by.as_deref(), Some("CooldownGuard"));
        assert!(second.intent.is_none());
        assert_eq!(fx.sink.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_drawdown_downgrades_to_hold() {
        let source = MockOpinionSource::new()
            .with_draft("technical", "BUY", 80)
            .with_draft("liquidity", "BUY", 70)
            .with_draft("sentiment", "BUY", 60);
        let portfolio = MockPortfolio::new(crate::domain::trading::PortfolioState {
            cash_quote: dec!(100000),
            positions: Default::default(),
            open_risk_exposure: dec!(0),
            drawdown_from_peak: 12.0,
        });
        let fx = fixture(source, portfolio).await;

        let record = fx.orchestrator.run_cycle(trigger()).await;
        let guard = record.guard_outcome.as_ref().unwrap();
        assert_eq!(guard.result, "DOWNGRADE");
        assert_eq!(guard.by.as_deref(), Some("DrawdownGuard"));
        assert!(record.intent.is_none());
    }

    #[tokio::test]
    async fn test_all_fallback_slots_hold_without_intent() {
        // No drafts configured: every slot fails and degrades.
        let source = MockOpinionSource::new();
        let fx = fixture(source, MockPortfolio::flat(dec!(100000))).await;

        let record = fx.orchestrator.run_cycle(trigger()).await;
        let decision = record.decision.as_ref().unwrap();
        assert_eq!(decision.signal, Signal::Hold);
        assert_eq!(decision.confidence, 0);
        assert!(record.intent.is_none());
        assert!(record.guard_outcome.is_none());
        assert_eq!(record.errors.len(), 3);
        assert_eq!(fx.sink.executed().len(), 0);
    }

    #[tokio::test]
    async fn test_tone_reporter_is_notified() {
        let source = MockOpinionSource::new()
            .with_draft("technical", "HOLD", 10)
            .with_draft("liquidity", "HOLD", 10)
            .with_draft("sentiment", "HOLD", 10);
        let fx = fixture(source, MockPortfolio::flat(dec!(100000))).await;

        fx.orchestrator.run_cycle(trigger()).await;
        // Reporter runs detached; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.tone.reported(), 1);
    }
}
