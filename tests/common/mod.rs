//! Shared fixture for integration tests: a full orchestrator wired to
//! mock providers and collaborators, journaling into a temp directory.
#![allow(dead_code)]

use quorum::application::analysts::AnalystPool;
use quorum::application::combiner::DecisionCombiner;
use quorum::application::guards::{CooldownTracker, GuardChain};
use quorum::application::orchestrator::{Orchestrator, OrchestratorParts};
use quorum::application::scheduler::Trigger;
use quorum::application::sizing::PositionSizer;
use quorum::application::snapshot::SnapshotAssembler;
use quorum::config::{
    AnalystConfig, CombinerConfig, GuardConfig, JournalConfig, SizingConfig, SnapshotConfig,
};
use quorum::domain::journal::{JournalRecord, TriggerCause};
use quorum::domain::market::{Interval, Pair};
use quorum::domain::ports::MarketDataProvider;
use quorum::domain::trading::PortfolioState;
use quorum::infrastructure::journal::{JournalWriter, read_records};
use quorum::infrastructure::mock::{MockIntentSink, MockOpinionSource, MockPortfolio, MockProvider};
use quorum::infrastructure::observability::Metrics;
use quorum::infrastructure::providers::{ProviderRegistry, RetryPolicy};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub fn pair() -> Pair {
    Pair::new("BTC", "USDT", Interval::OneHour)
}

pub fn trigger_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn scheduled_trigger() -> Trigger {
    Trigger {
        pair: pair(),
        fire_time: trigger_time(),
        cause: TriggerCause::Scheduled,
    }
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: 0.0,
    }
}

pub fn analyst_configs(weights: &[(&str, f64)]) -> Vec<AnalystConfig> {
    weights
        .iter()
        .map(|(id, weight)| AnalystConfig {
            id: id.to_string(),
            weight: *weight,
            timeout_ms: 500,
            source_config: Default::default(),
        })
        .collect()
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub registry: Arc<ProviderRegistry>,
    pub sink: Arc<MockIntentSink>,
    pub portfolio: Arc<MockPortfolio>,
    pub cooldowns: Arc<CooldownTracker>,
    pub metrics: Arc<Metrics>,
    pub journal_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn journal(&self) -> Vec<JournalRecord> {
        read_records(&self.journal_path, None).unwrap()
    }
}

pub struct HarnessBuilder {
    pub providers: Vec<Arc<dyn MarketDataProvider>>,
    pub source: MockOpinionSource,
    pub analysts: Vec<AnalystConfig>,
    pub guards: GuardConfig,
    pub sizing: SizingConfig,
    pub portfolio_state: Option<PortfolioState>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            providers: vec![Arc::new(MockProvider::healthy(
                "binance",
                dec!(50000),
                trigger_time(),
            ))],
            source: MockOpinionSource::new(),
            analysts: analyst_configs(&[("technical", 0.5), ("liquidity", 0.3), ("sentiment", 0.2)]),
            guards: GuardConfig::default(),
            sizing: SizingConfig::default(),
            portfolio_state: None,
        }
    }

    pub async fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let journal_path = dir.path().join("journal.jsonl");
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = Arc::new(ProviderRegistry::new(self.providers, quick_retry()));

        let (journal, _handle) = JournalWriter::open(&JournalConfig {
            path: journal_path.to_string_lossy().into_owned(),
            fsync_each_record: true,
        })
        .await
        .unwrap();

        let sink = Arc::new(MockIntentSink::new());
        let portfolio = Arc::new(match self.portfolio_state {
            Some(state) => MockPortfolio::new(state),
            None => MockPortfolio::flat(dec!(100000)),
        });
        let cooldowns = Arc::new(CooldownTracker::new());

        let orchestrator = Orchestrator::new(OrchestratorParts {
            assembler: SnapshotAssembler::new(
                registry.clone(),
                SnapshotConfig::default(),
                metrics.clone(),
            ),
            pool: AnalystPool::new(&self.analysts, Arc::new(self.source), metrics.clone())
                .unwrap(),
            combiner: DecisionCombiner::new(CombinerConfig::default(), &self.analysts),
            guards: GuardChain::standard(),
            guard_config: self.guards,
            sizer: PositionSizer::new(self.sizing),
            journal,
            portfolio: portfolio.clone(),
            sink: sink.clone(),
            tone: None,
            cooldowns: cooldowns.clone(),
            metrics: metrics.clone(),
        });

        Harness {
            orchestrator,
            registry,
            sink,
            portfolio,
            cooldowns,
            metrics,
            journal_path,
            _dir: dir,
        }
    }
}
