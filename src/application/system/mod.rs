//! Application composition.
//!
//! `App::build` wires config into the component graph; collaborators
//! (opinion source, portfolio, execution, tone) are injected so tests and
//! backtests swap in fakes without touching the core. No component talks
//! to globals: everything threads through here.

use crate::application::analysts::AnalystPool;
use crate::application::combiner::DecisionCombiner;
use crate::application::guards::{CooldownTracker, GuardChain};
use crate::application::orchestrator::{Orchestrator, OrchestratorParts};
use crate::application::scheduler::{Trigger, TriggerScheduler};
use crate::application::sizing::PositionSizer;
use crate::application::snapshot::SnapshotAssembler;
use crate::config::{AppConfig, ConfigError, DeployEnv, ProviderConfig};
use crate::domain::journal::{JournalRecord, TriggerCause};
use crate::domain::ports::{
    AnalystOpinionSource, IntentSink, MarketDataProvider, PortfolioView, ToneReporter,
};
use crate::domain::trading::TradeIntent;
use crate::infrastructure::journal::JournalWriter;
use crate::infrastructure::mock::MockPortfolio;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::providers::{
    BinanceProvider, CoinbaseProvider, ProviderRegistry, RetryPolicy,
};
use crate::infrastructure::sources::RuleBasedOpinionSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// External collaborators the core depends on but does not own.
pub struct Collaborators {
    pub opinion_source: Arc<dyn AnalystOpinionSource>,
    pub portfolio: Arc<dyn PortfolioView>,
    pub sink: Arc<dyn IntentSink>,
    pub tone: Option<Arc<dyn ToneReporter>>,
}

impl Collaborators {
    /// Self-contained set for dev runs and backtests: rule-based opinions,
    /// a flat simulated portfolio, and an intent sink that only logs.
    pub fn simulated() -> Self {
        Self {
            opinion_source: Arc::new(RuleBasedOpinionSource),
            portfolio: Arc::new(MockPortfolio::flat(dec!(100000))),
            sink: Arc::new(LoggingIntentSink),
            tone: None,
        }
    }
}

/// Default sink: the core only produces intents, so without an execution
/// collaborator attached they are logged and dropped.
pub struct LoggingIntentSink;

#[async_trait]
impl IntentSink for LoggingIntentSink {
    async fn execute(&self, intent: &TradeIntent) -> Result<()> {
        info!(
            "IntentSink: {} {} {} @ {:?} (decision {})",
            intent.side,
            intent.quantity_base,
            intent.pair,
            intent.limit_price,
            intent.source_decision_id
        );
        Ok(())
    }
}

pub struct App {
    config: AppConfig,
    orchestrator: Arc<Orchestrator>,
    scheduler: Arc<TriggerScheduler>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    journal_handle: Option<JoinHandle<()>>,
}

impl App {
    /// Builds the full component graph. Fails fast on config problems;
    /// missing provider credentials surface as `ConfigError::
    /// MissingCredentials` so the CLI can exit with the auth code.
    pub async fn build(config: AppConfig, collaborators: Collaborators) -> Result<Self> {
        let metrics = Arc::new(Metrics::new()?);

        let providers = build_providers(&config)?;
        info!(
            "App: {} providers configured ({})",
            providers.len(),
            providers
                .iter()
                .map(|p| p.id().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let registry = Arc::new(ProviderRegistry::new(providers, RetryPolicy::default()));

        let (journal, journal_handle) = JournalWriter::open(&config.journal).await?;

        let scheduler = Arc::new(TriggerScheduler::new(
            &config.pairs.iter().map(|p| p.to_pair()).collect::<Vec<_>>(),
            metrics.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(OrchestratorParts {
            assembler: SnapshotAssembler::new(
                registry.clone(),
                config.snapshot.clone(),
                metrics.clone(),
            ),
            pool: AnalystPool::new(
                &config.analysts,
                collaborators.opinion_source.clone(),
                metrics.clone(),
            )?,
            combiner: DecisionCombiner::new(config.combiner.clone(), &config.analysts),
            guards: GuardChain::standard(),
            guard_config: config.guards.clone(),
            sizer: PositionSizer::new(config.sizing.clone()),
            journal,
            portfolio: collaborators.portfolio,
            sink: collaborators.sink,
            tone: collaborators.tone,
            cooldowns: Arc::new(CooldownTracker::new()),
            metrics,
        }));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            orchestrator,
            scheduler,
            shutdown_tx,
            handles: Vec::new(),
            journal_handle: Some(journal_handle),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scheduler(&self) -> Arc<TriggerScheduler> {
        self.scheduler.clone()
    }

    /// Spawns the per-pair tickers and cycle workers.
    pub fn start(&mut self) {
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.handles
            .extend(self.scheduler.spawn_tickers(shutdown_rx.clone()));

        for pair in self.scheduler.pairs() {
            let symbol = pair.symbol();
            let scheduler = self.scheduler.clone();
            let orchestrator = self.orchestrator.clone();
            let mut shutdown = shutdown_rx.clone();
            self.handles.push(tokio::spawn(async move {
                while let Some(trigger) = scheduler.next_trigger(&symbol, &mut shutdown).await {
                    let mut abort = shutdown.clone();
                    tokio::select! {
                        _ = orchestrator.run_cycle(trigger) => {
                            scheduler.mark_idle(&symbol);
                        }
                        _ = async { let _ = abort.wait_for(|stop| *stop).await; } => {
                            // Cancelled mid-cycle: partial state discarded,
                            // nothing journaled.
                            warn!("App: Worker for {} cancelled in flight", symbol);
                            break;
                        }
                    }
                }
                info!("App: Worker for {} stopped", symbol);
            }));
        }
        info!("App: Started {} worker tasks", self.handles.len());
    }

    /// One manual cycle outside the schedule, for the `trigger` CLI.
    pub async fn run_once(&self, symbol: &str) -> Result<JournalRecord> {
        let pair = self
            .scheduler
            .pairs()
            .into_iter()
            .find(|p| p.symbol() == symbol)
            .with_context(|| format!("pair '{}' is not configured", symbol))?;
        Ok(self
            .orchestrator
            .run_cycle(Trigger {
                pair,
                fire_time: Utc::now(),
                cause: TriggerCause::Manual,
            })
            .await)
    }

    /// Flips the shutdown flag and waits for workers and the journal to
    /// drain.
    pub async fn shutdown(mut self) {
        info!("App: Shutting down");
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        // Workers are gone; dropping the orchestrator closes the journal
        // channel so the writer task can exit.
        drop(self.orchestrator);
        drop(self.scheduler);
        if let Some(journal_handle) = self.journal_handle.take() {
            let _ = journal_handle.await;
        }
        info!("App: Shutdown complete");
    }
}

fn build_providers(config: &AppConfig) -> Result<Vec<Arc<dyn MarketDataProvider>>, ConfigError> {
    let deploy_env = config.deploy_env();
    config
        .providers
        .iter()
        .map(|provider| build_provider(provider, deploy_env))
        .collect()
}

fn build_provider(
    config: &ProviderConfig,
    deploy_env: DeployEnv,
) -> Result<Arc<dyn MarketDataProvider>, ConfigError> {
    let credentials = config.credentials()?;
    let base_url = config.endpoint(deploy_env)?;

    match config.id.as_str() {
        "binance" => {
            let futures_url = match deploy_env {
                DeployEnv::Prod => "https://fapi.binance.com",
                DeployEnv::Dev => "https://testnet.binancefuture.com",
            };
            Ok(Arc::new(
                BinanceProvider::builder()
                    .id(config.id.clone())
                    .api_key(credentials.api_key)
                    .base_url(base_url)
                    .futures_url(futures_url)
                    .capabilities(config.capabilities.clone())
                    .build(),
            ))
        }
        "coinbase" => Ok(Arc::new(CoinbaseProvider::new(&config.id, base_url))),
        other => Err(ConfigError::Invalid {
            reason: format!("no connector implemented for provider '{}'", other),
        }),
    }
}
