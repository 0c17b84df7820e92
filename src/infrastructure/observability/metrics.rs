//! Prometheus metrics definitions for Quorum.
//!
//! All metrics use the `quorum_` prefix. Push-based: counters are scraped
//! from logs or dumped on demand; the core runs no HTTP server.

use prometheus::{Counter, CounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Cycles completed, by pair and outcome (intent, hold, veto,
    /// downgrade, error).
    pub cycles_total: CounterVec,
    /// Scheduled triggers dropped because a cycle was still in flight.
    pub skipped_busy_total: CounterVec,
    /// Journal writes that failed after the decision was made.
    pub journal_write_failures_total: Counter,
    /// Provider demotions, by provider id.
    pub provider_failovers_total: CounterVec,
    /// Analyst slots degraded to fallback, by analyst id and cause.
    pub analyst_degraded_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_total = CounterVec::new(
            Opts::new("quorum_cycles_total", "Cycles completed by pair and outcome"),
            &["pair", "outcome"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let skipped_busy_total = CounterVec::new(
            Opts::new(
                "quorum_skipped_busy_total",
                "Triggers coalesced because the pair was busy",
            ),
            &["pair"],
        )?;
        registry.register(Box::new(skipped_busy_total.clone()))?;

        let journal_write_failures_total = Counter::with_opts(Opts::new(
            "quorum_journal_write_failures_total",
            "Journal writes that failed",
        ))?;
        registry.register(Box::new(journal_write_failures_total.clone()))?;

        let provider_failovers_total = CounterVec::new(
            Opts::new(
                "quorum_provider_failovers_total",
                "Provider demotions by provider id",
            ),
            &["provider"],
        )?;
        registry.register(Box::new(provider_failovers_total.clone()))?;

        let analyst_degraded_total = CounterVec::new(
            Opts::new(
                "quorum_analyst_degraded_total",
                "Analyst slots degraded to fallback, by analyst and cause",
            ),
            &["analyst", "cause"],
        )?;
        registry.register(Box::new(analyst_degraded_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cycles_total,
            skipped_busy_total,
            journal_write_failures_total,
            provider_failovers_total,
            analyst_degraded_total,
        })
    }

    /// Text exposition of every registered metric, for log shipping.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}
