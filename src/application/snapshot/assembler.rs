//! Market snapshot assembly.
//!
//! For each capability the assembler walks the registry's failover chain:
//! retry policy per provider, schema validation on every payload, demotion
//! of providers that fail. Required components (candles, ticker, depth)
//! abort the cycle when exhausted or stale; derivatives degrade the
//! snapshot to PARTIAL instead.

use crate::config::SnapshotConfig;
use crate::domain::errors::{CycleError, ProviderError, ValidationError};
use crate::domain::market::{
    Candle, DepthLevels, DerivativesFact, MarketSnapshot, Pair, SnapshotQuality, Ticker,
};
use crate::domain::ports::{Capability, MarketDataProvider};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::providers::{DEFAULT_DEMOTION_TTL, ProviderRegistry};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SnapshotAssembler {
    registry: Arc<ProviderRegistry>,
    config: SnapshotConfig,
    metrics: Arc<Metrics>,
}

impl SnapshotAssembler {
    pub fn new(registry: Arc<ProviderRegistry>, config: SnapshotConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            config,
            metrics,
        }
    }

    /// Builds the snapshot for `(pair, trigger_time)` or fails the cycle
    /// with `DataUnavailable`.
    pub async fn assemble(
        &self,
        pair: &Pair,
        trigger_time: DateTime<Utc>,
    ) -> Result<MarketSnapshot, CycleError> {
        let candles = self.fetch_candles(pair, trigger_time).await?;
        let ticker = self.fetch_ticker(pair, trigger_time).await?;
        let depth = self.fetch_depth(pair, trigger_time).await?;
        let derivatives = self.fetch_derivatives(pair, trigger_time).await;

        let quality = if derivatives.is_some() {
            SnapshotQuality::Full
        } else {
            SnapshotQuality::Partial
        };

        // Required components only; consumers observing t_snap are
        // guaranteed nothing they rely on is older.
        let candle_ts = candles
            .last()
            .map(|c| c.close_time.min(trigger_time))
            .unwrap_or(trigger_time);
        let t_snap = candle_ts
            .min(ticker.timestamp)
            .min(depth.timestamp)
            .min(trigger_time);

        debug!(
            "SnapshotAssembler: {} snapshot at t_snap={} quality={:?} ({} candles)",
            pair,
            t_snap,
            quality,
            candles.len()
        );

        Ok(MarketSnapshot {
            pair: pair.clone(),
            t_snap,
            candles,
            ticker,
            depth,
            derivatives,
            quality,
        })
    }

    async fn fetch_candles(
        &self,
        pair: &Pair,
        trigger_time: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CycleError> {
        let limit = self.config.candle_limit;
        let interval = pair.interval;
        let budget = ChronoDuration::seconds(
            interval.to_seconds() * self.config.candle_max_age_intervals as i64,
        );

        self.fetch_required(pair, Capability::Candles, "fetch_candles",
            move |provider, pair| async move { provider.fetch_candles(&pair, limit).await },
            move |candles: &Vec<Candle>| {
                for candle in candles {
                    candle.validate(interval)?;
                }
                // Only candles closed by the trigger instant count toward
                // the window.
                let Some(latest_closed) = candles
                    .iter()
                    .rev()
                    .find(|c| c.close_time <= trigger_time)
                else {
                    return Err(ValidationError::Candle {
                        reason: "no closed candle at or before the trigger".to_string(),
                    });
                };
                let closed = candles
                    .iter()
                    .filter(|c| c.close_time <= trigger_time)
                    .count();
                if closed < 2 {
                    return Err(ValidationError::Candle {
                        reason: format!("window too small: {} closed candles", closed),
                    });
                }
                let age = trigger_time - latest_closed.close_time.min(trigger_time);
                if age > budget {
                    return Err(ValidationError::Candle {
                        reason: format!(
                            "stale window: latest close {} is {}s behind trigger",
                            latest_closed.close_time,
                            age.num_seconds()
                        ),
                    });
                }
                Ok(())
            },
        )
        .await
        // Drop any still-open candle so downstream windows end at or
        // before the trigger instant.
        .map(|candles| {
            candles
                .into_iter()
                .filter(|c| c.close_time <= trigger_time)
                .collect()
        })
    }

    async fn fetch_ticker(
        &self,
        pair: &Pair,
        trigger_time: DateTime<Utc>,
    ) -> Result<Ticker, CycleError> {
        let max_age = ChronoDuration::from_std(self.config.ticker_max_age())
            .unwrap_or(ChronoDuration::seconds(5));

        self.fetch_required(pair, Capability::Ticker, "fetch_ticker",
            |provider, pair| async move { provider.fetch_ticker(&pair).await },
            move |ticker: &Ticker| {
                ticker.validate()?;
                let age = trigger_time - ticker.timestamp.min(trigger_time);
                if age > max_age {
                    return Err(ValidationError::Ticker {
                        reason: format!("stale ticker: {}s old", age.num_seconds()),
                    });
                }
                Ok(())
            },
        )
        .await
    }

    async fn fetch_depth(
        &self,
        pair: &Pair,
        trigger_time: DateTime<Utc>,
    ) -> Result<DepthLevels, CycleError> {
        let levels = self.config.depth_levels;
        let max_age = ChronoDuration::from_std(self.config.depth_max_age())
            .unwrap_or(ChronoDuration::seconds(10));

        self.fetch_required(pair, Capability::Depth, "fetch_depth",
            move |provider, pair| async move { provider.fetch_depth(&pair, levels).await },
            move |depth: &DepthLevels| {
                depth.validate()?;
                let age = trigger_time - depth.timestamp.min(trigger_time);
                if age > max_age {
                    return Err(ValidationError::Depth {
                        reason: format!("stale depth: {}s old", age.num_seconds()),
                    });
                }
                Ok(())
            },
        )
        .await
    }

    /// Optional component: any failure or staleness just omits the fact.
    async fn fetch_derivatives(
        &self,
        pair: &Pair,
        trigger_time: DateTime<Utc>,
    ) -> Option<DerivativesFact> {
        let max_age = ChronoDuration::from_std(self.config.derivatives_max_age())
            .unwrap_or(ChronoDuration::seconds(60));

        let funding = self
            .fetch_optional(pair, Capability::Funding, "fetch_funding", |provider, pair| async move {
                provider.fetch_funding(&pair).await
            })
            .await?;
        let open_interest = self
            .fetch_optional(pair, Capability::OpenInterest, "fetch_open_interest", |provider, pair| async move {
                provider.fetch_open_interest(&pair).await
            })
            .await?;

        let timestamp = funding.timestamp.min(open_interest.timestamp);
        let age = trigger_time - timestamp.min(trigger_time);
        if age > max_age {
            info!(
                "SnapshotAssembler: Omitting stale derivatives for {} ({}s old)",
                pair,
                age.num_seconds()
            );
            return None;
        }

        Some(DerivativesFact {
            funding_rate: funding.funding_rate,
            open_interest: open_interest.open_interest,
            basis: funding.basis,
            timestamp,
        })
    }

    /// Failover loop for a required capability. Validation failures count
    /// as provider errors and move on down the chain.
    async fn fetch_required<T, FetchFn, Fut, ValidateFn>(
        &self,
        pair: &Pair,
        capability: Capability,
        call_name: &str,
        fetch: FetchFn,
        validate: ValidateFn,
    ) -> Result<T, CycleError>
    where
        FetchFn: Fn(Arc<dyn MarketDataProvider>, Pair) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        ValidateFn: Fn(&T) -> Result<(), ValidationError>,
    {
        let chain = self.registry.providers_for(capability);
        if chain.is_empty() {
            return Err(CycleError::DataUnavailable {
                capability: capability.to_string(),
                detail: "no provider serves this capability".to_string(),
            });
        }

        let mut last_failure = String::new();
        for provider in chain {
            let id = provider.id().to_string();
            let result = self
                .registry
                .retry_policy()
                .run(call_name, || fetch(provider.clone(), pair.clone()))
                .await;

            match result {
                Ok(value) => match validate(&value) {
                    Ok(()) => {
                        self.registry.mark_healthy(&id);
                        return Ok(value);
                    }
                    Err(validation) => {
                        warn!(
                            "SnapshotAssembler: {} from '{}' failed validation: {}",
                            capability, id, validation
                        );
                        self.demote(&id, &validation.to_string());
                        last_failure = format!("{}: {}", id, validation);
                    }
                },
                Err(provider_err) => {
                    warn!(
                        "SnapshotAssembler: {} from '{}' failed: {}",
                        capability, id, provider_err
                    );
                    self.demote(&id, &provider_err.to_string());
                    last_failure = format!("{}: {}", id, provider_err);
                }
            }
        }

        Err(CycleError::DataUnavailable {
            capability: capability.to_string(),
            detail: last_failure,
        })
    }

    /// Single-pass failover for optional capabilities; exhaustion is not
    /// an error.
    async fn fetch_optional<T, FetchFn, Fut>(
        &self,
        pair: &Pair,
        capability: Capability,
        call_name: &str,
        fetch: FetchFn,
    ) -> Option<T>
    where
        FetchFn: Fn(Arc<dyn MarketDataProvider>, Pair) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let chain = self.registry.providers_for(capability);
        for provider in chain {
            let id = provider.id().to_string();
            match self
                .registry
                .retry_policy()
                .run(call_name, || fetch(provider.clone(), pair.clone()))
                .await
            {
                Ok(value) => {
                    self.registry.mark_healthy(&id);
                    return Some(value);
                }
                Err(err) => {
                    debug!(
                        "SnapshotAssembler: optional {} from '{}' failed: {}",
                        capability, id, err
                    );
                    self.demote(&id, &err.to_string());
                }
            }
        }
        None
    }

    fn demote(&self, id: &str, reason: &str) {
        self.registry.mark_unhealthy(id, reason, DEFAULT_DEMOTION_TTL);
        self.metrics
            .provider_failovers_total
            .with_label_values(&[id])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Interval;
    use crate::infrastructure::mock::{MockProvider, candles_fixture, depth_fixture, ticker_fixture};
    use crate::infrastructure::providers::RetryPolicy;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn pair() -> Pair {
        Pair::new("BTC", "USDT", Interval::OneHour)
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
        }
    }

    fn assembler_with(providers: Vec<Arc<dyn MarketDataProvider>>) -> SnapshotAssembler {
        SnapshotAssembler::new(
            Arc::new(ProviderRegistry::new(providers, quick_retry())),
            SnapshotConfig::default(),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 30).unwrap()
    }

    #[tokio::test]
    async fn test_assembles_full_snapshot_from_healthy_provider() {
        let provider = Arc::new(MockProvider::healthy("binance", dec!(50000), now()));
        let assembler = assembler_with(vec![provider]);

        let snapshot = assembler.assemble(&pair(), now()).await.unwrap();
        assert_eq!(snapshot.quality, SnapshotQuality::Full);
        assert!(snapshot.t_snap <= now());
        assert!(!snapshot.candles.is_empty());
        assert!(snapshot.derivatives.is_some());
    }

    #[tokio::test]
    async fn test_fails_over_to_fallback_provider() {
        let primary = Arc::new(MockProvider::healthy("binance", dec!(50000), now()));
        // Two rate-limits then a region block exhaust the primary.
        primary.push_candles(Err(ProviderError::RateLimited {
            retry_after: Duration::from_millis(1),
        }));
        primary.push_candles(Err(ProviderError::RateLimited {
            retry_after: Duration::from_millis(1),
        }));
        primary.push_candles(Err(ProviderError::RegionBlocked));

        let fallback = Arc::new(MockProvider::healthy("coinbase", dec!(50000), now()));
        let assembler = assembler_with(vec![primary.clone(), fallback.clone()]);

        let snapshot = assembler.assemble(&pair(), now()).await.unwrap();
        assert!(!snapshot.candles.is_empty());
        assert_eq!(primary.calls(Capability::Candles), 3);
        assert_eq!(fallback.calls(Capability::Candles), 1);
    }

    #[tokio::test]
    async fn test_exhausted_required_capability_is_data_unavailable() {
        // Single provider whose ticker endpoint stays down past the retry
        // budget; no fallback exists.
        let bare = Arc::new(MockProvider::new(
            "solo",
            vec![Capability::Candles, Capability::Ticker, Capability::Depth],
        ));
        bare.set_default_candles(candles_fixture(dec!(50000), 50, now()));
        bare.set_default_depth(depth_fixture(dec!(50000), now()));
        for _ in 0..3 {
            bare.push_ticker(Err(ProviderError::Transient {
                reason: "down".into(),
            }));
        }

        let assembler = assembler_with(vec![bare]);
        let err = assembler.assemble(&pair(), now()).await.unwrap_err();
        assert!(matches!(err, CycleError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_stale_ticker_rejected_and_deterministic_under_retry() {
        let provider = Arc::new(MockProvider::new(
            "binance",
            vec![Capability::Candles, Capability::Ticker, Capability::Depth],
        ));
        provider.set_default_candles(candles_fixture(dec!(50000), 50, now()));
        provider.set_default_depth(depth_fixture(dec!(50000), now()));
        // Ticker is 30s older than the trigger: outside the 5s budget.
        provider.set_default_ticker(ticker_fixture(
            dec!(50000),
            now() - ChronoDuration::seconds(30),
        ));

        let assembler = assembler_with(vec![provider]);
        let first = assembler.assemble(&pair(), now()).await;
        let second = assembler.assemble(&pair(), now()).await;
        assert!(matches!(first, Err(CycleError::DataUnavailable { .. })));
        // Same inputs, same verdict: the staleness decision does not
        // depend on wall-clock time.
        assert!(matches!(second, Err(CycleError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_missing_derivatives_degrades_quality_only() {
        let provider = Arc::new(MockProvider::new(
            "coinbase",
            vec![Capability::Candles, Capability::Ticker, Capability::Depth],
        ));
        provider.set_default_candles(candles_fixture(dec!(50000), 50, now()));
        provider.set_default_ticker(ticker_fixture(dec!(50000), now()));
        provider.set_default_depth(depth_fixture(dec!(50000), now()));

        let assembler = assembler_with(vec![provider]);
        let snapshot = assembler.assemble(&pair(), now()).await.unwrap();
        assert_eq!(snapshot.quality, SnapshotQuality::Partial);
        assert!(snapshot.derivatives.is_none());
    }

    #[tokio::test]
    async fn test_t_snap_is_minimum_required_timestamp() {
        let provider = Arc::new(MockProvider::healthy("binance", dec!(50000), now()));
        let depth_time = now() - ChronoDuration::seconds(4);
        provider.set_default_depth(depth_fixture(dec!(50000), depth_time));

        let assembler = assembler_with(vec![provider]);
        let snapshot = assembler.assemble(&pair(), now()).await.unwrap();
        assert!(snapshot.t_snap <= depth_time);
    }
}
