use crate::domain::ports::{Capability, MarketDataProvider};
use crate::infrastructure::providers::RetryPolicy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_DEMOTION_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Demotion {
    until: Instant,
    reason: String,
}

/// Holds the configured providers in priority order and serves ordered
/// failover chains per capability. Health demotions are the registry's
/// only mutable state: reads are concurrent, writes serialized.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    health: RwLock<HashMap<String, Demotion>>,
    retry: RetryPolicy,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>, retry: RetryPolicy) -> Self {
        Self {
            providers,
            health: RwLock::new(HashMap::new()),
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Ordered chain for a capability: healthy providers in configured
    /// priority order, then demoted ones as a last resort. Expired
    /// demotions count as healthy.
    pub fn providers_for(&self, capability: Capability) -> Vec<Arc<dyn MarketDataProvider>> {
        let health = self.health.read().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let mut healthy = Vec::new();
        let mut demoted = Vec::new();
        for provider in &self.providers {
            if !provider.supports(capability) {
                continue;
            }
            match health.get(provider.id()) {
                Some(demotion) if demotion.until > now => demoted.push(provider.clone()),
                _ => healthy.push(provider.clone()),
            }
        }
        healthy.extend(demoted);
        healthy
    }

    /// Temporarily demotes a provider to the back of every chain.
    pub fn mark_unhealthy(&self, id: &str, reason: &str, ttl: Duration) {
        let mut health = self.health.write().unwrap_or_else(|e| e.into_inner());
        warn!(
            "ProviderRegistry: Demoting '{}' for {:?} ({})",
            id, ttl, reason
        );
        health.insert(
            id.to_string(),
            Demotion {
                until: Instant::now() + ttl,
                reason: reason.to_string(),
            },
        );
    }

    /// A successful call clears any standing demotion early.
    pub fn mark_healthy(&self, id: &str) {
        let mut health = self.health.write().unwrap_or_else(|e| e.into_inner());
        if let Some(demotion) = health.remove(id) {
            info!(
                "ProviderRegistry: Restoring '{}' (was demoted: {})",
                id, demotion.reason
            );
        }
    }

    /// Demotion reason for diagnostics, if one is standing.
    pub fn demotion_reason(&self, id: &str) -> Option<String> {
        let health = self.health.read().unwrap_or_else(|e| e.into_inner());
        health
            .get(id)
            .filter(|d| d.until > Instant::now())
            .map(|d| d.reason.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ProviderError;
    use crate::domain::market::{Candle, DepthLevels, Pair, Ticker};
    use async_trait::async_trait;

    struct StubProvider {
        id: String,
        capabilities: Vec<Capability>,
    }

    impl StubProvider {
        fn new(id: &str, capabilities: Vec<Capability>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                capabilities,
            })
        }
    }

    #[async_trait]
    impl MarketDataProvider for StubProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> &[Capability] {
            &self.capabilities
        }

        async fn fetch_candles(
            &self,
            _pair: &Pair,
            _limit: usize,
        ) -> Result<Vec<Candle>, ProviderError> {
            unimplemented!("not exercised")
        }

        async fn fetch_ticker(&self, _pair: &Pair) -> Result<Ticker, ProviderError> {
            unimplemented!("not exercised")
        }

        async fn fetch_depth(
            &self,
            _pair: &Pair,
            _levels: usize,
        ) -> Result<DepthLevels, ProviderError> {
            unimplemented!("not exercised")
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(
            vec![
                StubProvider::new(
                    "binance",
                    vec![Capability::Candles, Capability::Ticker, Capability::Funding],
                ),
                StubProvider::new("coinbase", vec![Capability::Candles, Capability::Ticker]),
            ],
            RetryPolicy::default(),
        )
    }

    fn ids(providers: &[Arc<dyn MarketDataProvider>]) -> Vec<&str> {
        providers.iter().map(|p| p.id()).collect()
    }

    #[test]
    fn test_chain_respects_configured_priority() {
        let registry = registry();
        let chain = registry.providers_for(Capability::Candles);
        assert_eq!(ids(&chain), vec!["binance", "coinbase"]);
    }

    #[test]
    fn test_chain_filters_by_capability() {
        let registry = registry();
        let chain = registry.providers_for(Capability::Funding);
        assert_eq!(ids(&chain), vec!["binance"]);
    }

    #[test]
    fn test_demotion_moves_provider_to_back() {
        let registry = registry();
        registry.mark_unhealthy("binance", "region blocked", Duration::from_secs(60));

        let chain = registry.providers_for(Capability::Candles);
        assert_eq!(ids(&chain), vec!["coinbase", "binance"]);
        assert!(registry.demotion_reason("binance").is_some());
    }

    #[test]
    fn test_successful_probe_clears_demotion() {
        let registry = registry();
        registry.mark_unhealthy("binance", "flaky", Duration::from_secs(60));
        registry.mark_healthy("binance");

        let chain = registry.providers_for(Capability::Candles);
        assert_eq!(ids(&chain), vec!["binance", "coinbase"]);
    }

    #[test]
    fn test_demotion_expires_after_ttl() {
        let registry = registry();
        registry.mark_unhealthy("binance", "flaky", Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));

        let chain = registry.providers_for(Capability::Candles);
        assert_eq!(ids(&chain), vec!["binance", "coinbase"]);
        assert!(registry.demotion_reason("binance").is_none());
    }
}
