//! Configuration for the orchestrator.
//!
//! Structure comes from a TOML file (pairs, providers, analysts, combiner,
//! guards, sizing, journal, environment); secrets come only from the
//! environment (`<PROVIDER>_KEY`, `<PROVIDER>_SECRET`, `DEPLOY_ENV`).

mod analyst_config;
mod policy_config;
mod provider_config;

pub use analyst_config::{AnalystConfig, BUILTIN_ROLES};
pub use policy_config::{
    CombinerConfig, GuardConfig, JournalConfig, SizingConfig, SnapshotConfig,
};
pub use provider_config::{ProviderAuth, ProviderConfig, ProviderCredentials, ProviderRole};

use crate::domain::market::{Interval, Pair};
use crate::domain::ports::Capability;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Snapshot components every cycle must have. FUNDING and OI stay optional.
pub const REQUIRED_CAPABILITIES: &[Capability] =
    &[Capability::Candles, Capability::Ticker, Capability::Depth];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("provider '{provider}' requires credentials: {var} is not set")]
    MissingCredentials { provider: String, var: String },
}

/// Deployment environment; selects default provider endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    Dev,
    Prod,
}

impl FromStr for DeployEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(DeployEnv::Dev),
            "prod" => Ok(DeployEnv::Prod),
            _ => Err(ConfigError::Invalid {
                reason: format!("invalid deploy_env: {}. Must be 'dev' or 'prod'", s),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub deploy_env: DeployEnv,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            deploy_env: DeployEnv::Dev,
        }
    }
}

/// One `[[pairs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub base: String,
    pub quote: String,
    pub interval: Interval,
}

impl PairConfig {
    pub fn to_pair(&self) -> Pair {
        Pair::new(self.base.clone(), self.quote.clone(), self.interval)
    }
}

/// The whole configuration surface. `load` parses, applies the
/// `DEPLOY_ENV` override, and validates; an invalid config refuses to
/// start the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub pairs: Vec<PairConfig>,
    pub providers: Vec<ProviderConfig>,
    pub analysts: Vec<AnalystConfig>,
    #[serde(default)]
    pub combiner: CombinerConfig,
    #[serde(default)]
    pub guards: GuardConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    pub journal: JournalConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(raw)?;

        // DEPLOY_ENV always wins over the file.
        if let Ok(value) = env::var("DEPLOY_ENV") {
            config.environment.deploy_env = value.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn deploy_env(&self) -> DeployEnv {
        self.environment.deploy_env
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pairs.is_empty() {
            return Err(invalid("at least one pair must be configured"));
        }
        let mut seen_pairs = HashSet::new();
        for pair in &self.pairs {
            if pair.base.is_empty() || pair.quote.is_empty() {
                return Err(invalid("pair base and quote must be non-empty"));
            }
            if !seen_pairs.insert((
                pair.base.to_uppercase(),
                pair.quote.to_uppercase(),
                pair.interval,
            )) {
                return Err(invalid(format!(
                    "duplicate pair {}/{} @ {}",
                    pair.base, pair.quote, pair.interval
                )));
            }
        }

        if self.providers.is_empty() {
            return Err(invalid("at least one provider must be configured"));
        }
        let mut seen_providers = HashSet::new();
        let mut seen_fallback = false;
        for provider in &self.providers {
            if !seen_providers.insert(provider.id.clone()) {
                return Err(invalid(format!("duplicate provider id '{}'", provider.id)));
            }
            // The list is the failover order; roles must agree with it.
            match provider.role {
                ProviderRole::Fallback => seen_fallback = true,
                ProviderRole::Primary if seen_fallback => {
                    return Err(invalid(format!(
                        "primary provider '{}' listed after a fallback",
                        provider.id
                    )));
                }
                ProviderRole::Primary => {}
            }
            if provider.capabilities.is_empty() {
                return Err(invalid(format!(
                    "provider '{}' declares no capabilities",
                    provider.id
                )));
            }
            // Catches unknown provider ids with no base_url override.
            provider.endpoint(self.environment.deploy_env)?;
        }
        for capability in REQUIRED_CAPABILITIES {
            if !self
                .providers
                .iter()
                .any(|p| p.capabilities.contains(capability))
            {
                return Err(invalid(format!(
                    "no provider serves required capability {}",
                    capability
                )));
            }
        }

        if self.analysts.is_empty() {
            return Err(invalid("at least one analyst must be configured"));
        }
        let mut seen_analysts = HashSet::new();
        let mut weight_sum = 0.0;
        for analyst in &self.analysts {
            if !seen_analysts.insert(analyst.id.clone()) {
                return Err(invalid(format!("duplicate analyst id '{}'", analyst.id)));
            }
            if !BUILTIN_ROLES.contains(&analyst.id.as_str()) {
                return Err(invalid(format!(
                    "unknown analyst role '{}'. Built-in roles: {}",
                    analyst.id,
                    BUILTIN_ROLES.join(", ")
                )));
            }
            if analyst.weight <= 0.0 {
                return Err(invalid(format!(
                    "analyst '{}' weight must be positive, got {}",
                    analyst.id, analyst.weight
                )));
            }
            if analyst.timeout_ms == 0 {
                return Err(invalid(format!(
                    "analyst '{}' timeout_ms must be positive",
                    analyst.id
                )));
            }
            weight_sum += analyst.weight;
        }
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(invalid(format!(
                "analyst weights must sum to 1.0, got {}",
                weight_sum
            )));
        }

        if !(0.0..=1.0).contains(&self.combiner.theta_buy)
            || !(0.0..=1.0).contains(&self.combiner.theta_sell)
            || self.combiner.theta_buy == 0.0
            || self.combiner.theta_sell == 0.0
        {
            return Err(invalid("combiner thetas must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.combiner.fallback_penalty)
            || self.combiner.fallback_penalty == 0.0
        {
            return Err(invalid("combiner fallback_penalty must be in (0, 1]"));
        }

        if self.guards.exposure_cap_quote.is_sign_negative()
            || self.guards.per_asset_cap_pct <= 0.0
            || self.guards.drawdown_pause_pct <= 0.0
            || self.guards.vol_upper_pct <= 0.0
        {
            return Err(invalid("guard thresholds must be positive"));
        }

        let sizing = &self.sizing;
        if sizing.base_notional_quote.is_sign_negative() || sizing.base_notional_quote.is_zero() {
            return Err(invalid("sizing.base_notional_quote must be positive"));
        }
        if sizing.min_quote > sizing.max_quote {
            return Err(invalid(format!(
                "sizing.min_quote {} exceeds sizing.max_quote {}",
                sizing.min_quote, sizing.max_quote
            )));
        }
        if sizing.vol_floor <= 0.0 || sizing.vol_floor > sizing.vol_cap {
            return Err(invalid("sizing volatility bounds must satisfy 0 < floor <= cap"));
        }
        if sizing.vol_sensitivity <= 0.0 {
            return Err(invalid("sizing.vol_sensitivity must be positive"));
        }

        if self.journal.path.is_empty() {
            return Err(invalid("journal.path must be non-empty"));
        }

        if self.snapshot.candle_limit < 2 {
            return Err(invalid("snapshot.candle_limit must be at least 2"));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}
