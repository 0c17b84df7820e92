use crate::config::{ConfigError, DeployEnv};
use crate::domain::ports::Capability;
use serde::{Deserialize, Serialize};
use std::env;

/// Priority position of a provider in the failover chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Primary,
    Fallback,
}

/// How a provider authenticates. `EnvKeys` reads `<ID>_KEY` and
/// `<ID>_SECRET` from the environment at startup; secrets never live in
/// the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAuth {
    #[default]
    None,
    EnvKeys,
}

/// One entry of the ordered `providers` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub role: ProviderRole,
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub auth: ProviderAuth,
    /// Optional endpoint override; when absent the deploy environment
    /// selects the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Credentials resolved from the environment for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ProviderConfig {
    /// Resolves the effective base URL for `deploy_env`, falling back to
    /// the known endpoints for the built-in providers.
    pub fn endpoint(&self, deploy_env: DeployEnv) -> Result<String, ConfigError> {
        if let Some(url) = &self.base_url {
            return Ok(url.clone());
        }
        let url = match (self.id.as_str(), deploy_env) {
            ("binance", DeployEnv::Prod) => "https://api.binance.com",
            ("binance", DeployEnv::Dev) => "https://testnet.binance.vision",
            ("coinbase", DeployEnv::Prod) => "https://api.exchange.coinbase.com",
            ("coinbase", DeployEnv::Dev) => "https://api-public.sandbox.exchange.coinbase.com",
            _ => {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "provider '{}' has no base_url and no built-in endpoint",
                        self.id
                    ),
                });
            }
        };
        Ok(url.to_string())
    }

    /// Loads credentials per the auth mode. Missing env vars are a startup
    /// failure for `EnvKeys` providers.
    pub fn credentials(&self) -> Result<ProviderCredentials, ConfigError> {
        match self.auth {
            ProviderAuth::None => Ok(ProviderCredentials::default()),
            ProviderAuth::EnvKeys => {
                let prefix = self.id.to_uppercase();
                let api_key = env::var(format!("{}_KEY", prefix)).map_err(|_| {
                    ConfigError::MissingCredentials {
                        provider: self.id.clone(),
                        var: format!("{}_KEY", prefix),
                    }
                })?;
                let api_secret = env::var(format!("{}_SECRET", prefix)).map_err(|_| {
                    ConfigError::MissingCredentials {
                        provider: self.id.clone(),
                        var: format!("{}_SECRET", prefix),
                    }
                })?;
                Ok(ProviderCredentials { api_key, api_secret })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_endpoints_per_environment() {
        let config = ProviderConfig {
            id: "binance".to_string(),
            role: ProviderRole::Primary,
            capabilities: vec![Capability::Candles],
            auth: ProviderAuth::None,
            base_url: None,
        };
        assert_eq!(
            config.endpoint(DeployEnv::Prod).unwrap(),
            "https://api.binance.com"
        );
        assert_eq!(
            config.endpoint(DeployEnv::Dev).unwrap(),
            "https://testnet.binance.vision"
        );
    }

    #[test]
    fn test_unknown_provider_requires_base_url() {
        let mut config = ProviderConfig {
            id: "kraken".to_string(),
            role: ProviderRole::Fallback,
            capabilities: vec![Capability::Ticker],
            auth: ProviderAuth::None,
            base_url: None,
        };
        assert!(config.endpoint(DeployEnv::Prod).is_err());

        config.base_url = Some("https://api.kraken.example".to_string());
        assert_eq!(
            config.endpoint(DeployEnv::Prod).unwrap(),
            "https://api.kraken.example"
        );
    }
}
