use crate::domain::errors::ProviderError;
use crate::domain::journal::JournalRecord;
use crate::domain::market::{Candle, DepthLevels, Pair, Ticker};
use crate::domain::trading::{PortfolioState, TradeIntent};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A market-data capability a provider may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "CANDLES")]
    Candles,
    #[serde(rename = "TICKER")]
    Ticker,
    #[serde(rename = "DEPTH")]
    Depth,
    #[serde(rename = "FUNDING")]
    Funding,
    #[serde(rename = "OI")]
    OpenInterest,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Candles => "CANDLES",
            Capability::Ticker => "TICKER",
            Capability::Depth => "DEPTH",
            Capability::Funding => "FUNDING",
            Capability::OpenInterest => "OI",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Capability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CANDLES" => Ok(Capability::Candles),
            "TICKER" => Ok(Capability::Ticker),
            "DEPTH" => Ok(Capability::Depth),
            "FUNDING" => Ok(Capability::Funding),
            "OI" => Ok(Capability::OpenInterest),
            _ => anyhow::bail!(
                "Invalid capability: {}. Must be one of CANDLES, TICKER, DEPTH, FUNDING, OI",
                s
            ),
        }
    }
}

/// Funding-rate reading from a derivatives venue.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingSample {
    pub funding_rate: Decimal,
    /// Mark minus index price.
    pub basis: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Open-interest reading from a derivatives venue.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenInterestSample {
    pub open_interest: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Contract every exchange connector implements. Calls return classified
/// errors so the registry's retry/failover logic can route around them.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    async fn fetch_candles(&self, pair: &Pair, limit: usize)
    -> Result<Vec<Candle>, ProviderError>;

    async fn fetch_ticker(&self, pair: &Pair) -> Result<Ticker, ProviderError>;

    async fn fetch_depth(&self, pair: &Pair, levels: usize)
    -> Result<DepthLevels, ProviderError>;

    async fn fetch_funding(&self, _pair: &Pair) -> Result<FundingSample, ProviderError> {
        Err(ProviderError::Permanent {
            reason: format!("{} does not serve funding data", self.id()),
        })
    }

    async fn fetch_open_interest(
        &self,
        _pair: &Pair,
    ) -> Result<OpenInterestSample, ProviderError> {
        Err(ProviderError::Permanent {
            reason: format!("{} does not serve open interest", self.id()),
        })
    }
}

/// What an analyst role hands its opinion source: the role's reduced view
/// of the snapshot plus identification.
#[derive(Debug, Clone, Serialize)]
pub struct OpinionRequest {
    pub analyst_id: String,
    pub pair: String,
    pub interval: String,
    /// Role-specific digest of the snapshot (indicators, depth stats, ...).
    pub digest: serde_json::Value,
}

/// Raw, unvalidated output of an opinion source. The pool coerces anything
/// that fails validation into a fallback opinion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpinionDraft {
    pub signal: String,
    pub confidence: i64,
    pub reasoning: String,
}

/// Collaborator that turns a role digest into an opinion, typically an LLM
/// client. Implementations must be cancel-safe; the pool applies deadlines.
#[async_trait]
pub trait AnalystOpinionSource: Send + Sync {
    async fn generate(&self, request: &OpinionRequest) -> Result<OpinionDraft>;
}

/// Read-only access to the external portfolio collaborator.
#[async_trait]
pub trait PortfolioView: Send + Sync {
    async fn portfolio_state(&self) -> Result<PortfolioState>;
}

/// Execution collaborator: receives intents, places orders elsewhere.
#[async_trait]
pub trait IntentSink: Send + Sync {
    async fn execute(&self, intent: &TradeIntent) -> Result<()>;
}

/// Terminal collaborator notified after a cycle is journaled, e.g. a prose
/// summarizer. Failures are logged and dropped.
#[async_trait]
pub trait ToneReporter: Send + Sync {
    async fn report(&self, record: &JournalRecord);
}
