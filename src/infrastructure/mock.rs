//! Mock collaborators for tests and simulation runs.

use crate::domain::errors::ProviderError;
use crate::domain::journal::JournalRecord;
use crate::domain::market::{
    Candle, DepthLevel, DepthLevels, Interval, Pair, Ticker,
};
use crate::domain::ports::{
    AnalystOpinionSource, Capability, FundingSample, IntentSink, MarketDataProvider,
    OpenInterestSample, OpinionDraft, OpinionRequest, PortfolioView, ToneReporter,
};
use crate::domain::trading::{PortfolioState, TradeIntent};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted responses: queued outcomes first, then the standing default.
struct Script<T> {
    queue: Mutex<Vec<Result<T, ProviderError>>>,
    default: Mutex<Option<T>>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            default: Mutex::new(None),
        }
    }

    fn push(&self, outcome: Result<T, ProviderError>) {
        self.queue.lock().unwrap().push(outcome);
    }

    fn set_default(&self, value: T) {
        *self.default.lock().unwrap() = Some(value);
    }

    fn next(&self, what: &str) -> Result<T, ProviderError> {
        let mut queue = self.queue.lock().unwrap();
        if !queue.is_empty() {
            return queue.remove(0);
        }
        drop(queue);
        self.default
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Permanent {
                reason: format!("mock has no {} response", what),
            })
    }
}

/// Provider with per-capability scripted outcomes. Call counts let tests
/// assert retry and failover behavior.
pub struct MockProvider {
    id: String,
    capabilities: Vec<Capability>,
    candles: Script<Vec<Candle>>,
    ticker: Script<Ticker>,
    depth: Script<DepthLevels>,
    funding: Script<FundingSample>,
    open_interest: Script<OpenInterestSample>,
    calls: Mutex<HashMap<Capability, u32>>,
}

impl MockProvider {
    pub fn new(id: &str, capabilities: Vec<Capability>) -> Self {
        Self {
            id: id.to_string(),
            capabilities,
            candles: Script::new(),
            ticker: Script::new(),
            depth: Script::new(),
            funding: Script::new(),
            open_interest: Script::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// A provider pre-loaded with a healthy one-hour market around
    /// `reference_price`, anchored at `now`.
    pub fn healthy(id: &str, reference_price: Decimal, now: DateTime<Utc>) -> Self {
        let provider = Self::new(
            id,
            vec![
                Capability::Candles,
                Capability::Ticker,
                Capability::Depth,
                Capability::Funding,
                Capability::OpenInterest,
            ],
        );
        provider
            .candles
            .set_default(candles_fixture(reference_price, 50, now));
        provider.ticker.set_default(ticker_fixture(reference_price, now));
        provider.depth.set_default(depth_fixture(reference_price, now));
        provider.funding.set_default(FundingSample {
            funding_rate: dec!(0.0001),
            basis: dec!(12.5),
            timestamp: now,
        });
        provider.open_interest.set_default(OpenInterestSample {
            open_interest: dec!(81000),
            timestamp: now,
        });
        provider
    }

    pub fn push_candles(&self, outcome: Result<Vec<Candle>, ProviderError>) {
        self.candles.push(outcome);
    }

    pub fn push_ticker(&self, outcome: Result<Ticker, ProviderError>) {
        self.ticker.push(outcome);
    }

    pub fn push_depth(&self, outcome: Result<DepthLevels, ProviderError>) {
        self.depth.push(outcome);
    }

    pub fn set_default_candles(&self, candles: Vec<Candle>) {
        self.candles.set_default(candles);
    }

    pub fn set_default_ticker(&self, ticker: Ticker) {
        self.ticker.set_default(ticker);
    }

    pub fn set_default_depth(&self, depth: DepthLevels) {
        self.depth.set_default(depth);
    }

    pub fn calls(&self, capability: Capability) -> u32 {
        *self.calls.lock().unwrap().get(&capability).unwrap_or(&0)
    }

    fn count(&self, capability: Capability) {
        *self.calls.lock().unwrap().entry(capability).or_insert(0) += 1;
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn fetch_candles(
        &self,
        _pair: &Pair,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.count(Capability::Candles);
        self.candles.next("candles").map(|mut candles| {
            if candles.len() > limit {
                candles.drain(..candles.len() - limit);
            }
            candles
        })
    }

    async fn fetch_ticker(&self, _pair: &Pair) -> Result<Ticker, ProviderError> {
        self.count(Capability::Ticker);
        self.ticker.next("ticker")
    }

    async fn fetch_depth(
        &self,
        _pair: &Pair,
        _levels: usize,
    ) -> Result<DepthLevels, ProviderError> {
        self.count(Capability::Depth);
        self.depth.next("depth")
    }

    async fn fetch_funding(&self, _pair: &Pair) -> Result<FundingSample, ProviderError> {
        self.count(Capability::Funding);
        self.funding.next("funding")
    }

    async fn fetch_open_interest(
        &self,
        _pair: &Pair,
    ) -> Result<OpenInterestSample, ProviderError> {
        self.count(Capability::OpenInterest);
        self.open_interest.next("open interest")
    }
}

/// Opinion source returning canned drafts, with optional per-analyst delay
/// (for deadline tests) and failure injection.
#[derive(Default)]
pub struct MockOpinionSource {
    drafts: Mutex<HashMap<String, OpinionDraft>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<Vec<String>>,
}

impl MockOpinionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(self, analyst_id: &str, signal: &str, confidence: i64) -> Self {
        self.drafts.lock().unwrap().insert(
            analyst_id.to_string(),
            OpinionDraft {
                signal: signal.to_string(),
                confidence,
                reasoning: format!("mock opinion for {}", analyst_id),
            },
        );
        self
    }

    pub fn with_raw_draft(self, analyst_id: &str, draft: OpinionDraft) -> Self {
        self.drafts
            .lock()
            .unwrap()
            .insert(analyst_id.to_string(), draft);
        self
    }

    pub fn with_delay(self, analyst_id: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(analyst_id.to_string(), delay);
        self
    }

    pub fn with_failure(self, analyst_id: &str) -> Self {
        self.failing.lock().unwrap().push(analyst_id.to_string());
        self
    }
}

#[async_trait]
impl AnalystOpinionSource for MockOpinionSource {
    async fn generate(&self, request: &OpinionRequest) -> Result<OpinionDraft> {
        let delay = self.delays.lock().unwrap().get(&request.analyst_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&request.analyst_id) {
            anyhow::bail!("mock source failure for {}", request.analyst_id);
        }
        self.drafts
            .lock()
            .unwrap()
            .get(&request.analyst_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no mock draft for {}", request.analyst_id))
    }
}

/// Portfolio view returning a fixed state.
pub struct MockPortfolio {
    state: Mutex<PortfolioState>,
}

impl MockPortfolio {
    pub fn new(state: PortfolioState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn flat(cash_quote: Decimal) -> Self {
        Self::new(PortfolioState {
            cash_quote,
            positions: HashMap::new(),
            open_risk_exposure: Decimal::ZERO,
            drawdown_from_peak: 0.0,
        })
    }

    pub fn set_state(&self, state: PortfolioState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl PortfolioView for MockPortfolio {
    async fn portfolio_state(&self) -> Result<PortfolioState> {
        Ok(self.state.lock().unwrap().clone())
    }
}

/// Intent sink that records what it was asked to execute.
#[derive(Default)]
pub struct MockIntentSink {
    executed: Mutex<Vec<TradeIntent>>,
}

impl MockIntentSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<TradeIntent> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentSink for MockIntentSink {
    async fn execute(&self, intent: &TradeIntent) -> Result<()> {
        self.executed.lock().unwrap().push(intent.clone());
        Ok(())
    }
}

/// Tone reporter counting notifications.
#[derive(Default)]
pub struct MockToneReporter {
    reported: Mutex<Vec<JournalRecord>>,
}

impl MockToneReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reported(&self) -> usize {
        self.reported.lock().unwrap().len()
    }
}

#[async_trait]
impl ToneReporter for MockToneReporter {
    async fn report(&self, record: &JournalRecord) {
        self.reported.lock().unwrap().push(record.clone());
    }
}

/// A gently rising candle series ending at `now` on the hour boundary.
pub fn candles_fixture(last_close: Decimal, count: usize, now: DateTime<Utc>) -> Vec<Candle> {
    let interval = Interval::OneHour;
    let aligned_end = interval.period_start(now);
    let mut candles = Vec::with_capacity(count);
    for i in 0..count {
        let offset = (count - i) as i64;
        let open_time = aligned_end - ChronoDuration::seconds(interval.to_seconds() * offset);
        let drift = Decimal::from(i as i64 - (count as i64 - 1));
        let close = last_close + drift;
        let open = close - dec!(1);
        candles.push(Candle {
            open_time,
            open,
            high: close + dec!(5),
            low: open - dec!(5),
            close,
            volume: dec!(100),
            close_time: open_time + ChronoDuration::seconds(interval.to_seconds() - 1),
            trades: 1_000,
        });
    }
    candles
}

pub fn ticker_fixture(last: Decimal, now: DateTime<Utc>) -> Ticker {
    Ticker {
        last,
        bid: last - dec!(1),
        ask: last + dec!(1),
        volume_24h: dec!(25000),
        timestamp: now,
    }
}

pub fn depth_fixture(mid: Decimal, now: DateTime<Utc>) -> DepthLevels {
    DepthLevels {
        bids: vec![
            DepthLevel {
                price: mid - dec!(1),
                size: dec!(2),
            },
            DepthLevel {
                price: mid - dec!(2),
                size: dec!(4),
            },
        ],
        asks: vec![
            DepthLevel {
                price: mid + dec!(1),
                size: dec!(2),
            },
            DepthLevel {
                price: mid + dec!(2),
                size: dec!(4),
            },
        ],
        timestamp: now,
    }
}
