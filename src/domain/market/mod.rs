mod interval;
mod snapshot;
mod types;

pub use interval::Interval;
pub use snapshot::{MarketSnapshot, SnapshotQuality};
pub use types::{Candle, DepthLevel, DepthLevels, DerivativesFact, Pair, Ticker};
