mod binance;
mod coinbase;
mod registry;
mod retry;

pub use binance::BinanceProvider;
pub use coinbase::CoinbaseProvider;
pub use registry::{DEFAULT_DEMOTION_TTL, ProviderRegistry};
pub use retry::RetryPolicy;
