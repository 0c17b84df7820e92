use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_timeout_ms() -> u64 {
    30_000
}

/// One configured analyst slot. The `id` selects the built-in role
/// (technical, sentiment, liquidity, funding, open_interest); unknown ids
/// are rejected at validation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    pub id: String,
    /// Combiner weight before any data-quality penalty. Weights across all
    /// analysts must sum to 1.
    pub weight: f64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Opaque settings handed to the opinion source for this role.
    #[serde(default)]
    pub source_config: toml::Table,
}

impl AnalystConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub const BUILTIN_ROLES: &[&str] = &[
    "technical",
    "sentiment",
    "liquidity",
    "funding",
    "open_interest",
];
