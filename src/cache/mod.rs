mod memory;
mod opportunity_cache;
mod store;

pub use memory::MemoryTier;
pub use opportunity_cache::{CacheStatsSnapshot, OpportunityCache};
pub use store::{PostgresSnapshotStore, ScanSession, ScanSessionStatus, SnapshotStore};

use std::collections::HashMap;
use std::time::Duration;

use crate::config::CacheConfig;

pub const ALL_STRATEGIES: &str = "all";

/// Canonical cache key: strategy id (or "all") plus the symbol set sorted
/// and deduplicated, so request order never splits the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    strategy: String,
    symbols: Vec<String>,
}

impl CacheKey {
    pub fn new(strategy: Option<&str>, symbols: &[String]) -> Self {
        let mut symbols: Vec<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
        symbols.sort();
        symbols.dedup();
        Self {
            strategy: strategy.unwrap_or(ALL_STRATEGIES).to_string(),
            symbols,
        }
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

/// Strategy-specific freshness windows. Fast-moving setups decay in a
/// minute or two; theta plays stay valid far longer, so a single global
/// TTL would either serve stale fast-movers or thrash slow ones.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    table: HashMap<String, Duration>,
    default: Duration,
}

impl TtlPolicy {
    pub fn new(table: HashMap<String, Duration>, default: Duration) -> Self {
        Self { table, default }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let table = config
            .ttl_seconds
            .iter()
            .map(|(k, v)| (k.clone(), Duration::from_secs(*v)))
            .collect();
        Self::new(table, Duration::from_secs(config.default_ttl_seconds))
    }

    pub fn ttl_for(&self, strategy: &str) -> Duration {
        self.table.get(strategy).copied().unwrap_or(self.default)
    }
}
