use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{Gauge, IntGauge, Registry};

use crate::cache::CacheStatsSnapshot;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();

    static ref CACHE_MEMORY_HITS: IntGauge = IntGauge::new(
        "cache_memory_hits_total",
        "Requests served from the memory tier"
    ).unwrap();

    static ref CACHE_DURABLE_HITS: IntGauge = IntGauge::new(
        "cache_durable_hits_total",
        "Requests served from the durable tier"
    ).unwrap();

    static ref CACHE_LIVE_SCANS: IntGauge = IntGauge::new(
        "cache_live_scans_total",
        "Requests that fell through to a live scan"
    ).unwrap();

    static ref CACHE_HIT_RATE: Gauge = Gauge::new(
        "cache_hit_rate",
        "Fraction of requests served from either cache tier"
    ).unwrap();

    static ref ACTIVE_STRATEGIES: IntGauge = IntGauge::new(
        "active_strategies_count",
        "Strategies with a live instance"
    ).unwrap();
}

pub struct MetricsCollector {
    _registry: &'static Registry,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        REGISTRY.register(Box::new(CACHE_MEMORY_HITS.clone()))?;
        REGISTRY.register(Box::new(CACHE_DURABLE_HITS.clone()))?;
        REGISTRY.register(Box::new(CACHE_LIVE_SCANS.clone()))?;
        REGISTRY.register(Box::new(CACHE_HIT_RATE.clone()))?;
        REGISTRY.register(Box::new(ACTIVE_STRATEGIES.clone()))?;

        Ok(Self {
            _registry: &REGISTRY,
        })
    }

    pub fn record_cache_stats(&self, stats: &CacheStatsSnapshot) {
        CACHE_MEMORY_HITS.set(stats.memory_hits as i64);
        CACHE_DURABLE_HITS.set(stats.durable_hits as i64);
        CACHE_LIVE_SCANS.set(stats.live_scans as i64);
        CACHE_HIT_RATE.set(stats.hit_rate);
    }

    pub fn record_active_strategies(&self, count: usize) {
        ACTIVE_STRATEGIES.set(count as i64);
    }
}
