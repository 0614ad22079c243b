use anyhow::Result;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::info;

use crate::cache::OpportunityCache;
use crate::strategies::StrategyRegistry;

use super::MetricsCollector;

/// Periodically mirrors cache and registry counters into prometheus.
pub struct MonitoringService {
    cache: Arc<OpportunityCache>,
    registry: Arc<StrategyRegistry>,
    metrics: MetricsCollector,
}

impl MonitoringService {
    pub fn new(cache: Arc<OpportunityCache>, registry: Arc<StrategyRegistry>) -> Result<Self> {
        Ok(Self {
            cache,
            registry,
            metrics: MetricsCollector::new()?,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let mut tick = interval(Duration::from_secs(60));

        info!("📊 Monitoring service started");

        loop {
            tick.tick().await;

            let stats = self.cache.get_stats();
            self.metrics.record_cache_stats(&stats);
            self.metrics
                .record_active_strategies(self.registry.instantiated_ids().await.len());
        }
    }
}
