use anyhow::Result;
use chrono::{Datelike, Timelike, Utc, Weekday};
use std::sync::Arc;
use tokio::time::{interval, timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::OpportunityCache;
use crate::config::SchedulerConfig;
use crate::strategies::StrategyRegistry;

/// Periodic trigger for scans and expiry sweeps. The cache itself never
/// self-schedules; this loop calls its write path on a fixed cadence and
/// only while the market session is open.
pub struct ScanScheduler {
    cache: Arc<OpportunityCache>,
    registry: Arc<StrategyRegistry>,
    config: SchedulerConfig,
    universe: Vec<String>,
}

impl ScanScheduler {
    pub fn new(
        cache: Arc<OpportunityCache>,
        registry: Arc<StrategyRegistry>,
        config: SchedulerConfig,
        universe: Vec<String>,
    ) -> Self {
        Self {
            cache,
            registry,
            config,
            universe,
        }
    }

    fn market_is_open(&self) -> bool {
        let now = Utc::now();
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let hour = now.hour();
        hour >= self.config.market_open_hour_utc && hour < self.config.market_close_hour_utc
    }

    pub async fn run(&self) -> Result<()> {
        let mut scan_tick = interval(Duration::from_secs(self.config.scan_interval_seconds));
        let mut cleanup_tick = interval(Duration::from_secs(self.config.cleanup_interval_seconds));

        info!(
            "⏰ Scheduler started: scans every {}s, sweeps every {}s",
            self.config.scan_interval_seconds, self.config.cleanup_interval_seconds
        );

        loop {
            tokio::select! {
                _ = scan_tick.tick() => {
                    if !self.market_is_open() {
                        debug!("Market closed, skipping scan cycle");
                        continue;
                    }
                    if let Err(e) = self.scan_cycle().await {
                        error!("Scan cycle error: {}", e);
                    }
                }
                _ = cleanup_tick.tick() => {
                    self.cache.cleanup_expired().await;
                }
            }
        }
    }

    /// One cadence-driven pass: scan each live strategy over the universe
    /// and push results through the cache's write path. A timeout means "no
    /// opportunities this cycle", not a retryable state.
    async fn scan_cycle(&self) -> Result<()> {
        let budget = Duration::from_secs(self.config.scan_timeout_seconds);

        for id in self.registry.instantiated_ids().await {
            let symbols = self.universe_for(&id).await;
            let session_id = Uuid::new_v4();
            let started_at = Utc::now();

            match timeout(budget, self.registry.scan_strategy(&id, &symbols)).await {
                Ok(Ok(opportunities)) if !opportunities.is_empty() => {
                    info!(
                        "✨ '{}' produced {} opportunities",
                        id,
                        opportunities.len()
                    );
                    self.cache
                        .add(opportunities, &id, Some((session_id, started_at)))
                        .await;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("'{}' scan failed this cycle: {}", id, e),
                Err(_) => warn!("'{}' scan timed out after {:?}", id, budget),
            }
        }

        Ok(())
    }

    /// Strategy-specific symbol lists win over the shared universe.
    async fn universe_for(&self, id: &str) -> Vec<String> {
        match self.registry.strategy_symbols(id).await {
            Some(symbols) if !symbols.is_empty() => symbols,
            _ => self.universe.clone(),
        }
    }
}
