use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::strategies::StrategyRegistry;
use crate::types::Opportunity;

use super::{
    CacheKey, MemoryTier, ScanSession, ScanSessionStatus, SnapshotStore, TtlPolicy,
};

#[derive(Default)]
struct CacheStats {
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    live_scans: AtomicU64,
    total_requests: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub live_scans: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

/// The read/write path consumers call. Resolves a request into a canonical
/// key, tries the memory tier, then the durable tier, then falls back to a
/// live scan through the strategy registry, writing results through both
/// tiers. Concurrent misses for the same key collapse into one scan.
pub struct OpportunityCache {
    memory: MemoryTier,
    store: Arc<dyn SnapshotStore>,
    registry: Arc<StrategyRegistry>,
    ttl: TtlPolicy,
    stats: CacheStats,
    inflight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl OpportunityCache {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        registry: Arc<StrategyRegistry>,
        ttl: TtlPolicy,
    ) -> Self {
        Self {
            memory: MemoryTier::new(),
            store,
            registry,
            ttl,
            stats: CacheStats::default(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Serve opportunities matching the filter. Never raises: a failed live
    /// scan or an unreachable durable tier degrades to whatever the
    /// remaining tiers produce, ultimately an empty list.
    pub async fn get(
        &self,
        strategy: Option<&str>,
        symbols: &[String],
        force_refresh: bool,
    ) -> Vec<Opportunity> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let key = CacheKey::new(strategy, symbols);

        if !force_refresh {
            if let Some(hit) = self.memory.get(&key, &self.ttl).await {
                self.stats.memory_hits.fetch_add(1, Ordering::Relaxed);
                return hit;
            }
        }

        // Slow path is single-flight per key: late arrivals wait for the
        // leader instead of re-triggering a redundant scan.
        let flight = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key.clone()).or_default().clone()
        };
        let _leader = flight.lock().await;

        if !force_refresh {
            // The leader may have landed results while we waited.
            if let Some(hit) = self.memory.get(&key, &self.ttl).await {
                self.stats.memory_hits.fetch_add(1, Ordering::Relaxed);
                return hit;
            }

            match self
                .store
                .fetch_active(strategy, key.symbols(), Utc::now())
                .await
            {
                Ok(rows) if !rows.is_empty() => {
                    self.stats.durable_hits.fetch_add(1, Ordering::Relaxed);
                    self.memory.insert(key.clone(), rows.clone()).await;

                    let ids: Vec<Uuid> = rows.iter().map(|o| o.id).collect();
                    if let Err(e) = self.store.record_hits(&ids).await {
                        debug!("hit-count update failed: {}", e);
                    }
                    return rows;
                }
                Ok(_) => {}
                Err(e) => {
                    // Durable tier unavailable: degrade to live-scan-only.
                    warn!("durable tier unavailable, falling through: {}", e);
                }
            }
        }

        self.live_scan(strategy, &key).await
    }

    async fn live_scan(&self, strategy: Option<&str>, key: &CacheKey) -> Vec<Opportunity> {
        self.stats.live_scans.fetch_add(1, Ordering::Relaxed);
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();

        let (opportunities, status) = match strategy {
            Some(id) => match self.registry.scan_strategy(id, key.symbols()).await {
                Ok(found) => (found, ScanSessionStatus::Completed),
                Err(e) => {
                    warn!("Live scan failed for '{}': {}", id, e);
                    (Vec::new(), ScanSessionStatus::Failed)
                }
            },
            None => {
                let outcome = self.registry.scan_all(key.symbols()).await;
                // A fan-out where every strategy failed is a failed scan,
                // not an empty market.
                let status = if !outcome.per_strategy.is_empty()
                    && outcome.failed.len() == outcome.per_strategy.len()
                {
                    ScanSessionStatus::Failed
                } else {
                    ScanSessionStatus::Completed
                };
                (outcome.all_opportunities(), status)
            }
        };

        if !opportunities.is_empty() {
            self.memory.insert(key.clone(), opportunities.clone()).await;
            self.upsert_by_strategy(&opportunities).await;
        }

        let session = ScanSession {
            id: session_id,
            strategy: key.strategy().to_string(),
            started_at,
            completed_at: Some(Utc::now()),
            status,
            opportunities_found: opportunities.len() as i64,
        };
        if let Err(e) = self.store.record_scan_session(&session).await {
            debug!("scan session not recorded: {}", e);
        }

        opportunities
    }

    /// Durable write-through. Expiry is strategy-specific, so a mixed batch
    /// is grouped per strategy first.
    async fn upsert_by_strategy(&self, opportunities: &[Opportunity]) {
        let mut groups: HashMap<&str, Vec<Opportunity>> = HashMap::new();
        for opportunity in opportunities {
            groups
                .entry(opportunity.strategy.as_str())
                .or_default()
                .push(opportunity.clone());
        }

        for (strategy, group) in groups {
            let ttl = chrono::Duration::from_std(self.ttl.ttl_for(strategy))
                .unwrap_or_else(|_| chrono::Duration::seconds(120));
            let expires_at = Utc::now() + ttl;
            if let Err(e) = self.store.upsert_snapshots(&group, expires_at).await {
                warn!("durable write-through failed for '{}': {}", strategy, e);
            }
        }
    }

    /// Write path used by scan producers. Always writes through both tiers;
    /// durable writes are upserts keyed by opportunity id. `scan_session`
    /// carries the producing scan's id and start time.
    pub async fn add(
        &self,
        opportunities: Vec<Opportunity>,
        strategy: &str,
        scan_session: Option<(Uuid, DateTime<Utc>)>,
    ) {
        if opportunities.is_empty() {
            return;
        }

        let symbols: Vec<String> = opportunities.iter().map(|o| o.symbol.clone()).collect();
        let key = CacheKey::new(Some(strategy), &symbols);

        let ttl = chrono::Duration::from_std(self.ttl.ttl_for(strategy))
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let expires_at = Utc::now() + ttl;
        if let Err(e) = self.store.upsert_snapshots(&opportunities, expires_at).await {
            warn!("durable write-through failed for '{}': {}", strategy, e);
        }

        if let Some((id, started_at)) = scan_session {
            let session = ScanSession {
                id,
                strategy: strategy.to_string(),
                started_at,
                completed_at: Some(Utc::now()),
                status: ScanSessionStatus::Completed,
                opportunities_found: opportunities.len() as i64,
            };
            if let Err(e) = self.store.record_scan_session(&session).await {
                debug!("scan session not recorded: {}", e);
            }
        }

        info!(
            "📥 Cached {} opportunities for '{}'",
            opportunities.len(),
            strategy
        );
        self.memory.insert(key, opportunities).await;
    }

    /// Two independent sweeps: memory keys past their TTL and durable rows
    /// past their expiry. Also drops idle in-flight markers.
    pub async fn cleanup_expired(&self) -> (usize, u64) {
        let memory_removed = self.memory.sweep(&self.ttl).await;
        let durable_removed = match self.store.delete_expired(Utc::now()).await {
            Ok(n) => n,
            Err(e) => {
                warn!("durable sweep failed: {}", e);
                0
            }
        };

        self.inflight
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        if memory_removed > 0 || durable_removed > 0 {
            info!(
                "🧹 Expired {} memory entries, {} durable rows",
                memory_removed, durable_removed
            );
        }
        (memory_removed, durable_removed)
    }

    pub fn get_stats(&self) -> CacheStatsSnapshot {
        let memory_hits = self.stats.memory_hits.load(Ordering::Relaxed);
        let durable_hits = self.stats.durable_hits.load(Ordering::Relaxed);
        let live_scans = self.stats.live_scans.load(Ordering::Relaxed);
        let total_requests = self.stats.total_requests.load(Ordering::Relaxed);
        let hit_rate = if total_requests > 0 {
            (memory_hits + durable_hits) as f64 / total_requests as f64
        } else {
            0.0
        };

        CacheStatsSnapshot {
            memory_hits,
            durable_hits,
            live_scans,
            total_requests,
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MarketDataProvider, MarketQuote, OptionsChain};
    use crate::error::{PluginError, ScanError, StoreError};
    use crate::strategies::{StrategyCategory, StrategyConfig, StrategyPlugin};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn opportunity(strategy: &str, symbol: &str) -> Opportunity {
        Opportunity {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            strategy: strategy.into(),
            legs: Vec::new(),
            premium: dec!(1.25),
            probability_of_profit: dec!(0.68),
            expected_value: dec!(31),
            greeks: Default::default(),
            liquidity_score: dec!(77),
            generated_at: Utc::now(),
        }
    }

    struct NullProvider;

    #[async_trait]
    impl MarketDataProvider for NullProvider {
        async fn get_market_data(&self, _symbol: &str) -> Result<MarketQuote, ScanError> {
            Err(ScanError::Provider("offline".into()))
        }

        async fn get_options_chain(
            &self,
            _symbol: &str,
            _expiration: NaiveDate,
        ) -> Result<OptionsChain, ScanError> {
            Err(ScanError::Provider("offline".into()))
        }

        async fn get_expirations(&self, _symbol: &str) -> Result<Vec<NaiveDate>, ScanError> {
            Err(ScanError::Provider("offline".into()))
        }
    }

    struct YieldStrategy {
        id: String,
        config: StrategyConfig,
        delay: Duration,
        fail: bool,
        scan_count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StrategyPlugin for YieldStrategy {
        fn id(&self) -> &str {
            &self.id
        }

        fn category(&self) -> StrategyCategory {
            StrategyCategory::Income
        }

        fn config(&self) -> &StrategyConfig {
            &self.config
        }

        async fn initialize(&mut self) -> Result<(), PluginError> {
            Ok(())
        }

        async fn scan_opportunities(
            &self,
            symbols: &[String],
        ) -> Result<Vec<Opportunity>, ScanError> {
            self.scan_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(ScanError::Strategy {
                    strategy: self.id.clone(),
                    reason: "provider offline".into(),
                });
            }
            let symbol = symbols.first().cloned().unwrap_or_else(|| "SPY".into());
            Ok(vec![opportunity(&self.id, &symbol)])
        }
    }

    async fn registry_with(
        id: &str,
        delay: Duration,
        fail: bool,
    ) -> (Arc<StrategyRegistry>, Arc<AtomicU32>) {
        let registry = Arc::new(StrategyRegistry::new(Arc::new(NullProvider), 0.8));
        let scan_count = Arc::new(AtomicU32::new(0));
        let id = id.to_string();
        let counter = scan_count.clone();
        registry
            .register(
                StrategyConfig::default(),
                Arc::new(move |config, _provider| {
                    Box::new(YieldStrategy {
                        id: id.clone(),
                        config,
                        delay,
                        fail,
                        scan_count: counter.clone(),
                    })
                }),
            )
            .await;
        registry.initialize_all().await;
        (registry, scan_count)
    }

    async fn registry_with_strategy(
        id: &str,
        delay: Duration,
    ) -> (Arc<StrategyRegistry>, Arc<AtomicU32>) {
        registry_with(id, delay, false).await
    }

    fn empty_registry() -> Arc<StrategyRegistry> {
        Arc::new(StrategyRegistry::new(Arc::new(NullProvider), 0.8))
    }

    /// In-process stand-in for the Postgres tier.
    #[derive(Default)]
    struct FakeStore {
        rows: StdMutex<HashMap<Uuid, (Opportunity, DateTime<Utc>, u64)>>,
        sessions: StdMutex<Vec<ScanSession>>,
        fail: AtomicBool,
    }

    impl FakeStore {
        fn failing() -> Self {
            let store = Self::default();
            store.fail.store(true, std::sync::atomic::Ordering::SeqCst);
            store
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                Err(StoreError::Database(sqlx::Error::PoolClosed))
            } else {
                Ok(())
            }
        }

        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn expiry_of(&self, id: Uuid) -> Option<DateTime<Utc>> {
            self.rows.lock().unwrap().get(&id).map(|(_, exp, _)| *exp)
        }

        fn hit_count_of(&self, id: Uuid) -> Option<u64> {
            self.rows.lock().unwrap().get(&id).map(|(_, _, h)| *h)
        }
    }

    #[async_trait]
    impl SnapshotStore for FakeStore {
        async fn upsert_snapshots(
            &self,
            opportunities: &[Opportunity],
            expires_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            for opportunity in opportunities {
                let hits = rows
                    .get(&opportunity.id)
                    .map(|(_, _, h)| *h)
                    .unwrap_or(0);
                rows.insert(opportunity.id, (opportunity.clone(), expires_at, hits));
            }
            Ok(())
        }

        async fn fetch_active(
            &self,
            strategy: Option<&str>,
            symbols: &[String],
            now: DateTime<Utc>,
        ) -> Result<Vec<Opportunity>, StoreError> {
            self.check()?;
            let rows = self.rows.lock().unwrap();
            let mut matched: Vec<Opportunity> = rows
                .values()
                .filter(|(opp, expires_at, _)| {
                    *expires_at > now
                        && strategy.map_or(true, |s| opp.strategy == s)
                        && (symbols.is_empty() || symbols.contains(&opp.symbol))
                })
                .map(|(opp, _, _)| opp.clone())
                .collect();
            matched.sort_by_key(|o| std::cmp::Reverse(o.generated_at));
            Ok(matched)
        }

        async fn record_hits(&self, ids: &[Uuid]) -> Result<(), StoreError> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            for id in ids {
                if let Some(entry) = rows.get_mut(id) {
                    entry.2 += 1;
                }
            }
            Ok(())
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, (_, expires_at, _)| *expires_at > now);
            Ok((before - rows.len()) as u64)
        }

        async fn record_scan_session(&self, session: &ScanSession) -> Result<(), StoreError> {
            self.check()?;
            self.sessions.lock().unwrap().push(session.clone());
            Ok(())
        }
    }

    fn ttl_policy() -> TtlPolicy {
        let mut table = HashMap::new();
        table.insert("fast".to_string(), Duration::from_secs(60));
        table.insert("slow".to_string(), Duration::from_secs(600));
        TtlPolicy::new(table, Duration::from_secs(120))
    }

    #[tokio::test]
    async fn add_then_get_hits_memory_without_scanning() {
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store, empty_registry(), ttl_policy());

        let opp = opportunity("slow", "SPY");
        cache.add(vec![opp.clone()], "slow", None).await;

        let served = cache.get(Some("slow"), &["SPY".into()], false).await;
        assert_eq!(served, vec![opp]);

        let stats = cache.get_stats();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.live_scans, 0);
        assert_eq!(stats.total_requests, 1);
        assert!((stats.hit_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn symbol_order_does_not_split_the_cache() {
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store, empty_registry(), ttl_policy());

        cache
            .add(
                vec![opportunity("slow", "SPY"), opportunity("slow", "QQQ")],
                "slow",
                None,
            )
            .await;

        let served = cache
            .get(Some("slow"), &["QQQ".into(), "SPY".into()], false)
            .await;
        assert_eq!(served.len(), 2);
        assert_eq!(cache.get_stats().memory_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_ttl_expires_while_slow_still_serves() {
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store, empty_registry(), ttl_policy());

        cache.add(vec![opportunity("fast", "SPY")], "fast", None).await;
        cache.add(vec![opportunity("slow", "SPY")], "slow", None).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        // Slow entry is still a memory hit; the fast one aged out and falls
        // to the durable tier instead.
        cache.get(Some("slow"), &["SPY".into()], false).await;
        cache.get(Some("fast"), &["SPY".into()], false).await;

        let stats = cache.get_stats();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.durable_hits, 1);
        assert_eq!(stats.live_scans, 0);
    }

    #[tokio::test]
    async fn durable_hit_backfills_memory_and_counts_hits() {
        let store = Arc::new(FakeStore::default());
        let opp = opportunity("slow", "SPY");
        store
            .upsert_snapshots(&[opp.clone()], Utc::now() + chrono::Duration::minutes(10))
            .await
            .unwrap();

        let cache = OpportunityCache::new(store.clone(), empty_registry(), ttl_policy());

        let served = cache.get(Some("slow"), &["SPY".into()], false).await;
        assert_eq!(served, vec![opp.clone()]);
        assert_eq!(cache.get_stats().durable_hits, 1);
        assert_eq!(store.hit_count_of(opp.id), Some(1));

        // Backfilled: second read is a memory hit.
        cache.get(Some("slow"), &["SPY".into()], false).await;
        assert_eq!(cache.get_stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn total_miss_returns_empty_not_an_error() {
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store, empty_registry(), ttl_policy());

        let served = cache.get(None, &["SPY".into()], false).await;
        assert!(served.is_empty());

        let stats = cache.get_stats();
        assert_eq!(stats.live_scans, 1);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[tokio::test]
    async fn live_scan_writes_through_both_tiers() {
        let (registry, _count) = registry_with_strategy("scanner", Duration::ZERO).await;
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store.clone(), registry, ttl_policy());

        let served = cache.get(Some("scanner"), &["SPY".into()], false).await;
        assert_eq!(served.len(), 1);
        assert_eq!(cache.get_stats().live_scans, 1);
        assert_eq!(store.row_count(), 1);

        // Session row correlates the scan.
        let sessions = store.sessions.lock().unwrap().clone();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, ScanSessionStatus::Completed);
        assert_eq!(sessions[0].opportunities_found, 1);
        drop(sessions);

        // And the memory tier now serves the same result.
        cache.get(Some("scanner"), &["SPY".into()], false).await;
        assert_eq!(cache.get_stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn fanout_where_every_strategy_fails_records_a_failed_session() {
        let (registry, _count) = registry_with("broken", Duration::ZERO, true).await;
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store.clone(), registry, ttl_policy());

        let served = cache.get(None, &["SPY".into()], false).await;
        assert!(served.is_empty());

        let sessions = store.sessions.lock().unwrap().clone();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, ScanSessionStatus::Failed);
        assert_eq!(sessions[0].opportunities_found, 0);
    }

    #[tokio::test]
    async fn add_preserves_the_producing_scans_start_time() {
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store.clone(), empty_registry(), ttl_policy());

        let session_id = Uuid::new_v4();
        let started_at = Utc::now() - chrono::Duration::seconds(25);
        cache
            .add(
                vec![opportunity("slow", "SPY")],
                "slow",
                Some((session_id, started_at)),
            )
            .await;

        let sessions = store.sessions.lock().unwrap().clone();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session_id);
        assert_eq!(sessions[0].started_at, started_at);
        assert!(sessions[0].completed_at.unwrap() >= started_at);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_both_tiers() {
        let (registry, count) = registry_with_strategy("scanner", Duration::ZERO).await;
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store, registry, ttl_policy());

        cache.add(vec![opportunity("scanner", "SPY")], "scanner", None).await;

        cache.get(Some("scanner"), &["SPY".into()], true).await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(cache.get_stats().live_scans, 1);
        assert_eq!(cache.get_stats().memory_hits, 0);
    }

    #[tokio::test]
    async fn repeated_add_upserts_instead_of_duplicating() {
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store.clone(), empty_registry(), ttl_policy());

        let opp = opportunity("slow", "SPY");
        cache.add(vec![opp.clone()], "slow", None).await;
        let first_expiry = store.expiry_of(opp.id).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.add(vec![opp.clone()], "slow", None).await;

        assert_eq!(store.row_count(), 1);
        assert!(store.expiry_of(opp.id).unwrap() > first_expiry);
    }

    #[tokio::test]
    async fn store_outage_degrades_to_live_scan() {
        let (registry, _count) = registry_with_strategy("scanner", Duration::ZERO).await;
        let store = Arc::new(FakeStore::failing());
        let cache = OpportunityCache::new(store, registry, ttl_policy());

        // add() must not panic, and get() still serves via live scan.
        cache.add(vec![opportunity("scanner", "SPY")], "scanner", None).await;
        let served = cache.get(Some("scanner"), &["QQQ".into()], false).await;

        assert_eq!(served.len(), 1);
        assert_eq!(cache.get_stats().live_scans, 1);
    }

    #[tokio::test]
    async fn missing_strategy_scan_yields_empty() {
        let store = Arc::new(FakeStore::default());
        let cache = OpportunityCache::new(store, empty_registry(), ttl_policy());

        let served = cache.get(Some("ghost"), &["SPY".into()], false).await;
        assert!(served.is_empty());
        assert_eq!(cache.get_stats().live_scans, 1);
    }

    #[tokio::test]
    async fn concurrent_misses_collapse_into_one_scan() {
        let (registry, count) =
            registry_with_strategy("scanner", Duration::from_millis(100)).await;
        let store = Arc::new(FakeStore::default());
        let cache = Arc::new(OpportunityCache::new(store, registry, ttl_policy()));

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(Some("scanner"), &["SPY".into()], false).await })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(Some("scanner"), &["SPY".into()], false).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a, b);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);

        let stats = cache.get_stats();
        assert_eq!(stats.live_scans, 1);
        assert_eq!(stats.memory_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_sweeps_both_tiers() {
        let store = Arc::new(FakeStore::default());
        // Durable expiry uses wall-clock time, so seed an already-expired row.
        store
            .upsert_snapshots(
                &[opportunity("slow", "IWM")],
                Utc::now() - chrono::Duration::minutes(1),
            )
            .await
            .unwrap();

        let cache = OpportunityCache::new(store.clone(), empty_registry(), ttl_policy());
        cache.add(vec![opportunity("fast", "SPY")], "fast", None).await;

        tokio::time::advance(Duration::from_secs(90)).await;
        let (memory_removed, durable_removed) = cache.cleanup_expired().await;

        assert_eq!(memory_removed, 1);
        assert_eq!(durable_removed, 1);
    }
}
