use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::types::Opportunity;

use super::{CacheKey, TtlPolicy};

struct MemoryEntry {
    opportunities: Vec<Opportunity>,
    inserted_at: Instant,
}

/// Process-local fast tier. Expiry is enforced lazily on read; a periodic
/// sweep drops whatever reads never touched. Deliberately not distributed:
/// each process instance keeps its own copy.
#[derive(Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<CacheKey, MemoryEntry>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hit requires the entry to be younger than the strategy's TTL.
    /// Expired entries are removed and reported as misses.
    pub async fn get(&self, key: &CacheKey, policy: &TtlPolicy) -> Option<Vec<Opportunity>> {
        let ttl = policy.ttl_for(key.strategy());
        {
            let entries = self.entries.read().await;
            let entry = entries.get(key)?;
            if entry.inserted_at.elapsed() < ttl {
                return Some(entry.opportunities.clone());
            }
        }

        // Re-check under the write lock: a refresh may have landed for this
        // key between the two acquisitions and must not be evicted.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < ttl => {
                Some(entry.opportunities.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: CacheKey, opportunities: Vec<Opportunity>) {
        self.entries.write().await.insert(
            key,
            MemoryEntry {
                opportunities,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every key whose age exceeds its strategy's TTL. Returns the
    /// number of entries removed.
    pub async fn sweep(&self, policy: &TtlPolicy) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, entry| entry.inserted_at.elapsed() < policy.ttl_for(key.strategy()));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use uuid::Uuid;

    fn opportunity(strategy: &str) -> Opportunity {
        Opportunity {
            id: Uuid::new_v4(),
            symbol: "SPY".into(),
            strategy: strategy.into(),
            legs: Vec::new(),
            premium: dec!(1.00),
            probability_of_profit: dec!(0.70),
            expected_value: dec!(20),
            greeks: Default::default(),
            liquidity_score: dec!(75),
            generated_at: Utc::now(),
        }
    }

    fn policy() -> TtlPolicy {
        let mut table = HashMap::new();
        table.insert("fast".to_string(), Duration::from_secs(60));
        table.insert("slow".to_string(), Duration::from_secs(600));
        TtlPolicy::new(table, Duration::from_secs(120))
    }

    #[tokio::test(start_paused = true)]
    async fn fast_entry_expires_while_slow_survives() {
        let tier = MemoryTier::new();
        let policy = policy();
        let fast_key = CacheKey::new(Some("fast"), &["SPY".into()]);
        let slow_key = CacheKey::new(Some("slow"), &["SPY".into()]);

        tier.insert(fast_key.clone(), vec![opportunity("fast")]).await;
        tier.insert(slow_key.clone(), vec![opportunity("slow")]).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(tier.get(&fast_key, &policy).await.is_none());
        assert!(tier.get(&slow_key, &policy).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_entry_hits_at_250s_and_misses_at_310s() {
        let mut table = HashMap::new();
        table.insert("fast".to_string(), Duration::from_secs(60));
        table.insert("slow".to_string(), Duration::from_secs(300));
        let policy = TtlPolicy::new(table, Duration::from_secs(120));

        let tier = MemoryTier::new();
        let key = CacheKey::new(Some("slow"), &["QQQ".into()]);
        tier.insert(key.clone(), vec![opportunity("slow")]).await;

        tokio::time::advance(Duration::from_secs(250)).await;
        assert!(tier.get(&key, &policy).await.is_some());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(tier.get(&key, &policy).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_read_removes_the_entry() {
        let tier = MemoryTier::new();
        let policy = policy();
        let key = CacheKey::new(Some("fast"), &["SPY".into()]);
        tier.insert(key.clone(), vec![opportunity("fast")]).await;

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(tier.get(&key, &policy).await.is_none());
        assert_eq!(tier.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_entry_survives_the_expired_read_path() {
        let tier = MemoryTier::new();
        let policy = policy();
        let key = CacheKey::new(Some("fast"), &["SPY".into()]);

        tier.insert(key.clone(), vec![opportunity("fast")]).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        // Expired read drops the stale entry,
        assert!(tier.get(&key, &policy).await.is_none());

        // and a refresh landing right after is served, not swept away by
        // the miss's removal.
        let fresh = vec![opportunity("fast")];
        tier.insert(key.clone(), fresh.clone()).await;
        assert_eq!(tier.get(&key, &policy).await, Some(fresh));
        assert_eq!(tier.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_only_drops_expired_keys() {
        let tier = MemoryTier::new();
        let policy = policy();

        tier.insert(
            CacheKey::new(Some("fast"), &["SPY".into()]),
            vec![opportunity("fast")],
        )
        .await;
        tier.insert(
            CacheKey::new(Some("slow"), &["SPY".into()]),
            vec![opportunity("slow")],
        )
        .await;

        tokio::time::advance(Duration::from_secs(90)).await;
        let removed = tier.sweep(&policy).await;

        assert_eq!(removed, 1);
        assert_eq!(tier.len().await, 1);
    }
}
