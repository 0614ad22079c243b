use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::data::MarketDataProvider;
use crate::error::ScanError;
use crate::types::Opportunity;

use super::{
    DefinedStrategy, ScanStats, StrategyCategory, StrategyConfig, StrategyDefinition,
    StrategyPlugin,
};

pub type StrategyFactory = Arc<
    dyn Fn(StrategyConfig, Arc<dyn MarketDataProvider>) -> Box<dyn StrategyPlugin> + Send + Sync,
>;

/// Where a registration's instances come from: a hand-written type's factory
/// or a parsed external definition. Selected once at registration; no type
/// branching afterwards.
enum StrategySource {
    Builtin(StrategyFactory),
    Defined(StrategyDefinition),
}

struct StrategyRegistration {
    id: String,
    category: StrategyCategory,
    config: StrategyConfig,
    source: StrategySource,
    enabled: bool,
    stats: ScanStats,
}

/// Result of a fan-out scan. One entry per scanned strategy; a strategy that
/// failed contributes an empty list and its id under `failed`.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub per_strategy: HashMap<String, Vec<Opportunity>>,
    pub failed: Vec<String>,
}

impl ScanOutcome {
    pub fn all_opportunities(&self) -> Vec<Opportunity> {
        self.per_strategy.values().flatten().cloned().collect()
    }

    pub fn total_found(&self) -> usize {
        self.per_strategy.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryInitSummary {
    pub total_enabled: usize,
    pub initialized: usize,
}

/// Registry of trading-strategy modules. Owns registration metadata and
/// per-strategy scan statistics; performs concurrent, failure-isolated scans
/// across every enabled, instantiated strategy.
pub struct StrategyRegistry {
    provider: Arc<dyn MarketDataProvider>,
    registrations: RwLock<HashMap<String, StrategyRegistration>>,
    category_index: RwLock<HashMap<StrategyCategory, Vec<String>>>,
    instances: RwLock<HashMap<String, Arc<RwLock<Box<dyn StrategyPlugin>>>>>,
    init_success_threshold: f64,
}

impl StrategyRegistry {
    pub fn new(provider: Arc<dyn MarketDataProvider>, init_success_threshold: f64) -> Self {
        Self {
            provider,
            registrations: RwLock::new(HashMap::new()),
            category_index: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            init_success_threshold,
        }
    }

    /// Register a hand-written strategy. Metadata is read from a throwaway
    /// instance built with the supplied config.
    pub async fn register(&self, config: StrategyConfig, factory: StrategyFactory) -> String {
        let probe = factory(config.clone(), self.provider.clone());
        let id = probe.id().to_string();
        let category = probe.category();
        drop(probe);

        self.insert_registration(StrategyRegistration {
            id: id.clone(),
            category,
            config,
            source: StrategySource::Builtin(factory),
            enabled: true,
            stats: ScanStats::default(),
        })
        .await;
        id
    }

    /// Register config-defined strategies. Each is wrapped in the
    /// [`DefinedStrategy`] adapter at instantiation time so both kinds
    /// satisfy the one shared contract.
    pub async fn register_definitions(&self, definitions: Vec<StrategyDefinition>) {
        for definition in definitions {
            self.insert_registration(StrategyRegistration {
                id: definition.id.clone(),
                category: definition.category,
                config: definition.config.clone(),
                source: StrategySource::Defined(definition),
                enabled: true,
                stats: ScanStats::default(),
            })
            .await;
        }
    }

    async fn insert_registration(&self, registration: StrategyRegistration) {
        let id = registration.id.clone();
        let category = registration.category;
        self.registrations
            .write()
            .await
            .insert(id.clone(), registration);
        self.category_index
            .write()
            .await
            .entry(category)
            .or_default()
            .push(id.clone());
        info!("📋 Registered strategy '{}'", id);
    }

    /// Instantiate and initialize one registered strategy. Guarded: any
    /// failure is logged and leaves the strategy un-instantiated; nothing is
    /// raised to the caller.
    pub async fn create_instance(&self, id: &str) -> bool {
        let registrations = self.registrations.read().await;
        let Some(registration) = registrations.get(id) else {
            warn!("Cannot instantiate unknown strategy '{}'", id);
            return false;
        };

        let mut instance: Box<dyn StrategyPlugin> = match &registration.source {
            StrategySource::Builtin(factory) => {
                factory(registration.config.clone(), self.provider.clone())
            }
            StrategySource::Defined(definition) => Box::new(DefinedStrategy::new(
                definition.clone(),
                self.provider.clone(),
            )),
        };
        drop(registrations);

        match instance.initialize().await {
            Ok(()) => {
                self.instances
                    .write()
                    .await
                    .insert(id.to_string(), Arc::new(RwLock::new(instance)));
                info!("✅ Strategy '{}' instantiated", id);
                true
            }
            Err(e) => {
                error!("Strategy '{}' failed to initialize: {}", id, e);
                false
            }
        }
    }

    /// Best-effort bulk creation across every enabled registration. Overall
    /// success requires the configured fraction of registrations to come up;
    /// individual malformed configurations never block the rest.
    pub async fn initialize_all(&self) -> RegistryInitSummary {
        let mut enabled: Vec<String> = self
            .registrations
            .read()
            .await
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.id.clone())
            .collect();
        enabled.sort();

        let mut initialized = 0;
        for id in &enabled {
            if self.create_instance(id).await {
                initialized += 1;
            }
        }

        let summary = RegistryInitSummary {
            total_enabled: enabled.len(),
            initialized,
        };
        if summary.is_success(self.init_success_threshold) {
            info!(
                "🎯 Strategy registry up: {}/{} strategies",
                initialized,
                enabled.len()
            );
        } else {
            warn!(
                "Strategy registry degraded: only {}/{} strategies initialized",
                initialized,
                enabled.len()
            );
        }
        summary
    }

    pub fn init_success_threshold(&self) -> f64 {
        self.init_success_threshold
    }

    /// Concurrent fan-out across every enabled, instantiated strategy. One
    /// strategy's failure yields an empty result for that strategy only;
    /// statistics are updated from completed results, never from intent.
    pub async fn scan_all(&self, symbols: &[String]) -> ScanOutcome {
        let targets: Vec<(String, Arc<RwLock<Box<dyn StrategyPlugin>>>)> = {
            let registrations = self.registrations.read().await;
            let instances = self.instances.read().await;
            instances
                .iter()
                .filter(|(id, _)| registrations.get(*id).map_or(false, |r| r.enabled))
                .map(|(id, inst)| (id.clone(), inst.clone()))
                .collect()
        };

        let scans = targets.iter().map(|(id, instance)| {
            let id = id.clone();
            let instance = instance.clone();
            let symbols = symbols.to_vec();
            async move {
                let guard = instance.read().await;
                let result = guard.scan_opportunities(&symbols).await;
                (id, result)
            }
        });

        let mut outcome = ScanOutcome::default();
        for (id, result) in join_all(scans).await {
            match result {
                Ok(opportunities) => {
                    outcome.per_strategy.insert(id, opportunities);
                }
                Err(e) => {
                    error!("Strategy '{}' scan failed: {}", id, e);
                    outcome.per_strategy.insert(id.clone(), Vec::new());
                    outcome.failed.push(id);
                }
            }
        }

        self.record_scan_results(&outcome).await;
        outcome
    }

    /// Scan a single strategy directly.
    pub async fn scan_strategy(
        &self,
        id: &str,
        symbols: &[String],
    ) -> Result<Vec<Opportunity>, ScanError> {
        let instance = {
            let instances = self.instances.read().await;
            instances
                .get(id)
                .cloned()
                .ok_or_else(|| ScanError::NotInstantiated(id.to_string()))?
        };

        let result = {
            let guard = instance.read().await;
            guard.scan_opportunities(symbols).await
        };

        let mut registrations = self.registrations.write().await;
        if let Some(registration) = registrations.get_mut(id) {
            registration.stats.last_scan = Some(Utc::now());
            registration.stats.total_scans += 1;
            if let Ok(opportunities) = &result {
                registration.stats.total_opportunities += opportunities.len() as u64;
            }
        }

        result
    }

    async fn record_scan_results(&self, outcome: &ScanOutcome) {
        let now = Utc::now();
        let mut registrations = self.registrations.write().await;
        for (id, opportunities) in &outcome.per_strategy {
            if let Some(registration) = registrations.get_mut(id) {
                registration.stats.last_scan = Some(now);
                registration.stats.total_scans += 1;
                registration.stats.total_opportunities += opportunities.len() as u64;
            }
        }
    }

    /// Re-enable a strategy and bring up its live instance.
    pub async fn enable(&self, id: &str) -> bool {
        {
            let mut registrations = self.registrations.write().await;
            let Some(registration) = registrations.get_mut(id) else {
                return false;
            };
            registration.enabled = true;
        }
        if self.instances.read().await.contains_key(id) {
            return true;
        }
        self.create_instance(id).await
    }

    /// Disable a strategy: guarded cleanup first, then the instance is
    /// dropped so disabled strategies never leak running resources.
    pub async fn disable(&self, id: &str) -> bool {
        {
            let mut registrations = self.registrations.write().await;
            let Some(registration) = registrations.get_mut(id) else {
                return false;
            };
            registration.enabled = false;
        }

        let removed = self.instances.write().await.remove(id);
        if let Some(instance) = removed {
            let mut guard = instance.write().await;
            if let Err(e) = guard.cleanup().await {
                error!("Strategy '{}' cleanup failed: {}", id, e);
            }
            info!("🛑 Strategy '{}' disabled", id);
        }
        true
    }

    pub async fn stats(&self, id: &str) -> Option<ScanStats> {
        self.registrations.read().await.get(id).map(|r| r.stats)
    }

    pub async fn strategy_symbols(&self, id: &str) -> Option<Vec<String>> {
        self.registrations
            .read()
            .await
            .get(id)
            .map(|r| r.config.symbols.clone())
    }

    pub async fn is_enabled(&self, id: &str) -> bool {
        self.registrations
            .read()
            .await
            .get(id)
            .map_or(false, |r| r.enabled)
    }

    pub async fn ids_in_category(&self, category: StrategyCategory) -> Vec<String> {
        self.category_index
            .read()
            .await
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn instantiated_ids(&self) -> Vec<String> {
        self.instances.read().await.keys().cloned().collect()
    }
}

impl RegistryInitSummary {
    pub fn is_success(&self, threshold: f64) -> bool {
        if self.total_enabled == 0 {
            return true;
        }
        (self.initialized as f64) / (self.total_enabled as f64) >= threshold
    }
}

pub const ENGINE_PLUGIN_NAME: &str = "strategy-engine";

/// Lifecycle wrapper: the plugin manager brings the whole strategy layer up
/// after the market-data provider and tears it down on shutdown.
pub struct StrategyEnginePlugin {
    registry: Arc<StrategyRegistry>,
}

impl StrategyEnginePlugin {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl crate::plugins::Plugin for StrategyEnginePlugin {
    fn name(&self) -> &str {
        ENGINE_PLUGIN_NAME
    }

    fn plugin_type(&self) -> crate::plugins::PluginType {
        crate::plugins::PluginType::TradingStrategy
    }

    fn dependencies(&self) -> Vec<String> {
        vec![crate::data::PROVIDER_PLUGIN_NAME.to_string()]
    }

    async fn initialize(&mut self) -> Result<(), crate::error::PluginError> {
        let summary = self.registry.initialize_all().await;
        if summary.is_success(self.registry.init_success_threshold()) {
            Ok(())
        } else {
            Err(crate::error::PluginError::InitializationFailed {
                name: ENGINE_PLUGIN_NAME.to_string(),
                reason: format!(
                    "only {}/{} strategies initialized",
                    summary.initialized, summary.total_enabled
                ),
            })
        }
    }

    async fn cleanup(&mut self) -> Result<(), crate::error::PluginError> {
        for id in self.registry.instantiated_ids().await {
            self.registry.disable(&id).await;
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        !self.registry.instantiated_ids().await.is_empty()
    }
}
