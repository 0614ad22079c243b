use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod data;
mod error;
mod monitoring;
mod plugins;
mod scheduler;
mod strategies;
mod types;

use cache::{OpportunityCache, PostgresSnapshotStore, TtlPolicy};
use config::Config;
use data::{HttpMarketDataProvider, MarketDataProvider, ProviderPlugin};
use monitoring::MonitoringService;
use plugins::{EventBus, PluginConfig, PluginManager};
use scheduler::ScanScheduler;
use strategies::{
    PutCreditSpreadStrategy, StrategyConfig, StrategyDefinition, StrategyEnginePlugin,
    StrategyRegistry, VolatilityStraddleStrategy,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opportunity_engine=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Opportunity Engine v1.2");

    // Load configuration
    let config = Config::load()?;
    info!("✅ Configuration loaded");

    // Initialize database connection pool
    let db_pool = config.create_db_pool().await?;
    let store = Arc::new(PostgresSnapshotStore::new(db_pool));
    info!("✅ Database connected");

    // Shared market-data provider
    let provider: Arc<dyn MarketDataProvider> =
        Arc::new(HttpMarketDataProvider::new(&config.provider)?);
    info!("✅ Market data provider configured");

    // Strategy registry with the built-in strategies from config
    let registry = Arc::new(StrategyRegistry::new(
        provider.clone(),
        config.registry.init_success_threshold,
    ));
    register_builtin_strategies(&registry, &config).await;
    register_defined_strategies(&registry).await;

    // Lifecycle manager brings the provider up before the strategy layer
    let manager = build_plugin_manager(provider.clone(), registry.clone(), &config).await;
    let report = manager.initialize_all().await?;
    if !report.all_succeeded() {
        warn!(
            "Degraded start: {}/{} plugins active",
            report.successes, report.total_enabled
        );
    }
    info!("✅ {} plugins active", manager.active_count().await);

    // Opportunity cache over both tiers
    let cache = Arc::new(OpportunityCache::new(
        store,
        registry.clone(),
        TtlPolicy::from_config(&config.cache),
    ));
    info!("✅ Opportunity cache ready");

    let monitoring = MonitoringService::new(cache.clone(), registry.clone())?;
    let scheduler = ScanScheduler::new(
        cache.clone(),
        registry.clone(),
        config.scheduler.clone(),
        config.registry.symbol_universe.clone(),
    );

    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run().await {
            error!("Scheduler error: {}", e);
        }
    });

    let monitoring_handle = tokio::spawn(async move {
        if let Err(e) = monitoring.run().await {
            error!("Monitoring service error: {}", e);
        }
    });

    info!("🎯 Opportunity engine is running...");
    info!("📈 Metrics: http://localhost:{}/metrics", config.monitoring.metrics_port);

    tokio::select! {
        _ = scheduler_handle => error!("Scheduler stopped"),
        _ = monitoring_handle => error!("Monitoring service stopped"),
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
    }

    manager.cleanup_all().await;
    info!("👋 Opportunity engine stopped");
    Ok(())
}

async fn register_builtin_strategies(registry: &StrategyRegistry, config: &Config) {
    for id in &config.registry.enabled_strategies {
        let strategy_config = StrategyConfig {
            symbols: config.registry.symbol_universe.clone(),
            ..Default::default()
        };
        match id.as_str() {
            PutCreditSpreadStrategy::ID => {
                registry
                    .register(
                        strategy_config,
                        Arc::new(|cfg, provider| {
                            Box::new(PutCreditSpreadStrategy::new(provider, cfg))
                        }),
                    )
                    .await;
            }
            VolatilityStraddleStrategy::ID => {
                registry
                    .register(
                        strategy_config,
                        Arc::new(|cfg, provider| {
                            Box::new(VolatilityStraddleStrategy::new(provider, cfg))
                        }),
                    )
                    .await;
            }
            other => warn!("Unknown strategy '{}' in config, skipping", other),
        }
    }
}

/// Externally-defined strategies, if the deployment ships any.
async fn register_defined_strategies(registry: &StrategyRegistry) {
    let raw = match std::fs::read_to_string("config/strategies.json") {
        Ok(raw) => raw,
        Err(_) => return,
    };

    match serde_json::from_str::<Vec<StrategyDefinition>>(&raw) {
        Ok(definitions) => {
            info!("📋 Loaded {} strategy definitions", definitions.len());
            registry.register_definitions(definitions).await;
        }
        Err(e) => warn!("Ignoring malformed config/strategies.json: {}", e),
    }
}

async fn build_plugin_manager(
    provider: Arc<dyn MarketDataProvider>,
    registry: Arc<StrategyRegistry>,
    config: &Config,
) -> PluginManager {
    let manager = PluginManager::new(EventBus::default());

    let probe_symbol = config
        .registry
        .symbol_universe
        .first()
        .cloned()
        .unwrap_or_else(|| "SPY".to_string());

    let provider_name = manager
        .register_class(Arc::new(move |_cfg| {
            Box::new(ProviderPlugin::new(provider.clone(), probe_symbol.clone()))
        }))
        .await;
    let engine_name = manager
        .register_class(Arc::new(move |_cfg| {
            Box::new(StrategyEnginePlugin::new(registry.clone()))
        }))
        .await;

    for name in [provider_name, engine_name] {
        if let Err(e) = manager.create(&name, PluginConfig::default()).await {
            error!("Could not create plugin '{}': {}", name, e);
        }
    }

    manager
}
