use anyhow::Result;
use serde::Deserialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub registry: RegistryConfig,
    pub scheduler: SchedulerConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Per-strategy freshness windows, seconds. Strategies absent from the
    /// table fall back to `default_ttl_seconds`.
    pub ttl_seconds: HashMap<String, u64>,
    pub default_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Fraction of registrations that must initialize for `initialize_all`
    /// to report success. Inherited business rule, kept tunable.
    pub init_success_threshold: f64,
    pub symbol_universe: Vec<String>,
    pub enabled_strategies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub scan_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub scan_timeout_seconds: u64,
    /// Market session bounds in UTC hours, [open, close).
    pub market_open_hour_utc: u32,
    pub market_close_hour_utc: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/production").required(false))
            .add_source(config::Environment::with_prefix("ENGINE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create database connection pool
    pub async fn create_db_pool(&self) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .acquire_timeout(Duration::from_secs(self.database.connection_timeout))
            .connect(&self.database.url)
            .await?;

        Ok(pool)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut ttl_seconds = HashMap::new();
        // Fast-decaying setups get short windows; theta plays keep longer.
        ttl_seconds.insert("volatility_straddle".to_string(), 90);
        ttl_seconds.insert("quick_scalp".to_string(), 60);
        ttl_seconds.insert("put_credit_spread".to_string(), 600);
        ttl_seconds.insert("covered_call".to_string(), 900);

        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/opportunity_engine".to_string(),
                max_connections: 10,
                min_connections: 2,
                connection_timeout: 30,
            },
            provider: ProviderConfig {
                api_url: "https://api.marketdata.app/v1".to_string(),
                api_key: None,
                request_timeout_seconds: 10,
            },
            cache: CacheConfig {
                ttl_seconds,
                default_ttl_seconds: 120,
            },
            registry: RegistryConfig {
                init_success_threshold: 0.8,
                symbol_universe: vec![
                    "SPY".to_string(),
                    "QQQ".to_string(),
                    "IWM".to_string(),
                    "AAPL".to_string(),
                    "MSFT".to_string(),
                    "NVDA".to_string(),
                ],
                enabled_strategies: vec![
                    "put_credit_spread".to_string(),
                    "volatility_straddle".to_string(),
                ],
            },
            scheduler: SchedulerConfig {
                scan_interval_seconds: 300,
                cleanup_interval_seconds: 600,
                scan_timeout_seconds: 30,
                market_open_hour_utc: 13,
                market_close_hour_utc: 21,
            },
            monitoring: MonitoringConfig { metrics_port: 9090 },
        }
    }
}
