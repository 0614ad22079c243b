mod http_provider;

pub use http_provider::HttpMarketDataProvider;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{PluginError, ScanError};
use crate::plugins::{Plugin, PluginType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: String,
    pub price: Decimal,
    pub volume: u64,
    pub implied_volatility: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub open_interest: u64,
    pub volume: u64,
    pub implied_volatility: Decimal,
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
}

impl OptionContract {
    pub fn mid_price(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsChain {
    pub symbol: String,
    pub expiration: NaiveDate,
    pub underlying_price: Decimal,
    pub calls: Vec<OptionContract>,
    pub puts: Vec<OptionContract>,
}

/// Market-data contract consumed by strategy modules. Failures are errors
/// the strategy must handle; the core never assumes these calls succeed.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_market_data(&self, symbol: &str) -> Result<MarketQuote, ScanError>;

    async fn get_options_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> Result<OptionsChain, ScanError>;

    /// Expirations available for a symbol, nearest first.
    async fn get_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>, ScanError>;
}

pub const PROVIDER_PLUGIN_NAME: &str = "market-data";

/// Lifecycle wrapper registering the shared provider with the plugin
/// manager, so strategy modules can declare a dependency on it.
pub struct ProviderPlugin {
    provider: Arc<dyn MarketDataProvider>,
    probe_symbol: String,
}

impl ProviderPlugin {
    pub fn new(provider: Arc<dyn MarketDataProvider>, probe_symbol: impl Into<String>) -> Self {
        Self {
            provider,
            probe_symbol: probe_symbol.into(),
        }
    }
}

#[async_trait]
impl Plugin for ProviderPlugin {
    fn name(&self) -> &str {
        PROVIDER_PLUGIN_NAME
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::DataProvider
    }

    async fn initialize(&mut self) -> Result<(), PluginError> {
        info!("📡 Market data provider ready");
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.provider
            .get_market_data(&self.probe_symbol)
            .await
            .is_ok()
    }
}
