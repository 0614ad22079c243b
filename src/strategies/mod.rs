mod definition;
mod pricing;
mod put_credit_spread;
mod registry;
mod volatility_straddle;

pub use definition::{DefinedStrategy, LegTemplate, StrategyDefinition};
pub use put_credit_spread::PutCreditSpreadStrategy;
pub use registry::{
    RegistryInitSummary, ScanOutcome, StrategyEnginePlugin, StrategyFactory, StrategyRegistry,
    ENGINE_PLUGIN_NAME,
};
pub use volatility_straddle::VolatilityStraddleStrategy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, ScanError};
use crate::types::Opportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyCategory {
    Income,
    Volatility,
    Directional,
    Hedging,
}

/// Static per-strategy parameters bound at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_probability: Decimal,
    pub symbols: Vec<String>,
    pub max_opportunities: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_dte: 7,
            max_dte: 45,
            min_probability: dec!(0.60),
            symbols: Vec::new(),
            max_opportunities: 10,
        }
    }
}

/// Runtime counters on a registration. Monotonically increasing, updated
/// only after a scan attempt completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub last_scan: Option<DateTime<Utc>>,
    pub total_scans: u64,
    pub total_opportunities: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub id: String,
    pub category: StrategyCategory,
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_probability: Decimal,
}

/// Contract every trading strategy must satisfy, hand-written or
/// config-defined alike.
#[async_trait]
pub trait StrategyPlugin: Send + Sync {
    fn id(&self) -> &str;

    fn category(&self) -> StrategyCategory;

    fn config(&self) -> &StrategyConfig;

    async fn initialize(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Scan the given symbols for tradeable setups. May suspend on market
    /// data calls; provider failures must not escape as panics.
    async fn scan_opportunities(&self, symbols: &[String]) -> Result<Vec<Opportunity>, ScanError>;

    /// Gate an opportunity against this strategy's thresholds.
    fn validate_opportunity(&self, opportunity: &Opportunity) -> bool {
        let config = self.config();
        if opportunity.probability_of_profit < config.min_probability {
            return false;
        }
        match opportunity.days_to_expiration(Utc::now()) {
            Some(dte) => dte >= config.min_dte && dte <= config.max_dte,
            None => false,
        }
    }

    fn status(&self) -> StrategyStatus {
        let config = self.config();
        StrategyStatus {
            id: self.id().to_string(),
            category: self.category(),
            min_dte: config.min_dte,
            max_dte: config.max_dte,
            min_probability: config.min_probability,
        }
    }
}
