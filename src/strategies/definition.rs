use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::data::{MarketDataProvider, OptionContract, OptionsChain};
use crate::error::ScanError;
use crate::types::{LegAction, OptionLeg, OptionSide, Opportunity};

use super::{pricing, StrategyCategory, StrategyConfig, StrategyPlugin};

/// One leg of an externally-defined setup, expressed relative to spot.
/// `strike_offset_pct` of -0.05 targets the strike nearest 95% of spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegTemplate {
    pub side: OptionSide,
    pub action: LegAction,
    pub strike_offset_pct: Decimal,
    pub quantity: u32,
}

/// A strategy described entirely in configuration. Parsed once at
/// registration; instances are produced by wrapping it in
/// [`DefinedStrategy`], which satisfies the same contract as the
/// hand-written strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: String,
    pub category: StrategyCategory,
    #[serde(default)]
    pub config: StrategyConfig,
    pub legs: Vec<LegTemplate>,
}

/// Generic adapter running a [`StrategyDefinition`] against the shared
/// market-data provider and pricing helpers.
pub struct DefinedStrategy {
    definition: StrategyDefinition,
    provider: Arc<dyn MarketDataProvider>,
}

impl DefinedStrategy {
    pub fn new(definition: StrategyDefinition, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            definition,
            provider,
        }
    }

    fn resolve_leg<'a>(
        chain: &'a OptionsChain,
        template: &LegTemplate,
    ) -> Option<&'a OptionContract> {
        let target = chain.underlying_price * (Decimal::ONE + template.strike_offset_pct);
        let contracts = match template.side {
            OptionSide::Call => &chain.calls,
            OptionSide::Put => &chain.puts,
        };
        contracts
            .iter()
            .filter(|c| c.ask > Decimal::ZERO)
            .min_by_key(|c| (c.strike - target).abs())
    }

    async fn scan_symbol(&self, symbol: &str) -> Result<Vec<Opportunity>, ScanError> {
        let config = &self.definition.config;
        let expirations = self.provider.get_expirations(symbol).await?;
        let today = Utc::now().date_naive();
        let expiration = expirations.into_iter().find(|exp| {
            let dte = (*exp - today).num_days();
            dte >= config.min_dte && dte <= config.max_dte
        });
        let Some(expiration) = expiration else {
            return Ok(Vec::new());
        };

        let chain = self.provider.get_options_chain(symbol, expiration).await?;
        let dte = (expiration - today).num_days();

        let mut legs = Vec::with_capacity(self.definition.legs.len());
        let mut resolved = Vec::with_capacity(self.definition.legs.len());
        for template in &self.definition.legs {
            let Some(contract) = Self::resolve_leg(&chain, template) else {
                return Ok(Vec::new());
            };
            legs.push(OptionLeg {
                side: template.side,
                action: template.action,
                strike: contract.strike,
                expiration,
                premium: contract.mid_price(),
                quantity: template.quantity,
            });
            resolved.push(contract);
        }

        // Net premium: credits from sold legs minus debits for bought ones.
        let mut premium = Decimal::ZERO;
        let mut iv_sum = Decimal::ZERO;
        for (leg, contract) in legs.iter().zip(&resolved) {
            let qty = Decimal::from(leg.quantity);
            match leg.action {
                LegAction::Sell => premium += contract.mid_price() * qty,
                LegAction::Buy => premium -= contract.mid_price() * qty,
            }
            iv_sum += contract.implied_volatility;
        }
        let avg_iv = iv_sum / Decimal::from(resolved.len().max(1));

        // Credit setups profit when spot holds above the highest sold
        // strike's breakeven; debit setups need a move past the outlay.
        let pop = if premium > Decimal::ZERO {
            let short_strike = legs
                .iter()
                .filter(|l| l.action == LegAction::Sell)
                .map(|l| l.strike)
                .max()
                .unwrap_or(chain.underlying_price);
            pricing::probability_above(
                chain.underlying_price,
                short_strike - premium,
                avg_iv,
                dte,
            )
        } else {
            pricing::probability_of_move(chain.underlying_price, -premium, avg_iv, dte)
        };

        let max_profit = premium.abs();
        let max_loss = max_profit; // symmetric model when width is unknown
        let expected_value = pricing::expected_value(max_profit, max_loss, pop);

        let pairs: Vec<(&OptionLeg, &OptionContract)> =
            legs.iter().zip(resolved.iter().copied()).collect();
        let greeks = pricing::aggregate_greeks(&pairs);
        let liquidity = pricing::liquidity_score(&resolved);

        let opportunity = Opportunity {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            strategy: self.definition.id.clone(),
            legs,
            premium,
            probability_of_profit: pop,
            expected_value,
            greeks,
            liquidity_score: liquidity,
            generated_at: Utc::now(),
        };

        if !self.validate_opportunity(&opportunity) {
            return Ok(Vec::new());
        }
        Ok(vec![opportunity])
    }
}

#[async_trait]
impl StrategyPlugin for DefinedStrategy {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn category(&self) -> StrategyCategory {
        self.definition.category
    }

    fn config(&self) -> &StrategyConfig {
        &self.definition.config
    }

    async fn scan_opportunities(&self, symbols: &[String]) -> Result<Vec<Opportunity>, ScanError> {
        let mut opportunities = Vec::new();
        for symbol in symbols {
            match self.scan_symbol(symbol).await {
                Ok(found) => opportunities.extend(found),
                Err(e) => debug!("{}: skipping {}: {}", self.definition.id, symbol, e),
            }
            if opportunities.len() >= self.definition.config.max_opportunities {
                opportunities.truncate(self.definition.config.max_opportunities);
                break;
            }
        }
        Ok(opportunities)
    }
}
