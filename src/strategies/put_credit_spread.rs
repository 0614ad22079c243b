use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::data::{MarketDataProvider, OptionContract, OptionsChain};
use crate::error::ScanError;
use crate::types::{LegAction, OptionLeg, OptionSide, Opportunity};

use super::{pricing, StrategyCategory, StrategyConfig, StrategyPlugin};

/// Theta-harvesting scanner: sell an out-of-the-money put, buy a further
/// OTM put for defined risk, collect the credit if the underlying holds.
///
/// Setups in this class decay slowly, so the cache keeps them on a long
/// freshness window.
pub struct PutCreditSpreadStrategy {
    provider: Arc<dyn MarketDataProvider>,
    config: StrategyConfig,
    short_delta_target: Decimal,
    spread_width: Decimal,
    min_credit: Decimal,
}

impl PutCreditSpreadStrategy {
    pub const ID: &'static str = "put_credit_spread";

    pub fn new(provider: Arc<dyn MarketDataProvider>, config: StrategyConfig) -> Self {
        Self {
            provider,
            config,
            short_delta_target: dec!(-0.25),
            spread_width: dec!(5),
            min_credit: dec!(0.30),
        }
    }

    /// Short put closest to the target delta, strictly below spot.
    fn pick_short_put<'a>(&self, chain: &'a OptionsChain) -> Option<&'a OptionContract> {
        chain
            .puts
            .iter()
            .filter(|p| p.strike < chain.underlying_price && p.bid > Decimal::ZERO)
            .min_by_key(|p| (p.delta - self.short_delta_target).abs())
    }

    fn pick_long_put<'a>(
        &self,
        chain: &'a OptionsChain,
        short: &OptionContract,
    ) -> Option<&'a OptionContract> {
        let target = short.strike - self.spread_width;
        chain
            .puts
            .iter()
            .filter(|p| p.strike < short.strike)
            .min_by_key(|p| (p.strike - target).abs())
    }

    async fn scan_symbol(&self, symbol: &str) -> Result<Vec<Opportunity>, ScanError> {
        let expirations = self.provider.get_expirations(symbol).await?;
        let today = Utc::now().date_naive();
        let expiration = expirations.into_iter().find(|exp| {
            let dte = (*exp - today).num_days();
            dte >= self.config.min_dte && dte <= self.config.max_dte
        });
        let Some(expiration) = expiration else {
            return Ok(Vec::new());
        };

        let chain = self.provider.get_options_chain(symbol, expiration).await?;
        let dte = (expiration - today).num_days();

        let Some(short) = self.pick_short_put(&chain) else {
            return Ok(Vec::new());
        };
        let Some(long) = self.pick_long_put(&chain, short) else {
            return Ok(Vec::new());
        };

        let credit = short.mid_price() - long.mid_price();
        if credit < self.min_credit {
            return Ok(Vec::new());
        }

        let breakeven = short.strike - credit;
        let pop = pricing::probability_above(
            chain.underlying_price,
            breakeven,
            short.implied_volatility,
            dte,
        );
        let max_loss = (short.strike - long.strike) - credit;
        let expected_value = pricing::expected_value(credit, max_loss, pop);

        let legs = vec![
            OptionLeg {
                side: OptionSide::Put,
                action: LegAction::Sell,
                strike: short.strike,
                expiration,
                premium: short.mid_price(),
                quantity: 1,
            },
            OptionLeg {
                side: OptionSide::Put,
                action: LegAction::Buy,
                strike: long.strike,
                expiration,
                premium: long.mid_price(),
                quantity: 1,
            },
        ];
        let greeks = pricing::aggregate_greeks(&[(&legs[0], short), (&legs[1], long)]);

        let opportunity = Opportunity {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            strategy: Self::ID.to_string(),
            legs,
            premium: credit,
            probability_of_profit: pop,
            expected_value,
            greeks,
            liquidity_score: pricing::liquidity_score(&[short, long]),
            generated_at: Utc::now(),
        };

        if !self.validate_opportunity(&opportunity) {
            return Ok(Vec::new());
        }

        info!(
            "💰 {} {}/{} put spread: credit {:.2}, POP {:.2}",
            symbol, short.strike, long.strike, credit, pop
        );
        Ok(vec![opportunity])
    }
}

#[async_trait]
impl StrategyPlugin for PutCreditSpreadStrategy {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Income
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    async fn scan_opportunities(&self, symbols: &[String]) -> Result<Vec<Opportunity>, ScanError> {
        let mut opportunities = Vec::new();

        for symbol in symbols {
            match self.scan_symbol(symbol).await {
                Ok(found) => opportunities.extend(found),
                Err(e) => {
                    // Per-symbol data failures shrink the result, they do
                    // not fail the scan.
                    debug!("{}: skipping {}: {}", Self::ID, symbol, e);
                }
            }
            if opportunities.len() >= self.config.max_opportunities {
                opportunities.truncate(self.config.max_opportunities);
                break;
            }
        }

        Ok(opportunities)
    }
}
