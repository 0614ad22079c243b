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

/// Long-volatility scanner: buy the at-the-money straddle when implied
/// volatility is elevated enough to expect a move past both breakevens.
///
/// These setups decay fast; the cache keeps them on a short window.
pub struct VolatilityStraddleStrategy {
    provider: Arc<dyn MarketDataProvider>,
    config: StrategyConfig,
    min_iv: Decimal,
    max_debit_pct: Decimal,
}

impl VolatilityStraddleStrategy {
    pub const ID: &'static str = "volatility_straddle";

    pub fn new(provider: Arc<dyn MarketDataProvider>, config: StrategyConfig) -> Self {
        Self {
            provider,
            config,
            min_iv: dec!(0.35),
            max_debit_pct: dec!(0.08),
        }
    }

    fn at_the_money<'a>(
        contracts: &'a [OptionContract],
        spot: Decimal,
    ) -> Option<&'a OptionContract> {
        contracts
            .iter()
            .filter(|c| c.ask > Decimal::ZERO)
            .min_by_key(|c| (c.strike - spot).abs())
    }

    async fn scan_symbol(&self, symbol: &str) -> Result<Vec<Opportunity>, ScanError> {
        let quote = self.provider.get_market_data(symbol).await?;
        match quote.implied_volatility {
            Some(iv) if iv >= self.min_iv => {}
            _ => return Ok(Vec::new()),
        }

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

        let Some(call) = Self::at_the_money(&chain.calls, chain.underlying_price) else {
            return Ok(Vec::new());
        };
        let Some(put) = Self::at_the_money(&chain.puts, chain.underlying_price) else {
            return Ok(Vec::new());
        };

        let debit = call.mid_price() + put.mid_price();
        if chain.underlying_price <= Decimal::ZERO
            || debit / chain.underlying_price > self.max_debit_pct
        {
            return Ok(Vec::new());
        }

        let iv = (call.implied_volatility + put.implied_volatility) / dec!(2);
        let pop = pricing::probability_of_move(chain.underlying_price, debit, iv, dte);
        // Defined risk is the full debit; profit modeled as one extra debit
        // of favorable movement.
        let expected_value = pricing::expected_value(debit, debit, pop);

        let legs = vec![
            OptionLeg {
                side: OptionSide::Call,
                action: LegAction::Buy,
                strike: call.strike,
                expiration,
                premium: call.mid_price(),
                quantity: 1,
            },
            OptionLeg {
                side: OptionSide::Put,
                action: LegAction::Buy,
                strike: put.strike,
                expiration,
                premium: put.mid_price(),
                quantity: 1,
            },
        ];
        let greeks = pricing::aggregate_greeks(&[(&legs[0], call), (&legs[1], put)]);

        let opportunity = Opportunity {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            strategy: Self::ID.to_string(),
            legs,
            premium: -debit,
            probability_of_profit: pop,
            expected_value,
            greeks,
            liquidity_score: pricing::liquidity_score(&[call, put]),
            generated_at: Utc::now(),
        };

        if !self.validate_opportunity(&opportunity) {
            return Ok(Vec::new());
        }

        info!(
            "⚡ {} {} straddle: debit {:.2}, POP {:.2}",
            symbol, call.strike, debit, pop
        );
        Ok(vec![opportunity])
    }
}

#[async_trait]
impl StrategyPlugin for VolatilityStraddleStrategy {
    fn id(&self) -> &str {
        Self::ID
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Volatility
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
