use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of a contract a leg takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSide {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegAction {
    Buy,
    Sell,
}

/// One leg of a multi-leg options setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub side: OptionSide,
    pub action: LegAction,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub premium: Decimal,
    pub quantity: u32,
}

/// First-order greeks aggregated across an opportunity's legs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
}

/// A single discovered tradeable setup. Immutable after creation: the cache
/// wraps it for bookkeeping but never mutates trading fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub symbol: String,
    pub strategy: String,
    pub legs: Vec<OptionLeg>,
    /// Net premium of the position: positive for credit, negative for debit.
    pub premium: Decimal,
    pub probability_of_profit: Decimal,
    pub expected_value: Decimal,
    pub greeks: Greeks,
    /// 0..=100, derived from open interest and bid/ask spreads.
    pub liquidity_score: Decimal,
    pub generated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Days to expiration of the nearest leg, relative to `now`.
    pub fn days_to_expiration(&self, now: DateTime<Utc>) -> Option<i64> {
        self.legs
            .iter()
            .map(|leg| (leg.expiration - now.date_naive()).num_days())
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn days_to_expiration_uses_nearest_leg() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap();
        let opp = Opportunity {
            id: Uuid::new_v4(),
            symbol: "SPY".into(),
            strategy: "put_credit_spread".into(),
            legs: vec![
                OptionLeg {
                    side: OptionSide::Put,
                    action: LegAction::Sell,
                    strike: dec!(500),
                    expiration: NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
                    premium: dec!(3.10),
                    quantity: 1,
                },
                OptionLeg {
                    side: OptionSide::Put,
                    action: LegAction::Buy,
                    strike: dec!(495),
                    expiration: NaiveDate::from_ymd_opt(2025, 7, 18).unwrap(),
                    premium: dec!(2.05),
                    quantity: 1,
                },
            ],
            premium: dec!(1.05),
            probability_of_profit: dec!(0.72),
            expected_value: dec!(38.50),
            greeks: Greeks::default(),
            liquidity_score: dec!(81),
            generated_at: now,
        };

        assert_eq!(opp.days_to_expiration(now), Some(19));
    }
}
