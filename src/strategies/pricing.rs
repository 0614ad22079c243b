use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::data::OptionContract;
use crate::types::{Greeks, LegAction, OptionLeg};

fn std_normal_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0).map(|n| n.cdf(x)).unwrap_or(0.5)
}

/// Probability the underlying finishes above `level` at expiration under a
/// lognormal model with zero drift (the usual d2 approximation).
pub fn probability_above(spot: Decimal, level: Decimal, iv: Decimal, dte: i64) -> Decimal {
    let (Some(spot), Some(level), Some(iv)) = (spot.to_f64(), level.to_f64(), iv.to_f64()) else {
        return dec!(0.5);
    };
    if spot <= 0.0 || level <= 0.0 || iv <= 0.0 || dte <= 0 {
        return dec!(0.5);
    }

    let t = dte as f64 / 365.0;
    let sigma_sqrt_t = iv * t.sqrt();
    let d2 = ((spot / level).ln() - 0.5 * iv * iv * t) / sigma_sqrt_t;

    Decimal::from_f64_retain(std_normal_cdf(d2)).unwrap_or(dec!(0.5))
}

/// Probability of an absolute move beyond `breakeven_distance` in either
/// direction, used by long-volatility setups.
pub fn probability_of_move(
    spot: Decimal,
    breakeven_distance: Decimal,
    iv: Decimal,
    dte: i64,
) -> Decimal {
    let (Some(spot), Some(distance), Some(iv)) =
        (spot.to_f64(), breakeven_distance.to_f64(), iv.to_f64())
    else {
        return dec!(0.0);
    };
    if spot <= 0.0 || distance <= 0.0 || iv <= 0.0 || dte <= 0 {
        return dec!(0.0);
    }

    let t = dte as f64 / 365.0;
    let z = distance / (spot * iv * t.sqrt());
    let p = 2.0 * (1.0 - std_normal_cdf(z));

    Decimal::from_f64_retain(p.clamp(0.0, 1.0)).unwrap_or(dec!(0.0))
}

/// Per-contract expected value of a defined-risk position.
pub fn expected_value(max_profit: Decimal, max_loss: Decimal, pop: Decimal) -> Decimal {
    (pop * max_profit - (dec!(1.0) - pop) * max_loss) * dec!(100)
}

/// Composite 0..=100 liquidity score from open interest and spread width.
pub fn liquidity_score(contracts: &[&OptionContract]) -> Decimal {
    if contracts.is_empty() {
        return Decimal::ZERO;
    }

    let mut total = Decimal::ZERO;
    for contract in contracts {
        let oi_component = Decimal::from(contract.open_interest.min(5_000)) / dec!(100); // caps at 50
        let mid = contract.mid_price();
        let spread_component = if mid > Decimal::ZERO {
            let spread_pct = (contract.ask - contract.bid) / mid;
            (dec!(0.10) - spread_pct).max(Decimal::ZERO) * dec!(500) // caps at 50
        } else {
            Decimal::ZERO
        };
        total += (oi_component + spread_component).min(dec!(100));
    }

    total / Decimal::from(contracts.len())
}

/// Position greeks: sold legs contribute with flipped sign.
pub fn aggregate_greeks(legs: &[(&OptionLeg, &OptionContract)]) -> Greeks {
    let mut greeks = Greeks::default();
    for (leg, contract) in legs {
        let sign = match leg.action {
            LegAction::Buy => Decimal::ONE,
            LegAction::Sell => -Decimal::ONE,
        };
        let qty = Decimal::from(leg.quantity);
        greeks.delta += sign * qty * contract.delta;
        greeks.gamma += sign * qty * contract.gamma;
        greeks.theta += sign * qty * contract.theta;
        greeks.vega += sign * qty * contract.vega;
    }
    greeks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_itm_short_level_has_high_probability() {
        // Spot far above the level: very likely to finish above it.
        let p = probability_above(dec!(100), dec!(70), dec!(0.25), 30);
        assert!(p > dec!(0.95), "got {p}");
    }

    #[test]
    fn probability_above_is_monotonic_in_level() {
        let low = probability_above(dec!(100), dec!(90), dec!(0.30), 30);
        let high = probability_above(dec!(100), dec!(110), dec!(0.30), 30);
        assert!(low > high);
    }

    #[test]
    fn degenerate_inputs_fall_back_to_even_odds() {
        assert_eq!(probability_above(dec!(0), dec!(90), dec!(0.3), 30), dec!(0.5));
        assert_eq!(probability_above(dec!(100), dec!(90), dec!(0.3), 0), dec!(0.5));
    }

    #[test]
    fn expected_value_balances_profit_and_loss() {
        // 70% to keep 1.00 credit vs 30% to lose 4.00.
        let ev = expected_value(dec!(1.00), dec!(4.00), dec!(0.70));
        assert_eq!(ev, dec!(-50.0));
    }

    #[test]
    fn wide_spreads_score_lower_than_tight_ones() {
        let tight = OptionContract {
            strike: dec!(100),
            bid: dec!(1.00),
            ask: dec!(1.02),
            open_interest: 2000,
            volume: 500,
            implied_volatility: dec!(0.25),
            delta: dec!(-0.25),
            gamma: dec!(0.01),
            theta: dec!(-0.05),
            vega: dec!(0.10),
        };
        let wide = OptionContract {
            bid: dec!(0.80),
            ask: dec!(1.30),
            ..tight.clone()
        };
        assert!(liquidity_score(&[&tight]) > liquidity_score(&[&wide]));
    }
}
