use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places of the traded contract's lot size
pub const QUANTITY_DECIMALS: u32 = 4;

/// Risk parameters for sizing a new position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    pub leverage: f64,
    /// Fraction of nominal leverage actually used, e.g. 0.9
    pub leverage_safety_factor: f64,
    /// Share of available margin lost if the stop is hit, in percent
    pub risk_percent: f64,
    /// Distance from entry to the protective stop, in percent
    pub stop_loss_percent: f64,
    pub minimum_notional_usd: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            leverage: 10.0,
            leverage_safety_factor: 0.9,
            risk_percent: 1.0,
            stop_loss_percent: 2.0,
            minimum_notional_usd: 10.0,
        }
    }
}

/// Quantity to trade so that hitting the stop costs `risk_percent` of margin.
///
/// The notional is capped by safe leverage and floored at the exchange minimum.
/// When the minimum does not fit under the leverage cap the result is zero,
/// which means "do not trade".
pub fn position_size(available_margin: f64, current_price: f64, params: &RiskParams) -> Decimal {
    let usable = |v: f64| v.is_finite() && v > 0.0;
    if !(usable(available_margin) && usable(current_price) && usable(params.stop_loss_percent)) {
        return Decimal::ZERO;
    }

    let max_leveraged_usd = available_margin * params.leverage * params.leverage_safety_factor;
    let risk_budget_usd = available_margin * (params.risk_percent / 100.0);
    let risk_defined_usd = risk_budget_usd / (params.stop_loss_percent / 100.0);

    let mut target_usd = max_leveraged_usd.min(risk_defined_usd);
    if target_usd < params.minimum_notional_usd {
        target_usd = params.minimum_notional_usd;
    }
    if target_usd > max_leveraged_usd {
        tracing::debug!(
            "Minimum notional ${:.2} exceeds leveraged capacity ${:.2}, no trade",
            params.minimum_notional_usd,
            max_leveraged_usd
        );
        return Decimal::ZERO;
    }

    Decimal::from_f64(target_usd / current_price)
        .map(|q| q.round_dp_with_strategy(QUANTITY_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_defined_size() {
        // max leveraged = 9000, risk defined = 500
        let qty = position_size(1000.0, 50_000.0, &RiskParams::default());
        assert_eq!(qty, dec!(0.0100));
    }

    #[test]
    fn test_raised_to_minimum_notional() {
        let params = RiskParams {
            risk_percent: 0.01,
            ..RiskParams::default()
        };
        // risk defined = 5 < 10 minimum
        let qty = position_size(1000.0, 50_000.0, &params);
        assert_eq!(qty, dec!(0.0002));
    }

    #[test]
    fn test_infeasible_when_minimum_exceeds_leverage() {
        // max leveraged = 9 < 10 minimum
        let qty = position_size(1.0, 50_000.0, &RiskParams::default());
        assert!(qty.is_zero());
    }

    #[test]
    fn test_capped_by_leverage() {
        let params = RiskParams {
            risk_percent: 50.0,
            ..RiskParams::default()
        };
        // risk defined = 25000 > max leveraged 9000
        let qty = position_size(1000.0, 50_000.0, &params);
        assert_eq!(qty, dec!(0.18));
    }

    #[test]
    fn test_rounds_to_four_places() {
        let qty = position_size(1000.0, 30_000.0, &RiskParams::default());
        // 500 / 30000 = 0.016666...
        assert_eq!(qty, dec!(0.0167));
    }

    #[test]
    fn test_degenerate_inputs_do_not_trade() {
        let params = RiskParams::default();
        assert!(position_size(0.0, 50_000.0, &params).is_zero());
        assert!(position_size(1000.0, 0.0, &params).is_zero());
        assert!(position_size(f64::NAN, 50_000.0, &params).is_zero());

        let no_stop = RiskParams {
            stop_loss_percent: 0.0,
            ..RiskParams::default()
        };
        assert!(position_size(1000.0, 50_000.0, &no_stop).is_zero());
    }
}
