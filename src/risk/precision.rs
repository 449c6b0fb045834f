use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Round a price to the nearest multiple of `tick_size`.
/// Example: price=100.16, tick=0.1 -> 100.2
pub fn normalize_price(price: f64, tick_size: f64) -> f64 {
    if tick_size.is_nan() || tick_size <= 0.0 {
        return price;
    }
    match (Decimal::from_f64(price), Decimal::from_f64(tick_size)) {
        (Some(p), Some(t)) => ((p / t).round() * t).to_f64().unwrap_or(price),
        _ => price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_nearest_tick() {
        assert_eq!(normalize_price(49_000.26, 0.5), 49_000.5);
        assert_eq!(normalize_price(49_000.24, 0.5), 49_000.0);
        assert_eq!(normalize_price(100.16, 0.1), 100.2);
    }

    #[test]
    fn test_zero_tick_is_identity() {
        assert_eq!(normalize_price(123.456, 0.0), 123.456);
    }
}
