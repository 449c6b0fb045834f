/// Relative Strength Index with Wilder smoothing.
///
/// Seeds the average gain/loss with a simple mean over the first `period` changes,
/// then smooths every later change in. Needs at least `period + 1` closes.
///
/// - RSI > 70: overbought
/// - RSI < 30: oversold
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / period as f64;

    let weight = (period - 1) as f64;
    for change in rest {
        avg_gain = (avg_gain * weight + change.max(0.0)) / period as f64;
        avg_loss = (avg_loss * weight + (-change).max(0.0)) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
