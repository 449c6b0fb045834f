// Technical indicators fed to the recommendation oracle
pub mod moving_average;
pub mod rsi;

pub use moving_average::calculate_sma;
pub use rsi::calculate_rsi;

use crate::models::Candle;
use serde::Serialize;

pub const RSI_PERIOD: usize = 14;
pub const SMA_PERIOD: usize = 20;

/// Scalar summary of a candle sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicators {
    pub last_price: f64,
    /// None until enough candles are available
    pub rsi: Option<f64>,
    pub sma: Option<f64>,
}

impl Indicators {
    /// Returns None for an empty sequence.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let last = candles.last()?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        Some(Self {
            last_price: last.close,
            rsi: calculate_rsi(&closes, RSI_PERIOD),
            sma: calculate_sma(&closes, SMA_PERIOD),
        })
    }
}
