// Recommendation oracle: context handed out, structured plan coming back
pub mod llm;
pub mod plan;

pub use llm::LlmOracle;
pub use plan::{parse_recommendation, ParsedRecommendation, PlanAction, TradePlan};

use crate::error::OracleError;
use crate::indicators::Indicators;
use crate::models::{AccountSnapshot, Candle, PositionSide};
use crate::persistence::TradeMemory;
use async_trait::async_trait;
use serde::Serialize;

/// How many recent closes the oracle sees alongside the indicators
pub const RECENT_CLOSES: usize = 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub side: PositionSide,
    pub size: String,
    pub entry_price: f64,
    pub stop_price: Option<f64>,
}

/// Everything the oracle is told about the current cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketContext {
    pub trading_symbol: String,
    pub pricing_symbol: String,
    pub indicators: Indicators,
    pub recent_closes: Vec<f64>,
    pub available_margin: f64,
    pub position: Option<PositionView>,
    pub memory: TradeMemory,
}

impl MarketContext {
    pub fn new(
        trading_symbol: &str,
        pricing_symbol: &str,
        indicators: Indicators,
        candles: &[Candle],
        snapshot: &AccountSnapshot,
        memory: &TradeMemory,
    ) -> Self {
        let skip = candles.len().saturating_sub(RECENT_CLOSES);
        let position = snapshot.position.as_ref().map(|p| PositionView {
            side: p.side,
            size: p.size.normalize().to_string(),
            entry_price: p.entry_price,
            stop_price: snapshot.protective_order.as_ref().and_then(|o| o.stop_price),
        });

        Self {
            trading_symbol: trading_symbol.to_string(),
            pricing_symbol: pricing_symbol.to_string(),
            indicators,
            recent_closes: candles.iter().skip(skip).map(|c| c.close).collect(),
            available_margin: snapshot.available_margin,
            position,
            memory: memory.clone(),
        }
    }
}

/// Source of trade recommendations.
///
/// Returns the raw structured text; validation into a `TradePlan` happens in the core.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn recommend(&self, context: &MarketContext) -> Result<String, OracleError>;
}
