// Exchange gateway: typed reads and order operations
pub mod kraken;
pub mod market_data;

pub use kraken::KrakenFuturesClient;

use crate::error::ExchangeError;
use crate::models::{Candle, CancelAck, OpenOrder, Order, OrderAck, Position};
use async_trait::async_trait;

/// Typed operations the trading core needs from a derivatives exchange.
///
/// Mutating calls honour the live-trading toggle of the implementation: with
/// trading disabled they return synthetic acknowledgements.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Margin available for new positions, in USD
    async fn fetch_available_margin(&self) -> Result<f64, ExchangeError>;

    async fn fetch_positions(&self) -> Result<Vec<Position>, ExchangeError>;

    async fn fetch_open_orders(&self) -> Result<Vec<OpenOrder>, ExchangeError>;

    /// Public candles for `symbol`, oldest first
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval_minutes: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn submit_order(&self, order: &Order) -> Result<OrderAck, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck, ExchangeError>;
}
