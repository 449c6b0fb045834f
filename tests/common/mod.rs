// Shared fixtures: a scripted in-memory exchange and a canned oracle
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futuresbot::error::{ExchangeError, OracleError};
use futuresbot::exchange::Exchange;
use futuresbot::execution::LifecycleSettings;
use futuresbot::models::{
    Candle, CancelAck, OpenOrder, Order, OrderAck, OrderType, Position, PositionSide, Side,
};
use futuresbot::oracle::{MarketContext, Oracle};
use futuresbot::risk::RiskParams;
use rust_decimal::Decimal;
use std::sync::Mutex;
use std::time::Duration;

pub const SYMBOL: &str = "PF_XBTUSD";
pub const PRICING: &str = "XBTUSD";

#[derive(Default)]
struct State {
    margin: f64,
    positions: Vec<Position>,
    orders: Vec<OpenOrder>,
    candles: Vec<Candle>,
    submitted: Vec<Order>,
    cancelled: Vec<String>,
    next_id: u32,
}

/// Exchange double whose reads return scripted state and whose writes are recorded.
///
/// Submissions of a rejected order type and cancellations fail when switched on.
#[derive(Default)]
pub struct ScriptedExchange {
    state: Mutex<State>,
    reject_types: Mutex<Vec<OrderType>>,
    fail_cancel: Mutex<bool>,
    fail_reads: Mutex<bool>,
    fill_price: Mutex<Option<f64>>,
}

impl ScriptedExchange {
    pub fn new(margin: f64) -> Self {
        let exchange = Self::default();
        exchange.state.lock().unwrap().margin = margin;
        exchange
    }

    pub fn with_candles(self, closes: &[f64]) -> Self {
        self.state.lock().unwrap().candles = candles(closes);
        self
    }

    pub fn with_position(self, side: PositionSide, size: Decimal, entry_price: f64) -> Self {
        self.state.lock().unwrap().positions.push(Position {
            symbol: SYMBOL.to_string(),
            side,
            size,
            entry_price,
        });
        self
    }

    pub fn with_order(self, order: OpenOrder) -> Self {
        self.state.lock().unwrap().orders.push(order);
        self
    }

    pub fn reject(&self, order_type: OrderType) {
        self.reject_types.lock().unwrap().push(order_type);
    }

    pub fn fail_cancels(&self) {
        *self.fail_cancel.lock().unwrap() = true;
    }

    pub fn fail_reads(&self) {
        *self.fail_reads.lock().unwrap() = true;
    }

    pub fn fill_at(&self, price: f64) {
        *self.fill_price.lock().unwrap() = Some(price);
    }

    pub fn submitted(&self) -> Vec<Order> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    fn read_guard(&self, endpoint: &str) -> Result<(), ExchangeError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(ExchangeError::rejected(endpoint, "service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn fetch_available_margin(&self) -> Result<f64, ExchangeError> {
        self.read_guard("accounts")?;
        Ok(self.state.lock().unwrap().margin)
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        self.read_guard("openpositions")?;
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn fetch_open_orders(&self) -> Result<Vec<OpenOrder>, ExchangeError> {
        self.read_guard("openorders")?;
        Ok(self.state.lock().unwrap().orders.clone())
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        _interval_minutes: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.read_guard("ohlc")?;
        Ok(self.state.lock().unwrap().candles.clone())
    }

    async fn submit_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        if self.reject_types.lock().unwrap().contains(&order.order_type) {
            return Err(ExchangeError::rejected("sendorder", "insufficientAvailableFunds"));
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.submitted.push(order.clone());
        let fill_price = match order.order_type {
            OrderType::Market => *self.fill_price.lock().unwrap(),
            _ => None,
        };
        Ok(OrderAck {
            order_id: format!("ord-{}", state.next_id),
            status: "placed".to_string(),
            fill_price,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck, ExchangeError> {
        if *self.fail_cancel.lock().unwrap() {
            return Err(ExchangeError::rejected("cancelorder", "notFound"));
        }
        self.state.lock().unwrap().cancelled.push(order_id.to_string());
        Ok(CancelAck {
            order_id: order_id.to_string(),
            status: "cancelled".to_string(),
        })
    }
}

/// Oracle double returning a fixed reply, optionally after a delay
pub struct StubOracle {
    reply: Result<String, u16>,
    delay: Option<Duration>,
}

impl StubOracle {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: None,
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            reply: Err(status),
            delay: None,
        }
    }

    pub fn slow(text: &str, delay: Duration) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl Oracle for StubOracle {
    async fn recommend(&self, _context: &MarketContext) -> Result<String, OracleError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(OracleError::Api {
                status: *status,
                body: "unavailable".to_string(),
            }),
        }
    }
}

pub fn candles(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| Candle {
            open_time: start + ChronoDuration::minutes(5 * i as i64),
            open: *close,
            high: close + 10.0,
            low: close - 10.0,
            close: *close,
            volume: 1.0,
        })
        .collect()
}

pub fn lifecycle_settings() -> LifecycleSettings {
    LifecycleSettings {
        symbol: SYMBOL.to_string(),
        risk: RiskParams::default(),
        tick_size: 0.5,
    }
}

pub fn stop_order(order_id: &str, side: Side, size: Decimal, stop_price: f64) -> OpenOrder {
    OpenOrder {
        order_id: order_id.to_string(),
        symbol: SYMBOL.to_string(),
        side,
        order_type: OrderType::Stop,
        size,
        limit_price: None,
        stop_price: Some(stop_price),
    }
}
