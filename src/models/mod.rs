use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV candlestick, oldest first when in a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

impl OrderType {
    /// Order type as the futures API spells it
    pub fn as_wire(self) -> &'static str {
        match self {
            OrderType::Market => "mkt",
            OrderType::Limit => "lmt",
            OrderType::Stop => "stp",
        }
    }
}

/// Direction of an open futures position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side of the order that would close this position
    pub fn closing_side(self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        }
    }
}

/// Open position as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: f64,
}

/// Resting order as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub size: Decimal,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
}

/// Order to be submitted. The exchange owns it once acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub size: Decimal,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
}

impl Order {
    pub fn market(symbol: &str, side: Side, size: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_type: OrderType::Market,
            side,
            size,
            limit_price: None,
            stop_price: None,
        }
    }

    pub fn limit(symbol: &str, side: Side, size: Decimal, limit_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_type: OrderType::Limit,
            side,
            size,
            limit_price: Some(limit_price),
            stop_price: None,
        }
    }

    /// Stop-limit order: triggers at `stop_price`, rests at `limit_price`
    pub fn stop(symbol: &str, side: Side, size: Decimal, stop_price: f64, limit_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_type: OrderType::Stop,
            side,
            size,
            limit_price: Some(limit_price),
            stop_price: Some(stop_price),
        }
    }

    /// URL-encoded form fields in the order the exchange documents them
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("orderType", self.order_type.as_wire().to_string()),
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_wire().to_string()),
            ("size", self.size.normalize().to_string()),
        ];
        if let Some(price) = self.limit_price {
            fields.push(("limitPrice", price.to_string()));
        }
        if let Some(price) = self.stop_price {
            fields.push(("stopPrice", price.to_string()));
        }
        fields
    }
}

/// Acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
    /// Execution price when the exchange reports an immediate fill
    pub fill_price: Option<f64>,
}

/// Acknowledgement of a cancelled order
#[derive(Debug, Clone, PartialEq)]
pub struct CancelAck {
    pub order_id: String,
    pub status: String,
}

/// Account state read fresh each cycle. Replaced, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub available_margin: f64,
    pub position: Option<Position>,
    pub protective_order: Option<OpenOrder>,
    pub open_orders: Vec<OpenOrder>,
}

impl AccountSnapshot {
    /// Combine the separate reads for one instrument into a snapshot.
    ///
    /// Positions and orders on other symbols are ignored. The protective order is the
    /// first stop order whose side closes the position.
    pub fn from_reads(
        symbol: &str,
        available_margin: f64,
        positions: Vec<Position>,
        orders: Vec<OpenOrder>,
    ) -> Self {
        let position = positions
            .into_iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol) && !p.size.is_zero());

        let open_orders: Vec<OpenOrder> = orders
            .into_iter()
            .filter(|o| o.symbol.eq_ignore_ascii_case(symbol))
            .collect();

        let protective_order = position.as_ref().and_then(|pos| {
            let closing = pos.side.closing_side();
            open_orders
                .iter()
                .find(|o| o.order_type == OrderType::Stop && o.side == closing)
                .cloned()
        });

        Self {
            available_margin,
            position,
            protective_order,
            open_orders,
        }
    }

    pub fn has_open_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn stop_orders(&self) -> impl Iterator<Item = &OpenOrder> {
        self.open_orders
            .iter()
            .filter(|o| o.order_type == OrderType::Stop)
    }

    /// Non-stop orders still resting on the book, e.g. an unfilled limit entry
    pub fn pending_entries(&self) -> impl Iterator<Item = &OpenOrder> {
        self.open_orders
            .iter()
            .filter(|o| o.order_type != OrderType::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stop_order(id: &str, symbol: &str, side: Side) -> OpenOrder {
        OpenOrder {
            order_id: id.to_string(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Stop,
            size: dec!(0.01),
            limit_price: Some(48_999.5),
            stop_price: Some(49_000.0),
        }
    }

    #[test]
    fn test_snapshot_picks_closing_stop() {
        let position = Position {
            symbol: "PF_XBTUSD".to_string(),
            side: PositionSide::Long,
            size: dec!(0.01),
            entry_price: 50_000.0,
        };
        let orders = vec![
            stop_order("wrong-side", "PF_XBTUSD", Side::Buy),
            stop_order("other-symbol", "PF_ETHUSD", Side::Sell),
            stop_order("protective", "PF_XBTUSD", Side::Sell),
        ];

        let snapshot = AccountSnapshot::from_reads("PF_XBTUSD", 1000.0, vec![position], orders);

        assert!(snapshot.has_open_position());
        assert_eq!(snapshot.open_orders.len(), 2);
        assert_eq!(
            snapshot.protective_order.map(|o| o.order_id),
            Some("protective".to_string())
        );
    }

    #[test]
    fn test_snapshot_ignores_zero_size_position() {
        let position = Position {
            symbol: "PF_XBTUSD".to_string(),
            side: PositionSide::Short,
            size: Decimal::ZERO,
            entry_price: 50_000.0,
        };
        let snapshot = AccountSnapshot::from_reads("PF_XBTUSD", 1000.0, vec![position], vec![]);
        assert!(!snapshot.has_open_position());
        assert!(snapshot.protective_order.is_none());
    }

    #[test]
    fn test_order_form_fields() {
        let order = Order::stop("PF_XBTUSD", Side::Sell, dec!(0.0100), 49_000.0, 48_999.5);
        let fields = order.form_fields();

        assert_eq!(fields[0], ("orderType", "stp".to_string()));
        assert_eq!(fields[3], ("size", "0.01".to_string()));
        assert!(fields.contains(&("limitPrice", "48999.5".to_string())));
        assert!(fields.contains(&("stopPrice", "49000".to_string())));
    }
}
