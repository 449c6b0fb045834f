use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::market_data::{parse_ohlc, OHLC_PATH};
use super::Exchange;
use crate::auth::{RequestSigner, SignedRequest};
use crate::error::ExchangeError;
use crate::models::{
    Candle, CancelAck, OpenOrder, Order, OrderAck, OrderType, Position, PositionSide, Side,
};
use crate::settings::ExchangeSettings;

const ACCOUNTS_PATH: &str = "/derivatives/api/v3/accounts";
const OPEN_POSITIONS_PATH: &str = "/derivatives/api/v3/openpositions";
const OPEN_ORDERS_PATH: &str = "/derivatives/api/v3/openorders";
const SEND_ORDER_PATH: &str = "/derivatives/api/v3/sendorder";
const CANCEL_ORDER_PATH: &str = "/derivatives/api/v3/cancelorder";

type GatewayRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPositionsResponse {
    #[serde(default)]
    open_positions: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    symbol: String,
    side: String,
    price: f64,
    size: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrdersResponse {
    #[serde(default)]
    open_orders: Vec<RawOpenOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOpenOrder {
    #[serde(rename = "order_id")]
    order_id: String,
    symbol: String,
    side: String,
    order_type: String,
    #[serde(default)]
    unfilled_size: Option<f64>,
    #[serde(default)]
    size: Option<f64>,
    #[serde(default)]
    limit_price: Option<f64>,
    #[serde(default)]
    stop_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendOrderResponse {
    send_status: SendStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendStatus {
    #[serde(default, rename = "order_id")]
    order_id: Option<String>,
    status: String,
    #[serde(default)]
    order_events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelOrderResponse {
    cancel_status: CancelStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelStatus {
    status: String,
    #[serde(default, rename = "order_id")]
    order_id: Option<String>,
}

// ============== Conversions ==============

/// Exact decimal for a JSON float, via its shortest round-trip representation
fn decimal_from_f64(value: f64) -> Option<Decimal> {
    Decimal::from_str(&value.to_string()).ok()
}

impl RawPosition {
    fn into_position(self) -> Option<Position> {
        let side = match self.side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            other => {
                tracing::warn!("Ignoring position on {} with side {:?}", self.symbol, other);
                return None;
            }
        };
        Some(Position {
            symbol: self.symbol,
            side,
            size: decimal_from_f64(self.size.abs())?,
            entry_price: self.price,
        })
    }
}

impl RawOpenOrder {
    fn into_open_order(self) -> Option<OpenOrder> {
        let order_type = match self.order_type.as_str() {
            "lmt" | "limit" => OrderType::Limit,
            "stp" | "stop" => OrderType::Stop,
            "mkt" | "market" => OrderType::Market,
            other => {
                tracing::debug!("Ignoring open order {} of type {:?}", self.order_id, other);
                return None;
            }
        };
        let side = match self.side.as_str() {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            _ => return None,
        };
        let size = self.unfilled_size.or(self.size)?;

        Some(OpenOrder {
            order_id: self.order_id,
            symbol: self.symbol,
            side,
            order_type,
            size: decimal_from_f64(size)?,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
        })
    }
}

/// First execution price reported for an immediately filled order
fn execution_price(events: &[Value]) -> Option<f64> {
    events
        .iter()
        .filter(|e| e.get("type").and_then(Value::as_str) == Some("EXECUTION"))
        .find_map(|e| e.get("price").and_then(Value::as_f64))
}

/// Available margin of the multi-collateral account, falling back to the first
/// single-collateral account that reports one
fn available_margin(accounts: &HashMap<String, Value>) -> Option<f64> {
    if let Some(margin) = accounts
        .get("flex")
        .and_then(|flex| flex.get("availableMargin"))
        .and_then(Value::as_f64)
    {
        return Some(margin);
    }
    let mut names: Vec<&String> = accounts.keys().collect();
    names.sort();
    names.into_iter().find_map(|name| {
        accounts[name]
            .get("auxiliary")
            .and_then(|aux| aux.get("af"))
            .and_then(Value::as_f64)
    })
}

// ============== Implementation ==============

/// Futures gateway: signed private calls, public spot candles, live-trading toggle
pub struct KrakenFuturesClient {
    client: Client,
    signer: RequestSigner,
    futures_base_url: String,
    spot_base_url: String,
    live_trading: bool,
    rate_limiter: Arc<GatewayRateLimiter>,
}

impl KrakenFuturesClient {
    pub fn new(signer: RequestSigner, settings: &ExchangeSettings) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            signer,
            futures_base_url: settings.futures_base_url.trim_end_matches('/').to_string(),
            spot_base_url: settings.spot_base_url.trim_end_matches('/').to_string(),
            live_trading: settings.live_trading,
            rate_limiter,
        })
    }

    pub fn is_live(&self) -> bool {
        self.live_trading
    }

    /// Wait for a rate-limit slot, then sign. The nonce is taken as late as possible
    /// so requests leave in nonce order.
    async fn sign_when_ready(&self, path: &str, body: String) -> SignedRequest {
        self.rate_limiter.until_ready().await;
        self.signer.signed_request(path, body)
    }

    /// Sign and send a private request, returning the JSON body once the exchange
    /// has reported success.
    async fn private_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let body = serde_urlencoded::to_string(form)?;
        let signed = self.sign_when_ready(path, body).await;

        let url = format!("{}{}", self.futures_base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("APIKey", self.signer.api_key())
            .header("Nonce", signed.nonce.as_str())
            .header("Authent", &signed.signature);
        if method == Method::POST {
            request = request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(signed.body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(ExchangeError::rejected(path, format!("HTTP {}: {}", status, text)))
            }
            Err(e) => return Err(ExchangeError::decode(path, e.to_string())),
        };

        if value.get("result").and_then(Value::as_str) == Some("error") || !status.is_success() {
            let reason = value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(ExchangeError::rejected(path, reason));
        }

        serde_json::from_value(value).map_err(|e| ExchangeError::decode(path, e.to_string()))
    }
}

#[async_trait]
impl Exchange for KrakenFuturesClient {
    async fn fetch_available_margin(&self) -> Result<f64, ExchangeError> {
        let response: AccountsResponse = self
            .private_request(Method::GET, ACCOUNTS_PATH, &[])
            .await?;
        available_margin(&response.accounts)
            .ok_or_else(|| ExchangeError::decode(ACCOUNTS_PATH, "no account reports available margin"))
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        let response: OpenPositionsResponse = self
            .private_request(Method::GET, OPEN_POSITIONS_PATH, &[])
            .await?;
        Ok(response
            .open_positions
            .into_iter()
            .filter_map(RawPosition::into_position)
            .collect())
    }

    async fn fetch_open_orders(&self) -> Result<Vec<OpenOrder>, ExchangeError> {
        let response: OpenOrdersResponse = self
            .private_request(Method::GET, OPEN_ORDERS_PATH, &[])
            .await?;
        Ok(response
            .open_orders
            .into_iter()
            .filter_map(RawOpenOrder::into_open_order)
            .collect())
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval_minutes: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let url = format!("{}{}", self.spot_base_url, OHLC_PATH);
        let interval = interval_minutes.to_string();

        let body = self
            .client
            .get(&url)
            .query(&[("pair", symbol), ("interval", interval.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let candles = parse_ohlc(&body)?;
        tracing::debug!("Fetched {} candles for {}", candles.len(), symbol);
        Ok(candles)
    }

    async fn submit_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        if !self.live_trading {
            let ack = OrderAck {
                order_id: format!("paper-{}", Uuid::new_v4()),
                status: "placed".to_string(),
                fill_price: None,
            };
            tracing::info!(
                "📝 PAPER {} {:?} {} {} (limit {:?}, stop {:?}) -> {}",
                order.side.as_wire(),
                order.order_type,
                order.size,
                order.symbol,
                order.limit_price,
                order.stop_price,
                ack.order_id
            );
            return Ok(ack);
        }

        tracing::info!(
            "🚀 Sending {} {:?} {} {} (limit {:?}, stop {:?})",
            order.side.as_wire(),
            order.order_type,
            order.size,
            order.symbol,
            order.limit_price,
            order.stop_price
        );

        let response: SendOrderResponse = self
            .private_request(Method::POST, SEND_ORDER_PATH, &order.form_fields())
            .await?;
        let status = response.send_status;

        if status.status != "placed" {
            return Err(ExchangeError::rejected(SEND_ORDER_PATH, status.status));
        }
        let order_id = status
            .order_id
            .ok_or_else(|| ExchangeError::decode(SEND_ORDER_PATH, "placed order without order_id"))?;

        Ok(OrderAck {
            order_id,
            fill_price: execution_price(&status.order_events),
            status: status.status,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck, ExchangeError> {
        if !self.live_trading {
            tracing::info!("📝 PAPER cancel {}", order_id);
            return Ok(CancelAck {
                order_id: order_id.to_string(),
                status: "cancelled".to_string(),
            });
        }

        let form = [("order_id", order_id.to_string())];
        let response: CancelOrderResponse = self
            .private_request(Method::POST, CANCEL_ORDER_PATH, &form)
            .await?;
        let status = response.cancel_status;

        if status.status != "cancelled" {
            return Err(ExchangeError::rejected(CANCEL_ORDER_PATH, status.status));
        }

        Ok(CancelAck {
            order_id: status.order_id.unwrap_or_else(|| order_id.to_string()),
            status: status.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_available_margin_prefers_flex() {
        let accounts: HashMap<String, Value> = serde_json::from_value(json!({
            "fi_xbtusd": {"auxiliary": {"af": 12.0}},
            "flex": {"availableMargin": 1000.5}
        }))
        .unwrap();
        assert_eq!(available_margin(&accounts), Some(1000.5));
    }

    #[test]
    fn test_available_margin_falls_back_to_single_collateral() {
        let accounts: HashMap<String, Value> = serde_json::from_value(json!({
            "cash": {"balances": {"xbt": 0.1}},
            "fi_xbtusd": {"auxiliary": {"af": 12.0}}
        }))
        .unwrap();
        assert_eq!(available_margin(&accounts), Some(12.0));
    }

    #[test]
    fn test_execution_price_from_events() {
        let events = vec![
            json!({"type": "PLACE", "order": {}}),
            json!({"type": "EXECUTION", "price": 50_010.5, "amount": 0.01}),
        ];
        assert_eq!(execution_price(&events), Some(50_010.5));
        assert_eq!(execution_price(&[]), None);
    }

    #[tokio::test]
    async fn test_nonce_taken_after_rate_limit_wait() {
        let credentials = crate::auth::Credentials::new(
            "test-key",
            "dGVzdC1zZWNyZXQta2V5LW1hdGVyaWFsLTAxMjM0NTY3ODk=",
        );
        let settings = ExchangeSettings {
            requests_per_second: 1,
            ..ExchangeSettings::default()
        };
        let client =
            KrakenFuturesClient::new(RequestSigner::new(&credentials).unwrap(), &settings).unwrap();
        let millis = |signed: &SignedRequest| -> i64 {
            let nonce = signed.nonce.as_str();
            nonce[..nonce.len() - 5].parse().unwrap()
        };

        client.sign_when_ready(ACCOUNTS_PATH, String::new()).await;
        let before_wait = chrono::Utc::now().timestamp_millis();
        let second = client.sign_when_ready(ACCOUNTS_PATH, String::new()).await;

        // one request per second: the second slot opens roughly a second later
        assert!(millis(&second) >= before_wait + 500, "nonce {} signed before the wait", second.nonce);
    }

    #[test]
    fn test_raw_order_conversion() {
        let raw = RawOpenOrder {
            order_id: "abc".to_string(),
            symbol: "PF_XBTUSD".to_string(),
            side: "sell".to_string(),
            order_type: "stop".to_string(),
            unfilled_size: Some(0.01),
            size: None,
            limit_price: Some(48_999.5),
            stop_price: Some(49_000.0),
        };
        let order = raw.into_open_order().unwrap();
        assert_eq!(order.order_type, OrderType::Stop);
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.size, Decimal::from_str("0.01").unwrap());
    }
}
