use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::ExchangeError;
use crate::models::Candle;

pub const OHLC_PATH: &str = "/0/public/OHLC";

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, Value>,
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Row layout: `[time, open, high, low, close, vwap, volume, count]`
fn parse_row(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 7 {
        return None;
    }
    let open_time = DateTime::<Utc>::from_timestamp(fields[0].as_i64()?, 0)?;

    Some(Candle {
        open_time,
        open: number(&fields[1])?,
        high: number(&fields[2])?,
        low: number(&fields[3])?,
        close: number(&fields[4])?,
        volume: number(&fields[6])?,
    })
}

/// Decode a spot OHLC response body into candles, oldest first.
///
/// The result object holds one series keyed by the exchange's pair name (which may
/// differ from the requested symbol) next to a `last` cursor.
pub fn parse_ohlc(body: &str) -> Result<Vec<Candle>, ExchangeError> {
    let response: OhlcResponse = serde_json::from_str(body)
        .map_err(|e| ExchangeError::decode(OHLC_PATH, e.to_string()))?;

    if !response.error.is_empty() {
        return Err(ExchangeError::rejected(OHLC_PATH, response.error.join(", ")));
    }

    let rows = response
        .result
        .iter()
        .find(|(key, _)| key.as_str() != "last")
        .and_then(|(_, series)| series.as_array())
        .ok_or_else(|| ExchangeError::decode(OHLC_PATH, "no candle series in result"))?;

    let mut candles: Vec<Candle> = rows.iter().filter_map(parse_row).collect();
    if candles.len() < rows.len() {
        tracing::warn!(
            "Dropped {} malformed candle rows",
            rows.len() - candles.len()
        );
    }
    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "error": [],
        "result": {
            "XXBTZUSD": [
                [1688671500, "30310.0", "30320.5", "30300.0", "30315.2", "30311.0", "1.25", 12],
                [1688671200, "30306.1", "30306.2", "30305.7", "30305.7", "30306.1", "3.39243896", 23],
                [1688671800, "30315.2", "30330.0", "30310.1", "30329.9", "30320.0", "0.5", 4]
            ],
            "last": 1688671500
        }
    }"#;

    #[test]
    fn test_parse_sorts_oldest_first() {
        let candles = parse_ohlc(BODY).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].open_time.timestamp(), 1688671200);
        assert_eq!(candles[0].volume, 3.39243896);
        assert_eq!(candles[2].close, 30329.9);
    }

    #[test]
    fn test_exchange_error_is_rejection() {
        let result = parse_ohlc(r#"{"error": ["EQuery:Unknown asset pair"]}"#);
        assert!(matches!(result, Err(ExchangeError::Rejected { reason, .. }) if reason.contains("Unknown asset pair")));
    }

    #[test]
    fn test_missing_series_is_decode_error() {
        let result = parse_ohlc(r#"{"error": [], "result": {"last": 1}}"#);
        assert!(matches!(result, Err(ExchangeError::Decode { .. })));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let body = r#"{"error": [], "result": {"XBTUSD": [[1688671200, "1", "2", "0.5", "1.5", "1.2", "10", 3], ["bad"]], "last": 0}}"#;
        let candles = parse_ohlc(body).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].high, 2.0);
    }
}
