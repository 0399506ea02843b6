//! Bybit v5 wire types
//!
//! Request and response shapes for the endpoints the engine consumes. All
//! numeric fields travel as strings on the wire and are parsed into
//! `Decimal` at the client boundary.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::exchange::OrderState;

/// Common response envelope: `retCode` 0 means success.
#[derive(Debug, Deserialize)]
pub struct RestResponse<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

impl<T> RestResponse<T> {
    /// Unwrap the payload, turning a non-zero `retCode` into an error.
    pub fn into_result(self) -> Result<T> {
        if self.ret_code != 0 {
            return Err(anyhow!(
                "Bybit API rejected request (retCode={}): {}",
                self.ret_code,
                self.ret_msg
            ));
        }
        self.result
            .ok_or_else(|| anyhow!("Bybit API returned success without a result payload"))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub category: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderResult {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub category: String,
    pub symbol: String,
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderListResult {
    pub list: Vec<OrderDetail>,
}

#[derive(Debug, Deserialize)]
pub struct OrderDetail {
    #[serde(rename = "orderId", default)]
    pub order_id: String,
    #[serde(rename = "orderStatus", default)]
    pub order_status: String,
    #[serde(rename = "cumExecQty", default)]
    pub cum_exec_qty: String,
}

impl OrderDetail {
    /// Collapse the exchange's status vocabulary to what the engine acts on.
    pub fn state(&self) -> OrderState {
        match self.order_status.as_str() {
            "New" | "Untriggered" | "Created" => OrderState::New,
            "PartiallyFilled" => OrderState::PartiallyFilled,
            "Filled" => OrderState::Filled,
            _ => OrderState::Other,
        }
    }

    /// Cumulative executed quantity; an absent field reads as zero.
    pub fn cum_exec_qty(&self) -> Decimal {
        if self.cum_exec_qty.is_empty() {
            return Decimal::ZERO;
        }
        Decimal::from_str(&self.cum_exec_qty).unwrap_or(Decimal::ZERO)
    }
}

/// Order book levels come as `[price, size]` string pairs; with `limit=1`
/// only the best level of each side is present.
#[derive(Debug, Deserialize)]
pub struct OrderbookResult {
    #[serde(default)]
    pub b: Vec<[String; 2]>,
    #[serde(default)]
    pub a: Vec<[String; 2]>,
}

impl OrderbookResult {
    pub fn best_bid(&self) -> Result<Decimal> {
        parse_level_price(self.b.first(), "bid")
    }

    pub fn best_ask(&self) -> Result<Decimal> {
        parse_level_price(self.a.first(), "ask")
    }
}

fn parse_level_price(level: Option<&[String; 2]>, side: &str) -> Result<Decimal> {
    let level = level.ok_or_else(|| anyhow!("Orderbook has no {} levels", side))?;
    Decimal::from_str(&level[0])
        .map_err(|e| anyhow!("Failed to parse best {} price {:?}: {}", side, level[0], e))
}

#[derive(Debug, Deserialize)]
pub struct WalletBalanceResult {
    pub list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
pub struct WalletAccount {
    #[serde(rename = "accountType", default)]
    pub account_type: String,
    #[serde(rename = "totalAvailableBalance", default)]
    pub total_available_balance: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_success() {
        let json = r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"abc-1"}}"#;
        let resp: RestResponse<CreateOrderResult> = serde_json::from_str(json).unwrap();
        assert_eq!(resp.into_result().unwrap().order_id, "abc-1");
    }

    #[test]
    fn test_envelope_rejection() {
        let json = r#"{"retCode":10001,"retMsg":"params error","result":null}"#;
        let resp: RestResponse<CreateOrderResult> = serde_json::from_str(json).unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(err.to_string().contains("10001"));
        assert!(err.to_string().contains("params error"));
    }

    #[test]
    fn test_order_status_mapping() {
        let mk = |status: &str| OrderDetail {
            order_id: "x".to_string(),
            order_status: status.to_string(),
            cum_exec_qty: String::new(),
        };
        assert_eq!(mk("New").state(), OrderState::New);
        assert_eq!(mk("PartiallyFilled").state(), OrderState::PartiallyFilled);
        assert_eq!(mk("Filled").state(), OrderState::Filled);
        assert_eq!(mk("Cancelled").state(), OrderState::Other);
        assert_eq!(mk("Rejected").state(), OrderState::Other);
    }

    #[test]
    fn test_cum_exec_qty_parsing() {
        let detail = OrderDetail {
            order_id: "x".to_string(),
            order_status: "PartiallyFilled".to_string(),
            cum_exec_qty: "0.4".to_string(),
        };
        assert_eq!(detail.cum_exec_qty(), dec!(0.4));

        let empty = OrderDetail {
            order_id: "x".to_string(),
            order_status: "New".to_string(),
            cum_exec_qty: String::new(),
        };
        assert_eq!(empty.cum_exec_qty(), Decimal::ZERO);
    }

    #[test]
    fn test_orderbook_parsing() {
        let json = r#"{"s":"BTCUSDT","b":[["100.00","2.5"]],"a":[["100.05","1.0"]]}"#;
        let book: OrderbookResult = serde_json::from_str(json).unwrap();
        assert_eq!(book.best_bid().unwrap(), dec!(100.00));
        assert_eq!(book.best_ask().unwrap(), dec!(100.05));
    }

    #[test]
    fn test_orderbook_empty_side_errors() {
        let json = r#"{"b":[],"a":[["100.05","1.0"]]}"#;
        let book: OrderbookResult = serde_json::from_str(json).unwrap();
        assert!(book.best_bid().is_err());
        assert!(book.best_ask().is_ok());
    }

    #[test]
    fn test_create_order_request_wire_shape() {
        let req = CreateOrderRequest {
            category: "spot".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: "Buy".to_string(),
            order_type: "Limit".to_string(),
            qty: "1".to_string(),
            price: Some("99.98".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""orderType":"Limit""#));
        assert!(json.contains(r#""price":"99.98""#));

        let market = CreateOrderRequest {
            price: None,
            order_type: "Market".to_string(),
            ..req
        };
        let json = serde_json::to_string(&market).unwrap();
        assert!(!json.contains("price"));
    }
}
