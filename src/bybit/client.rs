//! Bybit v5 HTTP client
//!
//! Implements the [`Exchange`] adapter over the v5 REST surface. There is no
//! client-side retry loop: the strategy tick loop re-queries every order each
//! cycle, so a failed call simply surfaces and the next tick retries.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;

use super::auth::Credentials;
use super::types::*;
use crate::exchange::{Exchange, OrderBookTop, OrderUpdate, Side};

/// Base URL for the Bybit v5 API
pub const API_BASE_URL: &str = "https://api.bybit.com";

/// Receive window attached to every authenticated request, in milliseconds
pub const RECV_WINDOW: &str = "5000";

/// Bybit exchange client bound to one symbol and product category
#[derive(Clone)]
pub struct BybitClient {
    credentials: Credentials,
    symbol: String,
    category: String,
    http_client: Client,
    base_url: String,
}

impl BybitClient {
    pub fn new(
        credentials: Credentials,
        symbol: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self::with_base_url(credentials, symbol, category, API_BASE_URL)
    }

    /// Point the client at a different host (testnet, local stub).
    pub fn with_base_url(
        credentials: Credentials,
        symbol: impl Into<String>,
        category: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            credentials,
            symbol: symbol.into(),
            category: category.into(),
            http_client,
            base_url: base_url.into(),
        }
    }

    /// Make an authenticated POST request with a signed JSON body
    async fn signed_post<T, R>(&self, endpoint: &str, body: &T) -> Result<R>
    where
        T: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let json_body = serde_json::to_string(body)?;
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.credentials.sign(timestamp, RECV_WINDOW, &json_body);

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-BAPI-API-KEY", self.credentials.api_key())
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .body(json_body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read response")?;

        if !status.is_success() {
            return Err(anyhow!("HTTP error ({}): {}", status, text));
        }

        serde_json::from_str(&text).context("Failed to parse response")
    }

    /// Make an authenticated GET request; the raw query string is signed.
    async fn signed_get<R>(&self, endpoint: &str, query: &str) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}?{}", self.base_url, endpoint, query);
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.credentials.sign(timestamp, RECV_WINDOW, query);

        let response = self
            .http_client
            .get(&url)
            .header("X-BAPI-API-KEY", self.credentials.api_key())
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read response")?;

        if !status.is_success() {
            return Err(anyhow!("HTTP error ({}): {}", status, text));
        }

        serde_json::from_str(&text).context("Failed to parse response")
    }

    /// Make a public (unsigned) GET request
    async fn public_get<R>(&self, endpoint: &str, query: &str) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}?{}", self.base_url, endpoint, query);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read response")?;

        if !status.is_success() {
            return Err(anyhow!("HTTP error ({}): {}", status, text));
        }

        serde_json::from_str(&text).context("Failed to parse response")
    }

    async fn create_order(
        &self,
        side: Side,
        order_type: &str,
        qty: Decimal,
        price: Option<Decimal>,
    ) -> Result<String> {
        let request = CreateOrderRequest {
            category: self.category.clone(),
            symbol: self.symbol.clone(),
            side: side.as_str().to_string(),
            order_type: order_type.to_string(),
            qty: qty.to_string(),
            price: price.map(|p| p.to_string()),
        };

        let response: RestResponse<CreateOrderResult> =
            self.signed_post("/v5/order/create", &request).await?;
        Ok(response.into_result()?.order_id)
    }

    /// Total available balance of the unified account, for the startup probe.
    pub async fn wallet_balance(&self) -> Result<Decimal> {
        let query = "accountType=UNIFIED";
        let response: RestResponse<WalletBalanceResult> =
            self.signed_get("/v5/account/wallet-balance", query).await?;
        let result = response.into_result()?;
        let account = result
            .list
            .first()
            .ok_or_else(|| anyhow!("Wallet balance response has no accounts"))?;
        account
            .total_available_balance
            .parse()
            .with_context(|| format!("Failed to parse balance {:?}", account.total_available_balance))
    }
}

#[async_trait]
impl Exchange for BybitClient {
    async fn place_limit(&self, side: Side, price: Decimal, qty: Decimal) -> Result<String> {
        self.create_order(side, "Limit", qty, Some(price)).await
    }

    async fn place_market(&self, side: Side, qty: Decimal) -> Result<String> {
        self.create_order(side, "Market", qty, None).await
    }

    async fn cancel(&self, order_id: &str) -> Result<()> {
        let request = CancelOrderRequest {
            category: self.category.clone(),
            symbol: self.symbol.clone(),
            order_id: order_id.to_string(),
        };

        let response: RestResponse<serde_json::Value> =
            self.signed_post("/v5/order/cancel", &request).await?;
        response.into_result()?;
        Ok(())
    }

    async fn status(&self, order_id: &str) -> Result<Option<OrderUpdate>> {
        let query = format!(
            "category={}&symbol={}&orderId={}",
            self.category, self.symbol, order_id
        );
        let response: RestResponse<OrderListResult> =
            self.signed_get("/v5/order/realtime", &query).await?;
        let result = response.into_result()?;

        Ok(result.list.first().map(|detail| OrderUpdate {
            state: detail.state(),
            cum_exec_qty: detail.cum_exec_qty(),
        }))
    }

    async fn orderbook_top(&self) -> Result<OrderBookTop> {
        let query = format!("category={}&symbol={}&limit=1", self.category, self.symbol);
        let response: RestResponse<OrderbookResult> =
            self.public_get("/v5/market/orderbook", &query).await?;
        let result = response.into_result()?;

        Ok(OrderBookTop {
            best_bid: result.best_bid()?,
            best_ask: result.best_ask()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BybitClient::new(Credentials::new("k", "s"), "BTCUSDT", "spot");
        assert_eq!(client.symbol, "BTCUSDT");
        assert_eq!(client.category, "spot");
        assert_eq!(client.base_url, API_BASE_URL);
    }

    #[test]
    fn test_with_base_url() {
        let client = BybitClient::with_base_url(
            Credentials::new("k", "s"),
            "BTCUSDT",
            "linear",
            "https://api-testnet.bybit.com",
        );
        assert_eq!(client.base_url, "https://api-testnet.bybit.com");
    }

    #[test]
    fn test_api_constants() {
        assert_eq!(API_BASE_URL, "https://api.bybit.com");
        assert_eq!(RECV_WINDOW, "5000");
    }
}
