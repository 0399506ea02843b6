//! Configuration management
//!
//! Handles loading and parsing of the JSON strategy configuration with
//! environment variable support for API credentials. Validation failures are
//! fatal: the engine refuses to start on an invalid config.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Validation errors for the strategy configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tick_size ({0}) must be > 0")]
    NonPositiveTickSize(Decimal),

    #[error("order_qty ({0}) must be > 0")]
    NonPositiveOrderQty(Decimal),

    #[error("max_buy_orders must be >= 1")]
    NoBuyLayers,

    #[error("layer_step_ticks must be >= 1")]
    ZeroLayerStep,

    #[error("buy_ttl_secs must be > 0")]
    ZeroBuyTtl,

    #[error("reprice_ticks must be >= 1")]
    ZeroRepriceTicks,

    #[error("tp_ticks must be >= 1")]
    ZeroTpTicks,

    #[error("max_sell_tp_orders must be >= 1")]
    NoTpCapacity,

    #[error("loop_interval_ms must be > 0")]
    ZeroLoopInterval,

    #[error("API credentials are missing (set api_key/api_secret or BYBIT_API_KEY/BYBIT_API_SECRET)")]
    MissingCredentials,
}

/// Strategy configuration, immutable for the life of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,

    /// Trading pair, e.g. "BTCUSDT"
    pub symbol: String,
    /// Product category, e.g. "spot" or "linear"
    pub category: String,

    /// Minimum price increment of the instrument
    pub tick_size: Decimal,
    /// Quantity of every BUY order (base asset)
    pub order_qty: Decimal,

    /// Number of ladder layers kept open below the best bid
    pub max_buy_orders: u32,
    /// Distance of layer 0 from the best bid, in ticks
    pub offset_ticks: u32,
    /// Distance between adjacent layers, in ticks
    pub layer_step_ticks: u32,

    /// Age bound after which an open BUY is canceled
    pub buy_ttl_secs: u64,
    /// Drift from the best bid, in ticks, that forces a reprice
    pub reprice_ticks: u32,

    /// Profit target of a take-profit SELL, in ticks above the fill
    pub tp_ticks: u32,
    /// Cap on simultaneously open take-profit orders
    pub max_sell_tp_orders: u32,

    /// Tick loop period in milliseconds
    pub loop_interval_ms: u64,
    /// Cooldown after a BUY fill before the ladder is topped up again
    #[serde(default)]
    pub wait_after_buy_fill_ms: u64,
    /// Flatten all take-profit inventory with market sells on stop
    #[serde(default)]
    pub sell_all_on_stop: bool,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Load API credentials from environment if not set
        if let Ok(api_key) = std::env::var("BYBIT_API_KEY") {
            config.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BYBIT_API_SECRET") {
            config.api_secret = Some(api_secret);
        }

        Ok(config)
    }

    /// Validate all numeric constraints and credential presence
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_size <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveTickSize(self.tick_size));
        }
        if self.order_qty <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveOrderQty(self.order_qty));
        }
        if self.max_buy_orders < 1 {
            return Err(ConfigError::NoBuyLayers);
        }
        if self.layer_step_ticks < 1 {
            return Err(ConfigError::ZeroLayerStep);
        }
        if self.buy_ttl_secs == 0 {
            return Err(ConfigError::ZeroBuyTtl);
        }
        if self.reprice_ticks < 1 {
            return Err(ConfigError::ZeroRepriceTicks);
        }
        if self.tp_ticks < 1 {
            return Err(ConfigError::ZeroTpTicks);
        }
        if self.max_sell_tp_orders < 1 {
            return Err(ConfigError::NoTpCapacity);
        }
        if self.loop_interval_ms == 0 {
            return Err(ConfigError::ZeroLoopInterval);
        }
        Ok(())
    }

    /// Validate including credentials, as required to go live
    pub fn validate_for_trading(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let _ = self.credentials()?;
        Ok(())
    }

    /// API key/secret pair, if both are present
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(k), Some(s)) if !k.is_empty() && !s.is_empty() => Ok((k, s)),
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    pub fn buy_ttl(&self) -> Duration {
        Duration::from_secs(self.buy_ttl_secs)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    pub fn wait_after_buy_fill(&self) -> Duration {
        Duration::from_millis(self.wait_after_buy_fill_ms)
    }
}
