//! Authentication utilities for the Bybit v5 API
//!
//! Implements HMAC-SHA256 signature generation as per the official Bybit
//! API documentation: the signature covers
//! `timestamp ‖ api_key ‖ recv_window ‖ payload`, where the payload is the
//! raw JSON body for POST requests or the raw query string (without the
//! leading `?`) for GET requests.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Generate the lowercase-hex HMAC-SHA256 signature for an API request.
pub fn sign_request(
    secret: &str,
    timestamp_ms: i64,
    api_key: &str,
    recv_window: &str,
    payload: &str,
) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(api_key.as_bytes());
    mac.update(recv_window.as_bytes());
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature against the expected value
pub fn verify_signature(
    secret: &str,
    timestamp_ms: i64,
    api_key: &str,
    recv_window: &str,
    payload: &str,
    signature: &str,
) -> bool {
    let computed = sign_request(secret, timestamp_ms, api_key, recv_window, payload);
    constant_time_eq(computed.as_bytes(), signature.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// API credentials container
#[derive(Debug, Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Create credentials from `BYBIT_API_KEY` and `BYBIT_API_SECRET`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("BYBIT_API_KEY")?;
        let api_secret = std::env::var("BYBIT_API_SECRET")?;
        Ok(Self::new(api_key, api_secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign a request payload with this credential pair
    pub fn sign(&self, timestamp_ms: i64, recv_window: &str, payload: &str) -> String {
        sign_request(
            &self.api_secret,
            timestamp_ms,
            &self.api_key,
            recv_window,
            payload,
        )
    }
}
