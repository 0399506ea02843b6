//! Bybit v5 REST API client
//!
//! Request signing, wire types, and the HTTP client implementing the
//! [`Exchange`](crate::exchange::Exchange) adapter.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{sign_request, Credentials};
pub use client::{BybitClient, API_BASE_URL, RECV_WINDOW};
