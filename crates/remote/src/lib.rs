//! `bottega-remote` — HTTP client for the console backend.
//!
//! **Responsibility:** a thin JSON wrapper over the REST API, with bearer
//! authentication handled transparently: a 401 clears the stored token,
//! performs one login over the configured credential list (shared across
//! concurrent callers), and retries the original request once.

pub mod client;
pub mod endpoints;
pub mod error;

pub use client::ApiClient;
pub use endpoints::{Comunicazione, DashboardSummary, LowStockItem, WhatsappStatus};
pub use error::ApiError;

/// Default backend base URL when `BOTTEGA_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";
