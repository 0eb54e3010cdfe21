//! WeCom (企业微信) adapter.
//!
//! # Module Structure
//!
//! - [`error`] - `WeComError` and its errcode mapping to `FetchError`
//! - [`types`] - Response envelopes
//! - [`client`] - `WeComClient`, the `EntityFetcher` implementation
//!
//! ```ignore
//! use crmsync::wecom::{WeComClient, WeComConfig};
//! use crmsync::platform::{RateLimitedFetcher, rate_limits};
//!
//! let client = WeComClient::new(WeComConfig::new(corp_id, contact_secret, customer_secret))?;
//! let fetcher = RateLimitedFetcher::new(client, rate_limits::WECOM_DEFAULT_RPS);
//! ```

mod client;
mod error;
mod types;

pub use client::{DEFAULT_API_BASE, SecretKind, WeComClient, WeComConfig};
pub use error::WeComError;
