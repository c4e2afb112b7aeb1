//! Lemmy v3 read API: HTTP client, response types and the request audit log.

pub mod api;
pub mod api_types;
pub mod audit;
pub mod client;
pub mod rate_limit;
pub mod types;

pub use api::LemmyApi;
pub use client::LemmyClient;
