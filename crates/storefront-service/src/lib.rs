//! Catalog access for the furniture storefront.
//!
//! The [`CmsClient`](client::CmsClient) fetches products, categories and site settings from
//! the headless CMS, deduplicating and caching requests in memory.

#[macro_use]
pub mod metrics;

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod types;

pub use client::CmsClient;
pub use error::ApiError;
pub use query::Query;
