//! Caching primitives for the storefront CMS client.
//!
//! Currently there is a [`RequestCache`] that memoizes the results of async computations
//! by key for a caller-provided time-to-live, and that coalesces concurrent requests for
//! the same key into a single computation.

#![warn(missing_docs)]

mod request;

pub use request::*;

#[cfg(any(test, feature = "test"))]
pub(crate) use tokio::time;

#[cfg(not(any(test, feature = "test")))]
pub(crate) use std::time;
