//! Remote event API: typed wire structs and the reqwest client.

mod client;
pub mod types;

pub use client::{ApiError, EventApi, EventApiClient};
