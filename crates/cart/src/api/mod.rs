//! Catalog API: product details and live stock availability.
//!
//! # Endpoints
//!
//! - `GET /stock/{id}` - available inventory for a product
//! - `GET /products/{id}` - product details (title, price, image)
//!
//! Product details are cached in memory via `moka`. Stock is always fetched
//! live since every quantity check must see current availability.

mod client;

use std::future::Future;

use rocketshoes_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::HttpCatalogClient;

/// Errors that can occur when talking to the catalog API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Catalog answered with an unexpected status.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limited by the catalog.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

/// Product details as served by `GET /products/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    /// Unit price in the store currency, a plain JSON number on the wire.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Image URL.
    pub image: String,
}

/// Available inventory for one product, as served by `GET /stock/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: ProductId,
    pub amount: u32,
}

/// Read access to the catalog.
///
/// `stock` returns `Ok(None)` when the catalog has no stock record for the
/// product; callers treat that as nothing available.
pub trait CatalogApi {
    /// Fetch live stock for a product.
    fn stock(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<StockRecord>, ApiError>> + Send;

    /// Fetch product details.
    fn product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Product, ApiError>> + Send;
}
