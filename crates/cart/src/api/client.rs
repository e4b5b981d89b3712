//! HTTP catalog client implementation.
//!
//! Plain JSON over `reqwest`. Caches product details using `moka`;
//! stock records are never cached.

use std::sync::Arc;

use moka::future::Cache;
use rocketshoes_core::ProductId;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{ApiError, CatalogApi, Product, StockRecord};
use crate::config::CartConfig;

/// Stock payload as it may arrive on the wire.
///
/// A body without an `id` means the catalog has no record for the product.
#[derive(Debug, Deserialize)]
struct StockPayload {
    id: Option<ProductId>,
    #[serde(default)]
    amount: u32,
}

// =============================================================================
// HttpCatalogClient
// =============================================================================

/// Client for the catalog HTTP API.
///
/// Cheap to clone; clones share the connection pool and product cache.
#[derive(Clone)]
pub struct HttpCatalogClient {
    inner: Arc<HttpCatalogClientInner>,
}

struct HttpCatalogClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    products: Option<Cache<ProductId, Product>>,
}

impl HttpCatalogClient {
    /// Create a new catalog client.
    ///
    /// A zero product cache TTL disables the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CartConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let products = (!config.product_cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1000)
                .time_to_live(config.product_cache_ttl)
                .build()
        });

        // Url::join drops the last path segment unless the base ends in '/'
        let mut base_url = config.api_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(HttpCatalogClientInner {
                client,
                base_url,
                token: config.api_token.clone(),
                products,
            }),
        })
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// GET a catalog path. `Ok(None)` means 404.
    async fn get(&self, path: &str) -> Result<Option<String>, ApiError> {
        let url = self.inner.base_url.join(path)?;
        debug!(%url, "Catalog request");

        let mut request = self.inner.client.get(url);
        if let Some(token) = &self.inner.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Catalog API returned non-success status"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(Some(body))
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse catalog response"
        );
        ApiError::Parse(e)
    })
}

impl CatalogApi for HttpCatalogClient {
    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn stock(&self, product_id: ProductId) -> Result<Option<StockRecord>, ApiError> {
        let body = self
            .get(&format!("stock/{product_id}"))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("stock {product_id}")))?;

        let payload: StockPayload = parse(&body)?;
        if payload.id.is_none() {
            debug!("No stock record");
        }
        Ok(payload.id.map(|id| StockRecord {
            id,
            amount: payload.amount,
        }))
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn product(&self, product_id: ProductId) -> Result<Product, ApiError> {
        if let Some(cache) = &self.inner.products
            && let Some(product) = cache.get(&product_id).await
        {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let body = self
            .get(&format!("products/{product_id}"))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("product {product_id}")))?;
        let product: Product = parse(&body)?;

        if let Some(cache) = &self.inner.products {
            cache.insert(product_id, product.clone()).await;
        }

        Ok(product)
    }
}
