//! Stand-in catalog API for local development.
//!
//! Serves the two read endpoints the cart uses from a JSON file:
//!
//! ```json
//! {
//!   "products": [{ "id": 1, "title": "...", "price": 179.9, "image": "..." }],
//!   "stock": [{ "id": 1, "amount": 3 }]
//! }
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rocketshoes_cart::{Product, StockRecord};
use rocketshoes_core::ProductId;
use serde::Deserialize;
use tracing::{info, instrument};

use super::CommandError;

/// Contents of the catalog file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogDb {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub stock: Vec<StockRecord>,
}

#[derive(Debug, Default)]
struct Catalog {
    products: HashMap<ProductId, Product>,
    stock: HashMap<ProductId, StockRecord>,
}

impl From<CatalogDb> for Catalog {
    fn from(db: CatalogDb) -> Self {
        Self {
            products: db.products.into_iter().map(|p| (p.id, p)).collect(),
            stock: db.stock.into_iter().map(|s| (s.id, s)).collect(),
        }
    }
}

/// Router serving `GET /stock/{id}` and `GET /products/{id}`.
pub fn router(db: CatalogDb) -> Router {
    Router::new()
        .route("/stock/{id}", get(stock))
        .route("/products/{id}", get(product))
        .with_state(Arc::new(Catalog::from(db)))
}

#[instrument(skip(catalog))]
async fn stock(
    State(catalog): State<Arc<Catalog>>,
    UrlPath(id): UrlPath<ProductId>,
) -> Result<Json<StockRecord>, StatusCode> {
    catalog
        .stock
        .get(&id)
        .copied()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[instrument(skip(catalog))]
async fn product(
    State(catalog): State<Arc<Catalog>>,
    UrlPath(id): UrlPath<ProductId>,
) -> Result<Json<Product>, StatusCode> {
    catalog
        .products
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Load `db` and serve it until interrupted.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the address
/// cannot be bound.
pub async fn run(db: &Path, host: IpAddr, port: u16) -> Result<(), CommandError> {
    let contents = tokio::fs::read_to_string(db).await?;
    let catalog: CatalogDb = serde_json::from_str(&contents)?;
    info!(
        path = %db.display(),
        products = catalog.products.len(),
        stock = catalog.stock.len(),
        "Loaded catalog"
    );

    let addr = SocketAddr::new(host, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Catalog API listening on http://{addr}");

    axum::serve(listener, router(catalog))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Catalog API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
