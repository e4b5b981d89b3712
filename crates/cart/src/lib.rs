//! RocketShoes cart library.
//!
//! Holds the shopper's selected products, persists them to key-value storage
//! and validates quantity changes against the catalog's stock endpoint.
//!
//! # Architecture
//!
//! - [`cart::Cart`] - immutable snapshot; every change returns a new one
//! - [`manager::CartManager`] - the store object handed to UI code
//! - [`api::CatalogApi`] - stock and product reads (`HttpCatalogClient` over `reqwest`)
//! - [`storage::CartStorage`] - durable key-value persistence
//! - [`notice::Notifier`] - where user-facing notices go
//!
//! # Example
//!
//! ```rust,ignore
//! use rocketshoes_cart::{CartConfig, CartManager, FileStorage, HttpCatalogClient, TracingNotifier};
//!
//! let config = CartConfig::from_env()?;
//! let api = HttpCatalogClient::new(&config)?;
//! let storage = FileStorage::new(&config.cart_path);
//! let mut manager = CartManager::load(api, storage, TracingNotifier, &config.storage_key);
//!
//! manager.add_product(ProductId::new(1)).await;
//! println!("{} itens", manager.cart().len());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod manager;
pub mod notice;
pub mod storage;

pub use api::{ApiError, CatalogApi, HttpCatalogClient, Product, StockRecord};
pub use cart::{Cart, CartEntry};
pub use config::{CartConfig, ConfigError};
pub use error::{CartError, Operation};
pub use manager::{CartManager, UpdateProductAmount};
pub use notice::{MemoryNotifier, Notice, Notifier, TracingNotifier};
pub use storage::{CartStorage, FileStorage, MemoryStorage, StorageError};

/// Storage key the storefront has always used for the cart.
pub const DEFAULT_STORAGE_KEY: &str = "@RocketShoes:cart";
