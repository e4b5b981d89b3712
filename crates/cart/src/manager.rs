//! The cart store handed to UI code.
//!
//! [`CartManager`] owns the current [`Cart`] snapshot and its three
//! collaborators: the catalog, the storage backend and the notifier. It is
//! constructed explicitly and passed to whoever needs it.
//!
//! Every mutation follows the same path: validate against the catalog, build
//! the next snapshot, write it to storage, then publish it. Nothing is
//! published unless the write succeeded, so memory and storage agree after
//! every operation.
//!
//! Operations come in two flavours. `add_product`, `remove_product` and
//! `update_product_amount` never fail; errors become a [`Notice`] on the
//! notifier. The `try_*` variants return the error instead and notify nobody.

use rocketshoes_core::ProductId;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::api::{CatalogApi, Product};
use crate::cart::Cart;
use crate::error::{CartError, Operation, Result};
use crate::notice::{Notice, Notifier};
use crate::storage::{CartStorage, StorageError};

/// Request to set a product's quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateProductAmount {
    pub product_id: ProductId,
    /// Requested quantity. Zero or negative requests are ignored.
    pub amount: i64,
}

/// Cart state container.
pub struct CartManager<A, S, N> {
    api: A,
    storage: S,
    notifier: N,
    storage_key: String,
    cart: Cart,
    updates: watch::Sender<Cart>,
}

impl<A, S, N> CartManager<A, S, N>
where
    A: CatalogApi,
    S: CartStorage,
    N: Notifier,
{
    /// Build a manager, loading the cart stored under `storage_key`.
    ///
    /// A missing value gives an empty cart. So does one that cannot be read
    /// or parsed; that case is logged.
    pub fn load(api: A, storage: S, notifier: N, storage_key: impl Into<String>) -> Self {
        let storage_key = storage_key.into();
        let cart = load_cart(&storage, &storage_key);
        let (updates, _) = watch::channel(cart.clone());

        Self {
            api,
            storage,
            notifier,
            storage_key,
            cart,
            updates,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current snapshot.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Receiver that always holds the latest committed snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.updates.subscribe()
    }

    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    // =========================================================================
    // Notifying operations
    // =========================================================================

    /// Add one unit of a product.
    pub async fn add_product(&mut self, product_id: ProductId) {
        if let Err(err) = self.try_add_product(product_id).await {
            self.report(Operation::Add, &err);
        }
    }

    /// Remove a product entirely.
    pub fn remove_product(&mut self, product_id: ProductId) {
        if let Err(err) = self.try_remove_product(product_id) {
            self.report(Operation::Remove, &err);
        }
    }

    /// Set a product's quantity.
    pub async fn update_product_amount(&mut self, request: UpdateProductAmount) {
        if let Err(err) = self.try_update_product_amount(request).await {
            self.report(Operation::Update, &err);
        }
    }

    fn report(&self, operation: Operation, err: &CartError) {
        let notice: Notice = err.notice(operation);
        match err {
            CartError::OutOfStock { .. } => info!(?operation, error = %err, "Refused by stock"),
            _ => error!(?operation, error = %err, "Cart operation failed"),
        }
        self.notifier.notify(notice);
    }

    // =========================================================================
    // Fallible operations
    // =========================================================================

    /// Add one unit of a product, returning the new snapshot.
    ///
    /// A product new to the cart is fetched from the catalog and appended
    /// with amount one. One already present is incremented.
    ///
    /// # Errors
    ///
    /// - `OutOfStock` if the catalog has no stock record, or fewer units than
    ///   the resulting amount
    /// - `Api` if a catalog call fails
    /// - `Storage` if the new cart could not be written
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn try_add_product(&mut self, product_id: ProductId) -> Result<Cart> {
        let current = self.cart.get(product_id).map_or(0, |entry| entry.amount);
        let requested = current.saturating_add(1);

        let Some(stock) = self.api.stock(product_id).await? else {
            return Err(CartError::OutOfStock {
                product_id,
                requested,
                available: 0,
            });
        };

        if requested > stock.amount {
            return Err(CartError::OutOfStock {
                product_id,
                requested,
                available: stock.amount,
            });
        }

        let next = match self.cart.with_incremented(product_id) {
            Some(next) => next,
            None => {
                let product = self.api.product(product_id).await?;
                if product.id != product_id {
                    warn!(returned = %product.id, "Catalog returned a different product id");
                }
                self.cart.with_new_entry(Product {
                    id: product_id,
                    ..product
                })
            }
        };

        self.commit(next)
    }

    /// Remove a product, returning the new snapshot.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the product is not in the cart
    /// - `Storage` if the new cart could not be written
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn try_remove_product(&mut self, product_id: ProductId) -> Result<Cart> {
        let next = self
            .cart
            .without(product_id)
            .ok_or(CartError::NotFound(product_id))?;
        self.commit(next)
    }

    /// Set a product's quantity, returning the new snapshot.
    ///
    /// Zero or negative amounts, and products not in the cart, change nothing
    /// and return the current cart without touching the catalog.
    ///
    /// # Errors
    ///
    /// - `OutOfStock` if the catalog has fewer units than requested (a missing
    ///   stock record counts as zero)
    /// - `Api` if the stock lookup fails
    /// - `Storage` if the new cart could not be written
    #[instrument(skip(self), fields(product_id = %request.product_id, amount = request.amount))]
    pub async fn try_update_product_amount(
        &mut self,
        request: UpdateProductAmount,
    ) -> Result<Cart> {
        let UpdateProductAmount { product_id, amount } = request;

        if amount <= 0 {
            debug!("Ignoring non-positive amount");
            return Ok(self.cart.clone());
        }
        let requested = u32::try_from(amount).unwrap_or(u32::MAX);

        if !self.cart.contains(product_id) {
            debug!("Ignoring update for a product not in the cart");
            return Ok(self.cart.clone());
        }

        let available = self
            .api
            .stock(product_id)
            .await?
            .map_or(0, |stock| stock.amount);
        if requested > available {
            return Err(CartError::OutOfStock {
                product_id,
                requested,
                available,
            });
        }

        let next = self
            .cart
            .with_amount(product_id, requested)
            .ok_or(CartError::NotFound(product_id))?;
        self.commit(next)
    }

    /// Write `next` to storage, then make it current.
    fn commit(&mut self, next: Cart) -> Result<Cart> {
        let json = next.to_json().map_err(StorageError::from)?;
        self.storage.set_item(&self.storage_key, &json)?;

        self.cart = next.clone();
        self.updates.send_replace(next.clone());

        info!(
            products = next.len(),
            items = next.total_items(),
            "Cart updated"
        );
        Ok(next)
    }
}

fn load_cart<S: CartStorage>(storage: &S, key: &str) -> Cart {
    match storage.get_item(key) {
        Ok(Some(value)) => Cart::from_json(&value).unwrap_or_else(|e| {
            warn!(key, error = %e, "Stored cart is corrupt, starting empty");
            Cart::new()
        }),
        Ok(None) => Cart::new(),
        Err(e) => {
            warn!(key, error = %e, "Could not read stored cart, starting empty");
            Cart::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use super::*;
    use crate::api::{ApiError, StockRecord};
    use crate::notice::MemoryNotifier;
    use crate::storage::MemoryStorage;

    const KEY: &str = "@RocketShoes:cart";

    /// Catalog backed by maps. Products without a stock entry have no record.
    #[derive(Default)]
    struct StubCatalog {
        stock: Mutex<HashMap<ProductId, u32>>,
        products: HashMap<ProductId, Product>,
        failing: Mutex<bool>,
        stock_calls: AtomicUsize,
        product_calls: AtomicUsize,
    }

    impl StubCatalog {
        fn with(items: &[(i32, u32)]) -> Self {
            let mut catalog = Self::default();
            for (id, amount) in items {
                let id = ProductId::new(*id);
                catalog.stock.get_mut().unwrap().insert(id, *amount);
                catalog.products.insert(id, product(id.as_i32()));
            }
            catalog
        }

        fn set_stock(&self, id: i32, amount: u32) {
            self.stock.lock().unwrap().insert(ProductId::new(id), amount);
        }

        fn fail(&self) {
            *self.failing.lock().unwrap() = true;
        }

        fn check(&self) -> std::result::Result<(), ApiError> {
            if *self.failing.lock().unwrap() {
                Err(ApiError::Status {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl CatalogApi for StubCatalog {
        async fn stock(
            &self,
            product_id: ProductId,
        ) -> std::result::Result<Option<StockRecord>, ApiError> {
            self.stock_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(self
                .stock
                .lock()
                .unwrap()
                .get(&product_id)
                .map(|amount| StockRecord {
                    id: product_id,
                    amount: *amount,
                }))
        }

        async fn product(&self, product_id: ProductId) -> std::result::Result<Product, ApiError> {
            self.product_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.products
                .get(&product_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("product {product_id}")))
        }
    }

    /// Storage whose writes fail after `ok_writes` successes.
    struct FlakyStorage {
        inner: MemoryStorage,
        ok_writes: usize,
    }

    impl CartStorage for FlakyStorage {
        fn get_item(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.inner.get_item(key)
        }

        fn set_item(&mut self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            if self.ok_writes == 0 {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.ok_writes -= 1;
            self.inner.set_item(key, value)
        }
    }

    fn product(id: i32) -> Product {
        Product {
            id: ProductId::new(id),
            title: format!("Tênis {id}"),
            price: Decimal::new(17990, 2),
            image: format!("https://img.test/{id}.jpg"),
        }
    }

    type TestManager = CartManager<StubCatalog, MemoryStorage, MemoryNotifier>;

    fn manager(catalog: StubCatalog) -> TestManager {
        CartManager::load(catalog, MemoryStorage::new(), MemoryNotifier::new(), KEY)
    }

    fn stored(manager: &TestManager) -> Cart {
        Cart::from_json(&manager.storage().get_item(KEY).unwrap().unwrap()).unwrap()
    }

    fn amount_of(manager: &TestManager, id: i32) -> Option<u32> {
        manager.cart().get(ProductId::new(id)).map(|e| e.amount)
    }

    fn update(id: i32, amount: i64) -> UpdateProductAmount {
        UpdateProductAmount {
            product_id: ProductId::new(id),
            amount,
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn test_load_starts_empty_without_stored_cart() {
        let manager = manager(StubCatalog::default());
        assert!(manager.cart().is_empty());
    }

    #[test]
    fn test_load_restores_stored_cart() {
        let storage = MemoryStorage::with_item(
            KEY,
            r#"[{"id":2,"title":"Tênis 2","price":139.9,"image":"2.jpg","amount":3}]"#,
        );
        let manager = CartManager::load(
            StubCatalog::default(),
            storage,
            MemoryNotifier::new(),
            KEY,
        );
        assert_eq!(manager.cart().len(), 1);
        assert_eq!(manager.cart().get(ProductId::new(2)).unwrap().amount, 3);
    }

    #[test]
    fn test_load_corrupt_cart_is_empty() {
        let storage = MemoryStorage::with_item(KEY, "{{{ definitely not json");
        let manager = CartManager::load(
            StubCatalog::default(),
            storage,
            MemoryNotifier::new(),
            KEY,
        );
        assert!(manager.cart().is_empty());
    }

    // =========================================================================
    // add_product
    // =========================================================================

    #[tokio::test]
    async fn test_add_new_product_with_stock() {
        let mut manager = manager(StubCatalog::with(&[(1, 3)]));

        manager.add_product(ProductId::new(1)).await;

        assert_eq!(amount_of(&manager, 1), Some(1));
        assert_eq!(
            manager.cart().get(ProductId::new(1)).unwrap().product,
            product(1)
        );
        assert!(manager.notifier().notices().is_empty());
        assert_eq!(stored(&manager), *manager.cart());
    }

    #[tokio::test]
    async fn test_add_existing_product_increments_without_refetching() {
        let mut manager = manager(StubCatalog::with(&[(1, 3)]));

        manager.add_product(ProductId::new(1)).await;
        manager.add_product(ProductId::new(1)).await;

        assert_eq!(amount_of(&manager, 1), Some(2));
        assert_eq!(manager.cart().len(), 1);
        assert_eq!(manager.api().product_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.api().stock_calls.load(Ordering::SeqCst), 2);
        assert_eq!(stored(&manager), *manager.cart());
    }

    #[tokio::test]
    async fn test_add_beyond_stock_is_refused() {
        let mut manager = manager(StubCatalog::with(&[(1, 2)]));

        manager.add_product(ProductId::new(1)).await;
        manager.add_product(ProductId::new(1)).await;
        let before = manager.cart().clone();

        manager.add_product(ProductId::new(1)).await;

        assert_eq!(*manager.cart(), before);
        assert_eq!(amount_of(&manager, 1), Some(2));
        assert_eq!(manager.notifier().take(), vec![Notice::OutOfStock]);
        assert_eq!(stored(&manager), before);
    }

    #[tokio::test]
    async fn test_add_with_zero_stock_is_refused() {
        let mut manager = manager(StubCatalog::with(&[(1, 0)]));

        manager.add_product(ProductId::new(1)).await;

        assert!(manager.cart().is_empty());
        assert_eq!(manager.notifier().take(), vec![Notice::OutOfStock]);
        assert_eq!(manager.api().product_calls.load(Ordering::SeqCst), 0);
        assert!(manager.storage().get_item(KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_without_stock_record_is_refused() {
        let mut manager = manager(StubCatalog::default());

        manager.add_product(ProductId::new(42)).await;

        assert!(manager.cart().is_empty());
        assert_eq!(manager.notifier().take(), vec![Notice::OutOfStock]);
    }

    #[tokio::test]
    async fn test_add_catalog_failure_notifies_add_failed() {
        let catalog = StubCatalog::with(&[(1, 5)]);
        catalog.fail();
        let mut manager = manager(catalog);

        manager.add_product(ProductId::new(1)).await;

        assert!(manager.cart().is_empty());
        assert_eq!(manager.notifier().take(), vec![Notice::AddFailed]);
    }

    #[tokio::test]
    async fn test_add_missing_product_details_notifies_add_failed() {
        let catalog = StubCatalog::default();
        catalog.set_stock(9, 5);
        let mut manager = manager(catalog);

        manager.add_product(ProductId::new(9)).await;

        assert!(manager.cart().is_empty());
        assert_eq!(manager.notifier().take(), vec![Notice::AddFailed]);
    }

    #[tokio::test]
    async fn test_add_sees_live_stock() {
        let mut manager = manager(StubCatalog::with(&[(1, 1)]));

        manager.add_product(ProductId::new(1)).await;
        manager.add_product(ProductId::new(1)).await;
        assert_eq!(amount_of(&manager, 1), Some(1));

        manager.api().set_stock(1, 2);
        manager.add_product(ProductId::new(1)).await;
        assert_eq!(amount_of(&manager, 1), Some(2));
    }

    #[tokio::test]
    async fn test_try_add_reports_out_of_stock_details() {
        let mut manager = manager(StubCatalog::with(&[(1, 0)]));

        let err = manager.try_add_product(ProductId::new(1)).await.unwrap_err();

        assert!(matches!(
            err,
            CartError::OutOfStock {
                requested: 1,
                available: 0,
                ..
            }
        ));
        // try_* variants never notify
        assert!(manager.notifier().notices().is_empty());
    }

    // =========================================================================
    // remove_product
    // =========================================================================

    #[tokio::test]
    async fn test_remove_product() {
        let mut manager = manager(StubCatalog::with(&[(1, 5), (2, 5)]));
        manager.add_product(ProductId::new(1)).await;
        manager.add_product(ProductId::new(2)).await;

        manager.remove_product(ProductId::new(1));

        assert_eq!(amount_of(&manager, 1), None);
        assert_eq!(amount_of(&manager, 2), Some(1));
        assert_eq!(stored(&manager), *manager.cart());
        assert!(manager.notifier().notices().is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_product_notifies() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        manager.add_product(ProductId::new(1)).await;
        let before = manager.cart().clone();

        manager.remove_product(ProductId::new(7));

        assert_eq!(*manager.cart(), before);
        assert_eq!(manager.notifier().take(), vec![Notice::RemoveFailed]);
        assert!(matches!(
            manager.try_remove_product(ProductId::new(7)),
            Err(CartError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_last_product_persists_empty_cart() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        manager.add_product(ProductId::new(1)).await;

        manager.remove_product(ProductId::new(1));

        assert!(manager.cart().is_empty());
        assert_eq!(manager.storage().get_item(KEY).unwrap().as_deref(), Some("[]"));
    }

    // =========================================================================
    // update_product_amount
    // =========================================================================

    #[tokio::test]
    async fn test_update_amount_within_stock() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        manager.add_product(ProductId::new(1)).await;

        manager.update_product_amount(update(1, 5)).await;

        assert_eq!(amount_of(&manager, 1), Some(5));
        assert_eq!(stored(&manager), *manager.cart());
        assert!(manager.notifier().notices().is_empty());

        manager.update_product_amount(update(1, 2)).await;
        assert_eq!(amount_of(&manager, 1), Some(2));
    }

    #[tokio::test]
    async fn test_update_non_positive_amount_is_noop() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        manager.add_product(ProductId::new(1)).await;
        let calls_before = manager.api().stock_calls.load(Ordering::SeqCst);
        let before = manager.cart().clone();

        manager.update_product_amount(update(1, 0)).await;
        manager.update_product_amount(update(1, -3)).await;

        assert_eq!(*manager.cart(), before);
        assert!(manager.notifier().notices().is_empty());
        assert_eq!(
            manager.api().stock_calls.load(Ordering::SeqCst),
            calls_before
        );
    }

    #[tokio::test]
    async fn test_update_beyond_stock_is_refused() {
        let mut manager = manager(StubCatalog::with(&[(1, 3)]));
        manager.add_product(ProductId::new(1)).await;
        let before = manager.cart().clone();

        manager.update_product_amount(update(1, 4)).await;

        assert_eq!(*manager.cart(), before);
        assert_eq!(manager.notifier().take(), vec![Notice::OutOfStock]);
        assert_eq!(stored(&manager), before);
    }

    #[tokio::test]
    async fn test_update_without_stock_record_is_refused() {
        let storage = MemoryStorage::with_item(
            KEY,
            r#"[{"id":4,"title":"Tênis 4","price":99.9,"image":"4.jpg","amount":1}]"#,
        );
        let mut manager =
            CartManager::load(StubCatalog::default(), storage, MemoryNotifier::new(), KEY);

        manager.update_product_amount(update(4, 2)).await;

        assert_eq!(amount_of(&manager, 4), Some(1));
        assert_eq!(manager.notifier().take(), vec![Notice::OutOfStock]);
    }

    #[tokio::test]
    async fn test_update_absent_product_is_noop() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        let updates = manager.subscribe();

        manager.update_product_amount(update(1, 2)).await;
        let cart = manager.try_update_product_amount(update(1, 2)).await.unwrap();

        assert!(cart.is_empty());
        assert!(manager.cart().is_empty());
        assert!(manager.notifier().notices().is_empty());
        assert!(!updates.has_changed().unwrap());
        assert!(manager.storage().get_item(KEY).unwrap().is_none());
        assert_eq!(manager.api().stock_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_catalog_failure_notifies_update_failed() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        manager.add_product(ProductId::new(1)).await;
        manager.api().fail();

        manager.update_product_amount(update(1, 2)).await;

        assert_eq!(amount_of(&manager, 1), Some(1));
        assert_eq!(manager.notifier().take(), vec![Notice::UpdateFailed]);
    }

    #[tokio::test]
    async fn test_update_huge_amount_saturates() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        manager.add_product(ProductId::new(1)).await;

        let err = manager
            .try_update_product_amount(update(1, i64::MAX))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CartError::OutOfStock {
                requested: u32::MAX,
                available: 5,
                ..
            }
        ));
    }

    // =========================================================================
    // Persistence and observation
    // =========================================================================

    #[tokio::test]
    async fn test_storage_failure_leaves_state_unchanged() {
        let storage = FlakyStorage {
            inner: MemoryStorage::new(),
            ok_writes: 1,
        };
        let mut manager =
            CartManager::load(StubCatalog::with(&[(1, 5)]), storage, MemoryNotifier::new(), KEY);
        let updates = manager.subscribe();

        manager.add_product(ProductId::new(1)).await;
        let committed = manager.cart().clone();

        manager.add_product(ProductId::new(1)).await;

        assert_eq!(*manager.cart(), committed);
        assert_eq!(*updates.borrow(), committed);
        assert_eq!(manager.notifier().take(), vec![Notice::AddFailed]);
        assert_eq!(
            Cart::from_json(&manager.storage().get_item(KEY).unwrap().unwrap()).unwrap(),
            committed
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_snapshots() {
        let mut manager = manager(StubCatalog::with(&[(1, 5)]));
        let mut updates = manager.subscribe();
        assert!(updates.borrow().is_empty());

        manager.add_product(ProductId::new(1)).await;

        assert!(updates.has_changed().unwrap());
        let seen = updates.borrow_and_update().clone();
        assert_eq!(seen, *manager.cart());

        // Refused operations publish nothing
        manager.update_product_amount(update(1, 99)).await;
        assert!(!updates.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_reload_restores_committed_cart() {
        let mut manager = manager(StubCatalog::with(&[(1, 5), (2, 5)]));
        manager.add_product(ProductId::new(1)).await;
        manager.add_product(ProductId::new(2)).await;
        manager.update_product_amount(update(2, 4)).await;

        let storage = manager.storage().clone();
        let reloaded = CartManager::load(StubCatalog::default(), storage, MemoryNotifier::new(), KEY);

        assert_eq!(reloaded.cart(), manager.cart());
    }
}
