//! Immutable cart snapshots.
//!
//! A [`Cart`] never changes once built. Every operation returns a new
//! snapshot, so a snapshot handed to a view stays valid while the manager
//! moves on.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rocketshoes_core::{CurrencyCode, Price, ProductId};
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::api::Product;

/// A product plus the chosen quantity.
///
/// Serialized flat, product fields alongside `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    #[serde(flatten)]
    pub product: Product,
    pub amount: u32,
}

impl CartEntry {
    /// Entry for a product with quantity one.
    #[must_use]
    pub const fn new(product: Product) -> Self {
        Self { product, amount: 1 }
    }

    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product.id
    }

    /// Unit price times amount.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.product.price * Decimal::from(self.amount)
    }
}

/// Ordered list of cart entries, unique by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    entries: Arc<[CartEntry]>,
}

impl Cart {
    /// Empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_vec(entries: Vec<CartEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    /// Parse a stored cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON array of entries, if a
    /// product appears twice, or if any amount is zero.
    pub fn from_json(value: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<CartEntry> = serde_json::from_str(value)?;

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if entry.amount == 0 {
                return Err(serde_json::Error::custom(format!(
                    "product {} has zero amount",
                    entry.product_id()
                )));
            }
            if !seen.insert(entry.product_id()) {
                return Err(serde_json::Error::custom(format!(
                    "product {} listed twice",
                    entry.product_id()
                )));
            }
        }

        Ok(Self::from_vec(entries))
    }

    /// Serialize for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&*self.entries)
    }

    #[must_use]
    pub fn entries(&self) -> &[CartEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CartEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartEntry> {
        self.entries.iter().find(|e| e.product_id() == product_id)
    }

    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.get(product_id).is_some()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all amounts.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.amount)).sum()
    }

    /// Amount per product, for product list badges.
    #[must_use]
    pub fn amounts(&self) -> BTreeMap<ProductId, u32> {
        self.entries
            .iter()
            .map(|e| (e.product_id(), e.amount))
            .collect()
    }

    /// Sum of entry subtotals.
    #[must_use]
    pub fn total(&self, currency_code: CurrencyCode) -> Price {
        Price::new(
            self.entries.iter().map(CartEntry::subtotal).sum(),
            currency_code,
        )
    }

    // =========================================================================
    // Snapshot operations
    // =========================================================================

    /// Append a product with amount one.
    ///
    /// A product already in the cart is left untouched.
    #[must_use]
    pub fn with_new_entry(&self, product: Product) -> Self {
        if self.contains(product.id) {
            return self.clone();
        }
        let mut entries = self.entries.to_vec();
        entries.push(CartEntry::new(product));
        Self::from_vec(entries)
    }

    /// Raise a product's amount by one. `None` if it is not in the cart.
    #[must_use]
    pub fn with_incremented(&self, product_id: ProductId) -> Option<Self> {
        let amount = self.get(product_id)?.amount.saturating_add(1);
        self.with_amount(product_id, amount)
    }

    /// Replace a product's amount. `None` if it is not in the cart or the
    /// amount is zero.
    #[must_use]
    pub fn with_amount(&self, product_id: ProductId, amount: u32) -> Option<Self> {
        if amount == 0 || !self.contains(product_id) {
            return None;
        }
        Some(Self::from_vec(
            self.entries
                .iter()
                .map(|e| {
                    if e.product_id() == product_id {
                        CartEntry {
                            amount,
                            ..e.clone()
                        }
                    } else {
                        e.clone()
                    }
                })
                .collect(),
        ))
    }

    /// Drop a product. `None` if it is not in the cart.
    #[must_use]
    pub fn without(&self, product_id: ProductId) -> Option<Self> {
        if !self.contains(product_id) {
            return None;
        }
        Some(Self::from_vec(
            self.entries
                .iter()
                .filter(|e| e.product_id() != product_id)
                .cloned()
                .collect(),
        ))
    }
}

impl<'a> IntoIterator for &'a Cart {
    type Item = &'a CartEntry;
    type IntoIter = std::slice::Iter<'a, CartEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
