// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Stock catalog.
//!
//! Holds products with their price and on-hand quantity. Stock status is
//! always derived from `stock` and `min_stock`, never stored.
//!
//! # Example
//!
//! ```
//! use credit_ledger_rs::{Catalog, NewProduct, ProductId, StockStatus};
//! use rust_decimal_macros::dec;
//!
//! let catalog = Catalog::new();
//! catalog
//!     .insert(ProductId(1), NewProduct {
//!         name: "Rice 5kg".into(),
//!         sku: "RICE-5".into(),
//!         price: dec!(12.50),
//!         stock: 45,
//!         min_stock: 10,
//!     })
//!     .unwrap();
//!
//! catalog.deduct(&[(ProductId(1), 40)]).unwrap();
//! assert_eq!(catalog.get(&ProductId(1)).unwrap().status(), StockStatus::LowStock);
//! ```

use crate::base::ProductId;
use crate::error::LedgerError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Availability bucket derived from a product's stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InStock => "In Stock",
            Self::LowStock => "Low Stock",
            Self::OutOfStock => "Out of Stock",
        };
        f.write_str(label)
    }
}

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub stock: u32,
    pub min_stock: u32,
}

impl Product {
    pub fn status(&self) -> StockStatus {
        if self.stock == 0 {
            StockStatus::OutOfStock
        } else if self.stock <= self.min_stock {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Registration data for a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub stock: u32,
    pub min_stock: u32,
}

impl NewProduct {
    fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("product name is required"));
        }
        if self.sku.trim().is_empty() {
            return Err(LedgerError::validation("product SKU is required"));
        }
        if self.price <= Decimal::ZERO {
            return Err(LedgerError::validation("product price must be positive"));
        }
        Ok(())
    }
}

/// Thread-safe product catalog.
///
/// Each product sits behind its own [`Mutex`]. Operations spanning several
/// products lock them in ascending [`ProductId`] order.
#[derive(Debug, Default)]
pub struct Catalog {
    products: DashMap<ProductId, Arc<Mutex<Product>>>,
    /// SKU index for uniqueness checks.
    skus: DashMap<String, ProductId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a product under the given id.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for an empty name/SKU or a non-positive price.
    /// - [`LedgerError::DuplicateSku`] if the SKU is already taken.
    pub fn insert(&self, id: ProductId, new: NewProduct) -> Result<Product, LedgerError> {
        new.validate()?;
        let sku = new.sku.trim().to_string();

        match self.skus.entry(sku.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateSku(sku)),
            Entry::Vacant(entry) => {
                entry.insert(id);
                let product = Product {
                    id,
                    name: new.name.trim().to_string(),
                    sku,
                    price: new.price,
                    stock: new.stock,
                    min_stock: new.min_stock,
                };
                self.products
                    .insert(id, Arc::new(Mutex::new(product.clone())));
                Ok(product)
            }
        }
    }

    /// Puts a previously persisted product back into the catalog.
    pub(crate) fn restore(&self, product: Product) -> Result<(), LedgerError> {
        match self.skus.entry(product.sku.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateSku(product.sku)),
            Entry::Vacant(entry) => {
                entry.insert(product.id);
                self.products
                    .insert(product.id, Arc::new(Mutex::new(product)));
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &ProductId) -> Option<Product> {
        self.handle(id).map(|product| product.lock().clone())
    }

    /// Returns all products ordered by id.
    pub fn all(&self) -> Vec<Product> {
        let handles: Vec<_> = self
            .products
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut products: Vec<Product> = handles.iter().map(|p| p.lock().clone()).collect();
        products.sort_by_key(|p| p.id);
        products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Deducts stock for every requested line as one atomic step.
    ///
    /// Quantities for the same product are summed before checking. Nothing is
    /// deducted unless every line can be satisfied.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ProductNotFound`] for an unknown product.
    /// - [`LedgerError::InsufficientStock`] naming the first product that falls short.
    pub fn deduct(&self, lines: &[(ProductId, u32)]) -> Result<Vec<Product>, LedgerError> {
        let wanted = aggregate(lines);
        let handles = self.handles(wanted.keys())?;
        let mut guards = lock_all(&handles);

        for (guard, requested) in guards.iter().zip(wanted.values()) {
            if *requested > guard.stock {
                return Err(LedgerError::InsufficientStock {
                    product: guard.name.clone(),
                    available: guard.stock,
                    requested: *requested,
                });
            }
        }

        for (guard, requested) in guards.iter_mut().zip(wanted.values()) {
            guard.stock -= *requested;
            debug!(
                product = %guard.id,
                quantity = requested,
                remaining = guard.stock,
                status = %guard.status(),
                "stock deducted"
            );
        }

        Ok(guards.iter().map(|guard| (**guard).clone()).collect())
    }

    /// Returns stock for every line as one atomic step.
    pub fn restock(&self, lines: &[(ProductId, u32)]) -> Result<Vec<Product>, LedgerError> {
        let wanted = aggregate(lines);
        let handles = self.handles(wanted.keys())?;
        let mut guards = lock_all(&handles);

        for (guard, quantity) in guards.iter().zip(wanted.values()) {
            if guard.stock.checked_add(*quantity).is_none() {
                return Err(LedgerError::validation(format!(
                    "stock overflow for {}",
                    guard.name
                )));
            }
        }

        for (guard, quantity) in guards.iter_mut().zip(wanted.values()) {
            guard.stock += *quantity;
            debug!(product = %guard.id, quantity, stock = guard.stock, "stock returned");
        }

        Ok(guards.iter().map(|guard| (**guard).clone()).collect())
    }

    fn handle(&self, id: &ProductId) -> Option<Arc<Mutex<Product>>> {
        self.products.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Clones the product handles out of the map so no shard lock is held
    /// while product mutexes are taken.
    fn handles<'a>(
        &self,
        ids: impl Iterator<Item = &'a ProductId>,
    ) -> Result<Vec<Arc<Mutex<Product>>>, LedgerError> {
        ids.map(|id| self.handle(id).ok_or(LedgerError::ProductNotFound(*id)))
            .collect()
    }
}

fn aggregate(lines: &[(ProductId, u32)]) -> BTreeMap<ProductId, u32> {
    let mut wanted = BTreeMap::new();
    for (id, quantity) in lines {
        let total = wanted.entry(*id).or_insert(0u32);
        *total = total.saturating_add(*quantity);
    }
    wanted
}

fn lock_all(handles: &[Arc<Mutex<Product>>]) -> Vec<MutexGuard<'_, Product>> {
    handles.iter().map(|handle| handle.lock()).collect()
}
