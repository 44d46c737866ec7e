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

//! # Credit Ledger
//!
//! This library tracks outlet credit accounts, settles invoices against that
//! credit, blocks and unblocks outlets automatically based on usage, and
//! reconciles stock distributions against on-hand inventory.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central ledger exposing every caller-facing operation
//! - [`Account`]: Outlet credit account with thresholds and history
//! - [`Catalog`]: Product stock with derived [`StockStatus`]
//! - [`Invoice`] / [`Distribution`]: Settlement and fulfillment documents
//! - [`DocumentStore`] / [`ActivitySink`]: Persistence and notification collaborators
//! - [`LedgerError`]: Error types for ledger operations
//!
//! ## Example
//!
//! ```
//! use credit_ledger_rs::{
//!     Engine, LineRequest, ManagerId, NewInvoice, NewOutlet, NewProduct, OutletStatus,
//!     OutletType, PaymentType, StoreId,
//! };
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let outlet = engine
//!     .register_outlet(NewOutlet {
//!         name: "Corner Mart".into(),
//!         outlet_type: OutletType::Official,
//!         credit_limit: dec!(1000),
//!     })
//!     .unwrap();
//! let product = engine
//!     .register_product(NewProduct {
//!         name: "Rice 5kg".into(),
//!         sku: "RICE-5".into(),
//!         price: dec!(250),
//!         stock: 40,
//!         min_stock: 5,
//!     })
//!     .unwrap();
//!
//! let invoice = engine
//!     .create_invoice(NewInvoice {
//!         outlet_id: outlet.id,
//!         manager_id: ManagerId(1),
//!         store_id: StoreId(1),
//!         payment_type: PaymentType::Credit,
//!         products: vec![LineRequest { product_id: product.id, quantity: 4 }],
//!         date: None,
//!     })
//!     .unwrap();
//!
//! // 4 x 250 uses the whole limit: the invoice is approved and the outlet blocked.
//! let settled = engine.approve_invoice(invoice.id).unwrap();
//! assert!(settled.warning.is_some());
//! assert_eq!(engine.outlet(outlet.id).unwrap().status, OutletStatus::Blocked);
//! ```
//!
//! ## Thread Safety
//!
//! Outlets, products and documents are locked individually, so operations on
//! different outlets proceed in parallel while each operation stays atomic.

pub mod account;
pub mod activity;
mod base;
pub mod catalog;
pub mod distribution;
mod engine;
pub mod error;
pub mod invoice;
pub mod store;

pub use account::{
    Account, BLOCK_THRESHOLD, ChargeOutcome, CreditEntry, CreditHealth, CreditOutcome,
    CreditWarning, EntryKind, NewOutlet, OutletRecord, OutletStatus, OutletType,
    WARNING_THRESHOLD,
};
pub use activity::{Activity, ActivityFeed, ActivityKind, ActivitySink, TracingActivitySink};
pub use base::{DistributionId, InvoiceId, ManagerId, OutletId, ProductId, StoreId};
pub use catalog::{Catalog, NewProduct, Product, StockStatus};
pub use distribution::{Distribution, DistributionStatus, NewDistribution};
pub use engine::{DEFAULT_ACTOR, Engine, Settled};
pub use error::{LedgerError, StoreError};
pub use invoice::{Invoice, InvoiceStatus, LineItem, LineRequest, NewInvoice, PaymentType};
pub use store::{Collection, DocumentStore, JsonFileStore, MemoryStore};
