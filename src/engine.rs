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

//! Ledger engine.
//!
//! The [`Engine`] is the central component that owns outlet credit accounts,
//! the stock catalog, invoices and distributions, and exposes the
//! caller-facing operations over them.
//!
//! # Operations
//!
//! - **Credit**: charge, payment, manual block and unblock.
//! - **Invoices**: create, approve (charges credit for Credit invoices), reject.
//! - **Distributions**: create (deducts stock, charges credit for Credit
//!   distributions), advance status, delete while still pending.
//!
//! # Thread Safety
//!
//! Entities are kept in [`DashMap`]s of `Arc`-wrapped, individually locked
//! values. Handles are cloned out of the maps before any entity lock is
//! taken, and locks are always acquired in the order
//! document → outlet → products (ascending id), so concurrent operations
//! cannot deadlock.
//!
//! Persistence and activity notifications run after every entity lock has
//! been released.

use crate::account::{
    Account, CreditHealth, CreditWarning, EntryKind, NewOutlet, OutletRecord, OutletStatus,
};
use crate::activity::{Activity, ActivityKind, ActivitySink, TracingActivitySink};
use crate::base::{DistributionId, InvoiceId, OutletId, ProductId};
use crate::catalog::{Catalog, NewProduct, Product, StockStatus};
use crate::distribution::{Distribution, DistributionStatus, NewDistribution};
use crate::error::LedgerError;
use crate::invoice::{Invoice, InvoiceStatus, LineItem, NewInvoice, validate_lines};
use crate::store::{Collection, DocumentStore, MemoryStore, decode, encode};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

/// Actor recorded on activities when none is configured.
pub const DEFAULT_ACTOR: &str = "system";

/// An updated entity together with the credit advisory its operation raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T> {
    pub entity: T,
    pub warning: Option<CreditWarning>,
}

/// Credit and fulfillment ledger.
///
/// # Invariants
///
/// - An outlet is Blocked iff it has both a block timestamp and a reason.
/// - `credit_used` never goes negative and only moves through charges,
///   payments and reversals.
/// - Invoices leave Pending at most once.
/// - Distributions only move Pending → In Transit → Completed.
/// - Stock is deducted only after every line of a distribution has been validated.
pub struct Engine {
    outlets: DashMap<OutletId, Arc<Account>>,
    catalog: Catalog,
    invoices: DashMap<InvoiceId, Arc<Mutex<Invoice>>>,
    distributions: DashMap<DistributionId, Arc<Mutex<Distribution>>>,
    next_outlet: AtomicU32,
    next_product: AtomicU32,
    next_invoice: AtomicU32,
    next_distribution: AtomicU32,
    next_payment: AtomicU32,
    store: Arc<dyn DocumentStore>,
    activity: Arc<dyn ActivitySink>,
    actor: String,
    /// Serializes collection saves so the last writer saves the latest state.
    persist_lock: Mutex<()>,
}

impl Engine {
    /// Creates an empty engine backed by a [`MemoryStore`] that logs activities.
    pub fn new() -> Self {
        Self::with_collaborators(Arc::new(MemoryStore::new()), Arc::new(TracingActivitySink))
    }

    /// Creates an empty engine with the given persistence and activity collaborators.
    pub fn with_collaborators(
        store: Arc<dyn DocumentStore>,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        Engine {
            outlets: DashMap::new(),
            catalog: Catalog::new(),
            invoices: DashMap::new(),
            distributions: DashMap::new(),
            next_outlet: AtomicU32::new(1),
            next_product: AtomicU32::new(1),
            next_invoice: AtomicU32::new(1),
            next_distribution: AtomicU32::new(1),
            next_payment: AtomicU32::new(1),
            store,
            activity,
            actor: DEFAULT_ACTOR.to_string(),
            persist_lock: Mutex::new(()),
        }
    }

    /// Loads every collection from `store` and resumes id allocation after
    /// the highest id found.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Persistence`] if a collection cannot be loaded or decoded.
    /// - [`LedgerError::DuplicateSku`] if the stored catalog reuses a SKU.
    pub fn open(
        store: Arc<dyn DocumentStore>,
        activity: Arc<dyn ActivitySink>,
    ) -> Result<Self, LedgerError> {
        let engine = Self::with_collaborators(Arc::clone(&store), activity);

        let outlets: Vec<OutletRecord> = decode(store.load(Collection::Outlets)?)?;
        let products: Vec<Product> = decode(store.load(Collection::Products)?)?;
        let invoices: Vec<Invoice> = decode(store.load(Collection::Invoices)?)?;
        let distributions: Vec<Distribution> = decode(store.load(Collection::Distributions)?)?;

        let last_payment = outlets
            .iter()
            .flat_map(|outlet| outlet.credit_history.iter())
            .filter(|entry| entry.kind == EntryKind::Payment)
            .filter_map(|entry| entry.reference_id.strip_prefix("PAY-")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        engine.next_payment.store(last_payment + 1, Ordering::SeqCst);

        resume_after(&engine.next_outlet, outlets.iter().map(|o| o.id.0));
        resume_after(&engine.next_product, products.iter().map(|p| p.id.0));
        resume_after(&engine.next_invoice, invoices.iter().map(|i| i.id.0));
        resume_after(&engine.next_distribution, distributions.iter().map(|d| d.id.0));

        for outlet in outlets {
            engine.outlets.insert(outlet.id, Arc::new(Account::from_record(outlet)));
        }
        for product in products {
            engine.catalog.restore(product)?;
        }
        for invoice in invoices {
            engine.invoices.insert(invoice.id, Arc::new(Mutex::new(invoice)));
        }
        for distribution in distributions {
            engine
                .distributions
                .insert(distribution.id, Arc::new(Mutex::new(distribution)));
        }

        info!(
            outlets = engine.outlets.len(),
            products = engine.catalog.len(),
            invoices = engine.invoices.len(),
            distributions = engine.distributions.len(),
            "ledger loaded"
        );
        Ok(engine)
    }

    /// Sets the actor name recorded on activities.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    // === Registration ===

    /// Registers a new, active outlet with zero credit used.
    pub fn register_outlet(&self, new: NewOutlet) -> Result<OutletRecord, LedgerError> {
        new.validate()?;
        let id = OutletId(self.next_outlet.fetch_add(1, Ordering::SeqCst));
        let account = Account::new(id, new.name.trim(), new.outlet_type, new.credit_limit);
        let record = account.snapshot();
        self.outlets.insert(id, Arc::new(account));

        self.persist(&[Collection::Outlets])?;
        self.notify(
            ActivityKind::OutletRegistered,
            format!("Outlet {} registered with credit limit {}", record.name, record.credit_limit),
        );
        Ok(record)
    }

    /// Adds a product to the catalog.
    pub fn register_product(&self, new: NewProduct) -> Result<Product, LedgerError> {
        let id = ProductId(self.next_product.fetch_add(1, Ordering::SeqCst));
        let product = self.catalog.insert(id, new)?;
        self.persist(&[Collection::Products])?;
        Ok(product)
    }

    /// Changes an outlet's credit limit without touching its usage or status.
    pub fn update_credit_limit(
        &self,
        outlet_id: OutletId,
        credit_limit: Decimal,
    ) -> Result<OutletRecord, LedgerError> {
        let account = self.account(outlet_id)?;
        account.update_credit_limit(credit_limit)?;
        self.persist(&[Collection::Outlets])?;
        Ok(account.snapshot())
    }

    /// Adds received stock to a product.
    pub fn restock_product(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Product, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::validation("restock quantity must be at least 1"));
        }
        let mut updated = self.catalog.restock(&[(product_id, quantity)])?;
        self.persist(&[Collection::Products])?;
        let product = updated.pop().ok_or(LedgerError::ProductNotFound(product_id))?;
        self.notify(
            ActivityKind::StockRestocked,
            format!("{} restocked by {quantity} to {}", product.name, product.stock),
        );
        Ok(product)
    }

    // === Credit Account Ledger ===

    /// Charges an outlet directly on behalf of an invoice or distribution.
    ///
    /// Over-limit charges complete and then block the outlet.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::OutletNotFound`] for an unknown outlet.
    /// - [`LedgerError::Validation`] for a negative amount or a non-charge `kind`.
    pub fn charge_credit(
        &self,
        outlet_id: OutletId,
        kind: EntryKind,
        reference_id: impl Into<String>,
        amount: Decimal,
    ) -> Result<Settled<OutletRecord>, LedgerError> {
        let reference_id = reference_id.into();
        let account = self.account(outlet_id)?;
        let outcome = account.charge(kind, reference_id.clone(), amount, self.now())?;
        let record = account.snapshot();

        self.persist(&[Collection::Outlets])?;
        self.notify(
            ActivityKind::CreditCharged,
            format!("{} charged {amount} for {reference_id}", record.name),
        );
        self.notify_charge(&record, outcome.warning, outcome.newly_blocked);
        Ok(Settled {
            entity: record,
            warning: outcome.warning,
        })
    }

    /// Applies a payment, clamping credit used at zero.
    pub fn credit_payment(
        &self,
        outlet_id: OutletId,
        amount: Decimal,
    ) -> Result<OutletRecord, LedgerError> {
        let account = self.account(outlet_id)?;
        let reference_id = self.next_payment_reference();
        let outcome = account.credit(reference_id, amount, self.now())?;
        self.finish_payment(&account, amount, outcome.unblocked)
    }

    /// Records a payment against an outlet.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::OutletNotFound`] for an unknown outlet.
    /// - [`LedgerError::Validation`] if `amount` is not positive.
    /// - [`LedgerError::Overpayment`] if `amount` exceeds the credit used.
    pub fn receive_payment(
        &self,
        outlet_id: OutletId,
        amount: Decimal,
    ) -> Result<OutletRecord, LedgerError> {
        let account = self.account(outlet_id)?;
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation("payment amount must be positive"));
        }
        let reference_id = self.next_payment_reference();
        let outcome = account.receive_payment(reference_id, amount, self.now())?;
        self.finish_payment(&account, amount, outcome.unblocked)
    }

    /// Blocks an active outlet by hand.
    pub fn block_outlet(
        &self,
        outlet_id: OutletId,
        reason: impl Into<String>,
    ) -> Result<OutletRecord, LedgerError> {
        let account = self.account(outlet_id)?;
        account.block(reason, self.now())?;
        let record = account.snapshot();

        self.persist(&[Collection::Outlets])?;
        self.notify(
            ActivityKind::OutletBlocked,
            format!(
                "{} blocked: {}",
                record.name,
                record.blocked_reason.as_deref().unwrap_or_default()
            ),
        );
        Ok(record)
    }

    /// Unblocks a blocked outlet, whatever its current usage.
    pub fn unblock_outlet(&self, outlet_id: OutletId) -> Result<OutletRecord, LedgerError> {
        let account = self.account(outlet_id)?;
        account.unblock()?;
        let record = account.snapshot();

        self.persist(&[Collection::Outlets])?;
        self.notify(ActivityKind::OutletUnblocked, format!("{} unblocked", record.name));
        Ok(record)
    }

    // === Invoice Settlement ===

    /// Raises a pending invoice. Stock and credit are untouched until approval.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for an empty line list or a zero quantity.
    /// - [`LedgerError::OutletNotFound`] / [`LedgerError::ProductNotFound`] for unknown references.
    pub fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, LedgerError> {
        validate_lines(&new.products)?;
        let account = self.account(new.outlet_id)?;
        let lines = new
            .products
            .iter()
            .map(|line| {
                let product = self
                    .catalog
                    .get(&line.product_id)
                    .ok_or(LedgerError::ProductNotFound(line.product_id))?;
                LineItem::priced(&product, line.quantity)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let id = InvoiceId(self.next_invoice.fetch_add(1, Ordering::SeqCst));
        let date = new.date.unwrap_or_else(|| self.now());
        let invoice = Invoice::new(id, account.name(), &new, lines, date)?;
        self.invoices.insert(id, Arc::new(Mutex::new(invoice.clone())));

        self.persist(&[Collection::Invoices])?;
        self.notify(
            ActivityKind::InvoiceCreated,
            format!("Invoice {id} raised for {} ({})", invoice.outlet_name, invoice.total_amount),
        );
        Ok(invoice)
    }

    /// Approves a pending invoice.
    ///
    /// Credit invoices charge the outlet first; if that pushes usage past the
    /// limit the outlet is blocked and the invoice is still approved.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvoiceNotFound`] for an unknown invoice.
    /// - [`LedgerError::AlreadyFinalized`] unless the invoice is pending.
    /// - [`LedgerError::OutletBlocked`] for a credit invoice whose outlet is blocked.
    pub fn approve_invoice(&self, invoice_id: InvoiceId) -> Result<Settled<Invoice>, LedgerError> {
        let handle = self.invoice_handle(invoice_id)?;
        let mut invoice = handle.lock();
        invoice.ensure_pending()?;

        let outcome = if invoice.is_credit() {
            let account = self.account(invoice.outlet_id)?;
            Some(account.charge_if_active(
                EntryKind::Invoice,
                invoice.id.to_string(),
                invoice.total_amount,
                self.now(),
            )?)
        } else {
            None
        };
        invoice.finalize(InvoiceStatus::Approved)?;
        let approved = invoice.clone();
        drop(invoice);

        info!(
            invoice = %approved.id,
            outlet = %approved.outlet_id,
            total = %approved.total_amount,
            "invoice approved"
        );
        if outcome.is_some() {
            self.persist(&[Collection::Outlets, Collection::Invoices])?;
        } else {
            self.persist(&[Collection::Invoices])?;
        }

        self.notify(
            ActivityKind::InvoiceApproved,
            format!(
                "Invoice {} for {} approved ({})",
                approved.id, approved.outlet_name, approved.total_amount
            ),
        );
        let warning = outcome.and_then(|o| o.warning);
        if let Some(outcome) = outcome {
            if let Some(record) = self.outlet(approved.outlet_id) {
                self.notify_charge(&record, outcome.warning, outcome.newly_blocked);
            }
        }
        Ok(Settled {
            entity: approved,
            warning,
        })
    }

    /// Rejects a pending invoice. Credit and stock are never touched.
    pub fn reject_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, LedgerError> {
        let handle = self.invoice_handle(invoice_id)?;
        let rejected = {
            let mut invoice = handle.lock();
            invoice.finalize(InvoiceStatus::Rejected)?;
            invoice.clone()
        };

        info!(invoice = %rejected.id, outlet = %rejected.outlet_id, "invoice rejected");
        self.persist(&[Collection::Invoices])?;
        self.notify(
            ActivityKind::InvoiceRejected,
            format!("Invoice {} for {} rejected", rejected.id, rejected.outlet_name),
        );
        Ok(rejected)
    }

    // === Distribution Fulfillment ===

    /// Creates a distribution, deducting stock and charging credit when the
    /// payment type is Credit.
    ///
    /// Validation (lines, discount, outlet status, stock levels) completes
    /// before anything is mutated.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for empty lines, zero quantities, overflowing
    ///   totals or a discount outside `0..=100`.
    /// - [`LedgerError::OutletNotFound`] / [`LedgerError::ProductNotFound`] for unknown references.
    /// - [`LedgerError::OutletBlocked`] for a credit distribution to a blocked outlet.
    /// - [`LedgerError::InsufficientStock`] if any product falls short.
    pub fn create_distribution(
        &self,
        new: NewDistribution,
    ) -> Result<Settled<Distribution>, LedgerError> {
        new.validate()?;
        let account = self.account(new.outlet_id)?;
        let id = DistributionId(self.next_distribution.fetch_add(1, Ordering::SeqCst));
        let now = self.now();
        let date = new.date.unwrap_or(now);
        let quantities: Vec<(ProductId, u32)> = new
            .products
            .iter()
            .map(|line| (line.product_id, line.quantity))
            .collect();

        let (distribution, outcome, outlet_name) = {
            let mut outlet = account.lock();
            if new.payment_type.is_credit() && outlet.status == OutletStatus::Blocked {
                return Err(LedgerError::OutletBlocked(outlet.id));
            }

            let deducted = self.catalog.deduct(&quantities)?;
            let prices: HashMap<ProductId, &Product> = deducted.iter().map(|p| (p.id, p)).collect();
            let built = new
                .products
                .iter()
                .filter_map(|line| {
                    prices
                        .get(&line.product_id)
                        .map(|product| LineItem::priced(product, line.quantity))
                })
                .collect::<Result<Vec<_>, _>>()
                .and_then(|lines| Distribution::new(id, outlet.name.clone(), &new, lines, date));
            let distribution = match built {
                Ok(distribution) => distribution,
                Err(err) => {
                    self.catalog.restock(&quantities)?;
                    return Err(err);
                }
            };
            let outcome = if distribution.is_credit() {
                // The kind is a charge kind and the discounted total is never negative.
                Some(outlet.charge(
                    EntryKind::Distribution,
                    id.to_string(),
                    distribution.total_value,
                    now,
                )?)
            } else {
                None
            };

            for product in &deducted {
                if product.status() != StockStatus::InStock {
                    debug!(
                        product = %product.id,
                        stock = product.stock,
                        status = %product.status(),
                        "stock running low"
                    );
                }
            }

            self.distributions
                .insert(id, Arc::new(Mutex::new(distribution.clone())));
            (distribution, outcome, outlet.name.clone())
        };

        info!(
            distribution = %distribution.id,
            outlet = %distribution.outlet_id,
            items = distribution.total_items,
            total = %distribution.total_value,
            "distribution created"
        );
        self.persist(&[Collection::Products, Collection::Outlets, Collection::Distributions])?;
        self.notify(
            ActivityKind::DistributionCreated,
            format!(
                "Distribution {} of {} items to {outlet_name} ({})",
                distribution.id, distribution.total_items, distribution.total_value
            ),
        );

        let warning = outcome.and_then(|o| o.warning);
        if let Some(outcome) = outcome {
            if let Some(record) = self.outlet(distribution.outlet_id) {
                self.notify_charge(&record, outcome.warning, outcome.newly_blocked);
            }
        }
        Ok(Settled {
            entity: distribution,
            warning,
        })
    }

    /// Moves a distribution one step forward.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DistributionNotFound`] for an unknown distribution.
    /// - [`LedgerError::InvalidTransition`] unless `target` directly follows the current state.
    pub fn advance_distribution_status(
        &self,
        distribution_id: DistributionId,
        target: DistributionStatus,
    ) -> Result<Distribution, LedgerError> {
        let handle = self.distribution_handle(distribution_id)?;
        let advanced = {
            let mut distribution = handle.lock();
            self.ensure_live(distribution_id)?;
            distribution.advance(target)?;
            distribution.clone()
        };

        info!(distribution = %advanced.id, status = %advanced.status, "distribution advanced");
        self.persist(&[Collection::Distributions])?;
        self.notify(
            ActivityKind::DistributionAdvanced,
            format!("Distribution {} is now {}", advanced.id, advanced.status),
        );
        Ok(advanced)
    }

    /// Deletes a pending distribution, returning its stock to the catalog and
    /// reversing its credit charge.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DistributionNotFound`] for an unknown distribution.
    /// - [`LedgerError::InvalidTransition`] once the distribution has left Pending.
    pub fn delete_distribution(
        &self,
        distribution_id: DistributionId,
    ) -> Result<Distribution, LedgerError> {
        let handle = self.distribution_handle(distribution_id)?;
        let (deleted, unblocked, outlet_name) = {
            let distribution = handle.lock();
            self.ensure_live(distribution_id)?;
            if distribution.status != DistributionStatus::Pending {
                return Err(LedgerError::transition(
                    distribution.id,
                    distribution.status,
                    "Deleted",
                ));
            }

            let account = self.account(distribution.outlet_id)?;
            let mut outlet = account.lock();
            self.catalog.restock(&distribution.quantities())?;
            let mut unblocked = false;
            if distribution.is_credit() && distribution.total_value > Decimal::ZERO {
                unblocked = outlet
                    .credit(
                        EntryKind::Reversal,
                        distribution.id.to_string(),
                        distribution.total_value,
                        self.now(),
                    )?
                    .unblocked;
            }
            let outlet_name = outlet.name.clone();
            drop(outlet);

            self.distributions.remove(&distribution_id);
            (distribution.clone(), unblocked, outlet_name)
        };

        info!(
            distribution = %deleted.id,
            outlet = %deleted.outlet_id,
            unblocked,
            "distribution deleted and reversed"
        );
        self.persist(&[Collection::Products, Collection::Outlets, Collection::Distributions])?;
        self.notify(
            ActivityKind::DistributionDeleted,
            format!("Distribution {} deleted, stock returned", deleted.id),
        );
        if unblocked {
            self.notify(
                ActivityKind::OutletUnblocked,
                format!("{outlet_name} unblocked after distribution {} was reversed", deleted.id),
            );
        }
        Ok(deleted)
    }

    // === Queries ===

    pub fn outlet(&self, outlet_id: OutletId) -> Option<OutletRecord> {
        self.account(outlet_id).ok().map(|account| account.snapshot())
    }

    /// Returns all outlets ordered by id.
    pub fn outlets(&self) -> Vec<OutletRecord> {
        let accounts: Vec<Arc<Account>> =
            self.outlets.iter().map(|e| Arc::clone(e.value())).collect();
        let mut records: Vec<OutletRecord> = accounts.iter().map(|a| a.snapshot()).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn product(&self, product_id: ProductId) -> Option<Product> {
        self.catalog.get(&product_id)
    }

    /// Returns all products ordered by id.
    pub fn products(&self) -> Vec<Product> {
        self.catalog.all()
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> Option<Invoice> {
        self.invoice_handle(invoice_id).ok().map(|handle| handle.lock().clone())
    }

    /// Returns all invoices ordered by id.
    pub fn invoices(&self) -> Vec<Invoice> {
        let handles: Vec<_> = self.invoices.iter().map(|e| Arc::clone(e.value())).collect();
        let mut invoices: Vec<Invoice> = handles.iter().map(|h| h.lock().clone()).collect();
        invoices.sort_by_key(|i| i.id);
        invoices
    }

    pub fn distribution(&self, distribution_id: DistributionId) -> Option<Distribution> {
        self.distribution_handle(distribution_id)
            .ok()
            .map(|handle| handle.lock().clone())
    }

    /// Returns all distributions ordered by id.
    pub fn distributions(&self) -> Vec<Distribution> {
        let handles: Vec<_> = self.distributions.iter().map(|e| Arc::clone(e.value())).collect();
        let mut distributions: Vec<Distribution> =
            handles.iter().map(|h| h.lock().clone()).collect();
        distributions.sort_by_key(|d| d.id);
        distributions
    }

    /// Products at or below their minimum stock.
    pub fn low_stock_products(&self) -> Vec<Product> {
        self.products()
            .into_iter()
            .filter(|p| p.status() != StockStatus::InStock)
            .collect()
    }

    /// Outlets at or above the warning threshold.
    pub fn outlets_near_limit(&self) -> Vec<OutletRecord> {
        self.outlets()
            .into_iter()
            .filter(|o| o.health() != CreditHealth::Healthy)
            .collect()
    }

    // === Internals ===

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn account(&self, outlet_id: OutletId) -> Result<Arc<Account>, LedgerError> {
        self.outlets
            .get(&outlet_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::OutletNotFound(outlet_id))
    }

    fn invoice_handle(&self, invoice_id: InvoiceId) -> Result<Arc<Mutex<Invoice>>, LedgerError> {
        self.invoices
            .get(&invoice_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::InvoiceNotFound(invoice_id))
    }

    fn distribution_handle(
        &self,
        distribution_id: DistributionId,
    ) -> Result<Arc<Mutex<Distribution>>, LedgerError> {
        self.distributions
            .get(&distribution_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::DistributionNotFound(distribution_id))
    }

    /// Guards against a handle whose distribution was deleted while we waited for its lock.
    fn ensure_live(&self, distribution_id: DistributionId) -> Result<(), LedgerError> {
        if self.distributions.contains_key(&distribution_id) {
            Ok(())
        } else {
            Err(LedgerError::DistributionNotFound(distribution_id))
        }
    }

    fn next_payment_reference(&self) -> String {
        format!("PAY-{}", self.next_payment.fetch_add(1, Ordering::SeqCst))
    }

    fn finish_payment(
        &self,
        account: &Account,
        amount: Decimal,
        unblocked: bool,
    ) -> Result<OutletRecord, LedgerError> {
        let record = account.snapshot();
        self.persist(&[Collection::Outlets])?;
        self.notify(
            ActivityKind::PaymentReceived,
            format!("Payment of {amount} received from {}", record.name),
        );
        if unblocked {
            self.notify(
                ActivityKind::OutletUnblocked,
                format!("{} unblocked after payment", record.name),
            );
        }
        Ok(record)
    }

    fn notify_charge(
        &self,
        record: &OutletRecord,
        warning: Option<CreditWarning>,
        newly_blocked: bool,
    ) {
        if newly_blocked {
            self.notify(
                ActivityKind::OutletBlocked,
                format!(
                    "{} blocked: {}",
                    record.name,
                    record.blocked_reason.as_deref().unwrap_or_default()
                ),
            );
        } else if let Some(warning) = warning {
            self.notify(ActivityKind::CreditWarning, format!("{}: {warning}", record.name));
        }
    }

    fn notify(&self, kind: ActivityKind, description: String) {
        self.activity.record(Activity {
            kind,
            description,
            timestamp: self.now(),
            actor: self.actor.clone(),
        });
    }

    /// Saves the given collections. Must be called with no entity lock held.
    fn persist(&self, collections: &[Collection]) -> Result<(), LedgerError> {
        let _guard = self.persist_lock.lock();
        for collection in collections {
            let records = match collection {
                Collection::Outlets => encode(&self.outlets())?,
                Collection::Products => encode(&self.products())?,
                Collection::Invoices => encode(&self.invoices())?,
                Collection::Distributions => encode(&self.distributions())?,
            };
            self.store.save(*collection, records)?;
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn resume_after(counter: &AtomicU32, ids: impl Iterator<Item = u32>) {
    let next = ids.max().map_or(1, |max| max + 1);
    counter.store(next, Ordering::SeqCst);
}
