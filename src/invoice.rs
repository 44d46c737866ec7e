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

//! Invoices and the line items shared with distributions.
//!
//! Invoices follow a one-way state machine:
//! - [`Pending`](InvoiceStatus::Pending) → [`Approved`](InvoiceStatus::Approved):
//!   charges credit for Credit invoices.
//! - [`Pending`](InvoiceStatus::Pending) → [`Rejected`](InvoiceStatus::Rejected):
//!   no side effects.
//!
//! Both target states are terminal.

use crate::base::{InvoiceId, ManagerId, OutletId, ProductId, StoreId};
use crate::catalog::Product;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Paid,
    Credit,
}

impl PaymentType {
    pub fn is_credit(self) -> bool {
        self == Self::Credit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        };
        f.write_str(label)
    }
}

/// Requested product and quantity, as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Priced document line. The price is captured from the catalog when the
/// document is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
    pub line_total: Decimal,
}

impl LineItem {
    /// Prices `quantity` units of `product` at its current catalog price.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] if the line total overflows.
    pub fn priced(product: &Product, quantity: u32) -> Result<Self, LedgerError> {
        let line_total = product
            .price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| {
                LedgerError::validation(format!("line total for {} overflows", product.id))
            })?;
        Ok(Self {
            product_id: product.id,
            quantity,
            price: product.price,
            line_total,
        })
    }
}

/// Rejects empty line lists, zero quantities and item counts that overflow.
pub(crate) fn validate_lines(lines: &[LineRequest]) -> Result<(), LedgerError> {
    if lines.is_empty() {
        return Err(LedgerError::validation("at least one product line is required"));
    }
    if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
        return Err(LedgerError::validation(format!(
            "quantity for {} must be at least 1",
            line.product_id
        )));
    }
    lines
        .iter()
        .try_fold(0u32, |total, line| total.checked_add(line.quantity))
        .ok_or_else(|| LedgerError::validation("total quantity is too large"))?;
    Ok(())
}

pub(crate) fn subtotal(lines: &[LineItem]) -> Result<Decimal, LedgerError> {
    lines
        .iter()
        .try_fold(Decimal::ZERO, |total, line| total.checked_add(line.line_total))
        .ok_or_else(|| LedgerError::validation("document total overflows"))
}

pub(crate) fn total_items(lines: &[LineItem]) -> Result<u32, LedgerError> {
    lines
        .iter()
        .try_fold(0u32, |total, line| total.checked_add(line.quantity))
        .ok_or_else(|| LedgerError::validation("total quantity is too large"))
}

/// Request to raise a new invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub outlet_id: OutletId,
    pub manager_id: ManagerId,
    pub store_id: StoreId,
    pub payment_type: PaymentType,
    pub products: Vec<LineRequest>,
    /// Defaults to the creation time.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub outlet_id: OutletId,
    pub outlet_name: String,
    pub manager_id: ManagerId,
    pub store_id: StoreId,
    pub date: DateTime<Utc>,
    pub payment_type: PaymentType,
    pub products: Vec<LineItem>,
    pub total_amount: Decimal,
    pub total_items: u32,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub(crate) fn new(
        id: InvoiceId,
        outlet_name: String,
        request: &NewInvoice,
        products: Vec<LineItem>,
        date: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            id,
            outlet_id: request.outlet_id,
            outlet_name,
            manager_id: request.manager_id,
            store_id: request.store_id,
            date,
            payment_type: request.payment_type,
            total_amount: subtotal(&products)?,
            total_items: total_items(&products)?,
            products,
            status: InvoiceStatus::Pending,
        })
    }

    /// Fails unless the invoice is still pending.
    pub fn ensure_pending(&self) -> Result<(), LedgerError> {
        match self.status {
            InvoiceStatus::Pending => Ok(()),
            status => Err(LedgerError::AlreadyFinalized {
                invoice: self.id,
                status,
            }),
        }
    }

    pub(crate) fn finalize(&mut self, status: InvoiceStatus) -> Result<(), LedgerError> {
        self.ensure_pending()?;
        if status == InvoiceStatus::Pending {
            return Err(LedgerError::transition(self.id, self.status, status));
        }
        self.status = status;
        Ok(())
    }

    pub fn is_credit(&self) -> bool {
        self.payment_type.is_credit()
    }
}
