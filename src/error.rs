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

//! Error types for ledger operations.

use crate::base::{DistributionId, InvoiceId, OutletId, ProductId};
use crate::invoice::InvoiceStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger operation errors.
///
/// All errors are local and synchronous; none of them is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed input (empty product list, non-positive amount, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credit business requested for an outlet that is currently blocked
    #[error("outlet {0} is blocked")]
    OutletBlocked(OutletId),

    /// Requested quantity exceeds on-hand stock
    #[error("insufficient stock for {product}: Available: {available}, Requested: {requested}")]
    InsufficientStock {
        product: String,
        available: u32,
        requested: u32,
    },

    /// Entity is not in the state the operation requires
    #[error("invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// Invoice was already approved or rejected
    #[error("invoice {invoice} is already {status}")]
    AlreadyFinalized {
        invoice: InvoiceId,
        status: InvoiceStatus,
    },

    /// Payment would drive credit used below zero
    #[error("payment of {amount} exceeds credit used {credit_used}")]
    Overpayment { amount: Decimal, credit_used: Decimal },

    #[error("outlet {0} not found")]
    OutletNotFound(OutletId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),

    #[error("distribution {0} not found")]
    DistributionNotFound(DistributionId),

    /// SKU is already registered to another product
    #[error("duplicate SKU {0}")]
    DuplicateSku(String),

    /// The persistence collaborator failed to save or load
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn transition(
        entity: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Failures of a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}
