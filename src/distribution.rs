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

//! Stock distributions.
//!
//! Distributions move forward only:
//!
//! ```text
//! Pending ──► In Transit ──► Completed
//! ```
//!
//! Stock is committed when a distribution is created, not when it ships.

use crate::base::{DistributionId, ManagerId, OutletId, ProductId, StoreId};
use crate::error::LedgerError;
use crate::invoice::{LineItem, LineRequest, PaymentType, subtotal, total_items};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionStatus {
    Pending,
    #[serde(rename = "In Transit")]
    InTransit,
    Completed,
}

impl DistributionStatus {
    /// The only state this one may advance to.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::InTransit),
            Self::InTransit => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

impl fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::InTransit => "In Transit",
            Self::Completed => "Completed",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for DistributionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "pending" => Ok(Self::Pending),
            "in transit" | "intransit" => Ok(Self::InTransit),
            "completed" => Ok(Self::Completed),
            other => Err(LedgerError::validation(format!(
                "unknown distribution status '{other}'"
            ))),
        }
    }
}

/// Applies a percentage discount. Only credit distributions are discounted.
pub fn discounted_total(
    subtotal: Decimal,
    discount: Decimal,
    payment_type: PaymentType,
) -> Decimal {
    match payment_type {
        PaymentType::Credit => subtotal - subtotal * (discount / Decimal::ONE_HUNDRED),
        PaymentType::Paid => subtotal,
    }
}

/// Request to create a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDistribution {
    pub outlet_id: OutletId,
    pub manager_id: ManagerId,
    pub store_id: StoreId,
    pub payment_type: PaymentType,
    /// Percentage in `0..=100`, ignored for paid distributions.
    #[serde(default)]
    pub discount: Decimal,
    pub products: Vec<LineRequest>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl NewDistribution {
    pub(crate) fn validate(&self) -> Result<(), LedgerError> {
        crate::invoice::validate_lines(&self.products)?;
        if self.discount < Decimal::ZERO || self.discount > Decimal::ONE_HUNDRED {
            return Err(LedgerError::validation("discount must be between 0 and 100"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: DistributionId,
    pub outlet_id: OutletId,
    pub outlet_name: String,
    pub manager_id: ManagerId,
    pub store_id: StoreId,
    pub date: DateTime<Utc>,
    pub payment_type: PaymentType,
    pub products: Vec<LineItem>,
    pub subtotal: Decimal,
    /// Effective discount; always zero for paid distributions.
    pub discount: Decimal,
    pub total_value: Decimal,
    pub total_items: u32,
    pub status: DistributionStatus,
}

impl Distribution {
    pub(crate) fn new(
        id: DistributionId,
        outlet_name: String,
        request: &NewDistribution,
        products: Vec<LineItem>,
        date: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let subtotal = subtotal(&products)?;
        let discount = match request.payment_type {
            PaymentType::Credit => request.discount,
            PaymentType::Paid => Decimal::ZERO,
        };
        Ok(Self {
            id,
            outlet_id: request.outlet_id,
            outlet_name,
            manager_id: request.manager_id,
            store_id: request.store_id,
            date,
            payment_type: request.payment_type,
            total_value: discounted_total(subtotal, discount, request.payment_type),
            subtotal,
            discount,
            total_items: total_items(&products)?,
            products,
            status: DistributionStatus::Pending,
        })
    }

    /// Moves to `target` if it is the immediate successor of the current state.
    pub(crate) fn advance(&mut self, target: DistributionStatus) -> Result<(), LedgerError> {
        if self.status.next() != Some(target) {
            return Err(LedgerError::transition(self.id, self.status, target));
        }
        self.status = target;
        Ok(())
    }

    pub fn is_credit(&self) -> bool {
        self.payment_type.is_credit()
    }

    /// Product quantities committed by this distribution.
    pub fn quantities(&self) -> Vec<(ProductId, u32)> {
        self.products
            .iter()
            .map(|line| (line.product_id, line.quantity))
            .collect()
    }
}
