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

//! Core identifier types for outlets, products and ledger documents.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a credit-bearing outlet.
    OutletId,
    "OUT"
);

id_type!(
    /// Unique identifier for a catalog product.
    ///
    /// Ordering matters: multi-product operations lock products in ascending id order.
    ProductId,
    "PRD"
);

id_type!(
    /// Unique identifier for an invoice.
    InvoiceId,
    "INV"
);

id_type!(
    /// Unique identifier for a stock distribution.
    DistributionId,
    "DST"
);

id_type!(
    /// Identifier of the manager who raised a document.
    ManagerId,
    "MGR"
);

id_type!(
    /// Identifier of the store a document is issued against.
    StoreId,
    "STR"
);
