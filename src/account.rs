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

//! Outlet credit accounts.
//!
//! Each outlet carries a revolving credit line. Charges from approved
//! invoices and credit distributions raise `credit_used`; payments lower it.
//!
//! ```text
//!  Active ──charge (usage ≥ 100%)──► Blocked ──payment (used < limit)──► Active
//!    │                                 ▲  │
//!    └──────────manual block───────────┘  └──manual unblock──► Active
//! ```
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use credit_ledger_rs::{Account, EntryKind, OutletId, OutletStatus, OutletType};
//! use rust_decimal_macros::dec;
//!
//! let account = Account::new(OutletId(1), "Corner Mart", OutletType::Official, dec!(15000));
//! account.charge(EntryKind::Invoice, "INV-1", dec!(12500), Utc::now()).unwrap();
//! let outcome = account.charge(EntryKind::Invoice, "INV-2", dec!(3000), Utc::now()).unwrap();
//!
//! assert_eq!(outcome.percentage, 103);
//! assert_eq!(account.status(), OutletStatus::Blocked);
//! ```

use crate::base::OutletId;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Usage percentage at which charges start producing a near-limit warning.
pub const WARNING_THRESHOLD: u32 = 80;

/// Usage percentage at which an outlet is blocked automatically.
pub const BLOCK_THRESHOLD: u32 = 100;

/// Reason recorded on automatic blocks.
pub const AUTO_BLOCK_REASON: &str = "Credit limit exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutletType {
    Official,
    Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutletStatus {
    Active,
    Blocked,
}

impl fmt::Display for OutletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Blocked => f.write_str("Blocked"),
        }
    }
}

/// Source of a credit history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Invoice,
    Distribution,
    Payment,
    /// Compensates a charge whose document was withdrawn.
    Reversal,
}

impl EntryKind {
    fn block_reason(self) -> String {
        match self {
            Self::Invoice => format!("{AUTO_BLOCK_REASON} after invoice approval"),
            Self::Distribution => format!("{AUTO_BLOCK_REASON} after distribution"),
            Self::Payment | Self::Reversal => AUTO_BLOCK_REASON.to_string(),
        }
    }
}

/// One line of an outlet's credit history.
///
/// Charges carry a positive `amount`, payments and reversals a negative one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub date: DateTime<Utc>,
    pub kind: EntryKind,
    pub reference_id: String,
    pub amount: Decimal,
    /// Remaining credit (`credit_limit - credit_used`) after this entry. May be negative.
    pub balance_after: Decimal,
}

/// Credit usage bucket, derived on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditHealth {
    Healthy,
    NearLimit,
    OverLimit,
}

/// Advisory produced by a charge for the caller to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditWarning {
    NearLimit { percentage: u32 },
    LimitExceeded { percentage: u32 },
}

impl fmt::Display for CreditWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NearLimit { percentage } => {
                write!(f, "credit usage at {percentage}% of limit")
            }
            Self::LimitExceeded { percentage } => {
                write!(f, "credit limit exceeded ({percentage}%), outlet blocked")
            }
        }
    }
}

/// Result of a successful charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeOutcome {
    pub percentage: u32,
    pub warning: Option<CreditWarning>,
    /// The charge moved the outlet from Active to Blocked.
    pub newly_blocked: bool,
}

/// Result of a successful payment or reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditOutcome {
    /// The credit moved the outlet from Blocked to Active.
    pub unblocked: bool,
}

/// Serializable state of an outlet's credit account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletRecord {
    pub id: OutletId,
    pub name: String,
    #[serde(rename = "type")]
    pub outlet_type: OutletType,
    pub credit_limit: Decimal,
    pub credit_used: Decimal,
    pub status: OutletStatus,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
    pub credit_history: Vec<CreditEntry>,
}

impl OutletRecord {
    fn new(id: OutletId, name: String, outlet_type: OutletType, credit_limit: Decimal) -> Self {
        Self {
            id,
            name,
            outlet_type,
            credit_limit,
            credit_used: Decimal::ZERO,
            status: OutletStatus::Active,
            blocked_at: None,
            blocked_reason: None,
            credit_history: Vec::new(),
        }
    }

    /// Credit used as a whole percentage of the limit, rounded half up.
    ///
    /// A zero limit with outstanding usage counts as fully used.
    pub fn usage_percentage(&self) -> u32 {
        if self.credit_used <= Decimal::ZERO {
            return 0;
        }
        if self.credit_limit <= Decimal::ZERO {
            return BLOCK_THRESHOLD;
        }
        self.credit_used
            .checked_div(self.credit_limit)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map(|pct| pct.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|pct| pct.to_u32())
            .unwrap_or(u32::MAX)
    }

    pub fn health(&self) -> CreditHealth {
        match self.usage_percentage() {
            p if p >= BLOCK_THRESHOLD => CreditHealth::OverLimit,
            p if p >= WARNING_THRESHOLD => CreditHealth::NearLimit,
            _ => CreditHealth::Healthy,
        }
    }

    /// Remaining credit. Negative when the outlet is over its limit.
    pub fn available_credit(&self) -> Decimal {
        self.credit_limit - self.credit_used
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.credit_used >= Decimal::ZERO,
            "Invariant violated: credit used went negative: {}",
            self.credit_used
        );
        debug_assert_eq!(
            self.status == OutletStatus::Blocked,
            self.blocked_at.is_some(),
            "Invariant violated: blocked_at out of sync with status"
        );
        debug_assert_eq!(
            self.status == OutletStatus::Blocked,
            self.blocked_reason.is_some(),
            "Invariant violated: blocked_reason out of sync with status"
        );
    }

    fn push_entry(
        &mut self,
        kind: EntryKind,
        reference_id: String,
        amount: Decimal,
        at: DateTime<Utc>,
    ) {
        let balance_after = self.available_credit();
        self.credit_history.push(CreditEntry {
            date: at,
            kind,
            reference_id,
            amount,
            balance_after,
        });
    }

    fn set_blocked(&mut self, reason: String, at: DateTime<Utc>) {
        self.status = OutletStatus::Blocked;
        self.blocked_at = Some(at);
        self.blocked_reason = Some(reason);
    }

    fn set_active(&mut self) {
        self.status = OutletStatus::Active;
        self.blocked_at = None;
        self.blocked_reason = None;
    }

    /// Raises credit used and blocks once usage reaches [`BLOCK_THRESHOLD`].
    ///
    /// The charge always completes; blocking happens after it.
    pub(crate) fn charge(
        &mut self,
        kind: EntryKind,
        reference_id: String,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<ChargeOutcome, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::validation("charge amount cannot be negative"));
        }
        if !matches!(kind, EntryKind::Invoice | EntryKind::Distribution) {
            return Err(LedgerError::validation(
                "only invoices and distributions can be charged",
            ));
        }

        self.credit_used += amount;
        self.push_entry(kind, reference_id, amount, at);

        let percentage = self.usage_percentage();
        let mut newly_blocked = false;
        let warning = if percentage >= BLOCK_THRESHOLD {
            // An outlet that is already blocked keeps its original block record.
            if self.status == OutletStatus::Active {
                self.set_blocked(kind.block_reason(), at);
                newly_blocked = true;
            }
            Some(CreditWarning::LimitExceeded { percentage })
        } else if percentage >= WARNING_THRESHOLD {
            Some(CreditWarning::NearLimit { percentage })
        } else {
            None
        };

        self.assert_invariants();
        let outcome = ChargeOutcome {
            percentage,
            warning,
            newly_blocked,
        };
        log_charge(self, &outcome);
        Ok(outcome)
    }

    /// Lowers credit used (never below zero) and unblocks once back under the limit.
    ///
    /// The history entry records the amount actually applied.
    pub(crate) fn credit(
        &mut self,
        kind: EntryKind,
        reference_id: String,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<CreditOutcome, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation("payment amount must be positive"));
        }

        let applied = amount.min(self.credit_used);
        self.credit_used -= applied;
        self.push_entry(kind, reference_id, -applied, at);

        let unblocked =
            self.status == OutletStatus::Blocked && self.credit_used < self.credit_limit;
        if unblocked {
            self.set_active();
        }

        self.assert_invariants();
        let outcome = CreditOutcome { unblocked };
        log_credit(self, &outcome);
        Ok(outcome)
    }
}

/// Registration data for a new outlet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutlet {
    pub name: String,
    #[serde(rename = "type")]
    pub outlet_type: OutletType,
    pub credit_limit: Decimal,
}

impl NewOutlet {
    pub(crate) fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("outlet name is required"));
        }
        if self.credit_limit < Decimal::ZERO {
            return Err(LedgerError::validation("credit limit cannot be negative"));
        }
        Ok(())
    }
}

/// Outlet credit account.
///
/// All mutation goes through the methods below, each of which runs under
/// the account's lock. `credit_used` has no direct setter.
#[derive(Debug)]
pub struct Account {
    inner: Mutex<OutletRecord>,
}

impl Account {
    pub fn new(
        id: OutletId,
        name: impl Into<String>,
        outlet_type: OutletType,
        credit_limit: Decimal,
    ) -> Self {
        Self {
            inner: Mutex::new(OutletRecord::new(id, name.into(), outlet_type, credit_limit)),
        }
    }

    /// Rebuilds an account from a persisted record.
    pub fn from_record(record: OutletRecord) -> Self {
        Self {
            inner: Mutex::new(record),
        }
    }

    /// Locks the account for a multi-step operation.
    pub(crate) fn lock(&self) -> MutexGuard<'_, OutletRecord> {
        self.inner.lock()
    }

    pub fn snapshot(&self) -> OutletRecord {
        self.inner.lock().clone()
    }

    pub fn id(&self) -> OutletId {
        self.inner.lock().id
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn status(&self) -> OutletStatus {
        self.inner.lock().status
    }

    pub fn credit_limit(&self) -> Decimal {
        self.inner.lock().credit_limit
    }

    pub fn credit_used(&self) -> Decimal {
        self.inner.lock().credit_used
    }

    pub fn usage_percentage(&self) -> u32 {
        self.inner.lock().usage_percentage()
    }

    /// Charges the account on behalf of an invoice or distribution.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for a negative amount or a non-charge `kind`.
    pub fn charge(
        &self,
        kind: EntryKind,
        reference_id: impl Into<String>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<ChargeOutcome, LedgerError> {
        let mut data = self.inner.lock();
        data.charge(kind, reference_id.into(), amount, at)
    }

    /// Like [`charge`](Self::charge) but refuses outlets that are already blocked.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::OutletBlocked`] if the outlet is blocked.
    pub fn charge_if_active(
        &self,
        kind: EntryKind,
        reference_id: impl Into<String>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<ChargeOutcome, LedgerError> {
        let mut data = self.inner.lock();
        if data.status == OutletStatus::Blocked {
            return Err(LedgerError::OutletBlocked(data.id));
        }
        data.charge(kind, reference_id.into(), amount, at)
    }

    /// Applies a payment, clamping credit used at zero.
    pub fn credit(
        &self,
        reference_id: impl Into<String>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<CreditOutcome, LedgerError> {
        let mut data = self.inner.lock();
        data.credit(EntryKind::Payment, reference_id.into(), amount, at)
    }

    /// Applies a payment that must not exceed the outstanding credit.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] for a non-positive amount.
    /// - [`LedgerError::Overpayment`] if `amount > credit_used`.
    pub fn receive_payment(
        &self,
        reference_id: impl Into<String>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<CreditOutcome, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation("payment amount must be positive"));
        }
        let mut data = self.inner.lock();
        if amount > data.credit_used {
            return Err(LedgerError::Overpayment {
                amount,
                credit_used: data.credit_used,
            });
        }
        data.credit(EntryKind::Payment, reference_id.into(), amount, at)
    }

    /// Undoes an earlier charge with a compensating entry.
    pub fn reverse(
        &self,
        reference_id: impl Into<String>,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<CreditOutcome, LedgerError> {
        let mut data = self.inner.lock();
        data.credit(EntryKind::Reversal, reference_id.into(), amount, at)
    }

    /// Blocks an active outlet by hand.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTransition`] if the outlet is already blocked.
    /// - [`LedgerError::Validation`] for an empty reason.
    pub fn block(&self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let reason = reason.into();
        let mut data = self.inner.lock();
        if data.status == OutletStatus::Blocked {
            return Err(LedgerError::transition(data.id, data.status, OutletStatus::Blocked));
        }
        if reason.trim().is_empty() {
            return Err(LedgerError::validation("block reason is required"));
        }
        data.set_blocked(reason, at);
        data.assert_invariants();
        info!(
            outlet = %data.id,
            reason = data.blocked_reason.as_deref(),
            "outlet blocked manually"
        );
        Ok(())
    }

    /// Unblocks a blocked outlet regardless of its usage.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTransition`] if the outlet is already active.
    pub fn unblock(&self) -> Result<(), LedgerError> {
        let mut data = self.inner.lock();
        if data.status == OutletStatus::Active {
            return Err(LedgerError::transition(data.id, data.status, OutletStatus::Active));
        }
        data.set_active();
        data.assert_invariants();
        info!(outlet = %data.id, credit_used = %data.credit_used, "outlet unblocked manually");
        Ok(())
    }

    /// Changes the credit limit. Usage and status are left as they are.
    pub fn update_credit_limit(&self, credit_limit: Decimal) -> Result<(), LedgerError> {
        if credit_limit < Decimal::ZERO {
            return Err(LedgerError::validation("credit limit cannot be negative"));
        }
        self.inner.lock().credit_limit = credit_limit;
        Ok(())
    }
}

fn log_charge(data: &OutletRecord, outcome: &ChargeOutcome) {
    match outcome.warning {
        Some(CreditWarning::LimitExceeded { percentage }) if outcome.newly_blocked => warn!(
            outlet = %data.id,
            percentage,
            credit_used = %data.credit_used,
            credit_limit = %data.credit_limit,
            "credit limit exceeded, outlet blocked"
        ),
        Some(warning) => warn!(outlet = %data.id, %warning, "credit usage warning"),
        None => {}
    }
}

fn log_credit(data: &OutletRecord, outcome: &CreditOutcome) {
    if outcome.unblocked {
        info!(outlet = %data.id, credit_used = %data.credit_used, "outlet unblocked after credit");
    }
}
