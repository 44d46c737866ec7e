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

//! Account public API integration tests.

use chrono::{TimeZone, Utc};
use credit_ledger_rs::{
    Account, CreditHealth, CreditWarning, EntryKind, LedgerError, OutletId, OutletStatus,
    OutletType,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

// === Helper Functions ===

fn make_account(limit: Decimal) -> Account {
    Account::new(OutletId(1), "Corner Mart", OutletType::Official, limit)
}

fn charge(account: &Account, reference: &str, amount: Decimal) -> credit_ledger_rs::ChargeOutcome {
    account
        .charge(EntryKind::Invoice, reference, amount, Utc::now())
        .unwrap()
}

// === Basic Account Tests ===

#[test]
fn new_account_is_active_with_zero_usage() {
    let account = make_account(dec!(1000));
    let record = account.snapshot();

    assert_eq!(record.credit_used, Decimal::ZERO);
    assert_eq!(record.status, OutletStatus::Active);
    assert_eq!(record.blocked_at, None);
    assert_eq!(record.blocked_reason, None);
    assert!(record.credit_history.is_empty());
    assert_eq!(record.available_credit(), dec!(1000));
    assert_eq!(record.health(), CreditHealth::Healthy);
}

#[test]
fn charges_accumulate() {
    let account = make_account(dec!(1000));
    charge(&account, "INV-1", dec!(100.25));
    charge(&account, "INV-2", dec!(49.75));

    assert_eq!(account.credit_used(), dec!(150));
    assert_eq!(account.snapshot().credit_history.len(), 2);
}

#[test]
fn zero_charge_is_recorded() {
    let account = make_account(dec!(1000));
    let outcome = charge(&account, "INV-1", Decimal::ZERO);

    assert_eq!(outcome.percentage, 0);
    assert_eq!(account.snapshot().credit_history.len(), 1);
}

#[test]
fn negative_charge_is_rejected() {
    let account = make_account(dec!(1000));
    let result = account.charge(EntryKind::Invoice, "INV-1", dec!(-1), Utc::now());

    assert!(matches!(result, Err(LedgerError::Validation(_))));
    assert_eq!(account.credit_used(), Decimal::ZERO);
}

#[test]
fn payment_kinds_cannot_be_charged() {
    let account = make_account(dec!(1000));
    for kind in [EntryKind::Payment, EntryKind::Reversal] {
        assert!(matches!(
            account.charge(kind, "X", dec!(1), Utc::now()),
            Err(LedgerError::Validation(_))
        ));
    }
    assert!(account.snapshot().credit_history.is_empty());
}

// === Threshold Tests ===

#[test]
fn below_warning_threshold_has_no_warning() {
    let account = make_account(dec!(1000));
    let outcome = charge(&account, "INV-1", dec!(794.99));

    assert_eq!(outcome.percentage, 79);
    assert_eq!(outcome.warning, None);
}

#[test]
fn warning_threshold_rounds_half_up() {
    let account = make_account(dec!(1000));
    let outcome = charge(&account, "INV-1", dec!(795));

    assert_eq!(outcome.percentage, 80);
    assert_eq!(outcome.warning, Some(CreditWarning::NearLimit { percentage: 80 }));
    assert_eq!(account.status(), OutletStatus::Active);
}

#[test]
fn rounding_to_one_hundred_blocks() {
    let account = make_account(dec!(1000));
    let outcome = charge(&account, "INV-1", dec!(995));

    assert_eq!(outcome.percentage, 100);
    assert!(outcome.newly_blocked);
    assert_eq!(account.status(), OutletStatus::Blocked);
}

#[test]
fn ninety_nine_percent_stays_active() {
    let account = make_account(dec!(1000));
    let outcome = charge(&account, "INV-1", dec!(994.99));

    assert_eq!(outcome.percentage, 99);
    assert!(!outcome.newly_blocked);
    assert_eq!(outcome.warning, Some(CreditWarning::NearLimit { percentage: 99 }));
    assert_eq!(account.status(), OutletStatus::Active);
}

#[test]
fn over_limit_charge_completes_then_blocks() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let account = make_account(dec!(15000));
    charge(&account, "INV-1", dec!(12500));

    let outcome = account
        .charge(EntryKind::Invoice, "INV-2", dec!(3000), at)
        .unwrap();

    assert_eq!(outcome.percentage, 103);
    assert_eq!(outcome.warning, Some(CreditWarning::LimitExceeded { percentage: 103 }));
    let record = account.snapshot();
    assert_eq!(record.credit_used, dec!(15500));
    assert_eq!(record.blocked_at, Some(at));
    assert_eq!(
        record.blocked_reason.as_deref(),
        Some("Credit limit exceeded after invoice approval")
    );
    assert_eq!(record.health(), CreditHealth::OverLimit);
    assert_eq!(record.available_credit(), dec!(-500));
}

#[test]
fn charge_on_blocked_outlet_keeps_original_block() {
    let first = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
    let account = make_account(dec!(100));
    account.block("Audit", first).unwrap();

    let outcome = account
        .charge(EntryKind::Distribution, "DST-1", dec!(500), later)
        .unwrap();

    assert!(!outcome.newly_blocked);
    let record = account.snapshot();
    assert_eq!(record.blocked_at, Some(first));
    assert_eq!(record.blocked_reason.as_deref(), Some("Audit"));
}

#[test]
fn charge_if_active_refuses_blocked_outlet() {
    let account = make_account(dec!(100));
    account.block("Audit", Utc::now()).unwrap();

    assert_eq!(
        account
            .charge_if_active(EntryKind::Invoice, "INV-1", dec!(1), Utc::now())
            .unwrap_err(),
        LedgerError::OutletBlocked(OutletId(1))
    );
    assert_eq!(account.credit_used(), Decimal::ZERO);
}

#[test]
fn zero_limit_with_usage_is_over_limit() {
    let account = make_account(Decimal::ZERO);
    assert_eq!(account.usage_percentage(), 0);

    let outcome = charge(&account, "INV-1", dec!(0.01));

    assert_eq!(outcome.percentage, 100);
    assert_eq!(account.status(), OutletStatus::Blocked);
}

// === Payment Tests ===

#[test]
fn payment_is_recorded_as_negative_entry() {
    let account = make_account(dec!(1000));
    charge(&account, "INV-1", dec!(400));

    account.receive_payment("PAY-1", dec!(150), Utc::now()).unwrap();

    let entry = account.snapshot().credit_history.pop().unwrap();
    assert_eq!(entry.kind, EntryKind::Payment);
    assert_eq!(entry.reference_id, "PAY-1");
    assert_eq!(entry.amount, dec!(-150));
    assert_eq!(entry.balance_after, dec!(750));
}

#[test]
fn credit_clamps_at_zero() {
    let account = make_account(dec!(1000));
    charge(&account, "INV-1", dec!(100));

    let outcome = account.credit("PAY-1", dec!(250), Utc::now()).unwrap();

    assert!(!outcome.unblocked);
    assert_eq!(account.credit_used(), Decimal::ZERO);
    let record = account.snapshot();
    assert_eq!(record.credit_history[1].amount, dec!(-100));
    let total: Decimal = record.credit_history.iter().map(|e| e.amount).sum();
    assert_eq!(total, Decimal::ZERO);
}

#[test]
fn received_payment_must_be_positive_even_with_nothing_owed() {
    let account = make_account(dec!(1000));

    for amount in [Decimal::ZERO, dec!(-5)] {
        assert!(matches!(
            account.receive_payment("PAY-1", amount, Utc::now()),
            Err(LedgerError::Validation(_))
        ));
    }
    assert!(account.snapshot().credit_history.is_empty());
}

#[test]
fn non_positive_payment_is_rejected() {
    let account = make_account(dec!(1000));
    charge(&account, "INV-1", dec!(100));

    for amount in [Decimal::ZERO, dec!(-5)] {
        assert!(matches!(
            account.credit("PAY-1", amount, Utc::now()),
            Err(LedgerError::Validation(_))
        ));
    }
    assert_eq!(account.credit_used(), dec!(100));
}

#[test]
fn payment_unblocks_only_below_limit() {
    let account = make_account(dec!(1000));
    charge(&account, "INV-1", dec!(1100));

    let outcome = account.receive_payment("PAY-1", dec!(100), Utc::now()).unwrap();
    assert!(!outcome.unblocked);
    assert_eq!(account.status(), OutletStatus::Blocked);

    let outcome = account.receive_payment("PAY-2", dec!(0.01), Utc::now()).unwrap();
    assert!(outcome.unblocked);
    let record = account.snapshot();
    assert_eq!(record.status, OutletStatus::Active);
    assert_eq!(record.blocked_at, None);
    assert_eq!(record.blocked_reason, None);
}

#[test]
fn payment_lifts_manual_block_once_under_limit() {
    let account = make_account(dec!(1000));
    charge(&account, "INV-1", dec!(500));
    account.block("Late payment", Utc::now()).unwrap();

    let outcome = account.receive_payment("PAY-1", dec!(100), Utc::now()).unwrap();

    assert!(outcome.unblocked);
    assert_eq!(account.status(), OutletStatus::Active);
}

#[test]
fn reversal_is_recorded_with_its_own_kind() {
    let account = make_account(dec!(1000));
    account
        .charge(EntryKind::Distribution, "DST-4", dec!(300), Utc::now())
        .unwrap();

    account.reverse("DST-4", dec!(300), Utc::now()).unwrap();

    let record = account.snapshot();
    assert_eq!(record.credit_used, Decimal::ZERO);
    let kinds: Vec<_> = record.credit_history.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [EntryKind::Distribution, EntryKind::Reversal]);
}

// === Serialization ===

#[test]
fn record_serializes_type_and_decimal_strings() {
    let account = Account::new(OutletId(7), "Harbor Shop", OutletType::Dummy, dec!(2500.50));
    charge(&account, "INV-1", dec!(10));

    let json = serde_json::to_value(account.snapshot()).unwrap();

    assert_eq!(json["id"], 7);
    assert_eq!(json["type"], "Dummy");
    assert_eq!(json["credit_limit"], "2500.50");
    assert_eq!(json["status"], "Active");
    assert_eq!(json["credit_history"][0]["kind"], "Invoice");

    let restored = Account::from_record(serde_json::from_value(json).unwrap());
    assert_eq!(restored.snapshot(), account.snapshot());
}

// === Concurrency Tests ===

#[test]
fn concurrent_charges_are_all_applied() {
    let account = Arc::new(make_account(dec!(1000000)));
    let mut handles = vec![];

    for t in 0..8 {
        let account = Arc::clone(&account);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                account
                    .charge(EntryKind::Invoice, format!("INV-{t}-{i}"), dec!(1.5), Utc::now())
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let record = account.snapshot();
    assert_eq!(record.credit_used, dec!(1200));
    assert_eq!(record.credit_history.len(), 800);
}

#[test]
fn concurrent_charges_and_payments_never_go_negative() {
    let account = Arc::new(make_account(dec!(1000)));
    charge(&account, "INV-0", dec!(500));

    let charger = {
        let account = Arc::clone(&account);
        thread::spawn(move || {
            for i in 0..200 {
                account
                    .charge(EntryKind::Invoice, format!("INV-{i}"), dec!(10), Utc::now())
                    .unwrap();
            }
        })
    };
    let payer = {
        let account = Arc::clone(&account);
        thread::spawn(move || {
            for i in 0..200 {
                account.credit(format!("PAY-{i}"), dec!(15), Utc::now()).unwrap();
            }
        })
    };
    charger.join().unwrap();
    payer.join().unwrap();

    let record = account.snapshot();
    assert!(record.credit_used >= Decimal::ZERO);
    assert_eq!(record.credit_history.len(), 401);
    let total: Decimal = record.credit_history.iter().map(|e| e.amount).sum();
    assert_eq!(total, record.credit_used);
    assert_eq!(
        record.status == OutletStatus::Blocked,
        record.blocked_at.is_some() && record.blocked_reason.is_some()
    );
}
