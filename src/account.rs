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

//! Balance accounts.
//!
//! One [`Account`] exists per user. Money only moves through
//! [`credit`](Account::credit) and [`debit`](Account::debit), each of which
//! bumps the matching lifetime counter and the update timestamp.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use course_ledger::{Account, UserId};
//!
//! let account = Account::new(UserId(1));
//! account.credit(dec!(100.00)).unwrap();
//! assert_eq!(account.available(), dec!(100.00));
//! ```

use crate::LedgerError;
use crate::base::UserId;
use crate::fee::CURRENCY_DECIMALS;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Balance before and after a single credit or debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: Decimal,
    pub after: Decimal,
}

/// Point-in-time copy of an account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    pub user_id: UserId,
    pub available: Decimal,
    /// Reserved funds. Informational only; nothing in the ledger freezes money yet.
    pub frozen: Decimal,
    /// Lifetime sum of all credits.
    pub total_credited: Decimal,
    /// Lifetime sum of all debits.
    pub total_debited: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// Returns `available - frozen`.
    pub fn spendable(&self) -> Decimal {
        self.available - self.frozen
    }

    /// True for a row that has never been credited, debited or frozen.
    pub fn is_untouched(&self) -> bool {
        self.available.is_zero()
            && self.frozen.is_zero()
            && self.total_credited.is_zero()
            && self.total_debited.is_zero()
    }
}

impl Serialize for AccountBalance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("AccountBalance", 5)?;
        state.serialize_field("user", &self.user_id)?;
        state.serialize_field("available", &to_cents(self.available))?;
        state.serialize_field("frozen", &to_cents(self.frozen))?;
        state.serialize_field("total_credited", &to_cents(self.total_credited))?;
        state.serialize_field("total_debited", &to_cents(self.total_debited))?;
        state.end()
    }
}

/// Rounds to currency precision and pads to exactly two fractional digits.
fn to_cents(value: Decimal) -> Decimal {
    let mut cents = value.round_dp(CURRENCY_DECIMALS);
    cents.rescale(CURRENCY_DECIMALS);
    cents
}

#[derive(Debug)]
pub(crate) struct AccountData {
    user_id: UserId,
    available: Decimal,
    frozen: Decimal,
    total_credited: Decimal,
    total_debited: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountData {
    fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            available: Decimal::ZERO,
            frozen: Decimal::ZERO,
            total_credited: Decimal::ZERO,
            total_debited: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.available >= Decimal::ZERO,
            "Invariant violated: available balance went negative: {}",
            self.available
        );
        debug_assert!(
            self.frozen >= Decimal::ZERO,
            "Invariant violated: frozen balance went negative: {}",
            self.frozen
        );
    }

    pub(crate) fn available(&self) -> Decimal {
        self.available
    }

    /// Increases available balance.
    pub(crate) fn credit(&mut self, amount: Decimal) -> Result<BalanceChange, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let available = self
            .available
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let total_credited = self
            .total_credited
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let before = self.available;
        self.available = available;
        self.total_credited = total_credited;
        self.updated_at = Utc::now();
        self.assert_invariants();
        Ok(BalanceChange {
            before,
            after: self.available,
        })
    }

    /// Decreases available balance.
    pub(crate) fn debit(&mut self, amount: Decimal) -> Result<BalanceChange, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.available < amount {
            return Err(LedgerError::InsufficientFunds {
                current: self.available,
                required: amount,
            });
        }
        let total_debited = self
            .total_debited
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let before = self.available;
        self.available -= amount;
        self.total_debited = total_debited;
        self.updated_at = Utc::now();
        self.assert_invariants();
        Ok(BalanceChange {
            before,
            after: self.available,
        })
    }

    pub(crate) fn snapshot(&self) -> AccountBalance {
        AccountBalance {
            user_id: self.user_id,
            available: self.available,
            frozen: self.frozen,
            total_credited: self.total_credited,
            total_debited: self.total_debited,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Puts the row back to a snapshot taken under the same lock.
    pub(crate) fn restore(&mut self, saved: &AccountBalance) {
        debug_assert_eq!(self.user_id, saved.user_id);
        self.available = saved.available;
        self.frozen = saved.frozen;
        self.total_credited = saved.total_credited;
        self.total_debited = saved.total_debited;
        self.updated_at = saved.updated_at;
    }
}

/// Ledger account.
#[derive(Debug)]
pub struct Account {
    inner: Mutex<AccountData>,
}

impl Account {
    pub fn new(user_id: UserId) -> Self {
        Self {
            inner: Mutex::new(AccountData::new(user_id)),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.inner.lock().user_id
    }

    pub fn available(&self) -> Decimal {
        self.inner.lock().available
    }

    pub fn frozen(&self) -> Decimal {
        self.inner.lock().frozen
    }

    pub fn balance(&self) -> AccountBalance {
        self.inner.lock().snapshot()
    }

    /// Credits `amount` to the account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::AmountOverflow`] if the balance or lifetime total would overflow.
    pub fn credit(&self, amount: Decimal) -> Result<BalanceChange, LedgerError> {
        self.inner.lock().credit(amount)
    }

    /// Debits `amount` from the account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::InsufficientFunds`] if `amount` exceeds the available balance.
    /// - [`LedgerError::AmountOverflow`] if the lifetime total would overflow.
    pub fn debit(&self, amount: Decimal) -> Result<BalanceChange, LedgerError> {
        self.inner.lock().debit(amount)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // === AccountData Internal Tests ===

    #[test]
    fn credit_updates_lifetime_total() {
        let mut data = AccountData::new(UserId(1));
        let change = data.credit(dec!(100.00)).unwrap();
        assert_eq!(change.before, Decimal::ZERO);
        assert_eq!(change.after, dec!(100.00));
        assert_eq!(data.total_credited, dec!(100.00));
        assert_eq!(data.total_debited, Decimal::ZERO);
    }

    #[test]
    fn debit_updates_lifetime_total() {
        let mut data = AccountData::new(UserId(1));
        data.credit(dec!(100.00)).unwrap();
        let change = data.debit(dec!(30.00)).unwrap();
        assert_eq!(change.before, dec!(100.00));
        assert_eq!(change.after, dec!(70.00));
        assert_eq!(data.total_debited, dec!(30.00));
    }

    #[test]
    fn debit_insufficient_reports_figures() {
        let mut data = AccountData::new(UserId(1));
        data.credit(dec!(12.00)).unwrap();
        let result = data.debit(dec!(50.00));
        assert_eq!(
            result,
            Err(LedgerError::InsufficientFunds {
                current: dec!(12.00),
                required: dec!(50.00),
            })
        );
        assert_eq!(data.available, dec!(12.00));
        assert_eq!(data.total_debited, Decimal::ZERO);
    }

    #[test]
    fn non_positive_amounts_mutate_nothing() {
        let mut data = AccountData::new(UserId(1));
        data.credit(dec!(10.00)).unwrap();
        let updated_at = data.updated_at;

        assert_eq!(data.credit(Decimal::ZERO), Err(LedgerError::InvalidAmount));
        assert_eq!(data.credit(dec!(-1)), Err(LedgerError::InvalidAmount));
        assert_eq!(data.debit(Decimal::ZERO), Err(LedgerError::InvalidAmount));
        assert_eq!(data.debit(dec!(-1)), Err(LedgerError::InvalidAmount));

        assert_eq!(data.available, dec!(10.00));
        assert_eq!(data.total_credited, dec!(10.00));
        assert_eq!(data.updated_at, updated_at);
    }

    #[test]
    fn credit_overflow_is_rejected_without_mutation() {
        let mut data = AccountData::new(UserId(1));
        data.credit(Decimal::MAX).unwrap();
        let saved = data.snapshot();

        assert_eq!(data.credit(Decimal::MAX), Err(LedgerError::AmountOverflow));
        assert_eq!(data.credit(dec!(1)), Err(LedgerError::AmountOverflow));
        assert_eq!(data.snapshot(), saved);
    }

    #[test]
    fn lifetime_credit_overflow_is_rejected() {
        let mut data = AccountData::new(UserId(1));
        data.credit(Decimal::MAX).unwrap();
        data.debit(Decimal::MAX).unwrap();
        let saved = data.snapshot();

        // Balance is back at zero but the lifetime total is saturated.
        assert_eq!(data.credit(dec!(1)), Err(LedgerError::AmountOverflow));
        assert_eq!(data.snapshot(), saved);
    }

    #[test]
    fn restore_rolls_back_to_snapshot() {
        let mut data = AccountData::new(UserId(1));
        data.credit(dec!(80.00)).unwrap();
        let saved = data.snapshot();

        data.debit(dec!(50.00)).unwrap();
        data.credit(dec!(5.00)).unwrap();
        data.restore(&saved);

        assert_eq!(data.snapshot(), saved);
    }

    // === Serialization Tests ===

    #[test]
    fn serializer_rounds_to_cents() {
        let account = Account::new(UserId(1));
        {
            let mut data = account.inner.lock();
            data.available = dec!(123.456);
            data.total_credited = dec!(123.456);
        }

        let json = serde_json::to_string(&account.balance()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["user"], 1);
        assert_eq!(parsed["available"].as_str().unwrap(), "123.46");
        assert_eq!(parsed["frozen"].as_str().unwrap(), "0.00");
        assert_eq!(parsed["total_credited"].as_str().unwrap(), "123.46");
        assert_eq!(parsed["total_debited"].as_str().unwrap(), "0.00");
    }

    #[test]
    fn serializer_pads_whole_and_tenths() {
        let account = Account::new(UserId(2));
        account.credit(dec!(100)).unwrap();
        account.debit(dec!(49.5)).unwrap();

        let json = serde_json::to_value(account.balance()).unwrap();
        assert_eq!(json["available"], "50.50");
        assert_eq!(json["total_credited"], "100.00");
        assert_eq!(json["total_debited"], "49.50");
    }

    #[test]
    fn spendable_subtracts_frozen() {
        let account = Account::new(UserId(5));
        {
            let mut data = account.inner.lock();
            data.available = dec!(40.00);
            data.frozen = dec!(15.00);
        }
        assert_eq!(account.balance().spendable(), dec!(25.00));
    }
}
