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

//! Ledger store: one balance account per user.
//!
//! Accounts live in a [`DashMap`] behind [`Arc`] so callers can take an
//! account out of the map and lock it without holding a shard lock.
//! Multi-account work (a purchase moves money between buyer and instructor)
//! goes through [`LockedAccounts`], which always locks in ascending user order.

use crate::LedgerError;
use crate::account::{Account, AccountBalance, AccountData, BalanceChange};
use crate::base::UserId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::MutexGuard;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Durable home of per-user balances.
#[derive(Debug, Default)]
pub struct LedgerStore {
    accounts: DashMap<UserId, Arc<Account>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Returns a snapshot of the user's balance, if an account exists.
    pub fn get_balance(&self, user_id: UserId) -> Option<AccountBalance> {
        self.account(user_id).map(|account| account.balance())
    }

    /// Creates a zero-balance account.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateAccount`] if the user already has one.
    pub fn init_balance(&self, user_id: UserId) -> Result<AccountBalance, LedgerError> {
        match self.accounts.entry(user_id) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateAccount(user_id)),
            Entry::Vacant(entry) => {
                let account = Arc::new(Account::new(user_id));
                let balance = account.balance();
                entry.insert(account);
                debug!(user_id = %user_id, "initialized balance account");
                Ok(balance)
            }
        }
    }

    /// Credits an existing account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::AccountNotFound`] if the user has no account.
    pub fn credit(&self, user_id: UserId, amount: Decimal) -> Result<BalanceChange, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.account(user_id)
            .ok_or(LedgerError::AccountNotFound(user_id))?
            .credit(amount)
    }

    /// Debits an existing account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::AccountNotFound`] if the user has no account.
    /// - [`LedgerError::InsufficientFunds`] if `amount` exceeds the available balance.
    pub fn debit(&self, user_id: UserId, amount: Decimal) -> Result<BalanceChange, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.account(user_id)
            .ok_or(LedgerError::AccountNotFound(user_id))?
            .debit(amount)
    }

    /// Snapshots of every account, ordered by user id.
    pub fn balances(&self) -> Vec<AccountBalance> {
        let accounts: Vec<Arc<Account>> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut balances: Vec<AccountBalance> =
            accounts.iter().map(|account| account.balance()).collect();
        balances.sort_by_key(|balance| balance.user_id);
        balances
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub(crate) fn account(&self, user_id: UserId) -> Option<Arc<Account>> {
        self.accounts.get(&user_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the user's account, creating a zero-balance one if absent.
    pub(crate) fn ensure_account(&self, user_id: UserId) -> Arc<Account> {
        let entry = self.accounts.entry(user_id).or_insert_with(|| {
            debug!(user_id = %user_id, "initialized balance account");
            Arc::new(Account::new(user_id))
        });
        Arc::clone(entry.value())
    }

    /// Removes an account that was opened lazily by an operation that then
    /// failed. The row is kept if anyone else holds it or it has ever moved money.
    pub(crate) fn discard_if_unused(&self, user_id: UserId) {
        let removed = self.accounts.remove_if(&user_id, |_, account| {
            Arc::strong_count(account) == 1 && account.balance().is_untouched()
        });
        if removed.is_some() {
            debug!(user_id = %user_id, "discarded unused balance account");
        }
    }
}

/// Exclusive hold on the buyer's and the instructor's accounts.
///
/// Locks are taken in ascending [`UserId`] order so two purchases touching
/// the same pair of users cannot deadlock. When both roles belong to the
/// same user only one lock is taken.
pub(crate) enum LockedAccounts<'a> {
    Single(MutexGuard<'a, AccountData>),
    Pair {
        buyer: MutexGuard<'a, AccountData>,
        instructor: MutexGuard<'a, AccountData>,
    },
}

impl<'a> LockedAccounts<'a> {
    pub(crate) fn acquire(
        buyer_id: UserId,
        buyer: &'a Account,
        instructor_id: UserId,
        instructor: &'a Account,
    ) -> Self {
        if buyer_id == instructor_id {
            return Self::Single(buyer.lock());
        }
        if buyer_id < instructor_id {
            let buyer = buyer.lock();
            let instructor = instructor.lock();
            Self::Pair { buyer, instructor }
        } else {
            let instructor = instructor.lock();
            let buyer = buyer.lock();
            Self::Pair { buyer, instructor }
        }
    }

    pub(crate) fn buyer(&mut self) -> &mut AccountData {
        match self {
            Self::Single(guard) => &mut **guard,
            Self::Pair { buyer, .. } => &mut **buyer,
        }
    }

    pub(crate) fn instructor(&mut self) -> &mut AccountData {
        match self {
            Self::Single(guard) => &mut **guard,
            Self::Pair { instructor, .. } => &mut **instructor,
        }
    }
}
