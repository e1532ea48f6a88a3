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

//! Purchase records.
//!
//! An append-only log of course purchases. The store enforces that at most
//! one [`PurchaseStatus::Success`] record exists per `(user, course)` pair,
//! regardless of how concurrent callers interleave.

use crate::LedgerError;
use crate::account::BalanceChange;
use crate::base::{CourseId, PurchaseId, UserId};
use crate::fee::FeeSplit;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Success,
    Failed,
    Refunded,
}

/// A stored purchase.
///
/// `purchase_price` is a snapshot taken at purchase time and does not follow
/// later catalog price changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub instructor_id: UserId,
    pub purchase_price: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub instructor_income: Decimal,
    pub platform_fee: Decimal,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub fn is_success(&self) -> bool {
        self.status == PurchaseStatus::Success
    }
}

/// Fields of a purchase record before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchaseRecord {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub instructor_id: UserId,
    pub purchase_price: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub instructor_income: Decimal,
    pub platform_fee: Decimal,
    pub status: PurchaseStatus,
}

impl NewPurchaseRecord {
    /// Builds a successful purchase from the fee split and the buyer's debit.
    pub fn success(
        user_id: UserId,
        course_id: CourseId,
        instructor_id: UserId,
        split: FeeSplit,
        buyer: BalanceChange,
    ) -> Self {
        Self {
            user_id,
            course_id,
            instructor_id,
            purchase_price: split.price,
            balance_before: buyer.before,
            balance_after: buyer.after,
            instructor_income: split.instructor_income,
            platform_fee: split.platform_fee,
            status: PurchaseStatus::Success,
        }
    }

    /// `price == income + fee` and `after == before - price`.
    fn is_balanced(&self) -> bool {
        self.purchase_price == self.instructor_income + self.platform_fee
            && self.balance_after == self.balance_before - self.purchase_price
    }
}

/// Append-only purchase log.
#[derive(Debug)]
pub struct PurchaseRecordStore {
    /// Records in insertion order.
    records: RwLock<Vec<PurchaseRecord>>,
    /// Successful purchases by `(user, course)`, the uniqueness backstop.
    successes: DashMap<(UserId, CourseId), PurchaseId>,
    next_id: AtomicU64,
}

impl PurchaseRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            successes: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a record and returns it with its generated id.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if the record's amounts do not balance.
    /// - [`LedgerError::AlreadyPurchased`] if a success record already exists
    ///   for the same user and course.
    pub fn append(&self, record: NewPurchaseRecord) -> Result<PurchaseRecord, LedgerError> {
        if !record.is_balanced() {
            return Err(LedgerError::InvalidAmount);
        }
        if record.status != PurchaseStatus::Success {
            let stored = self.build(record);
            self.records.write().push(stored.clone());
            return Ok(stored);
        }

        // Hold the entry while pushing so a concurrent append for the same
        // pair observes either nothing or the complete record.
        match self.successes.entry((record.user_id, record.course_id)) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyPurchased {
                user_id: record.user_id,
                course_id: record.course_id,
            }),
            Entry::Vacant(entry) => {
                let stored = self.build(record);
                entry.insert(stored.id);
                self.records.write().push(stored.clone());
                Ok(stored)
            }
        }
    }

    /// Returns the success record for the pair, or else the latest attempt.
    pub fn find_by_user_and_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Option<PurchaseRecord> {
        let success_id = self
            .successes
            .get(&(user_id, course_id))
            .map(|entry| *entry.value());
        let records = self.records.read();
        match success_id {
            Some(id) => records.iter().find(|r| r.id == id).cloned(),
            None => records
                .iter()
                .rev()
                .find(|r| r.user_id == user_id && r.course_id == course_id)
                .cloned(),
        }
    }

    /// Purchases made by the user, newest first.
    pub fn list_by_user(&self, user_id: UserId) -> Vec<PurchaseRecord> {
        self.collect_newest_first(|r| r.user_id == user_id)
    }

    /// Sales of the instructor's courses, newest first.
    pub fn list_by_instructor(&self, instructor_id: UserId) -> Vec<PurchaseRecord> {
        self.collect_newest_first(|r| r.instructor_id == instructor_id)
    }

    pub fn count_by_user(&self, user_id: UserId) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    pub fn count_by_instructor(&self, instructor_id: UserId) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.instructor_id == instructor_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Removes a record appended by a purchase that is being rolled back.
    pub(crate) fn discard(&self, id: PurchaseId) {
        let removed = {
            let mut records = self.records.write();
            records
                .iter()
                .position(|r| r.id == id)
                .map(|index| records.remove(index))
        };
        if let Some(record) = removed.filter(PurchaseRecord::is_success) {
            self.successes
                .remove_if(&(record.user_id, record.course_id), |_, stored| {
                    *stored == id
                });
        }
    }

    fn build(&self, record: NewPurchaseRecord) -> PurchaseRecord {
        PurchaseRecord {
            id: PurchaseId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            user_id: record.user_id,
            course_id: record.course_id,
            instructor_id: record.instructor_id,
            purchase_price: record.purchase_price,
            balance_before: record.balance_before,
            balance_after: record.balance_after,
            instructor_income: record.instructor_income,
            platform_fee: record.platform_fee,
            status: record.status,
            created_at: Utc::now(),
        }
    }

    fn collect_newest_first<F>(&self, filter: F) -> Vec<PurchaseRecord>
    where
        F: Fn(&PurchaseRecord) -> bool,
    {
        let mut matching: Vec<PurchaseRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching
    }
}

impl Default for PurchaseRecordStore {
    fn default() -> Self {
        Self::new()
    }
}
