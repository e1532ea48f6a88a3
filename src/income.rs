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

//! Instructor income ledger.
//!
//! Each sale appends one income record for the course's instructor. The
//! running total is computed by the store while it holds that instructor's
//! log exclusively, so concurrent sales can never read the same previous
//! total.

use crate::LedgerError;
use crate::base::{CourseId, IncomeId, PurchaseId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A stored income event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstructorIncome {
    pub id: IncomeId,
    pub instructor_id: UserId,
    pub course_id: CourseId,
    pub purchase_id: PurchaseId,
    pub income_amount: Decimal,
    /// Sum of every `income_amount` for this instructor up to and including this record.
    pub total_income: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Income event as submitted by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewInstructorIncome {
    pub instructor_id: UserId,
    pub course_id: CourseId,
    pub purchase_id: PurchaseId,
    pub income_amount: Decimal,
}

type IncomeLog = Arc<Mutex<Vec<InstructorIncome>>>;

/// Append-only income records, partitioned by instructor.
#[derive(Debug)]
pub struct InstructorIncomeStore {
    logs: DashMap<UserId, IncomeLog>,
    next_id: AtomicU64,
}

impl InstructorIncomeStore {
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends an income record, carrying the instructor's running total forward.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if the income is negative.
    pub fn append(&self, income: NewInstructorIncome) -> Result<InstructorIncome, LedgerError> {
        if income.income_amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let log = self.log(income.instructor_id);
        let mut entries = log.lock();
        let previous = entries
            .last()
            .map(|last| last.total_income)
            .unwrap_or(Decimal::ZERO);
        let record = InstructorIncome {
            id: IncomeId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            instructor_id: income.instructor_id,
            course_id: income.course_id,
            purchase_id: income.purchase_id,
            income_amount: income.income_amount,
            total_income: previous + income.income_amount,
            created_at: Utc::now(),
        };
        entries.push(record.clone());
        Ok(record)
    }

    /// Sum of all income amounts for the instructor; zero when none exist.
    pub fn total_for_instructor(&self, instructor_id: UserId) -> Decimal {
        self.existing_log(instructor_id)
            .map(|log| log.lock().iter().map(|r| r.income_amount).sum())
            .unwrap_or(Decimal::ZERO)
    }

    /// The instructor's income records, newest first.
    pub fn list_for_instructor(&self, instructor_id: UserId) -> Vec<InstructorIncome> {
        self.existing_log(instructor_id)
            .map(|log| log.lock().iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        let logs: Vec<IncomeLog> = self.logs.iter().map(|e| Arc::clone(e.value())).collect();
        logs.iter().map(|log| log.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes a record appended by a purchase that is being rolled back and
    /// re-derives the running totals that followed it.
    pub(crate) fn discard(&self, instructor_id: UserId, id: IncomeId) {
        let Some(log) = self.existing_log(instructor_id) else {
            return;
        };
        let mut entries = log.lock();
        let Some(index) = entries.iter().position(|r| r.id == id) else {
            return;
        };
        entries.remove(index);
        let mut running = if index == 0 {
            Decimal::ZERO
        } else {
            entries[index - 1].total_income
        };
        for entry in entries.iter_mut().skip(index) {
            running += entry.income_amount;
            entry.total_income = running;
        }
    }

    fn log(&self, instructor_id: UserId) -> IncomeLog {
        let entry = self.logs.entry(instructor_id).or_default();
        Arc::clone(entry.value())
    }

    fn existing_log(&self, instructor_id: UserId) -> Option<IncomeLog> {
        self.logs.get(&instructor_id).map(|e| Arc::clone(e.value()))
    }
}

impl Default for InstructorIncomeStore {
    fn default() -> Self {
        Self::new()
    }
}
