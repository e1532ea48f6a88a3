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

//! Wallet recharge records.

use crate::LedgerError;
use crate::account::BalanceChange;
use crate::base::{RechargeId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RechargeType {
    /// Top-up requested by the user.
    Manual,
    /// Credit issued by the platform.
    System,
}

/// A stored wallet top-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RechargeRecord {
    pub id: RechargeId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub recharge_type: RechargeType,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Top-up as submitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRechargeRecord {
    pub user_id: UserId,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub recharge_type: RechargeType,
    pub remark: Option<String>,
}

impl NewRechargeRecord {
    pub fn new(
        user_id: UserId,
        change: BalanceChange,
        recharge_type: RechargeType,
        remark: Option<String>,
    ) -> Self {
        Self {
            user_id,
            amount: change.after - change.before,
            balance_before: change.before,
            balance_after: change.after,
            recharge_type,
            remark,
        }
    }
}

/// Append-only recharge log.
#[derive(Debug)]
pub struct RechargeRecordStore {
    records: RwLock<Vec<RechargeRecord>>,
    next_id: AtomicU64,
}

impl RechargeRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a recharge record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if the amount is not positive or the
    /// before/after snapshot does not add up.
    pub fn append(&self, record: NewRechargeRecord) -> Result<RechargeRecord, LedgerError> {
        if record.amount <= Decimal::ZERO
            || record.balance_after != record.balance_before + record.amount
        {
            return Err(LedgerError::InvalidAmount);
        }
        let stored = RechargeRecord {
            id: RechargeId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            user_id: record.user_id,
            amount: record.amount,
            balance_before: record.balance_before,
            balance_after: record.balance_after,
            recharge_type: record.recharge_type,
            remark: record.remark,
            created_at: Utc::now(),
        };
        self.records.write().push(stored.clone());
        Ok(stored)
    }

    /// The user's recharges, newest first.
    pub fn list_by_user(&self, user_id: UserId) -> Vec<RechargeRecord> {
        let mut matching: Vec<RechargeRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching
    }

    pub fn count_by_user(&self, user_id: UserId) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for RechargeRecordStore {
    fn default() -> Self {
        Self::new()
    }
}
