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

//! Error types for ledger and purchase operations.

use crate::base::{CourseId, UserId};
use crate::ports::catalog::CatalogError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger and purchase errors.
///
/// Every variant maps to a stable machine-readable [`code`](LedgerError::code);
/// the `Display` output is the human-readable message shown to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Course does not exist in the catalog
    #[error("course {0} does not exist")]
    CourseNotFound(CourseId),

    /// Course exists but is not open for sale
    #[error("course {0} is not published")]
    CourseNotPublished(CourseId),

    /// User already holds a successful purchase of the course
    #[error("user {user_id} has already purchased course {course_id}")]
    AlreadyPurchased { user_id: UserId, course_id: CourseId },

    /// Available balance is below the amount required
    #[error("insufficient balance, current: ¥{current:.2}, required: ¥{required:.2}")]
    InsufficientFunds { current: Decimal, required: Decimal },

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// No balance row exists for the user
    #[error("no balance account for user {0}")]
    AccountNotFound(UserId),

    /// A balance or lifetime total would leave the representable range
    #[error("amount exceeds the supported balance range")]
    AmountOverflow,

    /// A balance row already exists for the user
    #[error("balance account for user {0} already exists")]
    DuplicateAccount(UserId),

    /// Money moved but the purchase could not be committed
    #[error("purchase could not be committed: {reason}")]
    PurchaseCommitFailed { reason: String },

    /// The course catalog could not answer a lookup
    #[error("course catalog unavailable: {0}")]
    Catalog(#[from] CatalogError),
}

impl LedgerError {
    /// Stable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CourseNotFound(_) => "COURSE_NOT_FOUND",
            Self::CourseNotPublished(_) => "COURSE_NOT_PUBLISHED",
            Self::AlreadyPurchased { .. } => "ALREADY_PURCHASED",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            Self::PurchaseCommitFailed { .. } => "PURCHASE_COMMIT_FAILED",
            Self::Catalog(_) => "CATALOG_UNAVAILABLE",
        }
    }
}
