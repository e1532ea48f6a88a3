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

//! # Course Ledger
//!
//! Wallet ledger and purchase engine for an online course marketplace:
//! per-user balances, wallet recharges, course purchases with a platform fee,
//! and an instructor income ledger.
//!
//! ## Core Components
//!
//! - [`PurchaseOrchestrator`]: Sells courses and recharges wallets as atomic units of work
//! - [`LedgerStore`]: One [`Account`] per user with credit/debit operations
//! - [`PurchaseRecordStore`]: Append-only purchase log, one success per user and course
//! - [`InstructorIncomeStore`]: Per-instructor income records with running totals
//! - [`RechargeRecordStore`]: Append-only wallet top-up log
//! - [`LedgerError`]: Typed failures with stable machine-readable codes
//!
//! ## Example
//!
//! ```
//! use course_ledger::adapters::memory::{InMemoryCatalog, InMemoryUserDirectory};
//! use course_ledger::ports::catalog::{Course, CourseStatus};
//! use course_ledger::{CourseId, LedgerConfig, PurchaseOrchestrator, UserId};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let catalog = InMemoryCatalog::new();
//! catalog.insert_course(Course {
//!     id: CourseId(1),
//!     title: "Rust for Accountants".into(),
//!     price: dec!(50.00),
//!     instructor_id: UserId(100),
//!     status: CourseStatus::Published,
//!     cover_image: None,
//! });
//! let orchestrator = PurchaseOrchestrator::new(
//!     LedgerConfig::default(),
//!     Arc::new(catalog),
//!     Arc::new(InMemoryUserDirectory::new()),
//! );
//!
//! orchestrator.recharge(UserId(1), dec!(100.00), None).unwrap();
//! let confirmation = orchestrator.purchase_course(UserId(1), CourseId(1)).unwrap();
//!
//! assert_eq!(confirmation.balance_after, dec!(50.00));
//! assert_eq!(orchestrator.total_income_for_instructor(UserId(100)), dec!(47.50));
//! ```
//!
//! ## Thread Safety
//!
//! Purchases for different buyers run in parallel. A purchase holds the
//! buyer's and the instructor's account locks (taken in user id order) for
//! its whole duration, which serializes concurrent purchases by the same
//! buyer and keeps each instructor's income totals exact.

pub mod account;
pub mod adapters;
mod base;
pub mod config;
pub mod error;
pub mod fee;
pub mod income;
mod ledger;
mod orchestrator;
pub mod ports;
pub mod purchase;
pub mod recharge;

pub use account::{Account, AccountBalance, BalanceChange};
pub use base::{CourseId, IncomeId, PurchaseId, RechargeId, UserId};
pub use config::{ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use fee::FeeSplit;
pub use income::{InstructorIncome, InstructorIncomeStore, NewInstructorIncome};
pub use ledger::LedgerStore;
pub use orchestrator::{
    BalanceInfo, PurchaseConfirmation, PurchaseOrchestrator, PurchasedCourse, UserLedgerSummary,
};
pub use purchase::{NewPurchaseRecord, PurchaseRecord, PurchaseRecordStore, PurchaseStatus};
pub use recharge::{NewRechargeRecord, RechargeRecord, RechargeRecordStore, RechargeType};
