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

//! Purchase orchestration.
//!
//! The [`PurchaseOrchestrator`] is the only component that moves money. A
//! course purchase is a single unit of work:
//!
//! 1. Look up the course; it must exist and be published.
//! 2. Reject the purchase if the buyer already owns the course.
//! 3. Lock buyer and instructor accounts, re-check ownership and funds. An
//!    instructor without an account only gets one once the buyer can pay.
//! 4. Split the price into platform fee and instructor income.
//! 5. Debit the buyer.
//! 6. Credit the instructor.
//! 7. Append the purchase record.
//! 8. Append the instructor income record.
//! 9. Report the sale to the catalog: student count first, ownership last.
//!
//! Steps 3 to 9 run while both accounts are locked. If any of them fails, every
//! write made so far is undone before the locks are released, so no other
//! request ever observes a partial purchase. A failure after money moved is
//! reported as [`LedgerError::PurchaseCommitFailed`] and logged at `error`.

use crate::LedgerError;
use crate::account::{Account, AccountBalance, BalanceChange};
use crate::base::{CourseId, IncomeId, PurchaseId, UserId};
use crate::config::LedgerConfig;
use crate::fee::FeeSplit;
use crate::income::{InstructorIncome, InstructorIncomeStore, NewInstructorIncome};
use crate::ledger::{LedgerStore, LockedAccounts};
use crate::ports::catalog::{Course, CourseCatalog};
use crate::ports::users::UserDirectory;
use crate::purchase::{NewPurchaseRecord, PurchaseRecord, PurchaseRecordStore, PurchaseStatus};
use crate::recharge::{NewRechargeRecord, RechargeRecord, RechargeRecordStore, RechargeType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Returned to the buyer after a successful purchase.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PurchaseConfirmation {
    pub purchase_id: PurchaseId,
    pub course_id: CourseId,
    pub course_title: String,
    pub purchase_price: Decimal,
    /// Buyer's balance right after the debit, before any income credited
    /// back when instructors buy their own course.
    pub balance_after: Decimal,
    pub purchased_at: DateTime<Utc>,
    pub status: PurchaseStatus,
}

/// A purchase record decorated with catalog details for display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PurchasedCourse {
    #[serde(flatten)]
    pub record: PurchaseRecord,
    pub course_title: Option<String>,
    pub cover_image: Option<String>,
    pub instructor_name: Option<String>,
}

/// Wallet figures for a single user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BalanceInfo {
    pub user_id: UserId,
    pub available: Decimal,
    pub frozen: Decimal,
    pub total_credited: Decimal,
    pub total_debited: Decimal,
    /// `available - frozen`
    pub spendable: Decimal,
}

impl From<AccountBalance> for BalanceInfo {
    fn from(balance: AccountBalance) -> Self {
        Self {
            user_id: balance.user_id,
            available: balance.available,
            frozen: balance.frozen,
            total_credited: balance.total_credited,
            total_debited: balance.total_debited,
            spendable: balance.spendable(),
        }
    }
}

/// Administrative overview of a user's wallet and purchases.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserLedgerSummary {
    pub user_id: UserId,
    pub balance: Decimal,
    pub total_credited: Decimal,
    pub total_debited: Decimal,
    pub purchased_courses: usize,
    pub purchases: Vec<PurchaseRecord>,
}

/// Writes made by an in-flight purchase, undone on failure.
#[derive(Debug, Default)]
struct PurchaseJournal {
    purchase: Option<PurchaseId>,
    income: Option<(UserId, IncomeId)>,
    student_counted: bool,
}

/// Coordinates the ledger stores and the catalog to sell courses.
pub struct PurchaseOrchestrator<C, U> {
    config: LedgerConfig,
    ledger: LedgerStore,
    purchases: PurchaseRecordStore,
    incomes: InstructorIncomeStore,
    recharges: RechargeRecordStore,
    catalog: Arc<C>,
    users: Arc<U>,
}

impl<C, U> PurchaseOrchestrator<C, U>
where
    C: CourseCatalog,
    U: UserDirectory,
{
    /// Creates an orchestrator with empty stores.
    pub fn new(config: LedgerConfig, catalog: Arc<C>, users: Arc<U>) -> Self {
        Self {
            config,
            ledger: LedgerStore::new(),
            purchases: PurchaseRecordStore::new(),
            incomes: InstructorIncomeStore::new(),
            recharges: RechargeRecordStore::new(),
            catalog,
            users,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn purchases(&self) -> &PurchaseRecordStore {
        &self.purchases
    }

    pub fn incomes(&self) -> &InstructorIncomeStore {
        &self.incomes
    }

    pub fn recharges(&self) -> &RechargeRecordStore {
        &self.recharges
    }

    /// Buys a course on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CourseNotFound`] / [`LedgerError::CourseNotPublished`] - Course cannot be sold.
    /// - [`LedgerError::Catalog`] - Course lookup failed.
    /// - [`LedgerError::AlreadyPurchased`] - User already owns the course.
    /// - [`LedgerError::InsufficientFunds`] - Balance is below the course price.
    /// - [`LedgerError::InvalidAmount`] - Catalog reports a negative price.
    /// - [`LedgerError::AmountOverflow`] - Instructor balance would leave the representable range.
    /// - [`LedgerError::PurchaseCommitFailed`] - A write after validation failed; everything was rolled back.
    pub fn purchase_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<PurchaseConfirmation, LedgerError> {
        let course = self
            .catalog
            .get_course_by_id(course_id)?
            .ok_or(LedgerError::CourseNotFound(course_id))?;
        if !course.is_published() {
            debug!(course_id = %course_id, status = ?course.status, "course not for sale");
            return Err(LedgerError::CourseNotPublished(course_id));
        }
        if course.price < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.has_purchased(user_id, course_id) {
            debug!(user_id = %user_id, course_id = %course_id, "course already owned");
            return Err(LedgerError::AlreadyPurchased { user_id, course_id });
        }

        let buyer = self.ledger.ensure_account(user_id);
        let (instructor, opened) = match self.ledger.account(course.instructor_id) {
            Some(account) => (account, false),
            None => {
                // The instructor's row is only opened for a buyer who can pay.
                self.check_purchasable(user_id, &course, buyer.available())?;
                (self.ledger.ensure_account(course.instructor_id), true)
            }
        };

        let result = self.purchase_locked(user_id, &course, &buyer, &instructor);
        if result.is_err() && opened {
            drop(instructor);
            self.ledger.discard_if_unused(course.instructor_id);
        }
        result
    }

    /// Re-checks and commits the purchase under both account locks.
    fn purchase_locked(
        &self,
        user_id: UserId,
        course: &Course,
        buyer: &Account,
        instructor: &Account,
    ) -> Result<PurchaseConfirmation, LedgerError> {
        let mut locked = LockedAccounts::acquire(user_id, buyer, course.instructor_id, instructor);

        // Another request for the same buyer may have committed while we waited.
        let current = locked.buyer().available();
        self.check_purchasable(user_id, course, current)?;

        let split = FeeSplit::compute(course.price, self.config.platform_fee_rate());
        let buyer_saved = locked.buyer().snapshot();
        let instructor_saved = locked.instructor().snapshot();
        let mut journal = PurchaseJournal::default();

        match self.commit_purchase(&mut locked, &mut journal, user_id, course, split) {
            Ok(record) => {
                info!(
                    user_id = %user_id,
                    course_id = %course.id,
                    purchase_id = %record.id,
                    price = %split.price,
                    platform_fee = %split.platform_fee,
                    "course purchased"
                );
                Ok(PurchaseConfirmation {
                    purchase_id: record.id,
                    course_id: course.id,
                    course_title: course.title.clone(),
                    purchase_price: record.purchase_price,
                    balance_after: record.balance_after,
                    purchased_at: record.created_at,
                    status: record.status,
                })
            }
            Err(failure) => {
                if journal.student_counted {
                    if let Err(e) = self.catalog.decrement_student_count(course.id) {
                        error!(course_id = %course.id, error = %e, "student count not restored");
                    }
                }
                if let Some((instructor_id, income_id)) = journal.income {
                    self.incomes.discard(instructor_id, income_id);
                }
                if let Some(purchase_id) = journal.purchase {
                    self.purchases.discard(purchase_id);
                }
                locked.instructor().restore(&instructor_saved);
                locked.buyer().restore(&buyer_saved);

                if let LedgerError::PurchaseCommitFailed { reason } = &failure {
                    error!(
                        user_id = %user_id,
                        course_id = %course.id,
                        price = %split.price,
                        %reason,
                        "purchase commit failed, ledger rolled back"
                    );
                }
                Err(failure)
            }
        }
    }

    /// Ownership and funds checks shared by the unlocked pre-check and the locked re-check.
    fn check_purchasable(
        &self,
        user_id: UserId,
        course: &Course,
        current: Decimal,
    ) -> Result<(), LedgerError> {
        if self.has_purchased(user_id, course.id) {
            debug!(user_id = %user_id, course_id = %course.id, "course already owned");
            return Err(LedgerError::AlreadyPurchased {
                user_id,
                course_id: course.id,
            });
        }
        if current < course.price {
            debug!(user_id = %user_id, %current, required = %course.price, "insufficient balance");
            return Err(LedgerError::InsufficientFunds {
                current,
                required: course.price,
            });
        }
        Ok(())
    }

    /// Steps 5 to 9. Every write is recorded in `journal` before the next one starts.
    fn commit_purchase(
        &self,
        locked: &mut LockedAccounts<'_>,
        journal: &mut PurchaseJournal,
        user_id: UserId,
        course: &Course,
        split: FeeSplit,
    ) -> Result<PurchaseRecord, LedgerError> {
        let debit = if split.price > Decimal::ZERO {
            locked.buyer().debit(split.price)?
        } else {
            let available = locked.buyer().available();
            BalanceChange {
                before: available,
                after: available,
            }
        };
        if split.instructor_income > Decimal::ZERO {
            locked.instructor().credit(split.instructor_income)?;
        }

        let record = self
            .purchases
            .append(NewPurchaseRecord::success(
                user_id,
                course.id,
                course.instructor_id,
                split,
                debit,
            ))
            .map_err(|e| match e {
                LedgerError::AlreadyPurchased { .. } => {
                    warn!(user_id = %user_id, course_id = %course.id, "duplicate purchase caught by record store");
                    e
                }
                other => commit_failed("purchase record", other),
            })?;
        journal.purchase = Some(record.id);

        let income = self
            .incomes
            .append(NewInstructorIncome {
                instructor_id: course.instructor_id,
                course_id: course.id,
                purchase_id: record.id,
                income_amount: split.instructor_income,
            })
            .map_err(|e| commit_failed("instructor income", e))?;
        journal.income = Some((income.instructor_id, income.id));

        self.catalog
            .increment_student_count(course.id)
            .map_err(|e| commit_failed("catalog student count", e))?;
        journal.student_counted = true;
        // Last write: once ownership is granted nothing else can fail.
        self.catalog
            .register_ownership(user_id, course.id, split.price)
            .map_err(|e| commit_failed("catalog ownership", e))?;

        Ok(record)
    }

    /// Credits the user's wallet and records the top-up as a manual recharge.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if `amount <= 0`; nothing is created or changed.
    pub fn recharge(
        &self,
        user_id: UserId,
        amount: Decimal,
        remark: Option<String>,
    ) -> Result<RechargeRecord, LedgerError> {
        self.recharge_as(user_id, amount, RechargeType::Manual, remark)
    }

    /// Same as [`recharge`](Self::recharge) with an explicit recharge type.
    pub fn recharge_as(
        &self,
        user_id: UserId,
        amount: Decimal,
        recharge_type: RechargeType,
        remark: Option<String>,
    ) -> Result<RechargeRecord, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let account = self.ledger.ensure_account(user_id);
        let mut data = account.lock();
        let saved = data.snapshot();
        let change = data.credit(amount)?;

        match self
            .recharges
            .append(NewRechargeRecord::new(user_id, change, recharge_type, remark))
        {
            Ok(record) => {
                info!(
                    user_id = %user_id,
                    amount = %amount,
                    balance_after = %record.balance_after,
                    "wallet recharged"
                );
                Ok(record)
            }
            Err(e) => {
                data.restore(&saved);
                Err(e)
            }
        }
    }

    /// True when a successful purchase of the course exists for the user.
    pub fn has_purchased(&self, user_id: UserId, course_id: CourseId) -> bool {
        self.purchases
            .find_by_user_and_course(user_id, course_id)
            .is_some_and(|record| record.is_success())
    }

    /// The user's purchases, newest first, joined with course and instructor details.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Catalog`] if a course lookup fails.
    pub fn list_purchases_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PurchasedCourse>, LedgerError> {
        self.purchases
            .list_by_user(user_id)
            .into_iter()
            .map(|record| {
                let course = self.catalog.get_course_by_id(record.course_id)?;
                let instructor_name = course
                    .as_ref()
                    .and_then(|course| self.users.username(course.instructor_id));
                Ok(PurchasedCourse {
                    course_title: course.as_ref().map(|c| c.title.clone()),
                    cover_image: course.and_then(|c| c.cover_image),
                    instructor_name,
                    record,
                })
            })
            .collect()
    }

    /// Sales of the instructor's courses, newest first.
    pub fn list_sales_for_instructor(&self, instructor_id: UserId) -> Vec<PurchaseRecord> {
        self.purchases.list_by_instructor(instructor_id)
    }

    /// Sum of everything the instructor has earned.
    pub fn total_income_for_instructor(&self, instructor_id: UserId) -> Decimal {
        self.incomes.total_for_instructor(instructor_id)
    }

    /// The instructor's income records, newest first.
    pub fn income_history(&self, instructor_id: UserId) -> Vec<InstructorIncome> {
        self.incomes.list_for_instructor(instructor_id)
    }

    /// Wallet figures for the user, opening a zero-balance account on first access.
    pub fn balance_info(&self, user_id: UserId) -> BalanceInfo {
        self.ledger.ensure_account(user_id).balance().into()
    }

    /// True when the user could spend `amount` right now.
    pub fn check_balance(&self, user_id: UserId, amount: Decimal) -> bool {
        self.ledger
            .get_balance(user_id)
            .is_some_and(|balance| balance.spendable() >= amount)
    }

    /// The user's recharges, newest first.
    pub fn recharge_history(&self, user_id: UserId) -> Vec<RechargeRecord> {
        self.recharges.list_by_user(user_id)
    }

    /// Balance figures and purchases for administrators. Does not open an account.
    pub fn user_ledger_summary(&self, user_id: UserId) -> UserLedgerSummary {
        let (balance, total_credited, total_debited) = self
            .ledger
            .get_balance(user_id)
            .map(|b| (b.available, b.total_credited, b.total_debited))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));
        let purchases = self.purchases.list_by_user(user_id);
        UserLedgerSummary {
            user_id,
            balance,
            total_credited,
            total_debited,
            purchased_courses: purchases.len(),
            purchases,
        }
    }
}

fn commit_failed(stage: &str, cause: impl std::fmt::Display) -> LedgerError {
    LedgerError::PurchaseCommitFailed {
        reason: format!("{stage}: {cause}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCatalog, InMemoryUserDirectory};
    use crate::ports::catalog::{CatalogError, CourseStatus, MockCourseCatalog};
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    const BUYER: UserId = UserId(1);
    const INSTRUCTOR: UserId = UserId(100);

    fn course(id: u32, price: Decimal) -> Course {
        Course {
            id: CourseId(id),
            title: format!("Course {id}"),
            price,
            instructor_id: INSTRUCTOR,
            status: CourseStatus::Published,
            cover_image: Some(format!("/covers/{id}.png")),
        }
    }

    fn orchestrator_with(
        courses: Vec<Course>,
    ) -> PurchaseOrchestrator<InMemoryCatalog, InMemoryUserDirectory> {
        let catalog = InMemoryCatalog::new();
        for course in courses {
            catalog.insert_course(course);
        }
        let users = InMemoryUserDirectory::new();
        users.insert(INSTRUCTOR, "prof");
        PurchaseOrchestrator::new(LedgerConfig::default(), Arc::new(catalog), Arc::new(users))
    }

    fn failing_catalog(
        course: Course,
        ownership_fails: bool,
    ) -> PurchaseOrchestrator<MockCourseCatalog, InMemoryUserDirectory> {
        let mut catalog = MockCourseCatalog::new();
        let id = course.id;
        catalog
            .expect_get_course_by_id()
            .with(eq(id))
            .returning(move |_| Ok(Some(course.clone())));
        if ownership_fails {
            catalog
                .expect_increment_student_count()
                .times(1)
                .returning(|_| Ok(()));
            catalog
                .expect_register_ownership()
                .times(1)
                .returning(|_, _, _| Err(CatalogError::Unavailable("connection reset".into())));
            catalog
                .expect_decrement_student_count()
                .with(eq(id))
                .times(1)
                .returning(|_| Ok(()));
        } else {
            catalog
                .expect_increment_student_count()
                .times(1)
                .returning(|_| Err(CatalogError::Unavailable("timeout".into())));
            catalog.expect_register_ownership().never();
            catalog.expect_decrement_student_count().never();
        }
        PurchaseOrchestrator::new(
            LedgerConfig::default(),
            Arc::new(catalog),
            Arc::new(InMemoryUserDirectory::new()),
        )
    }

    #[test]
    fn recharge_then_purchase() {
        let orchestrator = orchestrator_with(vec![course(1, dec!(50.00))]);
        orchestrator.recharge(BUYER, dec!(100.00), None).unwrap();

        let confirmation = orchestrator.purchase_course(BUYER, CourseId(1)).unwrap();
        assert_eq!(confirmation.balance_after, dec!(50.00));
        assert_eq!(confirmation.purchase_price, dec!(50.00));
        assert_eq!(confirmation.course_title, "Course 1");
        assert_eq!(confirmation.status, PurchaseStatus::Success);

        let record = orchestrator
            .purchases()
            .find_by_user_and_course(BUYER, CourseId(1))
            .unwrap();
        assert_eq!(record.platform_fee, dec!(2.50));
        assert_eq!(record.instructor_income, dec!(47.50));
        assert_eq!(record.balance_before, dec!(100.00));

        let incomes = orchestrator.income_history(INSTRUCTOR);
        assert_eq!(incomes.len(), 1);
        assert_eq!(incomes[0].total_income, dec!(47.50));
        assert_eq!(incomes[0].purchase_id, record.id);
        assert_eq!(orchestrator.ledger().get_balance(INSTRUCTOR).unwrap().available, dec!(47.50));
    }

    #[test]
    fn purchase_registers_with_catalog() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert_course(course(1, dec!(10.00)));
        let orchestrator = PurchaseOrchestrator::new(
            LedgerConfig::default(),
            Arc::clone(&catalog),
            Arc::new(InMemoryUserDirectory::new()),
        );
        orchestrator.recharge(BUYER, dec!(10.00), None).unwrap();
        orchestrator.purchase_course(BUYER, CourseId(1)).unwrap();

        assert_eq!(catalog.student_count(CourseId(1)), 1);
        assert_eq!(catalog.ownership(BUYER, CourseId(1)), Some(dec!(10.00)));
    }

    #[test]
    fn unknown_and_unpublished_courses() {
        let mut draft = course(2, dec!(5.00));
        draft.status = CourseStatus::Pending;
        let orchestrator = orchestrator_with(vec![draft]);

        assert_eq!(
            orchestrator.purchase_course(BUYER, CourseId(1)),
            Err(LedgerError::CourseNotFound(CourseId(1)))
        );
        assert_eq!(
            orchestrator.purchase_course(BUYER, CourseId(2)),
            Err(LedgerError::CourseNotPublished(CourseId(2)))
        );
        assert!(orchestrator.ledger().is_empty());
    }

    #[test]
    fn insufficient_funds_changes_nothing() {
        let orchestrator = orchestrator_with(vec![course(1, dec!(50.00))]);
        orchestrator.recharge(BUYER, dec!(12.00), None).unwrap();

        let result = orchestrator.purchase_course(BUYER, CourseId(1));
        assert_eq!(
            result,
            Err(LedgerError::InsufficientFunds {
                current: dec!(12.00),
                required: dec!(50.00),
            })
        );
        let balance = orchestrator.ledger().get_balance(BUYER).unwrap();
        assert_eq!(balance.available, dec!(12.00));
        assert_eq!(balance.total_debited, Decimal::ZERO);
        assert!(orchestrator.purchases().is_empty());
        assert!(orchestrator.incomes().is_empty());
        assert!(orchestrator.ledger().get_balance(INSTRUCTOR).is_none());
        assert_eq!(orchestrator.ledger().len(), 1);
    }

    #[test]
    fn failed_purchase_keeps_existing_instructor_account() {
        let orchestrator = orchestrator_with(vec![course(1, dec!(50.00))]);
        orchestrator.recharge(INSTRUCTOR, dec!(5.00), None).unwrap();
        orchestrator.recharge(BUYER, dec!(10.00), None).unwrap();

        assert!(orchestrator.purchase_course(BUYER, CourseId(1)).is_err());
        let instructor = orchestrator.ledger().get_balance(INSTRUCTOR).unwrap();
        assert_eq!(instructor.available, dec!(5.00));
    }

    #[test]
    fn instructor_overflow_rolls_back_buyer() {
        let orchestrator = orchestrator_with(vec![course(1, dec!(50.00))]);
        orchestrator.recharge(INSTRUCTOR, Decimal::MAX, None).unwrap();
        orchestrator.recharge(BUYER, dec!(50.00), None).unwrap();

        assert_eq!(
            orchestrator.purchase_course(BUYER, CourseId(1)),
            Err(LedgerError::AmountOverflow)
        );
        assert_eq!(orchestrator.ledger().get_balance(BUYER).unwrap().available, dec!(50.00));
        assert_eq!(
            orchestrator.ledger().get_balance(INSTRUCTOR).unwrap().available,
            Decimal::MAX
        );
        assert!(orchestrator.purchases().is_empty());
    }

    #[test]
    fn repeated_max_recharge_reports_overflow() {
        let orchestrator = orchestrator_with(vec![]);
        orchestrator.recharge(BUYER, Decimal::MAX, None).unwrap();

        assert_eq!(
            orchestrator.recharge(BUYER, Decimal::MAX, None),
            Err(LedgerError::AmountOverflow)
        );
        assert_eq!(orchestrator.ledger().get_balance(BUYER).unwrap().available, Decimal::MAX);
        assert_eq!(orchestrator.recharges().len(), 1);
    }

    #[test]
    fn repurchase_is_rejected_without_mutation() {
        let orchestrator = orchestrator_with(vec![course(1, dec!(20.00))]);
        orchestrator.recharge(BUYER, dec!(100.00), None).unwrap();
        orchestrator.purchase_course(BUYER, CourseId(1)).unwrap();
        let before = orchestrator.ledger().get_balance(BUYER).unwrap();

        assert_eq!(
            orchestrator.purchase_course(BUYER, CourseId(1)),
            Err(LedgerError::AlreadyPurchased {
                user_id: BUYER,
                course_id: CourseId(1),
            })
        );
        assert_eq!(orchestrator.ledger().get_balance(BUYER).unwrap(), before);
        assert_eq!(orchestrator.purchases().len(), 1);
    }

    #[test]
    fn free_course_moves_no_money() {
        let orchestrator = orchestrator_with(vec![course(1, Decimal::ZERO)]);
        let confirmation = orchestrator.purchase_course(BUYER, CourseId(1)).unwrap();

        assert_eq!(confirmation.balance_after, Decimal::ZERO);
        assert!(orchestrator.has_purchased(BUYER, CourseId(1)));
        assert_eq!(orchestrator.total_income_for_instructor(INSTRUCTOR), Decimal::ZERO);
        assert_eq!(orchestrator.incomes().len(), 1);
        let instructor = orchestrator.ledger().get_balance(INSTRUCTOR).unwrap();
        assert_eq!(instructor.total_credited, Decimal::ZERO);
    }

    #[test]
    fn instructor_can_buy_own_course() {
        let mut own = course(1, dec!(40.00));
        own.instructor_id = BUYER;
        let orchestrator = orchestrator_with(vec![own]);
        orchestrator.recharge(BUYER, dec!(40.00), None).unwrap();

        let confirmation = orchestrator.purchase_course(BUYER, CourseId(1)).unwrap();
        assert_eq!(confirmation.balance_after, dec!(0.00));

        // The fee is the only money that leaves the account.
        let balance = orchestrator.ledger().get_balance(BUYER).unwrap();
        assert_eq!(balance.available, dec!(38.00));
        assert_eq!(balance.total_debited, dec!(40.00));
        assert_eq!(balance.total_credited, dec!(78.00));
        // The confirmation reports the post-debit figure, not the final one.
        assert!(confirmation.balance_after < balance.available);
    }

    #[test]
    fn ownership_failure_rolls_back_everything() {
        let orchestrator = failing_catalog(course(1, dec!(50.00)), true);
        orchestrator.recharge(BUYER, dec!(100.00), None).unwrap();
        let buyer_before = orchestrator.ledger().get_balance(BUYER).unwrap();

        let result = orchestrator.purchase_course(BUYER, CourseId(1));
        assert!(matches!(
            result,
            Err(LedgerError::PurchaseCommitFailed { ref reason }) if reason.contains("catalog ownership")
        ));

        assert_eq!(orchestrator.ledger().get_balance(BUYER).unwrap(), buyer_before);
        assert!(orchestrator.ledger().get_balance(INSTRUCTOR).is_none());
        assert!(orchestrator.purchases().is_empty());
        assert!(orchestrator.incomes().is_empty());
        assert!(!orchestrator.has_purchased(BUYER, CourseId(1)));
    }

    #[test]
    fn student_count_failure_rolls_back_everything() {
        let orchestrator = failing_catalog(course(1, dec!(30.00)), false);
        orchestrator.recharge(BUYER, dec!(30.00), None).unwrap();

        let result = orchestrator.purchase_course(BUYER, CourseId(1));
        assert_eq!(
            result.map_err(|e| e.code()),
            Err("PURCHASE_COMMIT_FAILED")
        );
        assert_eq!(orchestrator.ledger().get_balance(BUYER).unwrap().available, dec!(30.00));
        assert_eq!(orchestrator.total_income_for_instructor(INSTRUCTOR), Decimal::ZERO);
        assert!(orchestrator.list_sales_for_instructor(INSTRUCTOR).is_empty());
    }

    #[test]
    fn catalog_lookup_failure_is_reported() {
        let mut catalog = MockCourseCatalog::new();
        catalog
            .expect_get_course_by_id()
            .returning(|_| Err(CatalogError::Unavailable("down".into())));
        let orchestrator = PurchaseOrchestrator::new(
            LedgerConfig::default(),
            Arc::new(catalog),
            Arc::new(InMemoryUserDirectory::new()),
        );
        assert_eq!(
            orchestrator.purchase_course(BUYER, CourseId(1)),
            Err(LedgerError::Catalog(CatalogError::Unavailable("down".into())))
        );
    }

    #[test]
    fn recharge_rejects_non_positive_amount() {
        let orchestrator = orchestrator_with(vec![]);
        assert_eq!(
            orchestrator.recharge(BUYER, Decimal::ZERO, None),
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(
            orchestrator.recharge(BUYER, dec!(-10), None),
            Err(LedgerError::InvalidAmount)
        );
        assert!(orchestrator.ledger().is_empty());
        assert!(orchestrator.recharges().is_empty());
    }

    #[test]
    fn recharge_records_snapshot() {
        let orchestrator = orchestrator_with(vec![]);
        orchestrator.recharge(BUYER, dec!(30.00), None).unwrap();
        let record = orchestrator
            .recharge_as(BUYER, dec!(5.00), RechargeType::System, Some("refund".into()))
            .unwrap();

        assert_eq!(record.balance_before, dec!(30.00));
        assert_eq!(record.balance_after, dec!(35.00));
        assert_eq!(record.recharge_type, RechargeType::System);
        assert_eq!(orchestrator.recharge_history(BUYER).len(), 2);
        assert_eq!(orchestrator.balance_info(BUYER).total_credited, dec!(35.00));
    }

    #[test]
    fn purchases_listing_joins_catalog_and_users() {
        let orchestrator = orchestrator_with(vec![course(1, dec!(10.00)), course(2, dec!(15.00))]);
        orchestrator.recharge(BUYER, dec!(25.00), None).unwrap();
        orchestrator.purchase_course(BUYER, CourseId(1)).unwrap();
        orchestrator.purchase_course(BUYER, CourseId(2)).unwrap();

        let listing = orchestrator.list_purchases_for_user(BUYER).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].record.course_id, CourseId(2));
        assert_eq!(listing[0].course_title.as_deref(), Some("Course 2"));
        assert_eq!(listing[0].cover_image.as_deref(), Some("/covers/2.png"));
        assert_eq!(listing[0].instructor_name.as_deref(), Some("prof"));
    }

    #[test]
    fn balance_queries() {
        let orchestrator = orchestrator_with(vec![]);
        assert!(!orchestrator.check_balance(BUYER, dec!(1)));

        let summary = orchestrator.user_ledger_summary(BUYER);
        assert_eq!(summary.balance, Decimal::ZERO);
        assert_eq!(summary.purchased_courses, 0);
        assert!(orchestrator.ledger().get_balance(BUYER).is_none());

        let info = orchestrator.balance_info(BUYER);
        assert_eq!(info.spendable, Decimal::ZERO);
        assert!(orchestrator.ledger().get_balance(BUYER).is_some());

        orchestrator.recharge(BUYER, dec!(8.00), None).unwrap();
        assert!(orchestrator.check_balance(BUYER, dec!(8.00)));
        assert!(!orchestrator.check_balance(BUYER, dec!(8.01)));
    }
}
