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

//! In-memory adapters for the catalog and user directory ports.
//!
//! Used by the CLI, the demo server and tests.

use crate::base::{CourseId, UserId};
use crate::ports::catalog::{CatalogError, Course, CourseCatalog};
use crate::ports::users::UserDirectory;
use dashmap::DashMap;
use rust_decimal::Decimal;

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    courses: DashMap<CourseId, Course>,
    student_counts: DashMap<CourseId, u32>,
    ownerships: DashMap<(UserId, CourseId), Decimal>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a course.
    pub fn insert_course(&self, course: Course) {
        self.courses.insert(course.id, course);
    }

    pub fn student_count(&self, course_id: CourseId) -> u32 {
        self.student_counts
            .get(&course_id)
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Price the user paid for the course, if they own it.
    pub fn ownership(&self, user_id: UserId, course_id: CourseId) -> Option<Decimal> {
        self.ownerships
            .get(&(user_id, course_id))
            .map(|price| *price)
    }
}

impl CourseCatalog for InMemoryCatalog {
    fn get_course_by_id(&self, course_id: CourseId) -> Result<Option<Course>, CatalogError> {
        Ok(self.courses.get(&course_id).map(|course| course.clone()))
    }

    fn increment_student_count(&self, course_id: CourseId) -> Result<(), CatalogError> {
        if !self.courses.contains_key(&course_id) {
            return Err(CatalogError::Unavailable(format!(
                "course {course_id} vanished from catalog"
            )));
        }
        *self.student_counts.entry(course_id).or_insert(0) += 1;
        Ok(())
    }

    fn decrement_student_count(&self, course_id: CourseId) -> Result<(), CatalogError> {
        if let Some(mut count) = self.student_counts.get_mut(&course_id) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    fn register_ownership(
        &self,
        user_id: UserId,
        course_id: CourseId,
        price: Decimal,
    ) -> Result<(), CatalogError> {
        self.ownerships.insert((user_id, course_id), price);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    names: DashMap<UserId, String>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, username: impl Into<String>) {
        self.names.insert(user_id, username.into());
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn username(&self, user_id: UserId) -> Option<String> {
        self.names.get(&user_id).map(|name| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::catalog::CourseStatus;
    use rust_decimal_macros::dec;

    fn course(id: u32) -> Course {
        Course {
            id: CourseId(id),
            title: format!("Course {id}"),
            price: dec!(10.00),
            instructor_id: UserId(50),
            status: CourseStatus::Published,
            cover_image: None,
        }
    }

    #[test]
    fn lookup_and_counters() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_course(course(1));

        assert_eq!(catalog.get_course_by_id(CourseId(1)).unwrap(), Some(course(1)));
        assert_eq!(catalog.get_course_by_id(CourseId(2)).unwrap(), None);

        catalog.increment_student_count(CourseId(1)).unwrap();
        catalog.increment_student_count(CourseId(1)).unwrap();
        assert_eq!(catalog.student_count(CourseId(1)), 2);
        assert_eq!(catalog.student_count(CourseId(2)), 0);
    }

    #[test]
    fn decrement_never_goes_below_zero() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_course(course(1));
        catalog.increment_student_count(CourseId(1)).unwrap();

        catalog.decrement_student_count(CourseId(1)).unwrap();
        catalog.decrement_student_count(CourseId(1)).unwrap();
        catalog.decrement_student_count(CourseId(2)).unwrap();
        assert_eq!(catalog.student_count(CourseId(1)), 0);
        assert_eq!(catalog.student_count(CourseId(2)), 0);
    }

    #[test]
    fn increment_unknown_course_fails() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.increment_student_count(CourseId(9)).is_err());
    }

    #[test]
    fn ownership_keeps_price_paid() {
        let catalog = InMemoryCatalog::new();
        catalog
            .register_ownership(UserId(1), CourseId(1), dec!(9.90))
            .unwrap();
        assert_eq!(catalog.ownership(UserId(1), CourseId(1)), Some(dec!(9.90)));
        assert_eq!(catalog.ownership(UserId(2), CourseId(1)), None);
    }

    #[test]
    fn directory_names() {
        let users = InMemoryUserDirectory::new();
        users.insert(UserId(3), "ada");
        assert_eq!(users.username(UserId(3)).as_deref(), Some("ada"));
        assert_eq!(users.username(UserId(4)), None);
    }
}
