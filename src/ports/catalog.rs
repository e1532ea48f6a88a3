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

//! Course catalog port.
//!
//! The catalog is owned by another part of the platform. The ledger only
//! reads course facts and reports sales back to it.

use crate::base::{CourseId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[cfg_attr(test, mockall::automock)]
pub trait CourseCatalog: Send + Sync {
    fn get_course_by_id(&self, course_id: CourseId) -> Result<Option<Course>, CatalogError>;

    /// Bumps the course's enrolled-student counter after a sale.
    fn increment_student_count(&self, course_id: CourseId) -> Result<(), CatalogError>;

    /// Takes back an increment whose sale did not go through.
    fn decrement_student_count(&self, course_id: CourseId) -> Result<(), CatalogError>;

    /// Records that the user now owns the course, at the price paid.
    fn register_ownership(
        &self,
        user_id: UserId,
        course_id: CourseId,
        price: Decimal,
    ) -> Result<(), CatalogError>;
}

/// Publication state of a course. Only published courses can be bought.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Pending,
    Published,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub price: Decimal,
    pub instructor_id: UserId,
    pub status: CourseStatus,
    pub cover_image: Option<String>,
}

impl Course {
    pub fn is_published(&self) -> bool {
        self.status == CourseStatus::Published
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Concrete adapter errors
    ///
    /// Connectivity, configuration or permission problems in whatever backs
    /// the catalog.
    #[error("catalog backend error: {0}")]
    Unavailable(String),
}
