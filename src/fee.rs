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

//! Splitting a sale between the platform and the course instructor.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits of the settlement currency.
pub const CURRENCY_DECIMALS: u32 = 2;

/// How a course price is divided between platform and instructor.
///
/// `platform_fee + instructor_income == price` holds exactly: the fee is
/// rounded once and the income is whatever remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub price: Decimal,
    pub platform_fee: Decimal,
    pub instructor_income: Decimal,
}

impl FeeSplit {
    /// Computes the split of `price` at `fee_rate`, rounding the fee half-up to cents.
    pub fn compute(price: Decimal, fee_rate: Decimal) -> Self {
        let platform_fee = (price * fee_rate)
            .round_dp_with_strategy(CURRENCY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
        Self {
            price,
            platform_fee,
            instructor_income: price - platform_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(50.00), dec!(2.50), dec!(47.50))]
    #[case(dec!(99.90), dec!(5.00), dec!(94.90))]
    #[case(dec!(0.10), dec!(0.01), dec!(0.09))]
    #[case(dec!(0.01), dec!(0.00), dec!(0.01))]
    #[case(dec!(19.99), dec!(1.00), dec!(18.99))]
    #[case(dec!(0), dec!(0), dec!(0))]
    fn five_percent_split(
        #[case] price: Decimal,
        #[case] fee: Decimal,
        #[case] income: Decimal,
    ) {
        let split = FeeSplit::compute(price, dec!(0.05));
        assert_eq!(split.platform_fee, fee);
        assert_eq!(split.instructor_income, income);
        assert_eq!(split.platform_fee + split.instructor_income, price);
    }

    #[test]
    fn midpoint_rounds_up() {
        // 0.30 * 0.05 = 0.015
        let split = FeeSplit::compute(dec!(0.30), dec!(0.05));
        assert_eq!(split.platform_fee, dec!(0.02));
        assert_eq!(split.instructor_income, dec!(0.28));
    }

    #[test]
    fn zero_rate_pays_everything_to_instructor() {
        let split = FeeSplit::compute(dec!(128.00), Decimal::ZERO);
        assert_eq!(split.platform_fee, Decimal::ZERO);
        assert_eq!(split.instructor_income, dec!(128.00));
    }
}
