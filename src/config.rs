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

//! Runtime configuration for the purchase orchestrator.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Fee rate must be a fraction in `[0, 1)`
    #[error("platform fee rate {0} is outside [0, 1)")]
    FeeRateOutOfRange(Decimal),
}

/// Ledger settings injected at orchestrator construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    platform_fee_rate: Decimal,
}

impl LedgerConfig {
    /// Platform share of every sale unless configured otherwise.
    pub const DEFAULT_FEE_RATE: Decimal = dec!(0.05);

    /// Builds a configuration with the given platform fee rate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FeeRateOutOfRange`] unless `0 <= rate < 1`.
    pub fn new(platform_fee_rate: Decimal) -> Result<Self, ConfigError> {
        if platform_fee_rate < Decimal::ZERO || platform_fee_rate >= Decimal::ONE {
            return Err(ConfigError::FeeRateOutOfRange(platform_fee_rate));
        }
        Ok(Self { platform_fee_rate })
    }

    pub fn platform_fee_rate(&self) -> Decimal {
        self.platform_fee_rate
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: Self::DEFAULT_FEE_RATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_five_percent() {
        assert_eq!(LedgerConfig::default().platform_fee_rate(), dec!(0.05));
    }

    #[test]
    fn accepts_zero_rate() {
        assert!(LedgerConfig::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn rejects_negative_and_full_rates() {
        assert_eq!(
            LedgerConfig::new(dec!(-0.01)),
            Err(ConfigError::FeeRateOutOfRange(dec!(-0.01)))
        );
        assert_eq!(
            LedgerConfig::new(Decimal::ONE),
            Err(ConfigError::FeeRateOutOfRange(Decimal::ONE))
        );
    }
}
