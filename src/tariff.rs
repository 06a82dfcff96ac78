// 💵 Tariff Calculator - Elapsed time → amount due
//
// Tiered-capped schedule:
// - up to and including TIER_LIMIT: every started hour costs UNIT_RATE
// - beyond TIER_LIMIT: FLAT_RATE, no matter how long
//
// Pure and deterministic. Comparisons use the full Duration (nanoseconds):
// exactly 5:00:00 stays tiered, 5:00:00 plus any fraction is flat.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParkingError, Result};

/// Money in whole currency units (COP in the deployed facility)
pub type Amount = i64;

pub const DEFAULT_UNIT_RATE: Amount = 1_000;
pub const DEFAULT_FLAT_RATE: Amount = 10_000;
pub const DEFAULT_TIER_LIMIT_HOURS: u32 = 5;

const SECONDS_PER_HOUR: f64 = 3_600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffCalculator {
    /// Charge per started hour inside the tier
    pub unit_rate: Amount,

    /// Charge once the stay exceeds the tier limit
    pub flat_rate: Amount,

    /// Length of the hourly tier, in hours
    pub tier_limit_hours: u32,
}

impl TariffCalculator {
    pub fn new(unit_rate: Amount, flat_rate: Amount, tier_limit_hours: u32) -> Self {
        TariffCalculator {
            unit_rate,
            flat_rate,
            tier_limit_hours,
        }
    }

    /// Amount due for a stay from `entry` to `exit`
    pub fn fare(&self, entry: DateTime<Utc>, exit: DateTime<Utc>) -> Result<Amount> {
        self.fare_for_elapsed(exit - entry)
    }

    /// Amount due for a stay of the given length
    pub fn fare_for_elapsed(&self, elapsed: Duration) -> Result<Amount> {
        if elapsed <= Duration::zero() {
            return Err(ParkingError::InvalidTimeRange);
        }

        if elapsed > Duration::hours(i64::from(self.tier_limit_hours)) {
            return Ok(self.flat_rate);
        }

        let whole_hours = elapsed.num_hours();
        let started_hours = if elapsed > Duration::hours(whole_hours) {
            whole_hours + 1
        } else {
            whole_hours
        };
        Ok(started_hours * self.unit_rate)
    }

    /// Amount due for a stay of `hours` (real-valued)
    pub fn fare_for_hours(&self, hours: f64) -> Result<Amount> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(ParkingError::InvalidTimeRange);
        }
        if hours <= f64::from(self.tier_limit_hours) {
            Ok(hours.ceil() as Amount * self.unit_rate)
        } else {
            Ok(self.flat_rate)
        }
    }
}

impl Default for TariffCalculator {
    fn default() -> Self {
        TariffCalculator::new(DEFAULT_UNIT_RATE, DEFAULT_FLAT_RATE, DEFAULT_TIER_LIMIT_HOURS)
    }
}

/// Elapsed time in fractional hours, for receipts and status displays
pub fn elapsed_hours(entry: DateTime<Utc>, exit: DateTime<Utc>) -> f64 {
    let elapsed = exit - entry;
    (elapsed.num_seconds() as f64 + f64::from(elapsed.subsec_nanos()) / 1e9) / SECONDS_PER_HOUR
}
